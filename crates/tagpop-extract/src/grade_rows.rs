use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html};
use url::Url;

use crate::model::{CardCtx, Extracted, GradeRow, Scope, TotalsRollup};
use crate::set_name::clean_set_title;
use crate::table::{self, Naming};
use crate::text::{is_totals, normalize};

lazy_static! {
    static ref MDY_DASH: Regex = Regex::new(r"^(\d{1,2})-(\d{1,2})-(\d{4})").unwrap();
    static ref MDY_SLASH: Regex = Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})").unwrap();
    static ref YMD: Regex = Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})").unwrap();
}

/// A grade table must map at least this many known columns.
const MIN_MAPPED_COLUMNS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Column {
    Rank,
    TagGrade,
    ReportUrl,
    RankByGrade,
    Chronology,
    ChronByGrade,
    Completed,
    CertNumber,
}

fn column_of(header: &str) -> Option<Column> {
    let h = header.to_lowercase();
    if h.contains("rank") && !h.contains("grade") && !h.contains("by") {
        Some(Column::Rank)
    } else if h.contains("tag grade") {
        Some(Column::TagGrade)
    } else if h.contains("report") {
        Some(Column::ReportUrl)
    } else if h.contains("rank by grade") {
        Some(Column::RankByGrade)
    } else if h.contains("chronology") && !h.contains("grade") {
        Some(Column::Chronology)
    } else if h.contains("chron by grade") {
        Some(Column::ChronByGrade)
    } else if h.contains("completed") {
        Some(Column::Completed)
    } else if h.contains("cert number") {
        Some(Column::CertNumber)
    } else {
        None
    }
}

fn map_columns(headers: &[String]) -> HashMap<Column, usize> {
    let mut columns = HashMap::new();
    for (i, header) in headers.iter().enumerate() {
        if let Some(col) = column_of(header) {
            columns.insert(col, i);
        }
    }
    columns
}

/// The `value` attribute when it carries data, else the display text.
fn cell_value(cell: &ElementRef) -> String {
    match cell.value().attr("value").map(str::trim) {
        Some(v) if !v.is_empty() && v != "0" => v.to_string(),
        _ => table::text(cell),
    }
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

/// Parses a displayed completion date, `None` unless it is a real date.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = normalize(text);
    let mdy = MDY_DASH
        .captures(&text)
        .or_else(|| MDY_SLASH.captures(&text));
    let ymd: (i32, u32, u32) = if let Some(c) = mdy {
        (c[3].parse().ok()?, c[1].parse().ok()?, c[2].parse().ok()?)
    } else if let Some(c) = YMD.captures(&text) {
        (c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?)
    } else {
        return None;
    };
    NaiveDate::from_ymd_opt(ymd.0, ymd.1, ymd.2)
}

fn parse_timestamp(value: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }
    let value = value.trim_end_matches('Z');
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M"))
        .ok()
        .map(|dt| dt.date())
}

/// Raw and parsed completion date of a cell.
///
/// An ISO timestamp in the `value` attribute wins and its raw form becomes
/// `MM-DD-YYYY`, otherwise the displayed text is parsed.
fn completed_date(cell: &ElementRef) -> (Option<String>, Option<NaiveDate>) {
    if let Some(value) = cell.value().attr("value").filter(|v| v.contains('T')) {
        if let Some(date) = parse_timestamp(value.trim()) {
            return (Some(date.format("%m-%d-%Y").to_string()), Some(date));
        }
    }
    let raw = table::text(cell);
    let iso = parse_date(&raw);
    (non_empty(raw), iso)
}

/// Extracts the graded copies listed on a card page.
pub fn extract_grade_rows(html: &str, ctx: &CardCtx, base: &Url) -> Extracted<GradeRow> {
    let doc = Html::parse_document(html);
    let set_title = clean_set_title(&ctx.set_title);
    let mut out = Extracted::default();

    let Some((table, columns)) = table::tables(&doc)
        .into_iter()
        .map(|t| {
            let columns = map_columns(&t.headers);
            (t, columns)
        })
        .find(|(_, columns)| columns.len() >= MIN_MAPPED_COLUMNS)
    else {
        log::warn!("No grade table found on {}", ctx.card_url);
        return out;
    };

    let width = columns.values().max().map_or(0, |max| max + 1);

    for cells in table.rows() {
        if cells.first().map_or(false, |c| is_totals(&table::text(c))) {
            out.totals.push(TotalsRollup {
                scope: Scope::Card,
                sport: ctx.sport.clone(),
                year: Some(ctx.year.clone()),
                set_title: Some(set_title.clone()),
                card_name: Some(ctx.card_name.clone()),
                metrics: table::row_metrics(&[], &cells, 1, Naming::Grades),
            });
            continue;
        }

        if cells.len() < width {
            out.skipped += 1;
            continue;
        }

        let text_of = |col: Column| columns.get(&col).map(|&i| cell_value(&cells[i]));
        let display_of = |col: Column| columns.get(&col).map(|&i| table::text(&cells[i]));

        let Some(cert_number) = text_of(Column::CertNumber).and_then(non_empty) else {
            log::debug!("Skipping grade row without cert number on {}", ctx.card_url);
            out.skipped += 1;
            continue;
        };
        let Some(tag_grade) = text_of(Column::TagGrade).and_then(non_empty) else {
            log::debug!("Skipping grade row {cert_number} without TAG grade");
            out.skipped += 1;
            continue;
        };

        let report_url = columns
            .get(&Column::ReportUrl)
            .and_then(|&i| table::links(&cells[i], base).into_iter().next())
            .filter(|u| u.starts_with("http"));

        let (completed_date_raw, completed_date_iso) = match columns.get(&Column::Completed) {
            Some(&i) => completed_date(&cells[i]),
            None => (None, None),
        };

        out.children.push(GradeRow {
            sport: ctx.sport.clone(),
            year: ctx.year.clone(),
            set_title: set_title.clone(),
            card_name: ctx.card_name.clone(),
            cert_number,
            card_url: ctx.card_url.clone(),
            rank: text_of(Column::Rank).and_then(non_empty),
            tag_grade,
            report_url,
            rank_by_grade: text_of(Column::RankByGrade).and_then(non_empty),
            chronology: display_of(Column::Chronology).and_then(non_empty),
            chron_by_grade: display_of(Column::ChronByGrade).and_then(non_empty),
            completed_date_raw,
            completed_date_iso,
        });
    }

    out
}
