//! Walks the report tables shared by every level of the site.

use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::model::{MetricValue, Metrics};
use crate::text::{dedup_ordered, normalize, parse_metric, resolve_link};

lazy_static! {
    static ref TABLE: Selector = Selector::parse("table").unwrap();
    static ref HEADER_ROW: Selector = Selector::parse("thead tr").unwrap();
    static ref HEADER_CELL: Selector = Selector::parse("th").unwrap();
    static ref BODY_ROW: Selector = Selector::parse("tbody tr").unwrap();
    static ref CELL: Selector = Selector::parse("td").unwrap();
    static ref LINK: Selector = Selector::parse("a[href]").unwrap();
    static ref CONTENT: Selector = Selector::parse("tbody tr, ul li, ol li").unwrap();
}

const GENERIC_HEADERS: &[&str] = &["", "#", "grade", "card", "player", "set", "year", "name"];

const SPORT_METRICS: &[&str] = &["num_sets", "total_items", "total_graded"];

#[derive(Debug, Clone, Copy)]
pub(crate) enum Naming {
    /// Sport pages report fixed columns.
    Sport,
    /// Grade columns named from the table header when it is meaningful.
    Grades,
}

pub(crate) struct Table<'a> {
    pub element: ElementRef<'a>,
    pub headers: Vec<String>,
}

impl<'a> Table<'a> {
    pub fn rows(&self) -> impl Iterator<Item = Vec<ElementRef<'a>>> + 'a {
        self.element
            .select(&BODY_ROW)
            .map(|row| row.select(&CELL).collect::<Vec<_>>())
    }
}

pub(crate) fn tables(doc: &Html) -> Vec<Table<'_>> {
    doc.select(&TABLE)
        .map(|element| {
            let headers = element
                .select(&HEADER_ROW)
                .map(|tr| tr.select(&HEADER_CELL).map(|th| text(&th)).collect::<Vec<_>>())
                .filter(|cells| !cells.is_empty())
                .last()
                .unwrap_or_default();
            Table { element, headers }
        })
        .collect()
}

/// Whether a document carries any row or list item to extract.
pub fn has_content(html: &str) -> bool {
    Html::parse_document(html).select(&CONTENT).next().is_some()
}

/// Normalized text content of an element.
pub(crate) fn text(element: &ElementRef) -> String {
    normalize(&element.text().collect::<String>())
}

/// Outbound links of a cell, resolved and de-duplicated.
pub(crate) fn links(cell: &ElementRef, base: &Url) -> Vec<String> {
    dedup_ordered(
        cell.select(&LINK)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| resolve_link(base, href)),
    )
}

/// Builds the metrics of a row from its cells starting at `first`.
pub(crate) fn row_metrics(
    headers: &[String],
    cells: &[ElementRef],
    first: usize,
    naming: Naming,
) -> Metrics {
    let mut metrics = Metrics::default();
    let metric_cells = cells.get(first..).unwrap_or_default();
    let last = metric_cells.len().saturating_sub(1);

    for (i, cell) in metric_cells.iter().enumerate() {
        let Some(value) = parse_metric(&text(cell)) else {
            continue;
        };
        let key = match naming {
            Naming::Sport => match SPORT_METRICS.get(i) {
                Some(name) => name.to_string(),
                None => format!("metric_{i}"),
            },
            Naming::Grades => grade_key(headers.get(first + i), i, i == last, &value),
        };
        metrics.insert(&key, value);
    }

    metrics
}

fn grade_key(header: Option<&String>, i: usize, is_last: bool, value: &MetricValue) -> String {
    match header {
        Some(h) if h.eq_ignore_ascii_case("total") || h.eq_ignore_ascii_case("totals") => {
            "total".to_string()
        }
        Some(h) if !GENERIC_HEADERS.contains(&h.to_ascii_lowercase().as_str()) => {
            format!("grade_{h}")
        }
        _ if is_last && matches!(value, MetricValue::Count(_)) => "total".to_string(),
        _ => format!("grade_{i}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_row_metrics(html: &str, first: usize, naming: Naming) -> Metrics {
        let doc = Html::parse_document(html);
        let tables = tables(&doc);
        let table = &tables[0];
        let cells = table.rows().next().unwrap();
        row_metrics(&table.headers, &cells, first, naming)
    }

    #[test]
    fn header_names_grade_columns() {
        let html = r#"<table>
            <thead><tr><th>Set</th><th>10</th><th>9.5</th><th>Total</th></tr></thead>
            <tbody><tr><td>Donruss</td><td>1</td><td>-</td><td>1,015</td></tr></tbody>
        </table>"#;
        let metrics = first_row_metrics(html, 1, Naming::Grades);
        assert_eq!(metrics.get("grade_10"), Some(&MetricValue::Count(1)));
        assert_eq!(metrics.get("grade_9.5"), None);
        assert_eq!(metrics.total, Some(MetricValue::Count(1015)));
        assert_eq!(metrics.len(), 2);
    }

    #[test]
    fn positional_names_without_headers() {
        let html = r#"<table><tbody>
            <tr><td>Donruss</td><td>3</td><td>x</td><td>12</td></tr>
        </tbody></table>"#;
        let metrics = first_row_metrics(html, 1, Naming::Grades);
        assert_eq!(metrics.get("grade_0"), Some(&MetricValue::Count(3)));
        assert_eq!(metrics.get("grade_1"), Some(&MetricValue::Text("x".into())));
        assert_eq!(metrics.total, Some(MetricValue::Count(12)));
    }

    #[test]
    fn generic_headers_fall_back_to_positions() {
        let html = r#"<table>
            <thead><tr><th>#</th><th>Player</th><th>Grade</th><th></th></tr></thead>
            <tbody><tr><td>53</td><td>Gary Carter</td><td>4</td><td>9</td></tr></tbody>
        </table>"#;
        let metrics = first_row_metrics(html, 2, Naming::Grades);
        assert_eq!(metrics.get("grade_0"), Some(&MetricValue::Count(4)));
        assert_eq!(metrics.total, Some(MetricValue::Count(9)));
    }

    #[test]
    fn sport_columns_have_fixed_names() {
        let html = r#"<table><tbody>
            <tr><td>TOTALS</td><td>4,405</td><td>9,708</td><td>46,291</td><td>2</td></tr>
        </tbody></table>"#;
        let metrics = first_row_metrics(html, 1, Naming::Sport);
        assert_eq!(metrics.num_sets, Some(MetricValue::Count(4405)));
        assert_eq!(metrics.total_items, Some(MetricValue::Count(9708)));
        assert_eq!(metrics.total_graded, Some(MetricValue::Count(46291)));
        assert_eq!(metrics.get("metric_3"), Some(&MetricValue::Count(2)));
    }

    #[test]
    fn content_needs_rows_or_items() {
        assert!(has_content("<table><tr><td>1</td></tr></table>"));
        assert!(has_content("<ul><li>Baseball</li></ul>"));
        assert!(!has_content("<table></table><ul></ul>"));
        assert!(!has_content(r#"<div id="app"></div>"#));
    }

    #[test]
    fn cell_links_are_deduplicated() {
        let html = r##"<table><tbody><tr><td>
            <a href="/pop-report/Baseball/1989">1989</a>
            <a href="/pop-report/Baseball/1989">again</a>
            <a href="#">skip</a>
            <a href="/pop-report/Baseball/1989?x=1">variant</a>
        </td></tr></tbody></table>"##;
        let doc = Html::parse_document(html);
        let tables = tables(&doc);
        let cells = tables[0].rows().next().unwrap();
        let base = Url::parse("https://my.taggrading.com").unwrap();
        assert_eq!(
            links(&cells[0], &base),
            vec![
                "https://my.taggrading.com/pop-report/Baseball/1989",
                "https://my.taggrading.com/pop-report/Baseball/1989?x=1",
            ]
        );
    }
}
