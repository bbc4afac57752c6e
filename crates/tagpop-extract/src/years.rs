use scraper::Html;
use url::Url;

use crate::model::{Extracted, Scope, SportCtx, TotalsRollup, YearIndexEntry};
use crate::table::{self, Naming};
use crate::text::is_totals;

fn is_year(title: &str) -> bool {
    title.len() == 4 && title.bytes().all(|b| b.is_ascii_digit())
}

/// Extracts the years listed on a sport page.
pub fn extract_years(html: &str, ctx: &SportCtx, base: &Url) -> Extracted<YearIndexEntry> {
    let doc = Html::parse_document(html);
    let mut out = Extracted::default();

    for table in table::tables(&doc) {
        for cells in table.rows() {
            let Some(title_cell) = cells.first() else {
                continue;
            };
            let title = table::text(title_cell);

            if is_totals(&title) {
                out.totals.push(TotalsRollup {
                    scope: Scope::Sport,
                    sport: ctx.sport.clone(),
                    year: None,
                    set_title: None,
                    card_name: None,
                    metrics: table::row_metrics(&table.headers, &cells, 1, Naming::Sport),
                });
                continue;
            }

            if !is_year(&title) {
                log::debug!("Skipping non-year row: {title:?}");
                out.skipped += 1;
                continue;
            }

            let Some(year_url) = table::links(title_cell, base).into_iter().next() else {
                log::warn!("No URL found for {} year {title}", ctx.sport);
                out.skipped += 1;
                continue;
            };

            out.children.push(YearIndexEntry {
                sport: ctx.sport.clone(),
                year: title,
                year_url,
            });
        }
    }

    out
}
