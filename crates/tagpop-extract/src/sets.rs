use scraper::Html;
use url::Url;

use crate::model::{Extracted, Scope, SetPerYear, TotalsRollup, YearCtx};
use crate::table::{self, Naming};
use crate::text::is_totals;

/// Extracts the sets listed on a year page.
pub fn extract_sets(html: &str, ctx: &YearCtx, base: &Url) -> Extracted<SetPerYear> {
    let doc = Html::parse_document(html);
    let mut out = Extracted::default();

    for table in table::tables(&doc) {
        for cells in table.rows() {
            let Some(title_cell) = cells.first() else {
                continue;
            };
            let set_title = table::text(title_cell);
            if set_title.is_empty() {
                out.skipped += 1;
                continue;
            }

            let metrics = table::row_metrics(&table.headers, &cells, 1, Naming::Grades);

            if is_totals(&set_title) {
                out.totals.push(TotalsRollup {
                    scope: Scope::Year,
                    sport: ctx.sport.clone(),
                    year: Some(ctx.year.clone()),
                    set_title: None,
                    card_name: None,
                    metrics,
                });
                continue;
            }

            out.children.push(SetPerYear {
                sport: ctx.sport.clone(),
                year: ctx.year.clone(),
                year_url: ctx.year_url.clone(),
                set_title,
                set_urls: table::links(title_cell, base),
                metrics,
            });
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MetricValue;

    #[test]
    fn sets_keep_all_title_links() {
        let html = r#"<table>
          <thead><tr><th>Set</th><th>10</th><th>9</th><th>Total</th></tr></thead>
          <tbody>
            <tr><td><a href="/pop-report/Baseball/1989/Donruss">Donruss</a><a href="/pop-report/Baseball/1989/Donruss?setName=Light+Blue">Light Blue</a></td><td>1</td><td>2</td><td>15</td></tr>
            <tr><td>Unlinked Set</td><td>-</td><td>-</td><td>1</td></tr>
            <tr><td></td><td>1</td><td>1</td><td>1</td></tr>
            <tr><td>TOTALS</td><td>10</td><td>20</td><td>592</td></tr>
          </tbody>
        </table>"#;
        let ctx = YearCtx {
            sport: "Baseball".into(),
            year: "1989".into(),
            year_url: "https://my.taggrading.com/pop-report/Baseball/1989".into(),
        };
        let base = Url::parse("https://my.taggrading.com").unwrap();
        let out = extract_sets(html, &ctx, &base);

        assert_eq!(out.children.len(), 2);
        let donruss = &out.children[0];
        assert_eq!(donruss.set_title, "DonrussLight Blue");
        assert_eq!(donruss.set_urls.len(), 2);
        assert_eq!(
            donruss.set_page_url(),
            Some("https://my.taggrading.com/pop-report/Baseball/1989/Donruss")
        );
        assert_eq!(donruss.metrics.get("grade_10"), Some(&MetricValue::Count(1)));
        assert_eq!(donruss.metrics.total, Some(MetricValue::Count(15)));

        let unlinked = &out.children[1];
        assert!(unlinked.set_urls.is_empty());
        assert_eq!(unlinked.metrics.len(), 1);

        assert_eq!(out.skipped, 1);
        assert_eq!(out.totals.len(), 1);
        assert_eq!(out.totals[0].scope, Scope::Year);
        assert_eq!(out.totals[0].year.as_deref(), Some("1989"));
        assert_eq!(out.totals[0].metrics.total, Some(MetricValue::Count(592)));
    }
}
