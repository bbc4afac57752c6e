use scraper::Html;
use url::Url;

use crate::model::{CardPerSet, Extracted, Scope, SetCtx, TotalsRollup};
use crate::set_name::clean_set_title;
use crate::table::{self, Naming};
use crate::text::is_totals;

/// Columns before the grade counts: card number then card name.
const FIRST_METRIC: usize = 2;

/// Extracts the cards listed on a set page.
///
/// The set title of every record is the cleaned title of `ctx`, so variants
/// reached through different URLs group under the same key.
pub fn extract_cards(html: &str, ctx: &SetCtx, base: &Url) -> Extracted<CardPerSet> {
    let doc = Html::parse_document(html);
    let set_title = clean_set_title(&ctx.set_title);
    let mut out = Extracted::default();

    for table in table::tables(&doc) {
        for cells in table.rows() {
            let [number_cell, name_cell, ..] = cells.as_slice() else {
                out.skipped += 1;
                continue;
            };
            let card_number = table::text(number_cell);
            let card_name = table::text(name_cell);

            if is_totals(&card_name) || is_totals(&card_number) {
                out.totals.push(TotalsRollup {
                    scope: Scope::Set,
                    sport: ctx.sport.clone(),
                    year: Some(ctx.year.clone()),
                    set_title: Some(set_title.clone()),
                    card_name: None,
                    metrics: table::row_metrics(
                        &table.headers,
                        &cells,
                        FIRST_METRIC,
                        Naming::Grades,
                    ),
                });
                continue;
            }

            if card_number.is_empty() || card_name.is_empty() {
                out.skipped += 1;
                continue;
            }

            out.children.push(CardPerSet {
                sport: ctx.sport.clone(),
                year: ctx.year.clone(),
                set_title: set_title.clone(),
                set_url: ctx.set_url.clone(),
                card_name,
                card_number: Some(card_number),
                card_urls: table::links(name_cell, base),
                metrics: table::row_metrics(&table.headers, &cells, FIRST_METRIC, Naming::Grades),
            });
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MetricValue;

    fn ctx() -> SetCtx {
        SetCtx {
            sport: "Baseball".into(),
            year: "1989".into(),
            set_title: "Donruss?setName=Light+Blue".into(),
            set_url: "https://my.taggrading.com/pop-report/Baseball/1989/Donruss".into(),
        }
    }

    #[test]
    fn cards_need_number_and_name() {
        let html = r#"<table>
          <thead><tr><th>#</th><th>Player</th><th>10</th><th>9</th><th>Total</th></tr></thead>
          <tbody>
            <tr><td>53</td><td><a href="/pop-report/Baseball/1989/Donruss/Gary Carter/53">Gary Carter</a></td><td>1</td><td>2</td><td>3</td></tr>
            <tr><td></td><td>No Number</td><td>1</td><td>1</td><td>2</td></tr>
            <tr><td>7</td></tr>
            <tr><td>TOTALS</td><td></td><td>5</td><td>6</td><td>11</td></tr>
          </tbody>
        </table>"#;
        let base = Url::parse("https://my.taggrading.com").unwrap();
        let out = extract_cards(html, &ctx(), &base);

        assert_eq!(out.children.len(), 1);
        let card = &out.children[0];
        assert_eq!(card.card_name, "Gary Carter");
        assert_eq!(card.card_number.as_deref(), Some("53"));
        assert_eq!(card.set_title, "Donruss");
        assert_eq!(
            card.card_page_url(),
            Some("https://my.taggrading.com/pop-report/Baseball/1989/Donruss/Gary%20Carter/53")
        );
        assert_eq!(card.metrics.get("grade_10"), Some(&MetricValue::Count(1)));
        assert_eq!(card.metrics.total, Some(MetricValue::Count(3)));
        assert_eq!(out.skipped, 2);

        assert_eq!(out.totals.len(), 1);
        let totals = &out.totals[0];
        assert_eq!(totals.scope, Scope::Set);
        assert_eq!(totals.set_title.as_deref(), Some("Donruss"));
        assert_eq!(totals.card_name, None);
        assert_eq!(totals.metrics.total, Some(MetricValue::Count(11)));
    }
}
