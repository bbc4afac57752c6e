use lazy_static::lazy_static;
use scraper::{Html, Selector};
use url::Url;

use crate::model::{Category, Extracted, Metrics};
use crate::table::{self, Naming};
use crate::text::{is_totals, normalize, resolve_link};

/// Sports crawled when the pop-report index cannot be read.
pub const DEFAULT_CATEGORIES: &[&str] = &[
    "Baseball",
    "Basketball",
    "Football",
    "Hockey",
    "MMA",
    "Soccer",
    "Racing",
    "Golf",
    "Tennis",
    "Boxing",
    "Other Sports",
    "Multi-Sport",
    "Marvel/DC",
    "Star Wars",
    "Fortnite",
    "Garbage Pail Kids",
    "Music",
    "TV/Movies",
    "Wrestling",
    "Video Games",
    "Nature",
    "Pop Culture",
    "Disney",
    "Pokémon",
    "Magic the Gathering",
    "Dragon Ball",
    "Metazoo",
    "Weiß Schwarz",
    "One Piece",
    "Lorcana",
    "Digimon",
    "Other TCG",
];

lazy_static! {
    static ref LINK: Selector = Selector::parse("a[href]").unwrap();
}

/// Sport name of a `/pop-report/{sport}` link, if the link is one.
fn sport_of(url: &Url) -> Option<String> {
    let segments = url.path_segments()?.filter(|s| !s.is_empty()).collect::<Vec<_>>();
    match segments.as_slice() {
        ["pop-report", sport] => Some(crate::set_name::clean_set_title(sport)),
        _ => None,
    }
}

/// Extracts the sports listed on the pop-report index.
///
/// Table rows contribute their counts, bare links (menus, tiles) only their
/// name. The index has no scope above sport so TOTALS rows are dropped.
pub fn extract_categories(html: &str, base: &Url) -> Extracted<Category> {
    let doc = Html::parse_document(html);
    let mut out = Extracted::default();

    for table in table::tables(&doc) {
        for cells in table.rows() {
            let Some(title_cell) = cells.first() else {
                continue;
            };
            let title = table::text(title_cell);
            if is_totals(&title) {
                continue;
            }
            let url = table::links(title_cell, base)
                .into_iter()
                .find(|u| Url::parse(u).ok().and_then(|u| sport_of(&u)).is_some());
            match url {
                Some(url) if !title.is_empty() => push_category(
                    &mut out,
                    title,
                    url,
                    table::row_metrics(&table.headers, &cells, 1, Naming::Sport),
                ),
                _ => out.skipped += 1,
            }
        }
    }

    for a in doc.select(&LINK) {
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        let Some(url) = resolve_link(base, href) else {
            continue;
        };
        let Some(sport) = Url::parse(&url).ok().and_then(|u| sport_of(&u)) else {
            continue;
        };
        let text = normalize(&a.text().collect::<String>());
        let name = if text.is_empty() || is_totals(&text) { sport } else { text };
        push_category(&mut out, name, url, Metrics::default());
    }

    out
}

fn push_category(out: &mut Extracted<Category>, name: String, url: String, metrics: Metrics) {
    if out.children.iter().any(|c| c.url == url) {
        return;
    }
    out.children.push(Category { name, url, metrics });
}
