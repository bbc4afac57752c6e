use lazy_static::lazy_static;
use regex::Regex;
use url::Url;

use crate::model::MetricValue;

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Trims and collapses internal whitespace runs to a single space.
pub fn normalize(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

pub fn is_totals(title: &str) -> bool {
    normalize(title).eq_ignore_ascii_case("totals")
}

/// Parses a metric cell.
///
/// Purely numeric text (thousands separators allowed) becomes a count, any
/// other non-empty text is kept as is. Empty cells and `-` are not observed.
pub fn parse_metric(text: &str) -> Option<MetricValue> {
    let text = normalize(text);
    if text.is_empty() || text == "-" {
        return None;
    }
    let digits = text.replace(',', "");
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(n) = digits.parse::<i64>() {
            return Some(MetricValue::Count(n));
        }
    }
    Some(MetricValue::Text(text))
}

/// Resolves a link found in a page against the site base.
///
/// Fragments, `javascript:` pseudo links and empty hrefs are not destinations.
pub fn resolve_link(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.to_ascii_lowercase().starts_with("javascript:")
    {
        return None;
    }
    base.join(href).ok().map(String::from)
}

/// Keeps the first occurrence of each item.
pub fn dedup_ordered(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(normalize("  Upper \n\t Deck  "), "Upper Deck");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn totals_detection_ignores_case_and_spacing() {
        assert!(is_totals("TOTALS"));
        assert!(is_totals("  totals "));
        assert!(is_totals("Totals"));
        assert!(!is_totals("Totals Set"));
        assert!(!is_totals("TOTAL"));
    }

    #[test]
    fn metrics_parse_counts_and_text() {
        assert_eq!(parse_metric("1,234"), Some(MetricValue::Count(1234)));
        assert_eq!(parse_metric(" 7 "), Some(MetricValue::Count(7)));
        assert_eq!(parse_metric("-"), None);
        assert_eq!(parse_metric("   "), None);
        assert_eq!(parse_metric("N/A"), Some(MetricValue::Text("N/A".into())));
        assert_eq!(parse_metric("1.5"), Some(MetricValue::Text("1.5".into())));
    }

    #[test]
    fn links_resolve_against_base() {
        let base = Url::parse("https://my.taggrading.com").unwrap();
        assert_eq!(
            resolve_link(&base, "/pop-report/Baseball/1989").as_deref(),
            Some("https://my.taggrading.com/pop-report/Baseball/1989")
        );
        assert_eq!(
            resolve_link(&base, "https://other.example/x").as_deref(),
            Some("https://other.example/x")
        );
        assert_eq!(resolve_link(&base, "#top"), None);
        assert_eq!(resolve_link(&base, "javascript:void(0)"), None);
        assert_eq!(resolve_link(&base, ""), None);
    }

    #[test]
    fn dedup_keeps_first_seen_order() {
        let urls = dedup_ordered(["b", "a", "b", "c", "a"].map(String::from));
        assert_eq!(urls, vec!["b", "a", "c"]);
    }
}
