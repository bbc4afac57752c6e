//! Set titles as displayed by the site glue a base set and a variant
//! together (`DonrussNight Moves`). Set pages are addressed by the base set
//! with the variant as a `setName` query parameter.

use lazy_static::lazy_static;
use regex::Regex;
use url::Url;

use crate::text::normalize;

/// Known base sets grouped with their common variations.
pub const KNOWN_BASE_SETS: &[(&str, &[&str])] = &[
    ("Donruss", &["Donruss"]),
    (
        "Topps",
        &["Topps", "Topps Chrome", "Topps Finest", "Topps Now", "Topps Total Football"],
    ),
    ("Panini", &["Panini", "Panini Prizm", "Panini Select", "Panini Instant"]),
    ("Upper Deck", &["Upper Deck"]),
    ("Fleer", &["Fleer"]),
    ("Score", &["Score"]),
    ("Stadium Club", &["Stadium Club"]),
    ("Bowman", &["Bowman", "Bowman Chrome"]),
    ("Leaf", &["Leaf"]),
    ("Playoff", &["Playoff"]),
    ("Skybox", &["Skybox"]),
    ("Pacific", &["Pacific"]),
    ("Collector's Edge", &["Collector's Edge"]),
    ("Pinnacle", &["Pinnacle"]),
    ("Studio", &["Studio"]),
    ("Flair", &["Flair"]),
    ("SP", &["SP"]),
    ("Ultra", &["Ultra"]),
    ("Collector's Choice", &["Collector's Choice"]),
    ("Classic", &["Classic"]),
    ("TSC", &["TSC"]),
    ("Parkside", &["Parkside"]),
    ("Wild Card", &["Wild Card"]),
    ("Futera", &["Futera"]),
    ("NSCC", &["NSCC"]),
    ("Platinum", &["Platinum"]),
    ("Pristine", &["Pristine"]),
    ("Deco", &["Deco"]),
    ("Showtime", &["Showtime"]),
    ("Knockout", &["Knockout"]),
    ("Living", &["Living"]),
    ("Merlin", &["Merlin", "Merlin Chrome", "Merlin Heritage"]),
    ("Impact", &["Impact"]),
    ("Jade Edition", &["Jade Edition"]),
    ("Gold", &["Gold"]),
    ("Focus", &["Focus"]),
    ("FuGenZ", &["FuGenZ"]),
    ("Match Attax", &["Match Attax"]),
    ("Adrenalyn XL", &["Adrenalyn XL"]),
];

lazy_static! {
    static ref CAMEL_CASE: Regex = Regex::new(r"^([A-Z][a-z]+)([A-Z].*)$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetName {
    pub base: String,
    pub variant: Option<String>,
}

impl SetName {
    fn new(base: &str, rest: &str) -> Self {
        let rest = rest.trim();
        Self {
            base: base.trim().to_string(),
            variant: (!rest.is_empty()).then(|| rest.to_string()),
        }
    }
}

/// Splits a displayed set title into its base set and variant.
///
/// Known bases win, the longest matching one first. Unknown titles are split
/// at a camel case boundary, then at the first space; a title with neither
/// is a base on its own.
pub fn split_set_name(title: &str) -> SetName {
    let title = normalize(title);

    let known = KNOWN_BASE_SETS
        .iter()
        .flat_map(|(_, variations)| variations.iter())
        .filter(|base| title.starts_with(**base))
        .max_by_key(|base| base.len());
    if let Some(base) = known {
        return SetName::new(base, &title[base.len()..]);
    }

    if let Some(caps) = CAMEL_CASE.captures(&title) {
        return SetName::new(&caps[1], &caps[2]);
    }

    let chars = title.char_indices().collect::<Vec<_>>();
    for pair in chars.windows(2) {
        let ((_, prev), (i, c)) = (pair[0], pair[1]);
        if prev.is_lowercase() && c.is_uppercase() {
            return SetName::new(&title[..i], &title[i..]);
        }
    }

    match title.split_once(' ') {
        Some((base, rest)) => SetName::new(base, rest),
        None => SetName::new(&title, ""),
    }
}

/// Strips a query selector embedded in a visible title and decodes it.
pub fn clean_set_title(raw: &str) -> String {
    let raw = raw.split('?').next().unwrap_or_default();
    let decoded = url::form_urlencoded::parse(format!("t={raw}").as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_else(|| raw.to_string());
    normalize(&decoded)
}

/// Title-cases a lowercase sport the way report paths spell it
/// (`baseball` → `Baseball`). Names with capitals are kept (`MMA`).
pub fn sport_path_name(sport: &str) -> String {
    let sport = normalize(sport);
    if sport.chars().any(char::is_uppercase) {
        return sport;
    }
    sport
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn report_url(base: &Url, segments: &[&str]) -> Result<Url, url::ParseError> {
    let mut url = base.join("/")?;
    url.path_segments_mut()
        .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
        .clear()
        .push("pop-report")
        .extend(segments);
    Ok(url)
}

pub fn pop_report_url(base: &Url) -> Result<Url, url::ParseError> {
    report_url(base, &[])
}

pub fn sport_url(base: &Url, sport: &str) -> Result<Url, url::ParseError> {
    report_url(base, &[sport])
}

pub fn year_url(base: &Url, sport: &str, year: &str) -> Result<Url, url::ParseError> {
    report_url(base, &[sport, year])
}

/// Builds the page listing the cards of a set from its displayed title.
pub fn build_set_page_url(
    base: &Url,
    sport: &str,
    year: &str,
    set_title: &str,
) -> Result<Url, url::ParseError> {
    let SetName { base: set, variant } = split_set_name(set_title);
    let mut url = report_url(base, &[&sport_path_name(sport), year, &set])?;
    if let Some(variant) = variant {
        url.query_pairs_mut().append_pair("setName", &variant);
    }
    Ok(url)
}

/// Identity of a card page parsed from its URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardLocation {
    pub sport: String,
    pub year: String,
    pub set_title: String,
    pub card_name: String,
    pub card_number: String,
}

/// Parses `/pop-report/{sport}/{year}/{set}/{card}/{number}[?setName=..]`.
pub fn parse_card_url(url: &Url) -> Option<CardLocation> {
    let segments = url
        .path_segments()?
        .filter(|s| !s.is_empty())
        .map(|s| clean_set_title(s))
        .collect::<Vec<_>>();
    let at = segments.iter().position(|s| s == "pop-report")?;
    let [sport, year, set, card, number] = segments.get(at + 1..at + 6)? else {
        return None;
    };
    let variant = url
        .query_pairs()
        .find(|(k, _)| k == "setName")
        .map(|(_, v)| normalize(&v));
    let set_title = match variant {
        Some(variant) if !variant.is_empty() => format!("{set}{variant}"),
        _ => set.clone(),
    };
    Some(CardLocation {
        sport: sport.clone(),
        year: year.clone(),
        set_title,
        card_name: card.clone(),
        card_number: number.clone(),
    })
}
