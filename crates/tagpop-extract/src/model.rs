use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Hierarchy level summarized by a TOTALS rollup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Sport,
    Year,
    Set,
    Card,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sport => "sport",
            Self::Year => "year",
            Self::Set => "set",
            Self::Card => "card",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sport" => Ok(Self::Sport),
            "year" => Ok(Self::Year),
            "set" => Ok(Self::Set),
            "card" => Ok(Self::Card),
            _ => Err(format!("Unknown scope: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Count(i64),
    Text(String),
}

impl MetricValue {
    pub fn as_count(&self) -> Option<i64> {
        match self {
            Self::Count(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

impl From<i64> for MetricValue {
    fn from(n: i64) -> Self {
        Self::Count(n)
    }
}

impl From<&str> for MetricValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// Row metrics.
///
/// The keys every level may report are typed fields, grade columns (whose set
/// depends on the page) live in `grades`. Both serialize as one flat object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<MetricValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_sets: Option<MetricValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_items: Option<MetricValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_graded: Option<MetricValue>,
    #[serde(flatten)]
    pub grades: BTreeMap<String, MetricValue>,
}

impl Metrics {
    pub fn insert(&mut self, key: &str, value: MetricValue) {
        match key {
            "total" => self.total = Some(value),
            "num_sets" => self.num_sets = Some(value),
            "total_items" => self.total_items = Some(value),
            "total_graded" => self.total_graded = Some(value),
            _ => {
                self.grades.insert(key.to_string(), value);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&MetricValue> {
        match key {
            "total" => self.total.as_ref(),
            "num_sets" => self.num_sets.as_ref(),
            "total_items" => self.total_items.as_ref(),
            "total_graded" => self.total_graded.as_ref(),
            _ => self.grades.get(key),
        }
    }

    pub fn len(&self) -> usize {
        [
            &self.total,
            &self.num_sets,
            &self.total_items,
            &self.total_graded,
        ]
        .iter()
        .filter(|v| v.is_some())
        .count()
            + self.grades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A sport (category) listed on the pop-report index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub url: String,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearIndexEntry {
    pub sport: String,
    pub year: String,
    pub year_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetPerYear {
    pub sport: String,
    pub year: String,
    pub year_url: String,
    pub set_title: String,
    pub set_urls: Vec<String>,
    pub metrics: Metrics,
}

impl SetPerYear {
    /// The page listing the cards of this set, when the row linked to one.
    pub fn set_page_url(&self) -> Option<&str> {
        self.set_urls.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardPerSet {
    pub sport: String,
    pub year: String,
    pub set_title: String,
    pub set_url: String,
    pub card_name: String,
    pub card_number: Option<String>,
    pub card_urls: Vec<String>,
    pub metrics: Metrics,
}

impl CardPerSet {
    pub fn card_page_url(&self) -> Option<&str> {
        self.card_urls.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeRow {
    pub sport: String,
    pub year: String,
    pub set_title: String,
    pub card_name: String,
    pub cert_number: String,
    pub card_url: String,
    pub rank: Option<String>,
    pub tag_grade: String,
    pub report_url: Option<String>,
    pub rank_by_grade: Option<String>,
    pub chronology: Option<String>,
    pub chron_by_grade: Option<String>,
    pub completed_date_raw: Option<String>,
    pub completed_date_iso: Option<NaiveDate>,
}

/// Aggregate reported inline by the site as a TOTALS row.
///
/// Levels above `scope` carry their context, levels below it are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TotalsRollup {
    pub scope: Scope,
    pub sport: String,
    pub year: Option<String>,
    pub set_title: Option<String>,
    pub card_name: Option<String>,
    pub metrics: Metrics,
}

/// Output of one extractor run over one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Extracted<T> {
    pub children: Vec<T>,
    pub totals: Vec<TotalsRollup>,
    /// Rows dropped for an empty title or missing key data.
    pub skipped: usize,
}

impl<T> Default for Extracted<T> {
    fn default() -> Self {
        Self {
            children: Vec::new(),
            totals: Vec::new(),
            skipped: 0,
        }
    }
}

// Parent contexts handed to each extractor

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SportCtx {
    pub sport: String,
    pub sport_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct YearCtx {
    pub sport: String,
    pub year: String,
    pub year_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SetCtx {
    pub sport: String,
    pub year: String,
    pub set_title: String,
    pub set_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CardCtx {
    pub sport: String,
    pub year: String,
    pub set_title: String,
    pub card_name: String,
    pub card_url: String,
}

impl From<&YearIndexEntry> for YearCtx {
    fn from(entry: &YearIndexEntry) -> Self {
        Self {
            sport: entry.sport.clone(),
            year: entry.year.clone(),
            year_url: entry.year_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_flatten_to_one_object() {
        let mut metrics = Metrics::default();
        metrics.insert("total", 15.into());
        metrics.insert("grade_10", 1.into());
        metrics.insert("grade_Auth", "A".into());

        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"total": 15, "grade_10": 1, "grade_Auth": "A"})
        );

        let back: Metrics = serde_json::from_value(json).unwrap();
        assert_eq!(back, metrics);
        assert_eq!(back.len(), 3);
        assert_eq!(back.get("total").and_then(MetricValue::as_count), Some(15));
    }

    #[test]
    fn scope_names() {
        for scope in [Scope::Sport, Scope::Year, Scope::Set, Scope::Card] {
            assert_eq!(scope.as_str().parse::<Scope>(), Ok(scope));
        }
        assert!("league".parse::<Scope>().is_err());
    }
}
