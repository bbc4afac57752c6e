use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::store::{TableKind, UpsertCounts};

#[derive(Debug, Default)]
struct TableCounters {
    planned: AtomicU64,
    inserted: AtomicU64,
    updated: AtomicU64,
    failed: AtomicU64,
}

/// Counters shared by every task of a run.
#[derive(Debug)]
pub struct RunStats {
    started: Instant,
    pub pages_fetched: AtomicU64,
    pub pages_rendered: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub categories: AtomicU64,
    pub years: AtomicU64,
    pub sets: AtomicU64,
    pub cards: AtomicU64,
    pub grade_rows: AtomicU64,
    pub totals: AtomicU64,
    pub skipped: AtomicU64,
    pub failures: AtomicU64,
    pub retries: AtomicU64,
    tables: [TableCounters; TableKind::ALL.len()],
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            pages_fetched: AtomicU64::new(0),
            pages_rendered: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            categories: AtomicU64::new(0),
            years: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            cards: AtomicU64::new(0),
            grade_rows: AtomicU64::new(0),
            totals: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            tables: Default::default(),
        }
    }

    pub fn incr(counter: &AtomicU64) {
        Self::add(counter, 1);
    }

    pub fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn record_planned(&self, table: TableKind, n: usize) {
        Self::add(&self.tables[table as usize].planned, n);
    }

    pub fn record_upsert(&self, table: TableKind, counts: &UpsertCounts) {
        let counters = &self.tables[table as usize];
        Self::add(&counters.inserted, counts.inserted);
        Self::add(&counters.updated, counts.updated);
        Self::add(&counters.failed, counts.failed);
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn summary(&self) -> RunSummary {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        let elapsed = self.elapsed();
        let pages_fetched = load(&self.pages_fetched);

        let tables = TableKind::ALL
            .into_iter()
            .map(|table| {
                let c = &self.tables[table as usize];
                let summary = TableSummary {
                    planned: load(&c.planned),
                    inserted: load(&c.inserted),
                    updated: load(&c.updated),
                    failed: load(&c.failed),
                };
                (table.as_str().to_string(), summary)
            })
            .collect::<BTreeMap<_, _>>();

        RunSummary {
            duration_secs: elapsed.as_secs_f64(),
            pages_fetched,
            pages_rendered: load(&self.pages_rendered),
            pages_per_sec: if elapsed.as_secs_f64() > 0.0 {
                pages_fetched as f64 / elapsed.as_secs_f64()
            } else {
                0.0
            },
            cache_hits: load(&self.cache_hits),
            cache_misses: load(&self.cache_misses),
            categories: load(&self.categories),
            years: load(&self.years),
            sets: load(&self.sets),
            cards: load(&self.cards),
            grade_rows: load(&self.grade_rows),
            totals: load(&self.totals),
            inserted: tables.values().map(|t| t.inserted).sum(),
            updated: tables.values().map(|t| t.updated).sum(),
            skipped: load(&self.skipped),
            failures: load(&self.failures),
            retries: load(&self.retries),
            tables,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSummary {
    pub planned: u64,
    pub inserted: u64,
    pub updated: u64,
    pub failed: u64,
}

/// Snapshot of [`RunStats`].
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub duration_secs: f64,
    pub pages_fetched: u64,
    pub pages_rendered: u64,
    pub pages_per_sec: f64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub categories: u64,
    pub years: u64,
    pub sets: u64,
    pub cards: u64,
    pub grade_rows: u64,
    pub totals: u64,
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
    pub failures: u64,
    pub retries: u64,
    pub tables: BTreeMap<String, TableSummary>,
}

impl RunSummary {
    /// Adds the counts of `other`, keeping this summary's duration.
    pub fn absorb(&mut self, other: &RunSummary) {
        self.pages_fetched += other.pages_fetched;
        self.pages_rendered += other.pages_rendered;
        self.cache_hits += other.cache_hits;
        self.cache_misses += other.cache_misses;
        self.categories += other.categories;
        self.years += other.years;
        self.sets += other.sets;
        self.cards += other.cards;
        self.grade_rows += other.grade_rows;
        self.totals += other.totals;
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.failures += other.failures;
        self.retries += other.retries;
        for (name, t) in &other.tables {
            let mine = self.tables.entry(name.clone()).or_default();
            mine.planned += t.planned;
            mine.inserted += t.inserted;
            mine.updated += t.updated;
            mine.failed += t.failed;
        }
        self.pages_per_sec = if self.duration_secs > 0.0 {
            self.pages_fetched as f64 / self.duration_secs
        } else {
            0.0
        };
    }

    /// Counts that depend only on what was discovered, not on how fast or
    /// from where pages were obtained.
    pub fn discovery(&self) -> [u64; 6] {
        [
            self.years,
            self.sets,
            self.cards,
            self.grade_rows,
            self.totals,
            self.skipped,
        ]
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Crawled in {:.1}s: {} pages ({} rendered, {:.2}/s), cache {} hits {} misses",
            self.duration_secs,
            self.pages_fetched,
            self.pages_rendered,
            self.pages_per_sec,
            self.cache_hits,
            self.cache_misses
        )?;
        writeln!(
            f,
            "Discovered {} years, {} sets, {} cards, {} grade rows, {} totals ({} rows skipped)",
            self.years, self.sets, self.cards, self.grade_rows, self.totals, self.skipped
        )?;
        writeln!(
            f,
            "{:<20} {:>8} {:>8} {:>8} {:>8}",
            "table", "planned", "inserted", "updated", "failed"
        )?;
        for (name, t) in &self.tables {
            writeln!(
                f,
                "{name:<20} {:>8} {:>8} {:>8} {:>8}",
                t.planned, t.inserted, t.updated, t.failed
            )?;
        }
        write!(f, "{} failures, {} retries", self.failures, self.retries)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SportReport {
    pub sport: String,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub summary: RunSummary,
}

/// Outcome of a multi-sport run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlReport {
    pub dry_run: bool,
    pub sports: Vec<SportReport>,
    pub total: RunSummary,
}

impl CrawlReport {
    pub fn failed_sports(&self) -> impl Iterator<Item = &SportReport> {
        self.sports.iter().filter(|s| !s.succeeded)
    }
}

impl fmt::Display for CrawlReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for sport in &self.sports {
            match &sport.error {
                None => writeln!(
                    f,
                    "{}: {} sets, {} cards, {} grade rows",
                    sport.sport, sport.summary.sets, sport.summary.cards, sport.summary.grade_rows
                )?,
                Some(e) => writeln!(f, "{}: failed, {e}", sport.sport)?,
            }
        }
        if self.dry_run {
            writeln!(f, "Dry run, nothing was written")?;
        }
        write!(f, "{}", self.total)
    }
}
