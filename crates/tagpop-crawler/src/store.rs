use std::ops::AddAssign;
use std::sync::Arc;

use serde::Serialize;
use tagpop_extract::{CardPerSet, GradeRow, SetPerYear, TotalsRollup, YearIndexEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    YearsIndex,
    SetsPerYear,
    CardsPerSet,
    CardGradeRows,
    TotalsRollups,
}

impl TableKind {
    pub const ALL: [TableKind; 5] = [
        Self::YearsIndex,
        Self::SetsPerYear,
        Self::CardsPerSet,
        Self::CardGradeRows,
        Self::TotalsRollups,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::YearsIndex => "years_index",
            Self::SetsPerYear => "sets_per_year",
            Self::CardsPerSet => "cards_per_set",
            Self::CardGradeRows => "card_grade_rows",
            Self::TotalsRollups => "totals_rollups",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertCounts {
    pub inserted: usize,
    pub updated: usize,
    pub failed: usize,
}

impl AddAssign for UpsertCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.inserted += rhs.inserted;
        self.updated += rhs.updated;
        self.failed += rhs.failed;
    }
}

/// A batch of records bound for one table.
#[derive(Debug, Clone)]
pub enum Records {
    Years(Vec<YearIndexEntry>),
    Sets(Vec<SetPerYear>),
    Cards(Vec<CardPerSet>),
    GradeRows(Vec<GradeRow>),
    Totals(Vec<TotalsRollup>),
}

impl Records {
    pub fn table(&self) -> TableKind {
        match self {
            Self::Years(_) => TableKind::YearsIndex,
            Self::Sets(_) => TableKind::SetsPerYear,
            Self::Cards(_) => TableKind::CardsPerSet,
            Self::GradeRows(_) => TableKind::CardGradeRows,
            Self::Totals(_) => TableKind::TotalsRollups,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Years(r) => r.len(),
            Self::Sets(r) => r.len(),
            Self::Cards(r) => r.len(),
            Self::GradeRows(r) => r.len(),
            Self::Totals(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Idempotent persistence of crawled records, keyed by their natural keys.
///
/// Implementations are synchronous, the pipeline calls them from blocking
/// tasks. A record that cannot be written is counted in
/// [`UpsertCounts::failed`] without failing its batch, an `Err` means the
/// store itself is unusable.
pub trait Store: Send + Sync + 'static {
    fn upsert_year_index(&self, rows: &[YearIndexEntry]) -> anyhow::Result<UpsertCounts>;

    fn upsert_sets_per_year(&self, rows: &[SetPerYear]) -> anyhow::Result<UpsertCounts>;

    fn upsert_cards_per_set(&self, rows: &[CardPerSet]) -> anyhow::Result<UpsertCounts>;

    fn upsert_card_grade_rows(&self, rows: &[GradeRow]) -> anyhow::Result<UpsertCounts>;

    fn upsert_totals_rollups(&self, rows: &[TotalsRollup]) -> anyhow::Result<UpsertCounts>;

    fn upsert(&self, records: &Records) -> anyhow::Result<UpsertCounts> {
        match records {
            Records::Years(r) => self.upsert_year_index(r),
            Records::Sets(r) => self.upsert_sets_per_year(r),
            Records::Cards(r) => self.upsert_cards_per_set(r),
            Records::GradeRows(r) => self.upsert_card_grade_rows(r),
            Records::Totals(r) => self.upsert_totals_rollups(r),
        }
    }
}

impl<S: Store> Store for Arc<S> {
    fn upsert_year_index(&self, rows: &[YearIndexEntry]) -> anyhow::Result<UpsertCounts> {
        (**self).upsert_year_index(rows)
    }

    fn upsert_sets_per_year(&self, rows: &[SetPerYear]) -> anyhow::Result<UpsertCounts> {
        (**self).upsert_sets_per_year(rows)
    }

    fn upsert_cards_per_set(&self, rows: &[CardPerSet]) -> anyhow::Result<UpsertCounts> {
        (**self).upsert_cards_per_set(rows)
    }

    fn upsert_card_grade_rows(&self, rows: &[GradeRow]) -> anyhow::Result<UpsertCounts> {
        (**self).upsert_card_grade_rows(rows)
    }

    fn upsert_totals_rollups(&self, rows: &[TotalsRollup]) -> anyhow::Result<UpsertCounts> {
        (**self).upsert_totals_rollups(rows)
    }
}

/// Store accepting nothing, for dry runs that never reach persistence.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

impl Store for NullStore {
    fn upsert_year_index(&self, rows: &[YearIndexEntry]) -> anyhow::Result<UpsertCounts> {
        discard(rows.len())
    }

    fn upsert_sets_per_year(&self, rows: &[SetPerYear]) -> anyhow::Result<UpsertCounts> {
        discard(rows.len())
    }

    fn upsert_cards_per_set(&self, rows: &[CardPerSet]) -> anyhow::Result<UpsertCounts> {
        discard(rows.len())
    }

    fn upsert_card_grade_rows(&self, rows: &[GradeRow]) -> anyhow::Result<UpsertCounts> {
        discard(rows.len())
    }

    fn upsert_totals_rollups(&self, rows: &[TotalsRollup]) -> anyhow::Result<UpsertCounts> {
        discard(rows.len())
    }
}

fn discard(n: usize) -> anyhow::Result<UpsertCounts> {
    anyhow::bail!("No store configured, discarding {n} records")
}
