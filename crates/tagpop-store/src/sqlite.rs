use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{anyhow, Context};
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row, Transaction};
use tagpop_crawler::{Store, TableKind, UpsertCounts};
use tagpop_extract::{CardPerSet, GradeRow, Metrics, SetPerYear, TotalsRollup, YearIndexEntry};

use crate::schema;

pub const DEFAULT_BATCH_SIZE: usize = 100;

/// [`Store`] backed by one SQLite database.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    batch_size: usize,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P, batch_size: usize) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Couldn't open database {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("Couldn't enable WAL journal")?;
        log::info!("Opened database {}", path.display());
        Self::with_connection(conn, batch_size)
    }

    pub fn open_in_memory(batch_size: usize) -> anyhow::Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, batch_size)
    }

    fn with_connection(mut conn: Connection, batch_size: usize) -> anyhow::Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        schema::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            batch_size: batch_size.max(1),
        })
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Database connection lock poisoned"))
    }

    fn write_all<R: Record>(&self, records: &[R]) -> anyhow::Result<UpsertCounts> {
        let mut conn = self.lock()?;
        let mut counts = UpsertCounts::default();

        for batch in records.chunks(self.batch_size) {
            let mut tx = conn.transaction()?;
            let now = Utc::now().to_rfc3339();
            for record in batch {
                let written = match write_one(&mut tx, record, &now) {
                    Err(e) => {
                        log::debug!("Retrying {} {}: {e:#}", R::TABLE.as_str(), record.describe());
                        write_one(&mut tx, record, &now)
                    }
                    ok => ok,
                };
                match written {
                    Ok(true) => counts.inserted += 1,
                    Ok(false) => counts.updated += 1,
                    Err(e) => {
                        log::warn!(
                            "Couldn't write {} {}: {e:#}",
                            R::TABLE.as_str(),
                            record.describe()
                        );
                        counts.failed += 1;
                    }
                }
            }
            tx.commit()
                .with_context(|| format!("Couldn't commit batch into {}", R::TABLE.as_str()))?;
        }

        log::debug!(
            "Wrote {} rows into {} ({} inserted, {} updated, {} failed)",
            records.len(),
            R::TABLE.as_str(),
            counts.inserted,
            counts.updated,
            counts.failed
        );
        Ok(counts)
    }

    pub fn count(&self, table: TableKind) -> anyhow::Result<u64> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", table.as_str()),
            [],
            |r| r.get(0),
        )?;
        Ok(n as u64)
    }

    pub fn counts(&self) -> anyhow::Result<Vec<(TableKind, u64)>> {
        TableKind::ALL
            .into_iter()
            .map(|table| Ok((table, self.count(table)?)))
            .collect()
    }

    pub fn get_years(&self, sport: &str) -> anyhow::Result<Vec<YearIndexEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT sport, year, year_url FROM years_index WHERE sport = ?1 ORDER BY year",
        )?;
        let rows = stmt.query_map([sport], |r| {
            Ok(YearIndexEntry {
                sport: r.get(0)?,
                year: r.get(1)?,
                year_url: r.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn get_sets(&self, sport: &str, year: &str) -> anyhow::Result<Vec<SetPerYear>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT sport, year, year_url, set_title, set_urls, metrics FROM sets_per_year
             WHERE sport = ?1 AND year = ?2 ORDER BY set_title",
        )?;
        let rows = stmt.query_map([sport, year], |r| {
            Ok(SetPerYear {
                sport: r.get(0)?,
                year: r.get(1)?,
                year_url: r.get(2)?,
                set_title: r.get(3)?,
                set_urls: json_column(r, 4)?,
                metrics: json_column(r, 5)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn get_cards(
        &self,
        sport: &str,
        year: &str,
        set_title: &str,
    ) -> anyhow::Result<Vec<CardPerSet>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT sport, year, set_title, set_url, card_name, card_number, card_urls, metrics
             FROM cards_per_set WHERE sport = ?1 AND year = ?2 AND set_title = ?3
             ORDER BY card_name",
        )?;
        let rows = stmt.query_map([sport, year, set_title], |r| {
            Ok(CardPerSet {
                sport: r.get(0)?,
                year: r.get(1)?,
                set_title: r.get(2)?,
                set_url: r.get(3)?,
                card_name: r.get(4)?,
                card_number: r.get(5)?,
                card_urls: json_column(r, 6)?,
                metrics: json_column(r, 7)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn get_grade_rows(
        &self,
        sport: &str,
        year: &str,
        set_title: &str,
        card_name: &str,
    ) -> anyhow::Result<Vec<GradeRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT sport, year, set_title, card_name, cert_number, card_url, rank, tag_grade,
                    report_url, rank_by_grade, chronology, chron_by_grade,
                    completed_date_raw, completed_date_iso
             FROM card_grade_rows
             WHERE sport = ?1 AND year = ?2 AND set_title = ?3 AND card_name = ?4
             ORDER BY cert_number",
        )?;
        let rows = stmt.query_map([sport, year, set_title, card_name], grade_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn get_grade_row(&self, cert_number: &str) -> anyhow::Result<Option<GradeRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT sport, year, set_title, card_name, cert_number, card_url, rank, tag_grade,
                    report_url, rank_by_grade, chronology, chron_by_grade,
                    completed_date_raw, completed_date_iso
             FROM card_grade_rows WHERE cert_number = ?1 ORDER BY id LIMIT 1",
        )?;
        Ok(stmt.query_row([cert_number], grade_row).optional()?)
    }

    pub fn get_totals(&self, sport: &str) -> anyhow::Result<Vec<TotalsRollup>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT scope, sport, year, set_title, card_name, metrics FROM totals_rollups
             WHERE sport = ?1 ORDER BY scope, year, set_title, card_name",
        )?;
        let rows = stmt.query_map([sport], |r| {
            let scope: String = r.get(0)?;
            Ok(TotalsRollup {
                scope: scope.parse().map_err(|e: String| {
                    rusqlite::Error::FromSqlConversionFailure(
                        0,
                        rusqlite::types::Type::Text,
                        e.into(),
                    )
                })?,
                sport: r.get(1)?,
                year: non_empty(r.get(2)?),
                set_title: non_empty(r.get(3)?),
                card_name: non_empty(r.get(4)?),
                metrics: json_column(r, 5)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }
}

impl Store for SqliteStore {
    fn upsert_year_index(&self, rows: &[YearIndexEntry]) -> anyhow::Result<UpsertCounts> {
        self.write_all(rows)
    }

    fn upsert_sets_per_year(&self, rows: &[SetPerYear]) -> anyhow::Result<UpsertCounts> {
        self.write_all(rows)
    }

    fn upsert_cards_per_set(&self, rows: &[CardPerSet]) -> anyhow::Result<UpsertCounts> {
        self.write_all(rows)
    }

    fn upsert_card_grade_rows(&self, rows: &[GradeRow]) -> anyhow::Result<UpsertCounts> {
        self.write_all(rows)
    }

    fn upsert_totals_rollups(&self, rows: &[TotalsRollup]) -> anyhow::Result<UpsertCounts> {
        self.write_all(rows)
    }
}

/// Writes one record in its own savepoint, returns whether it was new.
fn write_one<R: Record>(tx: &mut Transaction<'_>, record: &R, now: &str) -> anyhow::Result<bool> {
    let sp = tx.savepoint()?;
    let existed = record.exists(&sp)?;
    record.upsert(&sp, now)?;
    sp.commit()?;
    Ok(!existed)
}

/// A record written by natural key.
trait Record {
    const TABLE: TableKind;

    fn exists(&self, conn: &Connection) -> anyhow::Result<bool>;

    fn upsert(&self, conn: &Connection, now: &str) -> anyhow::Result<()>;

    fn describe(&self) -> String;
}

fn found(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> anyhow::Result<bool> {
    let mut stmt = conn.prepare_cached(sql)?;
    Ok(stmt.exists(params)?)
}

impl Record for YearIndexEntry {
    const TABLE: TableKind = TableKind::YearsIndex;

    fn exists(&self, conn: &Connection) -> anyhow::Result<bool> {
        found(
            conn,
            "SELECT 1 FROM years_index WHERE sport = ?1 AND year = ?2",
            params![self.sport, self.year],
        )
    }

    fn upsert(&self, conn: &Connection, now: &str) -> anyhow::Result<()> {
        let mut stmt = conn.prepare_cached(
            "INSERT INTO years_index (sport, year, year_url, discovered_at, updated_at, is_active)
             VALUES (?1, ?2, ?3, ?4, ?4, 1)
             ON CONFLICT(sport, year) DO UPDATE SET
                year_url = excluded.year_url,
                updated_at = excluded.updated_at,
                is_active = 1",
        )?;
        stmt.execute(params![self.sport, self.year, self.year_url, now])?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{}/{}", self.sport, self.year)
    }
}

impl Record for SetPerYear {
    const TABLE: TableKind = TableKind::SetsPerYear;

    fn exists(&self, conn: &Connection) -> anyhow::Result<bool> {
        found(
            conn,
            "SELECT 1 FROM sets_per_year WHERE sport = ?1 AND year = ?2 AND set_title = ?3",
            params![self.sport, self.year, self.set_title],
        )
    }

    fn upsert(&self, conn: &Connection, now: &str) -> anyhow::Result<()> {
        let set_urls = serde_json::to_string(&self.set_urls)?;
        let metrics = serde_json::to_string(&self.metrics)?;
        let mut stmt = conn.prepare_cached(
            "INSERT INTO sets_per_year
                (sport, year, set_title, year_url, set_urls, metrics,
                 discovered_at, updated_at, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, 1)
             ON CONFLICT(sport, year, set_title) DO UPDATE SET
                year_url = excluded.year_url,
                set_urls = excluded.set_urls,
                metrics = excluded.metrics,
                updated_at = excluded.updated_at,
                is_active = 1",
        )?;
        stmt.execute(params![
            self.sport,
            self.year,
            self.set_title,
            self.year_url,
            set_urls,
            metrics,
            now
        ])?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{}/{}/{}", self.sport, self.year, self.set_title)
    }
}

impl Record for CardPerSet {
    const TABLE: TableKind = TableKind::CardsPerSet;

    fn exists(&self, conn: &Connection) -> anyhow::Result<bool> {
        found(
            conn,
            "SELECT 1 FROM cards_per_set
             WHERE sport = ?1 AND year = ?2 AND set_title = ?3 AND card_name = ?4",
            params![self.sport, self.year, self.set_title, self.card_name],
        )
    }

    fn upsert(&self, conn: &Connection, now: &str) -> anyhow::Result<()> {
        let card_urls = serde_json::to_string(&self.card_urls)?;
        let metrics = serde_json::to_string(&self.metrics)?;
        let mut stmt = conn.prepare_cached(
            "INSERT INTO cards_per_set
                (sport, year, set_title, card_name, card_number, set_url, card_urls, metrics,
                 discovered_at, updated_at, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9, 1)
             ON CONFLICT(sport, year, set_title, card_name) DO UPDATE SET
                card_number = excluded.card_number,
                set_url = excluded.set_url,
                card_urls = excluded.card_urls,
                metrics = excluded.metrics,
                updated_at = excluded.updated_at,
                is_active = 1",
        )?;
        stmt.execute(params![
            self.sport,
            self.year,
            self.set_title,
            self.card_name,
            self.card_number,
            self.set_url,
            card_urls,
            metrics,
            now
        ])?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.sport, self.year, self.set_title, self.card_name
        )
    }
}

impl Record for GradeRow {
    const TABLE: TableKind = TableKind::CardGradeRows;

    fn exists(&self, conn: &Connection) -> anyhow::Result<bool> {
        found(
            conn,
            "SELECT 1 FROM card_grade_rows
             WHERE sport = ?1 AND year = ?2 AND set_title = ?3 AND card_name = ?4
               AND cert_number = ?5",
            params![
                self.sport,
                self.year,
                self.set_title,
                self.card_name,
                self.cert_number
            ],
        )
    }

    fn upsert(&self, conn: &Connection, now: &str) -> anyhow::Result<()> {
        let completed_iso = self.completed_date_iso.map(|d| d.to_string());
        let mut stmt = conn.prepare_cached(
            "INSERT INTO card_grade_rows
                (sport, year, set_title, card_name, cert_number, card_url, rank, tag_grade,
                 report_url, rank_by_grade, chronology, chron_by_grade,
                 completed_date_raw, completed_date_iso, discovered_at, updated_at, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15, 1)
             ON CONFLICT(sport, year, set_title, card_name, cert_number) DO UPDATE SET
                card_url = excluded.card_url,
                rank = excluded.rank,
                tag_grade = excluded.tag_grade,
                report_url = excluded.report_url,
                rank_by_grade = excluded.rank_by_grade,
                chronology = excluded.chronology,
                chron_by_grade = excluded.chron_by_grade,
                completed_date_raw = excluded.completed_date_raw,
                completed_date_iso = excluded.completed_date_iso,
                updated_at = excluded.updated_at,
                is_active = 1",
        )?;
        stmt.execute(params![
            self.sport,
            self.year,
            self.set_title,
            self.card_name,
            self.cert_number,
            self.card_url,
            self.rank,
            self.tag_grade,
            self.report_url,
            self.rank_by_grade,
            self.chronology,
            self.chron_by_grade,
            self.completed_date_raw,
            completed_iso,
            now
        ])?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{} of {}", self.cert_number, self.card_name)
    }
}

impl Record for TotalsRollup {
    const TABLE: TableKind = TableKind::TotalsRollups;

    fn exists(&self, conn: &Connection) -> anyhow::Result<bool> {
        let (year, set_title, card_name) = rollup_key(self);
        found(
            conn,
            "SELECT 1 FROM totals_rollups
             WHERE scope = ?1 AND sport = ?2 AND year = ?3 AND set_title = ?4
               AND card_name = ?5",
            params![self.scope.as_str(), self.sport, year, set_title, card_name],
        )
    }

    fn upsert(&self, conn: &Connection, now: &str) -> anyhow::Result<()> {
        let (year, set_title, card_name) = rollup_key(self);
        let metrics = serde_json::to_string(&self.metrics)?;
        let mut stmt = conn.prepare_cached(
            "INSERT INTO totals_rollups
                (scope, sport, year, set_title, card_name, metrics,
                 computed_at, discovered_at, updated_at, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?7, 1)
             ON CONFLICT(scope, sport, year, set_title, card_name) DO UPDATE SET
                metrics = excluded.metrics,
                computed_at = excluded.computed_at,
                updated_at = excluded.updated_at,
                is_active = 1",
        )?;
        stmt.execute(params![
            self.scope.as_str(),
            self.sport,
            year,
            set_title,
            card_name,
            metrics,
            now
        ])?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{} rollup of {}", self.scope, self.sport)
    }
}

/// Levels below a rollup's scope, stored as ''.
fn rollup_key(rollup: &TotalsRollup) -> (&str, &str, &str) {
    (
        rollup.year.as_deref().unwrap_or_default(),
        rollup.set_title.as_deref().unwrap_or_default(),
        rollup.card_name.as_deref().unwrap_or_default(),
    )
}

fn grade_row(r: &Row<'_>) -> rusqlite::Result<GradeRow> {
    let completed_iso: Option<String> = r.get(13)?;
    Ok(GradeRow {
        sport: r.get(0)?,
        year: r.get(1)?,
        set_title: r.get(2)?,
        card_name: r.get(3)?,
        cert_number: r.get(4)?,
        card_url: r.get(5)?,
        rank: r.get(6)?,
        tag_grade: r.get(7)?,
        report_url: r.get(8)?,
        rank_by_grade: r.get(9)?,
        chronology: r.get(10)?,
        chron_by_grade: r.get(11)?,
        completed_date_raw: r.get(12)?,
        completed_date_iso: completed_iso
            .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
    })
}

fn json_column<T: serde::de::DeserializeOwned>(r: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = r.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagpop_extract::{MetricValue, Scope};
    use tempfile::TempDir;

    fn create_test_store(batch_size: usize) -> (SqliteStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(dir.path().join("pop.db"), batch_size).unwrap();
        (store, dir)
    }

    fn row(cert: &str, grade: &str) -> GradeRow {
        GradeRow {
            sport: "Baseball".into(),
            year: "1989".into(),
            set_title: "Donruss".into(),
            card_name: "Gary Carter".into(),
            cert_number: cert.into(),
            card_url: "https://my.taggrading.com/pop-report/Baseball/1989/Donruss/Gary%20Carter/53"
                .into(),
            rank: Some("1".into()),
            tag_grade: grade.into(),
            report_url: Some(format!("https://my.taggrading.com/card/{cert}")),
            rank_by_grade: None,
            chronology: Some("1".into()),
            chron_by_grade: None,
            completed_date_raw: Some("03/14/2024".into()),
            completed_date_iso: NaiveDate::from_ymd_opt(2024, 3, 14),
        }
    }

    fn metrics(total: i64) -> Metrics {
        let mut metrics = Metrics::default();
        metrics.insert("total_graded", total.into());
        metrics
    }

    #[test]
    fn second_write_updates_in_place() {
        let (store, _dir) = create_test_store(2);
        let rows = vec![
            row("X3032464", "8.5"),
            row("X3032465", "9"),
            row("X3032466", "10"),
        ];

        let first = store.upsert_card_grade_rows(&rows).unwrap();
        assert_eq!(first.inserted, 3);
        assert_eq!(first.updated, 0);

        let second = store.upsert_card_grade_rows(&rows).unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.updated, 3);
        assert_eq!(store.count(TableKind::CardGradeRows).unwrap(), 3);
    }

    #[test]
    fn grade_values_are_stored_verbatim() {
        let (store, _dir) = create_test_store(DEFAULT_BATCH_SIZE);
        store
            .upsert_card_grade_rows(&[row("X3032464", "8.5")])
            .unwrap();

        let stored = store.get_grade_row("X3032464").unwrap().unwrap();
        assert_eq!(stored.tag_grade, "8.5");
        assert_eq!(stored.cert_number, "X3032464");
        assert_eq!(stored, row("X3032464", "8.5"));
        assert!(store.get_grade_row("X0").unwrap().is_none());
    }

    #[test]
    fn updates_replace_values() {
        let (store, _dir) = create_test_store(DEFAULT_BATCH_SIZE);
        store
            .upsert_card_grade_rows(&[row("X3032464", "8.5")])
            .unwrap();
        store
            .upsert_card_grade_rows(&[row("X3032464", "9")])
            .unwrap();

        let rows = store
            .get_grade_rows("Baseball", "1989", "Donruss", "Gary Carter")
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].tag_grade, "9");
    }

    #[test]
    fn failing_record_spares_its_batch() {
        let (store, _dir) = create_test_store(DEFAULT_BATCH_SIZE);
        let rows = vec![
            row("X1", "10"),
            row("", "10"),
            row("X2", "9"),
        ];

        let counts = store.upsert_card_grade_rows(&rows).unwrap();
        assert_eq!(counts.inserted, 2);
        assert_eq!(counts.failed, 1);
        assert_eq!(store.count(TableKind::CardGradeRows).unwrap(), 2);
    }

    #[test]
    fn rollups_with_absent_levels_are_one_row() {
        let (store, _dir) = create_test_store(DEFAULT_BATCH_SIZE);
        let sport = TotalsRollup {
            scope: Scope::Sport,
            sport: "Baseball".into(),
            year: None,
            set_title: None,
            card_name: None,
            metrics: metrics(1092),
        };
        let year = TotalsRollup {
            scope: Scope::Year,
            year: Some("1989".into()),
            metrics: metrics(12),
            ..sport.clone()
        };

        store
            .upsert_totals_rollups(&[sport.clone(), year.clone()])
            .unwrap();
        let again = store
            .upsert_totals_rollups(&[TotalsRollup {
                metrics: metrics(1100),
                ..sport.clone()
            }])
            .unwrap();
        assert_eq!(again.updated, 1);

        let totals = store.get_totals("Baseball").unwrap();
        assert_eq!(totals.len(), 2);
        let stored = totals.iter().find(|t| t.scope == Scope::Sport).unwrap();
        assert_eq!(stored.year, None);
        assert_eq!(
            stored.metrics.total_graded,
            Some(MetricValue::Count(1100))
        );
        assert!(totals.contains(&year));
    }

    #[test]
    fn sets_and_cards_read_back() {
        let store = SqliteStore::open_in_memory(DEFAULT_BATCH_SIZE).unwrap();
        let year_url = "https://my.taggrading.com/pop-report/Baseball/1989".to_string();
        let set = SetPerYear {
            sport: "Baseball".into(),
            year: "1989".into(),
            year_url: year_url.clone(),
            set_title: "Donruss".into(),
            set_urls: vec![format!("{year_url}/Donruss")],
            metrics: metrics(40),
        };
        let card = CardPerSet {
            sport: "Baseball".into(),
            year: "1989".into(),
            set_title: "Donruss".into(),
            set_url: format!("{year_url}/Donruss"),
            card_name: "Gary Carter".into(),
            card_number: Some("53".into()),
            card_urls: vec![format!("{year_url}/Donruss/Gary%20Carter/53")],
            metrics: metrics(2),
        };
        let year = YearIndexEntry {
            sport: "Baseball".into(),
            year: "1989".into(),
            year_url,
        };

        store.upsert(&tagpop_crawler::Records::Years(vec![year.clone()])).unwrap();
        store.upsert_sets_per_year(&[set.clone()]).unwrap();
        store.upsert_cards_per_set(&[card.clone()]).unwrap();

        assert_eq!(store.get_years("Baseball").unwrap(), vec![year]);
        assert_eq!(store.get_sets("Baseball", "1989").unwrap(), vec![set]);
        assert_eq!(
            store.get_cards("Baseball", "1989", "Donruss").unwrap(),
            vec![card]
        );
        let counts = store.counts().unwrap();
        assert_eq!(counts[0], (TableKind::YearsIndex, 1));
        assert_eq!(counts[3], (TableKind::CardGradeRows, 0));
    }

    #[test]
    fn reopening_keeps_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pop.db");
        {
            let store = SqliteStore::open(&path, DEFAULT_BATCH_SIZE).unwrap();
            store
                .upsert_card_grade_rows(&[row("X3032464", "8.5")])
                .unwrap();
        }
        let store = SqliteStore::open(&path, DEFAULT_BATCH_SIZE).unwrap();
        assert_eq!(store.count(TableKind::CardGradeRows).unwrap(), 1);
    }
}
