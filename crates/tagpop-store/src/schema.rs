use anyhow::{bail, Context};
use rusqlite::Connection;

pub const SCHEMA_VERSION: i64 = 1;

// Rollup keys above their scope are stored as '' so the unique constraint
// applies to them.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS years_index (
    id INTEGER PRIMARY KEY,
    sport TEXT NOT NULL CHECK (sport <> ''),
    year TEXT NOT NULL CHECK (year <> ''),
    year_url TEXT NOT NULL,
    discovered_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    UNIQUE (sport, year)
);

CREATE TABLE IF NOT EXISTS sets_per_year (
    id INTEGER PRIMARY KEY,
    sport TEXT NOT NULL CHECK (sport <> ''),
    year TEXT NOT NULL CHECK (year <> ''),
    set_title TEXT NOT NULL CHECK (set_title <> ''),
    year_url TEXT NOT NULL,
    set_urls TEXT NOT NULL,
    metrics TEXT NOT NULL,
    discovered_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    UNIQUE (sport, year, set_title)
);

CREATE TABLE IF NOT EXISTS cards_per_set (
    id INTEGER PRIMARY KEY,
    sport TEXT NOT NULL CHECK (sport <> ''),
    year TEXT NOT NULL CHECK (year <> ''),
    set_title TEXT NOT NULL CHECK (set_title <> ''),
    card_name TEXT NOT NULL CHECK (card_name <> ''),
    card_number TEXT,
    set_url TEXT NOT NULL,
    card_urls TEXT NOT NULL,
    metrics TEXT NOT NULL,
    discovered_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    UNIQUE (sport, year, set_title, card_name)
);

CREATE TABLE IF NOT EXISTS card_grade_rows (
    id INTEGER PRIMARY KEY,
    sport TEXT NOT NULL CHECK (sport <> ''),
    year TEXT NOT NULL CHECK (year <> ''),
    set_title TEXT NOT NULL CHECK (set_title <> ''),
    card_name TEXT NOT NULL CHECK (card_name <> ''),
    cert_number TEXT NOT NULL CHECK (cert_number <> ''),
    card_url TEXT NOT NULL,
    rank TEXT,
    tag_grade TEXT NOT NULL CHECK (tag_grade <> ''),
    report_url TEXT,
    rank_by_grade TEXT,
    chronology TEXT,
    chron_by_grade TEXT,
    completed_date_raw TEXT,
    completed_date_iso TEXT,
    discovered_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    UNIQUE (sport, year, set_title, card_name, cert_number)
);

CREATE INDEX IF NOT EXISTS card_grade_rows_cert ON card_grade_rows (cert_number);

CREATE TABLE IF NOT EXISTS totals_rollups (
    id INTEGER PRIMARY KEY,
    scope TEXT NOT NULL CHECK (scope IN ('sport', 'year', 'set', 'card')),
    sport TEXT NOT NULL CHECK (sport <> ''),
    year TEXT NOT NULL DEFAULT '',
    set_title TEXT NOT NULL DEFAULT '',
    card_name TEXT NOT NULL DEFAULT '',
    metrics TEXT NOT NULL,
    computed_at TEXT NOT NULL,
    discovered_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    UNIQUE (scope, sport, year, set_title, card_name)
);
";

/// Creates the tables of a new database, refuses databases from the future.
pub(crate) fn migrate(conn: &mut Connection) -> anyhow::Result<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    if version > SCHEMA_VERSION {
        bail!("Database schema version {version} is newer than supported {SCHEMA_VERSION}");
    }
    if version == SCHEMA_VERSION {
        return Ok(());
    }

    log::info!("Creating database schema at version {SCHEMA_VERSION}");
    let tx = conn.transaction()?;
    tx.execute_batch(SCHEMA).context("Couldn't create schema")?;
    tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    tx.commit()?;
    Ok(())
}
