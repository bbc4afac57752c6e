//! SQLite persistence of crawled population reports.
//!
//! Every table carries the natural key of its records as a unique
//! constraint, so writing the same crawl twice updates rows in place.

mod schema;
mod sqlite;

pub use schema::SCHEMA_VERSION;
pub use sqlite::{SqliteStore, DEFAULT_BATCH_SIZE};
