//! Database operations and SQLite management for operations and plans.
//!
//! This module provides the low-level storage used by
//! [`crate::operator::LocalOperator`]. It handles SQLite connections and
//! schema management, and provides one query file per stored entity.

use std::path::Path;
use std::time::Duration;

use rusqlite::{types::Type, Connection};

use crate::error::{DatabaseResultExt, Result};

pub mod migrations;
pub mod operation_queries;
pub mod plan_queries;
pub mod progress_queries;
pub mod report_queries;

/// Parallel phases record changes concurrently; writers wait this long for
/// the lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Database connection and operations handler.
pub struct Database {
    connection: Connection,
}

impl Database {
    /// Creates a new database connection and initializes the schema.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let connection = Connection::open(path).db_context("Failed to open database connection")?;
        connection
            .busy_timeout(BUSY_TIMEOUT)
            .db_context("Failed to set busy timeout")?;

        let db = Self { connection };
        db.initialize_schema()?;
        Ok(db)
    }
}

/// Reads an RFC 3339 timestamp column.
pub(crate) fn timestamp_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<jiff::Timestamp> {
    row.get::<_, String>(idx)?
        .parse::<jiff::Timestamp>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Reads a text column holding a value with a `FromStr` representation.
pub(crate) fn parsed_column<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let value: String = row.get(idx)?;
    value
        .parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}
