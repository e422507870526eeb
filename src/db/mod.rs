//! Database module
//!
//! Read-only execution of gate-approved SQL. Rows come back as ordered
//! column → JSON value maps, capped at a caller-supplied row count.

pub mod connection;
pub mod postgres;
pub mod sqlite;

pub use connection::{init_pool, DbPool};
pub use postgres::PgDatabase;
pub use sqlite::SqliteDatabase;

use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;

/// One result row; keys keep the column order of the query.
pub type Row = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    pub rows: Vec<Row>,
    /// More rows were available than the cap allowed.
    pub truncated: bool,
}

impl ResultSet {
    pub fn new(rows: Vec<Row>, truncated: bool) -> Self {
        Self { rows, truncated }
    }

    /// Keep at most `max_rows`; used by backends that over-fetch by one.
    pub fn capped(mut rows: Vec<Row>, max_rows: usize) -> Self {
        let truncated = rows.len() > max_rows;
        rows.truncate(max_rows);
        Self { rows, truncated }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column names of the first row.
    pub fn columns(&self) -> Vec<&str> {
        self.rows
            .first()
            .map(|row| row.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
pub trait Database: Send + Sync {
    fn name(&self) -> &str;

    /// Run a read-only statement and return up to `max_rows` rows.
    async fn fetch_rows(&self, sql: &str, max_rows: usize) -> Result<ResultSet>;
}
