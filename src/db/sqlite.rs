//! SQLite backend for local runs and tests.

use crate::db::{Database, ResultSet, Row};
use crate::error::{NlSqlError, Result};
use async_trait::async_trait;
use itertools::Itertools;
use parking_lot::Mutex;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

pub struct SqliteDatabase {
    conn: Arc<Mutex<Connection>>,
}

fn sqlite_error(e: rusqlite::Error) -> NlSqlError {
    NlSqlError::ExecutionFailure(e.to_string())
}

impl SqliteDatabase {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            NlSqlError::Config(format!("Failed to open SQLite database {}: {}", path.display(), e))
        })?;
        info!("Opened SQLite database {}", path.display());
        Self::from_connection(conn)
    }

    /// Wrap an existing connection and switch it to query-only mode.
    pub fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA query_only = ON;")
            .map_err(sqlite_error)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(bytes.iter().map(|b| format!("{:02x}", b)).join("")),
    }
}

fn query_rows(conn: &Connection, sql: &str, max_rows: usize) -> rusqlite::Result<ResultSet> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query([])?;

    let mut out = Vec::new();
    let mut truncated = false;
    while let Some(row) = rows.next()? {
        if out.len() == max_rows {
            truncated = true;
            break;
        }
        let mut record = Row::new();
        for (i, name) in columns.iter().enumerate() {
            record.insert(name.clone(), to_json(row.get_ref(i)?));
        }
        out.push(record);
    }
    Ok(ResultSet::new(out, truncated))
}

#[async_trait]
impl Database for SqliteDatabase {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn fetch_rows(&self, sql: &str, max_rows: usize) -> Result<ResultSet> {
        debug!("Executing SQL: {}", sql);
        let conn = Arc::clone(&self.conn);
        let sql = sql.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            query_rows(&conn, &sql, max_rows).map_err(sqlite_error)
        })
        .await
        .map_err(|e| NlSqlError::ExecutionFailure(format!("SQLite task failed: {}", e)))?
    }
}
