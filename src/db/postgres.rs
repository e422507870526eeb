//! Postgres backend.
//!
//! Each statement runs in its own read-only transaction on a pooled
//! connection. The query is wrapped so every row arrives as one JSON
//! object, which keeps column order and avoids per-type decoding.

use crate::db::{Database, ResultSet, Row};
use crate::error::{NlSqlError, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, error};

pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Outer cap of `max_rows + 1` lets us tell a full page from a truncated one.
fn wrap_as_json_rows(sql: &str) -> String {
    format!("SELECT row_to_json(q) FROM (\n{}\n) AS q LIMIT $1", sql)
}

fn execution_error(e: sqlx::Error) -> NlSqlError {
    error!("Database execution failed: {}", e);
    NlSqlError::ExecutionFailure(e.to_string())
}

#[async_trait]
impl Database for PgDatabase {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn fetch_rows(&self, sql: &str, max_rows: usize) -> Result<ResultSet> {
        let wrapped = wrap_as_json_rows(sql);
        debug!("Executing SQL: {}", sql);

        let mut tx = self.pool.begin().await.map_err(execution_error)?;
        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(execution_error)?;

        let values: Vec<serde_json::Value> = sqlx::query_scalar(&wrapped)
            .bind(max_rows.saturating_add(1) as i64)
            .fetch_all(&mut *tx)
            .await
            .map_err(execution_error)?;

        tx.rollback().await.map_err(execution_error)?;

        let rows: Vec<Row> = values
            .into_iter()
            .map(|value| match value {
                serde_json::Value::Object(map) => Ok(map),
                other => Err(NlSqlError::ExecutionFailure(format!(
                    "Unexpected row shape from row_to_json: {}",
                    other
                ))),
            })
            .collect::<Result<_>>()?;

        Ok(ResultSet::capped(rows, max_rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_keeps_trailing_comment_inside() {
        let wrapped = wrap_as_json_rows("SELECT title FROM v -- note\nLIMIT 200");
        assert_eq!(
            wrapped,
            "SELECT row_to_json(q) FROM (\nSELECT title FROM v -- note\nLIMIT 200\n) AS q LIMIT $1"
        );
    }
}
