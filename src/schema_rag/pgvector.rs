//! pgvector-backed similarity store
//!
//! Reads the `schema_embeddings` table maintained alongside the catalog.
//! Ranking uses the negative inner product operator (`<#>`).

use crate::catalog::{CatalogEntry, Column, ObjectType};
use crate::error::{NlSqlError, Result};
use crate::schema_rag::vector_store::SimilarityStore;
use async_trait::async_trait;
use itertools::Itertools;
use sqlx::PgPool;

const TOP_K_SQL: &str = r#"
SELECT name, object_type, schema_name, description, columns
FROM schema_embeddings
ORDER BY embedding <#> $1::text::vector
LIMIT $2
"#;

#[derive(Debug, sqlx::FromRow)]
struct SchemaEmbeddingRow {
    name: String,
    object_type: String,
    schema_name: String,
    description: Option<String>,
    columns: Option<serde_json::Value>,
}

pub struct PgVectorStore {
    pool: PgPool,
}

impl PgVectorStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SimilarityStore for PgVectorStore {
    async fn top_k(&self, query: &[f32], k: usize) -> Result<Vec<CatalogEntry>> {
        let rows: Vec<SchemaEmbeddingRow> = sqlx::query_as(TOP_K_SQL)
            .bind(vector_literal(query))
            .bind(k as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| NlSqlError::Catalog(format!("Schema similarity search failed: {}", e)))?;

        rows.into_iter().map(row_to_entry).collect()
    }
}

/// pgvector text form: `[0.1,0.2,...]`
fn vector_literal(values: &[f32]) -> String {
    format!("[{}]", values.iter().join(","))
}

fn row_to_entry(row: SchemaEmbeddingRow) -> Result<CatalogEntry> {
    let object_type = match row.object_type.to_lowercase().as_str() {
        "table" => ObjectType::Table,
        "view" => ObjectType::View,
        other => {
            return Err(NlSqlError::Catalog(format!(
                "Unknown object type '{}' for {}.{}",
                other, row.schema_name, row.name
            )))
        }
    };
    let columns: Vec<Column> = match row.columns {
        Some(value) if !value.is_null() => serde_json::from_value(value)?,
        _ => Vec::new(),
    };
    Ok(CatalogEntry {
        schema: row.schema_name,
        name: row.name,
        object_type,
        description: row.description.unwrap_or_default(),
        columns,
    })
}
