//! Schema RAG Retriever
//!
//! Turns a question into a compact schema context for the SQL prompt.
//! Retrieval is best-effort: any failure yields an empty context and the
//! caller falls back to the full catalog text.

use crate::catalog::CatalogEntry;
use crate::schema_rag::embedder::Embedder;
use crate::schema_rag::vector_store::SimilarityStore;
use itertools::Itertools;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct SchemaRetriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn SimilarityStore>,
    top_k: usize,
}

impl SchemaRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn SimilarityStore>, top_k: usize) -> Self {
        Self {
            embedder,
            store,
            top_k: top_k.max(1),
        }
    }

    /// Describe the `top_k` entries closest to the question. Never fails.
    pub async fn relevant_schema(&self, question: &str) -> String {
        let embedding = match self.embedder.embed(question).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!("Schema retrieval skipped, embedding failed: {}", e);
                return String::new();
            }
        };

        match self.store.top_k(&embedding, self.top_k).await {
            Ok(entries) => {
                debug!(
                    "Retrieved schema context: {}",
                    entries.iter().map(|e| e.qualified_name()).join(", ")
                );
                format_context(&entries)
            }
            Err(e) => {
                warn!("Schema retrieval skipped, similarity search failed: {}", e);
                String::new()
            }
        }
    }
}

fn format_context(entries: &[CatalogEntry]) -> String {
    entries
        .iter()
        .map(|entry| {
            let columns = entry
                .columns
                .iter()
                .map(|c| {
                    if c.description.is_empty() {
                        c.name.clone()
                    } else {
                        format!("{}: {}", c.name, c.description)
                    }
                })
                .join("; ");
            format!(
                "{} {} - {}\n  Columns: {}",
                entry.object_type.as_str().to_uppercase(),
                entry.qualified_name(),
                entry.description,
                columns
            )
        })
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Column, ObjectType};
    use crate::error::{NlSqlError, Result};
    use crate::schema_rag::vector_store::{Embedding, InMemorySchemaIndex};
    use async_trait::async_trait;

    /// Embeds by keyword presence so tests can steer ranking.
    struct KeywordEmbedder;

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Embedding> {
            let text = text.to_lowercase();
            Ok(vec![
                if text.contains("rating") { 1.0 } else { 0.0 },
                if text.contains("ticket") { 1.0 } else { 0.0 },
                0.1,
            ])
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Embedding> {
            Err(NlSqlError::Llm("embedding service down".to_string()))
        }
    }

    fn entries() -> Vec<CatalogEntry> {
        vec![
            CatalogEntry {
                schema: "private".to_string(),
                name: "movielens_view".to_string(),
                object_type: ObjectType::View,
                description: "Movie ratings".to_string(),
                columns: vec![Column {
                    name: "rating".to_string(),
                    data_type: "numeric".to_string(),
                    description: "Star rating".to_string(),
                }],
            },
            CatalogEntry {
                schema: "public".to_string(),
                name: "ticket_sales".to_string(),
                object_type: ObjectType::Table,
                description: "Ticket sales".to_string(),
                columns: vec![Column {
                    name: "sold_at".to_string(),
                    data_type: "date".to_string(),
                    description: String::new(),
                }],
            },
        ]
    }

    #[tokio::test]
    async fn test_relevant_schema_picks_closest_entry() {
        let index = InMemorySchemaIndex::build(&entries(), &KeywordEmbedder).await.unwrap();
        let retriever = SchemaRetriever::new(Arc::new(KeywordEmbedder), Arc::new(index), 1);

        let context = retriever.relevant_schema("average rating per genre").await;
        assert_eq!(
            context,
            "VIEW private.movielens_view - Movie ratings\n  Columns: rating: Star rating"
        );

        let context = retriever.relevant_schema("ticket revenue").await;
        assert!(context.starts_with("TABLE public.ticket_sales"));
        assert!(context.ends_with("Columns: sold_at"));
    }

    #[tokio::test]
    async fn test_relevant_schema_is_empty_on_failure() {
        let index = InMemorySchemaIndex::build(&entries(), &KeywordEmbedder).await.unwrap();
        let retriever = SchemaRetriever::new(Arc::new(FailingEmbedder), Arc::new(index), 3);
        assert_eq!(retriever.relevant_schema("anything").await, "");
    }
}
