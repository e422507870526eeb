//! Vector Store Abstraction
//!
//! k-nearest-neighbour lookup of catalog entries by embedding. The in-memory
//! index does a linear cosine scan, which is plenty for a catalog of a few
//! dozen tables/views.

use crate::catalog::CatalogEntry;
use crate::error::{NlSqlError, Result};
use crate::schema_rag::embedder::Embedder;
use async_trait::async_trait;
use tracing::{info, warn};

/// Vector embedding (simple f32 vector)
pub type Embedding = Vec<f32>;

#[async_trait]
pub trait SimilarityStore: Send + Sync {
    /// Entries ranked by similarity to `query`, best first.
    async fn top_k(&self, query: &[f32], k: usize) -> Result<Vec<CatalogEntry>>;
}

pub struct InMemorySchemaIndex {
    dimension: usize,
    entries: Vec<(CatalogEntry, Embedding)>,
}

impl InMemorySchemaIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: Vec::new(),
        }
    }

    /// Embed every entry and index it. The dimension is taken from the first embedding.
    pub async fn build(entries: &[CatalogEntry], embedder: &dyn Embedder) -> Result<Self> {
        let mut index: Option<Self> = None;
        for entry in entries {
            let embedding = embedder.embed(&entry.embedding_text()).await?;
            let index = index.get_or_insert_with(|| Self::new(embedding.len()));
            index.add(entry.clone(), embedding);
        }
        let index = index.unwrap_or_else(|| Self::new(0));
        info!("Built in-memory schema index with {} entries", index.len());
        Ok(index)
    }

    /// Add an entry. Embeddings of the wrong dimension are skipped.
    pub fn add(&mut self, entry: CatalogEntry, embedding: Embedding) {
        if embedding.len() != self.dimension {
            warn!(
                "Skipping {}: embedding dimension {} doesn't match index dimension {}",
                entry.qualified_name(),
                embedding.len(),
                self.dimension
            );
            return;
        }
        self.entries.push((entry, embedding));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(CatalogEntry, f32)>> {
        if self.entries.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(NlSqlError::Llm(format!(
                "Query embedding dimension {} doesn't match index dimension {}",
                query.len(),
                self.dimension
            )));
        }

        let mut scored: Vec<(CatalogEntry, f32)> = self
            .entries
            .iter()
            .map(|(entry, embedding)| (entry.clone(), cosine_similarity(query, embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}

#[async_trait]
impl SimilarityStore for InMemorySchemaIndex {
    async fn top_k(&self, query: &[f32], k: usize) -> Result<Vec<CatalogEntry>> {
        Ok(self
            .search(query, k)?
            .into_iter()
            .map(|(entry, _)| entry)
            .collect())
    }
}

/// Compute cosine similarity between two vectors
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
