//! Relevant-schema retrieval
//!
//! Embeds the question and asks a similarity store for the closest catalog
//! entries, so the SQL prompt carries only the schema it needs.

pub mod embedder;
pub mod pgvector;
pub mod retriever;
pub mod vector_store;

pub use embedder::{Embedder, OpenAiEmbedder};
pub use pgvector::PgVectorStore;
pub use retriever::SchemaRetriever;
pub use vector_store::{Embedding, InMemorySchemaIndex, SimilarityStore};
