//! Schema Embedder
//!
//! Embeds questions and catalog entries using the OpenAI embeddings API.

use crate::error::{NlSqlError, Result};
use crate::schema_rag::vector_store::Embedding;
use async_trait::async_trait;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Embedding>;
}

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String, // e.g., "text-embedding-3-small"
}

impl OpenAiEmbedder {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| NlSqlError::Llm(format!("Embedding API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(NlSqlError::Llm(format!(
                "Embedding API error ({}): {}",
                status, error_text
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| NlSqlError::Llm(format!("Failed to parse embedding response: {}", e)))?;

        parse_embedding(&response_json)
    }
}

fn parse_embedding(response_json: &serde_json::Value) -> Result<Embedding> {
    let data = response_json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|arr| arr.first())
        .ok_or_else(|| NlSqlError::Llm("No embedding data in response".to_string()))?;

    let embedding: Embedding = data
        .get("embedding")
        .and_then(|e| e.as_array())
        .ok_or_else(|| NlSqlError::Llm("No embedding vector in response".to_string()))?
        .iter()
        .filter_map(|v| v.as_f64().map(|f| f as f32))
        .collect();

    if embedding.is_empty() {
        return Err(NlSqlError::Llm("Embedding vector is empty".to_string()));
    }
    Ok(embedding)
}
