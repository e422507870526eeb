//! Language-Model Gateway
//!
//! A single completion interface over whichever provider is configured.
//! Callers build a [`CompletionRequest`] and depend only on
//! [`LanguageModelGateway`]; each backend lives in its own module.

pub mod ollama;
pub mod openai;

pub use ollama::OllamaGateway;
pub use openai::OpenAiGateway;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_message: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Per-call model override (e.g. a cheaper classifier model).
    pub model: Option<String>,
}

impl CompletionRequest {
    pub fn new(system_prompt: impl Into<String>, user_message: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_message: user_message.into(),
            temperature: 0.1,
            max_tokens: None,
            model: None,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

#[async_trait]
pub trait LanguageModelGateway: Send + Sync {
    /// Backend name for logs (e.g. "openai", "ollama").
    fn name(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;
}

/// Remove a surrounding markdown code fence (```sql / ```json / ```).
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }

    let inner = trimmed.trim_start_matches('`');
    // Drop an info string such as "sql" or "json" on the opening line.
    let inner = match inner.find('\n') {
        Some(newline) if !inner[..newline].trim().contains(' ') => &inner[newline + 1..],
        _ => inner,
    };
    inner.trim_end().trim_end_matches('`').trim().to_string()
}

/// Slice out the outermost JSON object of a model reply.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}
