//! Ollama backend (local models via `/api/chat`).

use crate::error::{NlSqlError, Result};
use crate::llm::{Completion, CompletionRequest, LanguageModelGateway, TokenUsage};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub struct OllamaGateway {
    base_url: String,
    model: String,
    client: Client,
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Deserialize, Debug)]
struct OllamaChatResponse {
    message: OllamaReply,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Deserialize, Debug)]
struct OllamaReply {
    content: String,
}

impl OllamaGateway {
    pub fn new(base_url: Option<String>, model: Option<String>) -> Self {
        Self {
            base_url: base_url
                .unwrap_or_else(|| "http://localhost:11434".to_string())
                .trim_end_matches('/')
                .to_string(),
            model: model.unwrap_or_else(|| "llama3.2".to_string()),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl LanguageModelGateway for OllamaGateway {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let model = request.model.as_deref().unwrap_or(&self.model);
        let body = OllamaChatRequest {
            model,
            messages: vec![
                OllamaMessage { role: "system", content: &request.system_prompt },
                OllamaMessage { role: "user", content: &request.user_message },
            ],
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| NlSqlError::Llm(format!("Failed to send request to Ollama: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(NlSqlError::Llm(format!("Ollama error ({}): {}", status, error_text)));
        }

        let reply: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| NlSqlError::Llm(format!("Failed to parse Ollama response: {}", e)))?;

        Ok(into_completion(reply))
    }
}

fn into_completion(reply: OllamaChatResponse) -> Completion {
    let usage = match (reply.prompt_eval_count, reply.eval_count) {
        (None, None) => None,
        (prompt, completion) => {
            let prompt_tokens = prompt.unwrap_or(0);
            let completion_tokens = completion.unwrap_or(0);
            Some(TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            })
        }
    };
    Completion {
        text: reply.message.content.trim().to_string(),
        usage,
    }
}
