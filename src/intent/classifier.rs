//! LLM-backed intent classifier.

use crate::error::Result;
use crate::intent::Intent;
use crate::llm::{CompletionRequest, LanguageModelGateway, TokenUsage};
use std::sync::Arc;
use tracing::info;

const CLASSIFIER_PROMPT: &str = "You classify user questions.\n\
- If the question can be answered by running a SQL query over the available tables and views, respond with exactly: retrieval\n\
- If the user is asking for a chart/graph/plot or any visualization, respond with exactly: visualization\n\
- Otherwise respond with exactly: other\n\
Return only the single word label.";

#[derive(Debug, Clone, PartialEq)]
pub struct IntentPrediction {
    pub intent: Intent,
    /// Raw label as returned by the model, lower-cased.
    pub label: String,
    pub usage: Option<TokenUsage>,
}

pub struct IntentClassifier {
    gateway: Arc<dyn LanguageModelGateway>,
    model: Option<String>,
}

impl IntentClassifier {
    /// `model` overrides the gateway's default model for classification only.
    pub fn new(gateway: Arc<dyn LanguageModelGateway>, model: Option<String>) -> Self {
        Self { gateway, model }
    }

    pub async fn predict(&self, question: &str) -> Result<IntentPrediction> {
        info!("Classifying intent for question: {}", question);

        let request = CompletionRequest::new(CLASSIFIER_PROMPT, question)
            .temperature(0.0)
            .max_tokens(3)
            .model(self.model.clone());
        let completion = self.gateway.complete(request).await?;

        let label = completion.text.trim().to_lowercase();
        let intent = Intent::from_label(&label);
        info!("Intent classified as: {} (raw: {})", intent, label);

        Ok(IntentPrediction {
            intent,
            label,
            usage: completion.usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Completion;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Recording {
        reply: String,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl LanguageModelGateway for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
            self.requests.lock().unwrap().push(request);
            Ok(Completion {
                text: self.reply.clone(),
                usage: Some(TokenUsage {
                    prompt_tokens: 40,
                    completion_tokens: 1,
                    total_tokens: 41,
                }),
            })
        }
    }

    fn recording(reply: &str) -> Arc<Recording> {
        Arc::new(Recording {
            reply: reply.to_string(),
            requests: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_predict_is_deterministic_and_short() {
        let gateway = recording("  Retrieval\n");
        let classifier = IntentClassifier::new(gateway.clone(), Some("gpt-4o-mini".to_string()));

        let prediction = classifier.predict("how many movies are there").await.unwrap();
        assert_eq!(prediction.intent, Intent::Retrieval);
        assert_eq!(prediction.label, "retrieval");
        assert_eq!(prediction.usage.unwrap().total_tokens, 41);

        let requests = gateway.requests.lock().unwrap();
        assert_eq!(requests[0].temperature, 0.0);
        assert_eq!(requests[0].max_tokens, Some(3));
        assert_eq!(requests[0].model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(requests[0].user_message, "how many movies are there");
    }

    #[tokio::test]
    async fn test_unexpected_label_is_other() {
        let classifier = IntentClassifier::new(recording("I am not sure"), None);
        let prediction = classifier.predict("hello").await.unwrap();
        assert_eq!(prediction.intent, Intent::Other);
        assert_eq!(prediction.label, "i am not sure");
    }
}
