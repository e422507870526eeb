//! Intent Router
//!
//! Keyword pre-filter first, then the classifier. A classifier error routes
//! to no agent at all.

use crate::intent::{AgentTarget, Intent, IntentClassifier, RouteDecision};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

const VIZ_PATTERNS: [&str; 8] = [
    r"\bplot\b",
    r"\bchart\b",
    r"\bgraph\b",
    r"\bvisual",
    r"\bbar chart\b",
    r"\bline chart\b",
    r"\bscatter\b",
    r"\bpie\b",
];

lazy_static! {
    static ref VIZ_KEYWORDS: Vec<(&'static str, Regex)> = VIZ_PATTERNS
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok().map(|re| (*pattern, re)))
        .collect();
}

/// First visualization pattern matching the lower-cased question.
pub fn match_viz_keyword(question: &str) -> Option<&'static str> {
    let q = question.to_lowercase();
    VIZ_KEYWORDS
        .iter()
        .find(|(_, re)| re.is_match(&q))
        .map(|(pattern, _)| *pattern)
}

pub struct IntentRouter {
    classifier: IntentClassifier,
}

impl IntentRouter {
    pub fn new(classifier: IntentClassifier) -> Self {
        Self { classifier }
    }

    pub async fn route(&self, question: &str) -> RouteDecision {
        if let Some(pattern) = match_viz_keyword(question) {
            let decision = RouteDecision::from_intent(
                Intent::Visualization,
                format!("Matched visualization keyword: {}", pattern),
                None,
            );
            info!("Routed to {:?}: {}", decision.target, decision.reason);
            return decision;
        }

        let decision = match self.classifier.predict(question).await {
            Ok(prediction) => RouteDecision::from_intent(
                prediction.intent,
                format!("LLM label: {}", prediction.label),
                prediction.usage,
            ),
            Err(e) => {
                warn!("Intent classification failed: {}", e);
                RouteDecision {
                    target: AgentTarget::None,
                    intent: Intent::Unknown,
                    reason: format!("Intent classification failed: {}", e),
                    usage: None,
                }
            }
        };
        info!("Routed to {:?}: {}", decision.target, decision.reason);
        decision
    }
}
