//! Intent routing
//!
//! Decides which generator serves a question: a keyword pre-filter for
//! obvious visualization requests, then an LLM label for everything else.

pub mod classifier;
pub mod router;

pub use classifier::{IntentClassifier, IntentPrediction};
pub use router::IntentRouter;

use crate::llm::TokenUsage;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Retrieval,
    Visualization,
    Other,
    /// Classification itself failed.
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Retrieval => "retrieval",
            Intent::Visualization => "visualization",
            Intent::Other => "other",
            Intent::Unknown => "unknown",
        }
    }

    /// Map a raw classifier label. "visual" wins over "retrieval"; anything else is `Other`.
    pub fn from_label(label: &str) -> Self {
        let label = label.to_lowercase();
        if label.contains("visual") {
            Intent::Visualization
        } else if label.contains("retrieval") {
            Intent::Retrieval
        } else {
            Intent::Other
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentTarget {
    Sql,
    Visualization,
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteDecision {
    pub target: AgentTarget,
    pub intent: Intent,
    pub reason: String,
    pub usage: Option<TokenUsage>,
}

impl RouteDecision {
    pub fn from_intent(intent: Intent, reason: String, usage: Option<TokenUsage>) -> Self {
        let target = match intent {
            Intent::Retrieval => AgentTarget::Sql,
            Intent::Visualization => AgentTarget::Visualization,
            Intent::Other | Intent::Unknown => AgentTarget::None,
        };
        Self {
            target,
            intent,
            reason,
            usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_mapping_prefers_visual() {
        assert_eq!(Intent::from_label("Visualization"), Intent::Visualization);
        assert_eq!(Intent::from_label("retrieval"), Intent::Retrieval);
        assert_eq!(Intent::from_label("visual retrieval"), Intent::Visualization);
        assert_eq!(Intent::from_label("RETRIEVAL."), Intent::Retrieval);
        assert_eq!(Intent::from_label("other"), Intent::Other);
        assert_eq!(Intent::from_label(""), Intent::Other);
    }

    #[test]
    fn test_decision_targets() {
        let d = RouteDecision::from_intent(Intent::Other, "LLM label: other".into(), None);
        assert_eq!(d.target, AgentTarget::None);
        let d = RouteDecision::from_intent(Intent::Retrieval, "r".into(), None);
        assert_eq!(d.target, AgentTarget::Sql);
    }
}
