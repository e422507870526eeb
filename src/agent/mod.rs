//! LLM-backed generators: plain SQL and visualization plans.

pub mod sql_agent;
pub mod viz_agent;

pub use sql_agent::SqlGenerator;
pub use viz_agent::{VizPlan, VizPlanner};

use crate::llm::TokenUsage;

/// Model-produced SQL. Never executed before it passes the safety gate.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedQuery {
    pub sql: String,
    pub debug_prompt: Option<String>,
    pub usage: Option<TokenUsage>,
}

/// Comma-separated allowlist for prompts.
pub(crate) fn allowed_objects_text(objects: &[String]) -> String {
    if objects.is_empty() {
        "the provided tables/views".to_string()
    } else {
        objects.join(", ")
    }
}
