//! Visualization planner: one SQL statement plus a chart request.

use crate::agent::GeneratedQuery;
use crate::catalog::SchemaCatalog;
use crate::chart::ChartRequest;
use crate::error::{NlSqlError, Result};
use crate::llm::{extract_json_object, strip_code_fences, CompletionRequest, LanguageModelGateway};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct VizPlan {
    pub query: GeneratedQuery,
    pub chart: ChartRequest,
}

pub struct VizPlanner {
    gateway: Arc<dyn LanguageModelGateway>,
    catalog: Arc<SchemaCatalog>,
    /// Object the plan must query; falls back to the first catalog view.
    target_object: Option<String>,
}

impl VizPlanner {
    pub fn new(
        gateway: Arc<dyn LanguageModelGateway>,
        catalog: Arc<SchemaCatalog>,
        target_object: Option<String>,
    ) -> Self {
        Self {
            gateway,
            catalog,
            target_object,
        }
    }

    fn target(&self) -> String {
        if let Some(target) = &self.target_object {
            return target.clone();
        }
        let snapshot = self.catalog.snapshot();
        let target = snapshot
            .views()
            .next()
            .or_else(|| snapshot.entries().first())
            .map(|e| e.qualified_name())
            .unwrap_or_else(|| "the allowed view".to_string());
        target
    }

    fn system_prompt(&self) -> String {
        let snapshot = self.catalog.snapshot();
        let target = self.target();
        format!(
            "You are a data visualization assistant. Given a user question, return JSON with two keys:\n\
             - \"sql\": a safe {} SELECT that answers the question, querying ONLY from {target}\n\
             - \"chart\": an object with keys:\n\
             \x20   - \"type\": one of [\"bar\",\"line\",\"scatter\",\"pie\"]\n\
             \x20   - \"x\": column name for x-axis (or category for pie)\n\
             \x20   - \"y\": column name for y-axis (not needed for pie)\n\
             \x20   - \"title\": short chart title\n\n\
             Rules:\n\
             - Only SELECT; no DDL/DML.\n\
             - Use fully qualified view name: {target}\n\
             - Keep result sets small; include LIMIT when appropriate.\n\n\
             View schema:\n{}\n\
             Respond with ONLY the JSON object.",
            snapshot.dialect(),
            snapshot.schema_text()
        )
    }

    pub async fn plan(&self, question: &str) -> Result<VizPlan> {
        let system_prompt = self.system_prompt();

        info!("Planning visualization for question: {}", question);
        let completion = self
            .gateway
            .complete(CompletionRequest::new(system_prompt.clone(), question))
            .await?;

        let (sql, chart) = parse_plan(&completion.text)?;
        info!("Visualization plan SQL: {}", sql);

        Ok(VizPlan {
            query: GeneratedQuery {
                sql,
                debug_prompt: Some(system_prompt),
                usage: completion.usage,
            },
            chart,
        })
    }
}

fn parse_plan(raw: &str) -> Result<(String, ChartRequest)> {
    let content = strip_code_fences(raw);
    let json = extract_json_object(&content).unwrap_or(&content);

    let plan: serde_json::Value = serde_json::from_str(json).map_err(|e| {
        warn!("Failed to parse visualization plan JSON: {}", content);
        NlSqlError::GenerationFailure(format!("Failed to parse visualization plan: {}", e))
    })?;

    let (Some(sql), Some(chart)) = (plan.get("sql"), plan.get("chart")) else {
        return Err(NlSqlError::GenerationFailure(
            "Visualization plan must include 'sql' and 'chart' keys.".to_string(),
        ));
    };

    let sql = sql
        .as_str()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            NlSqlError::GenerationFailure("Visualization plan 'sql' must be a non-empty string.".to_string())
        })?;

    let chart: ChartRequest = serde_json::from_value(chart.clone()).map_err(|e| {
        NlSqlError::GenerationFailure(format!("Invalid chart object in visualization plan: {}", e))
    })?;

    Ok((sql, chart))
}
