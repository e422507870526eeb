//! Query Orchestrator
//!
//! Per request: route, generate, gate, execute (through the cache), and on
//! the retrieval path allow exactly one repair round-trip when the gate or
//! the database refuses the first statement. Visualization plans get no
//! repair; any failure there ends the request.

use crate::agent::{GeneratedQuery, SqlGenerator, VizPlanner};
use crate::catalog::{CatalogSnapshot, SchemaCatalog};
use crate::chart::build_figure;
use crate::db::{Database, ResultSet, Row};
use crate::error::{NlSqlError, Result};
use crate::execution_loop::cache::{CacheOutcome, QueryCache};
use crate::intent::{AgentTarget, Intent, IntentRouter, RouteDecision};
use crate::observability::{QueryHistory, QueryLogEntry};
use crate::security::SqlSafetyGate;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

pub const DEFAULT_MAX_RESULT_ROWS: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub sql: String,
    pub rows: Vec<Row>,
    pub figure: Option<serde_json::Value>,
    pub intent: Option<String>,
}

/// What a completed path hands back for the response and the history log.
struct PathOutcome {
    sql: String,
    rows: Vec<Row>,
    figure: Option<serde_json::Value>,
    repaired: bool,
}

pub struct QueryOrchestrator {
    router: IntentRouter,
    sql_generator: SqlGenerator,
    viz_planner: VizPlanner,
    gate: SqlSafetyGate,
    catalog: Arc<SchemaCatalog>,
    database: Arc<dyn Database>,
    cache: Option<Arc<QueryCache>>,
    history: Arc<QueryHistory>,
    max_result_rows: usize,
}

impl QueryOrchestrator {
    pub fn new(
        router: IntentRouter,
        sql_generator: SqlGenerator,
        viz_planner: VizPlanner,
        gate: SqlSafetyGate,
        catalog: Arc<SchemaCatalog>,
        database: Arc<dyn Database>,
    ) -> Self {
        Self {
            router,
            sql_generator,
            viz_planner,
            gate,
            catalog,
            database,
            cache: None,
            history: Arc::new(QueryHistory::default()),
            max_result_rows: DEFAULT_MAX_RESULT_ROWS,
        }
    }

    pub fn with_cache(mut self, cache: Arc<QueryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_history(mut self, history: Arc<QueryHistory>) -> Self {
        self.history = history;
        self
    }

    pub fn with_max_result_rows(mut self, max_result_rows: usize) -> Self {
        self.max_result_rows = max_result_rows.max(1);
        self
    }

    pub fn catalog(&self) -> &Arc<SchemaCatalog> {
        &self.catalog
    }

    pub fn history(&self) -> &Arc<QueryHistory> {
        &self.history
    }

    pub fn cache(&self) -> Option<&Arc<QueryCache>> {
        self.cache.as_ref()
    }

    pub fn gate(&self) -> &SqlSafetyGate {
        &self.gate
    }

    pub async fn handle(&self, question: &str, execute: bool) -> Result<QueryResponse> {
        let started = Instant::now();
        let question = question.trim();
        let mut entry = QueryLogEntry::new(question);

        let result = self.dispatch(question, execute, &mut entry).await;

        entry.elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(response) => {
                entry.success = true;
                entry.sql = Some(response.sql.clone());
                entry.rows_returned = response.rows.len();
                info!(
                    "Request completed in {} ms ({} rows)",
                    entry.elapsed_ms, entry.rows_returned
                );
            }
            Err(e) => {
                entry.error = Some(e.to_string());
                warn!("Request failed after {} ms: {}", entry.elapsed_ms, e);
            }
        }
        self.history.record(entry);
        result
    }

    async fn dispatch(&self, question: &str, execute: bool, entry: &mut QueryLogEntry) -> Result<QueryResponse> {
        if question.is_empty() {
            return Err(NlSqlError::InvalidRequest("question must not be empty".to_string()));
        }

        let decision = self.router.route(question).await;
        entry.intent = Some(decision.intent.to_string());
        if let Some(usage) = &decision.usage {
            info!("Intent classifier usage: {:?}", usage);
        }

        let outcome = match decision.target {
            AgentTarget::Sql => self.run_retrieval(question, execute).await?,
            AgentTarget::Visualization => self.run_visualization(question, execute).await?,
            AgentTarget::None => return Err(unroutable(decision)),
        };

        entry.repaired = outcome.repaired;
        Ok(QueryResponse {
            sql: outcome.sql,
            rows: outcome.rows,
            figure: outcome.figure,
            intent: Some(decision.intent.to_string()),
        })
    }

    async fn run_retrieval(&self, question: &str, execute: bool) -> Result<PathOutcome> {
        let generated = self.sql_generator.generate(question).await?;
        log_usage("SQL generator", &generated);
        let snapshot = self.catalog.snapshot();

        match self.validate_and_fetch(&generated.sql, &snapshot, execute).await {
            Ok((sql, result)) => Ok(PathOutcome {
                sql,
                rows: result.rows.clone(),
                figure: None,
                repaired: false,
            }),
            Err(e) if e.is_repairable() => {
                warn!("First attempt failed, repairing once: {}", e);
                let repaired = self
                    .sql_generator
                    .repair(question, &generated.sql, &e.to_string())
                    .await?;
                log_usage("SQL repair", &repaired);

                let (sql, result) = self.validate_and_fetch(&repaired.sql, &snapshot, execute).await?;
                Ok(PathOutcome {
                    sql,
                    rows: result.rows.clone(),
                    figure: None,
                    repaired: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn run_visualization(&self, question: &str, execute: bool) -> Result<PathOutcome> {
        let plan = self.viz_planner.plan(question).await?;
        log_usage("Viz generator", &plan.query);
        let snapshot = self.catalog.snapshot();

        let (sql, result) = self.validate_and_fetch(&plan.query.sql, &snapshot, execute).await?;
        if !execute {
            return Ok(PathOutcome {
                sql,
                rows: Vec::new(),
                figure: None,
                repaired: false,
            });
        }

        let figure = build_figure(&result.rows, &plan.chart)?;
        Ok(PathOutcome {
            sql,
            rows: result.rows.clone(),
            figure: Some(figure),
            repaired: false,
        })
    }

    /// Gate the statement, then fetch its rows unless `execute` is off.
    async fn validate_and_fetch(
        &self,
        sql: &str,
        snapshot: &CatalogSnapshot,
        execute: bool,
    ) -> Result<(String, Arc<ResultSet>)> {
        let normalized = self.gate.validate_for_catalog(sql, snapshot)?;
        if !execute {
            return Ok((normalized, Arc::new(ResultSet::default())));
        }
        let result = self.fetch(&normalized).await?;
        Ok((normalized, result))
    }

    async fn fetch(&self, sql: &str) -> Result<Arc<ResultSet>> {
        let max_rows = self.max_result_rows;
        let Some(cache) = &self.cache else {
            let result = self.database.fetch_rows(sql, max_rows).await?;
            info!("Fetched {} rows from {}", result.len(), self.database.name());
            return Ok(Arc::new(result));
        };

        let (result, outcome) = cache
            .get_or_fetch(sql, || self.database.fetch_rows(sql, max_rows))
            .await?;
        match outcome {
            CacheOutcome::Hit => info!("Cache hit ({} rows)", result.len()),
            CacheOutcome::Miss => info!(
                "Cache miss, fetched {} rows from {}",
                result.len(),
                self.database.name()
            ),
        }
        if result.truncated {
            warn!("Result truncated to {} rows", max_rows);
        }
        Ok(result)
    }
}

fn unroutable(decision: RouteDecision) -> NlSqlError {
    if decision.intent == Intent::Unknown {
        NlSqlError::ClassificationFailure(decision.reason)
    } else {
        NlSqlError::UnroutableIntent {
            intent: decision.intent.to_string(),
            reason: decision.reason,
        }
    }
}

fn log_usage(stage: &str, generated: &GeneratedQuery) {
    if let Some(usage) = &generated.usage {
        info!("{} usage: {:?}", stage, usage);
    }
}
