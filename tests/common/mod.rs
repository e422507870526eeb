#![allow(dead_code)]

use async_trait::async_trait;
use nl2sql::bootstrap::build_orchestrator;
use nl2sql::catalog::{CatalogSnapshot, SchemaCatalog};
use nl2sql::config::ServiceConfig;
use nl2sql::db::{Database, ResultSet, SqliteDatabase};
use nl2sql::error::{NlSqlError, Result};
use nl2sql::execution_loop::QueryOrchestrator;
use nl2sql::llm::{Completion, CompletionRequest, LanguageModelGateway, TokenUsage};
use rusqlite::Connection;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const METADATA: &str = r#"{
    "dialect": "sqlite",
    "defaultschema": "private",
    "views": [
        {
            "name": "movielens_view",
            "description": "One row per movie with its average rating",
            "columns": [
                {"name": "movieid", "type": "integer", "description": "Movie id"},
                {"name": "title", "type": "text", "description": "Movie title"},
                {"name": "genres", "type": "text", "description": "Primary genre"},
                {"name": "rating", "type": "real", "description": "Average rating"}
            ]
        }
    ]
}"#;

/// Which prompt a request carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Classify,
    Generate,
    Repair,
    Plan,
}

fn stage_of(request: &CompletionRequest) -> Stage {
    let prompt = &request.system_prompt;
    if prompt.starts_with("You classify user questions") {
        Stage::Classify
    } else if prompt.contains("SQL fixer") {
        Stage::Repair
    } else if prompt.contains("data visualization assistant") {
        Stage::Plan
    } else {
        Stage::Generate
    }
}

/// Replies per stage; the last reply of a stage repeats once the script runs out.
pub struct ScriptedGateway {
    label: std::result::Result<String, String>,
    generate: Vec<String>,
    repair: Vec<String>,
    plan: Vec<String>,
    requests: Mutex<Vec<(Stage, CompletionRequest)>>,
}

impl ScriptedGateway {
    pub fn new(label: &str) -> Self {
        Self {
            label: Ok(label.to_string()),
            generate: Vec::new(),
            repair: Vec::new(),
            plan: Vec::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_classifier(message: &str) -> Self {
        Self {
            label: Err(message.to_string()),
            ..Self::new("")
        }
    }

    pub fn generate(mut self, sql: &str) -> Self {
        self.generate.push(sql.to_string());
        self
    }

    pub fn repair(mut self, sql: &str) -> Self {
        self.repair.push(sql.to_string());
        self
    }

    pub fn plan(mut self, json: &str) -> Self {
        self.plan.push(json.to_string());
        self
    }

    pub fn calls(&self, stage: Stage) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == stage)
            .count()
    }

    pub fn requests(&self, stage: Stage) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == stage)
            .map(|(_, r)| r.clone())
            .collect()
    }

    fn scripted(replies: &[String], seen: usize, stage: Stage) -> Result<String> {
        replies
            .get(seen)
            .or_else(|| replies.last())
            .cloned()
            .ok_or_else(|| NlSqlError::Llm(format!("no scripted reply for {:?}", stage)))
    }
}

#[async_trait]
impl LanguageModelGateway for ScriptedGateway {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let stage = stage_of(&request);
        let seen = {
            let mut requests = self.requests.lock().unwrap();
            let seen = requests.iter().filter(|(s, _)| *s == stage).count();
            requests.push((stage, request));
            seen
        };

        let text = match stage {
            Stage::Classify => self.label.clone().map_err(NlSqlError::Llm)?,
            Stage::Generate => Self::scripted(&self.generate, seen, stage)?,
            Stage::Repair => Self::scripted(&self.repair, seen, stage)?,
            Stage::Plan => Self::scripted(&self.plan, seen, stage)?,
        };
        Ok(Completion {
            text,
            usage: Some(TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 2,
                total_tokens: 12,
            }),
        })
    }
}

/// Counts statements that reach the database.
pub struct CountingDatabase {
    inner: SqliteDatabase,
    calls: AtomicUsize,
    statements: Mutex<Vec<String>>,
}

impl CountingDatabase {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }
}

#[async_trait]
impl Database for CountingDatabase {
    fn name(&self) -> &str {
        "counting-sqlite"
    }

    async fn fetch_rows(&self, sql: &str, max_rows: usize) -> Result<ResultSet> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.statements.lock().unwrap().push(sql.to_string());
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        self.inner.fetch_rows(sql, max_rows).await
    }
}

/// In-memory SQLite with `private.movielens_view` populated.
pub fn movielens_database() -> Arc<CountingDatabase> {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "ATTACH DATABASE ':memory:' AS private;
         CREATE TABLE private.movielens_view (movieid INTEGER, title TEXT, genres TEXT, rating REAL);
         INSERT INTO private.movielens_view VALUES (1, 'Heat', 'Crime', 4.4);
         INSERT INTO private.movielens_view VALUES (2, 'Ran', 'Drama', 4.6);
         INSERT INTO private.movielens_view VALUES (3, 'Up', 'Animation', 4.1);
         INSERT INTO private.movielens_view VALUES (4, 'Fargo', 'Crime', 4.3);",
    )
    .unwrap();
    Arc::new(CountingDatabase {
        inner: SqliteDatabase::from_connection(conn).unwrap(),
        calls: AtomicUsize::new(0),
        statements: Mutex::new(Vec::new()),
    })
}

pub fn catalog() -> Arc<SchemaCatalog> {
    Arc::new(SchemaCatalog::from_snapshot(
        CatalogSnapshot::from_json(METADATA).unwrap(),
    ))
}

pub struct Harness {
    pub orchestrator: Arc<QueryOrchestrator>,
    pub gateway: Arc<ScriptedGateway>,
    pub database: Arc<CountingDatabase>,
}

pub fn harness_with(gateway: ScriptedGateway, config: ServiceConfig) -> Harness {
    let gateway = Arc::new(gateway);
    let database = movielens_database();
    let orchestrator = build_orchestrator(
        &config,
        catalog(),
        gateway.clone(),
        database.clone(),
        None,
    );
    Harness {
        orchestrator: Arc::new(orchestrator),
        gateway,
        database,
    }
}

pub fn harness(gateway: ScriptedGateway) -> Harness {
    harness_with(gateway, ServiceConfig::default())
}
