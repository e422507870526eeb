//! Service wiring
//!
//! Builds the collaborators named by [`ServiceConfig`] and assembles the
//! orchestrator shared by the CLI and the HTTP server.

use crate::agent::{SqlGenerator, VizPlanner};
use crate::catalog::SchemaCatalog;
use crate::config::{LlmProvider, SchemaIndexKind, ServiceConfig};
use crate::db::{init_pool, Database, DbPool, PgDatabase, SqliteDatabase};
use crate::error::{NlSqlError, Result};
use crate::execution_loop::{QueryCache, QueryOrchestrator};
use crate::intent::{IntentClassifier, IntentRouter};
use crate::llm::{LanguageModelGateway, OllamaGateway, OpenAiGateway};
use crate::observability::QueryHistory;
use crate::schema_rag::{Embedder, InMemorySchemaIndex, OpenAiEmbedder, PgVectorStore, SchemaRetriever};
use crate::security::{GatePolicy, SqlSafetyGate};
use std::sync::Arc;
use tracing::{info, warn};

/// Everything a front end needs to serve requests.
pub struct AppState {
    pub config: ServiceConfig,
    pub catalog: Arc<SchemaCatalog>,
    pub orchestrator: Arc<QueryOrchestrator>,
}

pub fn build_gateway(config: &ServiceConfig) -> Result<Arc<dyn LanguageModelGateway>> {
    match config.llm_provider {
        LlmProvider::OpenAi => {
            let api_key = config.openai_api_key.clone().ok_or_else(|| {
                NlSqlError::Config("OPENAI_API_KEY is required when LLM_PROVIDER=openai".to_string())
            })?;
            info!("Using OpenAI-compatible gateway (model {})", config.openai_model);
            Ok(Arc::new(OpenAiGateway::new(
                api_key,
                config.openai_model.clone(),
                config.openai_base_url.clone(),
            )))
        }
        LlmProvider::Ollama => {
            info!("Using Ollama gateway (model {})", config.ollama_model);
            Ok(Arc::new(OllamaGateway::new(
                Some(config.ollama_base_url.clone()),
                Some(config.ollama_model.clone()),
            )))
        }
    }
}

/// Postgres when `DATABASE_URL` is set, otherwise SQLite at `SQLITE_PATH`.
pub async fn build_database(config: &ServiceConfig) -> Result<(Arc<dyn Database>, Option<DbPool>)> {
    if let Some(url) = &config.database_url {
        let pool = init_pool(url, config.db_max_connections)
            .await
            .map_err(|e| NlSqlError::Config(format!("Failed to connect to database: {}", e)))?;
        return Ok((Arc::new(PgDatabase::new(pool.clone())), Some(pool)));
    }
    if let Some(path) = &config.sqlite_path {
        return Ok((Arc::new(SqliteDatabase::open(path)?), None));
    }
    Err(NlSqlError::Config(
        "Set DATABASE_URL (Postgres) or SQLITE_PATH (SQLite)".to_string(),
    ))
}

/// Relevant-schema retrieval, or `None` when disabled or unavailable.
pub async fn build_retriever(
    config: &ServiceConfig,
    catalog: &SchemaCatalog,
    pool: Option<&DbPool>,
) -> Option<Arc<SchemaRetriever>> {
    if config.schema_index == SchemaIndexKind::None {
        return None;
    }
    let Some(api_key) = config.openai_api_key.clone() else {
        warn!("SCHEMA_INDEX is set but OPENAI_API_KEY is missing; schema retrieval disabled");
        return None;
    };
    let embedder: Arc<dyn Embedder> = Arc::new(OpenAiEmbedder::new(
        api_key,
        config.openai_base_url.clone(),
        config.openai_embedding_model.clone(),
    ));

    match config.schema_index {
        SchemaIndexKind::PgVector => {
            let Some(pool) = pool else {
                warn!("SCHEMA_INDEX=pgvector needs DATABASE_URL; schema retrieval disabled");
                return None;
            };
            info!("Schema retrieval via pgvector (top {})", config.schema_top_k);
            Some(Arc::new(SchemaRetriever::new(
                embedder,
                Arc::new(PgVectorStore::new(pool.clone())),
                config.schema_top_k,
            )))
        }
        SchemaIndexKind::Memory => {
            let snapshot = catalog.snapshot();
            match InMemorySchemaIndex::build(snapshot.entries(), embedder.as_ref()).await {
                Ok(index) => Some(Arc::new(SchemaRetriever::new(
                    embedder,
                    Arc::new(index),
                    config.schema_top_k,
                ))),
                Err(e) => {
                    warn!("Failed to build in-memory schema index: {}", e);
                    None
                }
            }
        }
        SchemaIndexKind::None => None,
    }
}

/// Assemble the orchestrator from already-built collaborators.
pub fn build_orchestrator(
    config: &ServiceConfig,
    catalog: Arc<SchemaCatalog>,
    gateway: Arc<dyn LanguageModelGateway>,
    database: Arc<dyn Database>,
    retriever: Option<Arc<SchemaRetriever>>,
) -> QueryOrchestrator {
    let default_limit = config.default_row_limit as usize;
    let router = IntentRouter::new(IntentClassifier::new(
        Arc::clone(&gateway),
        config.openai_intent_model.clone(),
    ));
    let sql_generator = SqlGenerator::new(
        Arc::clone(&gateway),
        Arc::clone(&catalog),
        retriever,
        default_limit,
    );
    let viz_planner = VizPlanner::new(gateway, Arc::clone(&catalog), config.allowed_fq_view.clone());
    let gate = SqlSafetyGate::new(GatePolicy::with_default_limit(default_limit));

    let orchestrator = QueryOrchestrator::new(router, sql_generator, viz_planner, gate, catalog, database)
        .with_history(Arc::new(QueryHistory::default()))
        .with_max_result_rows(config.max_result_rows);

    if config.enable_query_cache {
        orchestrator.with_cache(Arc::new(QueryCache::new()))
    } else {
        orchestrator
    }
}

pub async fn bootstrap(config: ServiceConfig) -> Result<AppState> {
    let catalog = Arc::new(SchemaCatalog::load(&config.metadata_path)?);
    let gateway = build_gateway(&config)?;
    let (database, pool) = build_database(&config).await?;
    let retriever = build_retriever(&config, &catalog, pool.as_ref()).await;

    let orchestrator = build_orchestrator(&config, Arc::clone(&catalog), gateway, database, retriever);
    Ok(AppState {
        config,
        catalog,
        orchestrator: Arc::new(orchestrator),
    })
}
