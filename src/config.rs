//! Service configuration
//!
//! All settings come from the process environment (optionally seeded from a
//! `.env` file by the binaries).

use crate::error::{NlSqlError, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAi,
    Ollama,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaIndexKind {
    PgVector,
    Memory,
    None,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub llm_provider: LlmProvider,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub openai_intent_model: Option<String>,
    pub openai_embedding_model: String,
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub database_url: Option<String>,
    pub sqlite_path: Option<PathBuf>,
    pub db_max_connections: u32,
    pub metadata_path: PathBuf,
    pub allowed_fq_view: Option<String>,
    pub default_row_limit: u32,
    pub max_result_rows: usize,
    pub enable_query_cache: bool,
    pub schema_index: SchemaIndexKind,
    pub schema_top_k: usize,
    pub bind_addr: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            llm_provider: LlmProvider::OpenAi,
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_model: "gpt-4o-mini".to_string(),
            openai_intent_model: None,
            openai_embedding_model: "text-embedding-3-small".to_string(),
            ollama_base_url: "http://localhost:11434".to_string(),
            ollama_model: "llama3.2".to_string(),
            database_url: None,
            sqlite_path: None,
            db_max_connections: 5,
            metadata_path: PathBuf::from("config/metadata.json"),
            allowed_fq_view: None,
            default_row_limit: 200,
            max_result_rows: 1000,
            enable_query_cache: true,
            schema_index: SchemaIndexKind::None,
            schema_top_k: 5,
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Build a configuration from the current environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let llm_provider = match get("LLM_PROVIDER").as_deref() {
            None | Some("openai") => LlmProvider::OpenAi,
            Some("ollama") => LlmProvider::Ollama,
            Some(other) => {
                return Err(NlSqlError::Config(format!(
                    "LLM_PROVIDER must be 'openai' or 'ollama', got '{}'",
                    other
                )))
            }
        };

        let schema_index = match get("SCHEMA_INDEX").as_deref() {
            None | Some("none") => SchemaIndexKind::None,
            Some("pgvector") => SchemaIndexKind::PgVector,
            Some("memory") => SchemaIndexKind::Memory,
            Some(other) => {
                return Err(NlSqlError::Config(format!(
                    "SCHEMA_INDEX must be 'pgvector', 'memory' or 'none', got '{}'",
                    other
                )))
            }
        };

        Ok(Self {
            llm_provider,
            openai_api_key: get("OPENAI_API_KEY"),
            openai_base_url: get("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
            openai_model: get("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            openai_intent_model: get("OPENAI_INTENT_MODEL"),
            openai_embedding_model: get("OPENAI_EMBEDDING_MODEL")
                .unwrap_or(defaults.openai_embedding_model),
            ollama_base_url: get("OLLAMA_BASE_URL").unwrap_or(defaults.ollama_base_url),
            ollama_model: get("OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
            database_url: get("DATABASE_URL"),
            sqlite_path: get("SQLITE_PATH").map(PathBuf::from),
            db_max_connections: parse_or("DB_MAX_CONNECTIONS", get("DB_MAX_CONNECTIONS"), defaults.db_max_connections)?,
            metadata_path: get("METADATA_PATH").map(PathBuf::from).unwrap_or(defaults.metadata_path),
            allowed_fq_view: get("ALLOWED_FQ_VIEW"),
            default_row_limit: parse_or("DEFAULT_ROW_LIMIT", get("DEFAULT_ROW_LIMIT"), defaults.default_row_limit)?,
            max_result_rows: parse_or("MAX_RESULT_ROWS", get("MAX_RESULT_ROWS"), defaults.max_result_rows)?,
            enable_query_cache: parse_bool("ENABLE_QUERY_CACHE", get("ENABLE_QUERY_CACHE"), defaults.enable_query_cache)?,
            schema_index,
            schema_top_k: parse_or("SCHEMA_TOP_K", get("SCHEMA_TOP_K"), defaults.schema_top_k)?,
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
        })
    }
}

fn parse_or<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| NlSqlError::Config(format!("{} has invalid value '{}': {}", key, raw, e))),
    }
}

fn parse_bool(key: &str, value: Option<String>, default: bool) -> Result<bool> {
    match value.as_deref().map(str::to_lowercase).as_deref() {
        None => Ok(default),
        Some("1") | Some("true") | Some("yes") | Some("on") => Ok(true),
        Some("0") | Some("false") | Some("no") | Some("off") => Ok(false),
        Some(other) => Err(NlSqlError::Config(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}
