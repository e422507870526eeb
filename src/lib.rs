pub mod agent;
pub mod api;
pub mod bootstrap;
pub mod catalog;
pub mod chart;
pub mod config;
pub mod db;
pub mod error;
pub mod execution_loop;
pub mod intent;
pub mod llm;
pub mod observability;
pub mod schema_rag;
pub mod security;

pub use error::{NlSqlError, Result, SqlRejection};
