//! Observability
//!
//! Tracing setup and the in-memory log of recent requests.

pub mod logging;
pub mod query_log;

pub use logging::init_tracing;
pub use query_log::{QueryHistory, QueryLogEntry};
