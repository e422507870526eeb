//! Request execution: the orchestrator state machine and its result cache.

pub mod cache;
pub mod orchestrator;

pub use cache::{CacheOutcome, QueryCache};
pub use orchestrator::{QueryOrchestrator, QueryResponse};
