//! Read-only SQL guard for model-generated statements.

pub mod lexer;
pub mod sql_gate;

pub use lexer::{lex, IdentChain, LexedSql};
pub use sql_gate::{GatePolicy, SqlSafetyGate};
