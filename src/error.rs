use thiserror::Error;

/// Reasons the safety gate refuses a statement.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SqlRejection {
    #[error("Only SELECT queries are allowed.")]
    NotSelect,

    #[error("Only read-only SELECT queries are allowed (found '{0}').")]
    ForbiddenKeyword(String),

    #[error("Only a single SQL statement is allowed.")]
    MultipleStatements,

    #[error("Query must reference one of the allowed objects: {0}")]
    DisallowedObject(String),

    #[error("Query references unknown column: {column}{}", did_you_mean(.suggestion))]
    UnknownColumn {
        column: String,
        suggestion: Option<String>,
    },
}

fn did_you_mean(suggestion: &Option<String>) -> String {
    suggestion
        .as_ref()
        .map(|s| format!(" (did you mean '{}'?)", s))
        .unwrap_or_default()
}

#[derive(Error, Debug)]
pub enum NlSqlError {
    #[error("No suitable agent for intent '{intent}': {reason}")]
    UnroutableIntent { intent: String, reason: String },

    /// Carries the router's reason, which already names the failure.
    #[error("{0}")]
    ClassificationFailure(String),

    #[error("Generation failed: {0}")]
    GenerationFailure(String),

    #[error("SQL rejected: {0}")]
    SqlRejected(#[from] SqlRejection),

    #[error("Invalid chart spec: {0}")]
    ChartSpecInvalid(String),

    #[error("Database execution failed: {0}")]
    ExecutionFailure(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NlSqlError {
    /// Errors caused by the caller's input rather than by a collaborator.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            NlSqlError::InvalidRequest(_) | NlSqlError::UnroutableIntent { .. }
        )
    }

    /// Whether the retrieval path may feed this failure into a repair round-trip.
    pub fn is_repairable(&self) -> bool {
        matches!(
            self,
            NlSqlError::SqlRejected(_) | NlSqlError::ExecutionFailure(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, NlSqlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_column_message_includes_suggestion() {
        let rejection = SqlRejection::UnknownColumn {
            column: "ratng".to_string(),
            suggestion: Some("rating".to_string()),
        };
        assert_eq!(
            rejection.to_string(),
            "Query references unknown column: ratng (did you mean 'rating'?)"
        );
    }

    #[test]
    fn test_client_error_mapping() {
        assert!(NlSqlError::InvalidRequest("empty".into()).is_client_error());
        assert!(NlSqlError::UnroutableIntent {
            intent: "other".into(),
            reason: "LLM label: other".into()
        }
        .is_client_error());
        assert!(!NlSqlError::ExecutionFailure("boom".into()).is_client_error());
        assert!(!NlSqlError::SqlRejected(SqlRejection::NotSelect).is_client_error());
    }
}
