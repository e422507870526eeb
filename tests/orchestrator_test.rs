mod common;

use common::{harness, harness_with, ScriptedGateway, Stage};
use nl2sql::config::ServiceConfig;
use nl2sql::error::{NlSqlError, SqlRejection};
use serde_json::json;

const TOP_RATED: &str = "SELECT title, rating FROM private.movielens_view ORDER BY rating DESC";

#[tokio::test]
async fn test_retrieval_appends_limit_and_returns_rows() {
    let h = harness(ScriptedGateway::new("retrieval").generate(TOP_RATED));

    let response = h.orchestrator.handle("top rated movies", true).await.unwrap();

    assert_eq!(response.sql, format!("{} LIMIT 200", TOP_RATED));
    assert_eq!(response.intent.as_deref(), Some("retrieval"));
    assert!(response.figure.is_none());
    assert_eq!(response.rows.len(), 4);
    assert_eq!(response.rows[0]["title"], json!("Ran"));
    assert_eq!(response.rows[0]["rating"], json!(4.6));

    assert_eq!(h.gateway.calls(Stage::Classify), 1);
    assert_eq!(h.gateway.calls(Stage::Repair), 0);
    assert_eq!(h.database.statements(), vec![response.sql.clone()]);
}

#[tokio::test]
async fn test_execution_failure_is_repaired_once() {
    let h = harness(
        ScriptedGateway::new("retrieval")
            .generate("SELECT titel FROM private.movielens_view")
            .repair("SELECT title FROM private.movielens_view ORDER BY title LIMIT 2"),
    );

    let response = h.orchestrator.handle("list two movies", true).await.unwrap();

    assert_eq!(response.sql, "SELECT title FROM private.movielens_view ORDER BY title LIMIT 2");
    assert_eq!(response.rows.len(), 2);
    assert_eq!(response.rows[0]["title"], json!("Fargo"));

    let repairs = h.gateway.requests(Stage::Repair);
    assert_eq!(repairs.len(), 1);
    assert!(repairs[0].user_message.contains("Question: list two movies"));
    assert!(repairs[0].user_message.contains("Bad SQL: SELECT titel FROM private.movielens_view"));
    assert!(repairs[0].user_message.contains("titel"));
    assert_eq!(h.database.calls(), 2);

    let history = h.orchestrator.history().recent(1);
    assert!(history[0].success);
    assert!(history[0].repaired);
}

#[tokio::test]
async fn test_failed_repair_surfaces_execution_failure() {
    let h = harness(
        ScriptedGateway::new("retrieval")
            .generate("SELECT titel FROM private.movielens_view")
            .repair("SELECT nope FROM private.movielens_view"),
    );

    let err = h.orchestrator.handle("list movies", true).await.unwrap_err();

    assert!(matches!(err, NlSqlError::ExecutionFailure(_)));
    assert!(!err.is_client_error());
    assert_eq!(h.gateway.calls(Stage::Repair), 1);
    assert_eq!(h.database.calls(), 2);
}

#[tokio::test]
async fn test_gate_rejection_triggers_repair_on_retrieval() {
    let h = harness(
        ScriptedGateway::new("retrieval")
            .generate("DELETE FROM private.movielens_view")
            .repair("SELECT title FROM private.movielens_view WHERE genres = 'Crime' ORDER BY title"),
    );

    let response = h.orchestrator.handle("crime movies", true).await.unwrap();

    assert!(response.sql.ends_with(" LIMIT 200"));
    assert_eq!(response.rows.len(), 2);
    let repairs = h.gateway.requests(Stage::Repair);
    assert_eq!(repairs.len(), 1);
    assert!(repairs[0].user_message.contains("Only SELECT queries are allowed."));
    // The rejected statement never reaches the database.
    assert_eq!(h.database.calls(), 1);
}

#[tokio::test]
async fn test_rejected_repair_is_final() {
    let h = harness(
        ScriptedGateway::new("retrieval")
            .generate("SELECT * FROM secret.salaries")
            .repair("SELECT * FROM secret.salaries"),
    );

    let err = h.orchestrator.handle("show salaries", true).await.unwrap_err();

    match err {
        NlSqlError::SqlRejected(rejection) => assert_eq!(
            rejection,
            SqlRejection::DisallowedObject("private.movielens_view".to_string())
        ),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(h.gateway.calls(Stage::Repair), 1);
    assert_eq!(h.database.calls(), 0);
}

#[tokio::test]
async fn test_visualization_keyword_skips_classifier_and_builds_figure() {
    let plan = r#"```json
{"sql": "SELECT genres, COUNT(*) AS n FROM private.movielens_view GROUP BY genres ORDER BY genres",
 "chart": {"type": "bar", "x": "genres", "y": "n", "title": "Movies per genre"}}
```"#;
    let h = harness(ScriptedGateway::new("retrieval").plan(plan));

    let response = h.orchestrator.handle("plot movies per genre", true).await.unwrap();

    assert_eq!(h.gateway.calls(Stage::Classify), 0);
    assert_eq!(response.intent.as_deref(), Some("visualization"));
    assert!(response.sql.ends_with("ORDER BY genres LIMIT 200"));
    assert_eq!(response.rows.len(), 3);

    let figure = response.figure.unwrap();
    assert_eq!(figure["data"][0]["type"], json!("bar"));
    assert_eq!(figure["data"][0]["x"], json!(["Animation", "Crime", "Drama"]));
    assert_eq!(figure["data"][0]["y"], json!([1, 2, 1]));
    assert_eq!(figure["layout"]["title"]["text"], json!("Movies per genre"));
}

#[tokio::test]
async fn test_visualization_rejection_is_terminal() {
    let plan = r#"{"sql": "SELECT x FROM secret.table", "chart": {"type": "bar", "x": "x", "y": "x"}}"#;
    let h = harness(ScriptedGateway::new("visualization").plan(plan));

    let err = h.orchestrator.handle("chart of secrets", true).await.unwrap_err();

    assert!(matches!(
        err,
        NlSqlError::SqlRejected(SqlRejection::DisallowedObject(_))
    ));
    assert_eq!(h.gateway.calls(Stage::Repair), 0);
    assert_eq!(h.database.calls(), 0);
}

#[tokio::test]
async fn test_visualization_of_empty_result_is_invalid_chart() {
    let plan = r#"{"sql": "SELECT title, rating FROM private.movielens_view WHERE rating > 10",
                   "chart": {"type": "line", "x": "title", "y": "rating"}}"#;
    let h = harness(ScriptedGateway::new("visualization").plan(plan));

    let err = h.orchestrator.handle("graph of perfect scores", true).await.unwrap_err();

    assert!(matches!(err, NlSqlError::ChartSpecInvalid(_)));
    assert_eq!(h.gateway.calls(Stage::Repair), 0);
}

#[tokio::test]
async fn test_classifier_failure_is_server_error() {
    let h = harness(ScriptedGateway::failing_classifier("connection refused"));

    let err = h.orchestrator.handle("how many movies", true).await.unwrap_err();

    assert!(matches!(err, NlSqlError::ClassificationFailure(_)));
    assert!(err.to_string().starts_with("Intent classification failed"));
    assert!(!err.is_client_error());
    assert_eq!(h.gateway.calls(Stage::Generate), 0);
    assert_eq!(h.database.calls(), 0);
}

#[tokio::test]
async fn test_other_intent_is_unroutable() {
    let h = harness(ScriptedGateway::new("other"));

    let err = h.orchestrator.handle("tell me a joke", true).await.unwrap_err();

    match &err {
        NlSqlError::UnroutableIntent { intent, reason } => {
            assert_eq!(intent, "other");
            assert_eq!(reason, "LLM label: other");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(err.is_client_error());
    assert_eq!(h.gateway.calls(Stage::Generate), 0);
}

#[tokio::test]
async fn test_empty_question_is_invalid_request() {
    let h = harness(ScriptedGateway::new("retrieval"));

    let err = h.orchestrator.handle("   ", true).await.unwrap_err();

    assert!(matches!(err, NlSqlError::InvalidRequest(_)));
    assert_eq!(h.gateway.calls(Stage::Classify), 0);
}

#[tokio::test]
async fn test_cache_hit_skips_database() {
    let h = harness(ScriptedGateway::new("retrieval").generate(TOP_RATED));

    let first = h.orchestrator.handle("top rated movies", true).await.unwrap();
    let second = h.orchestrator.handle("best movies by rating", true).await.unwrap();

    assert_eq!(first.rows, second.rows);
    assert_eq!(h.database.calls(), 1);
    assert_eq!(h.orchestrator.cache().map(|c| c.len()), Some(1));
}

#[tokio::test]
async fn test_cache_disabled_always_hits_database() {
    let config = ServiceConfig {
        enable_query_cache: false,
        ..ServiceConfig::default()
    };
    let h = harness_with(ScriptedGateway::new("retrieval").generate(TOP_RATED), config);

    h.orchestrator.handle("top rated movies", true).await.unwrap();
    h.orchestrator.handle("top rated movies", true).await.unwrap();

    assert!(h.orchestrator.cache().is_none());
    assert_eq!(h.database.calls(), 2);
}

#[tokio::test]
async fn test_concurrent_identical_requests_share_one_fetch() {
    let h = harness(ScriptedGateway::new("retrieval").generate(TOP_RATED));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let orchestrator = h.orchestrator.clone();
            tokio::spawn(async move { orchestrator.handle("top rated movies", true).await })
        })
        .collect();

    for handle in handles {
        let response = handle.await.unwrap().unwrap();
        assert_eq!(response.rows.len(), 4);
    }
    assert_eq!(h.database.calls(), 1);
}

#[tokio::test]
async fn test_no_execute_returns_normalized_sql_only() {
    let h = harness(ScriptedGateway::new("retrieval").generate(&format!("{};", TOP_RATED)));

    let response = h.orchestrator.handle("top rated movies", false).await.unwrap();

    assert_eq!(response.sql, format!("{} LIMIT 200", TOP_RATED));
    assert!(response.rows.is_empty());
    assert!(response.figure.is_none());
    assert_eq!(h.database.calls(), 0);
}

#[tokio::test]
async fn test_history_records_success_and_failure() {
    let h = harness(ScriptedGateway::new("retrieval").generate(TOP_RATED));

    h.orchestrator.handle("top rated movies", true).await.unwrap();
    h.orchestrator.handle("", true).await.unwrap_err();

    let history = h.orchestrator.history().recent(10);
    assert_eq!(history.len(), 2);

    assert!(!history[0].success);
    assert!(history[0].error.as_deref().unwrap().starts_with("Invalid request"));

    assert!(history[1].success);
    assert_eq!(history[1].question, "top rated movies");
    assert_eq!(history[1].intent.as_deref(), Some("retrieval"));
    assert_eq!(history[1].rows_returned, 4);
    assert_eq!(history[1].sql.as_deref(), Some(format!("{} LIMIT 200", TOP_RATED).as_str()));
}
