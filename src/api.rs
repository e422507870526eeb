//! HTTP API
//!
//! Request parsing, routing and response framing for the tokio server in
//! `bin/server.rs`. Kept free of sockets so routes can be tested directly.

use crate::error::NlSqlError;
use crate::execution_loop::QueryOrchestrator;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, error};

const DEFAULT_HISTORY_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl HttpRequest {
    /// Value of `key` in the query string, if present.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.as_deref()?.split('&').find_map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (k == key).then_some(v)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }

    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self::json(status, &json!({ "error": message.into() }))
    }

    pub fn status_text(&self) -> &'static str {
        match self.status {
            200 => "OK",
            204 => "No Content",
            400 => "Bad Request",
            404 => "Not Found",
            405 => "Method Not Allowed",
            _ => "Internal Server Error",
        }
    }

    pub fn to_http_string(&self) -> String {
        format!(
            "HTTP/1.1 {} {}\r\n\
             Content-Type: application/json\r\n\
             Access-Control-Allow-Origin: *\r\n\
             Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
             Access-Control-Allow-Headers: Content-Type\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\
             \r\n\
             {}",
            self.status,
            self.status_text(),
            self.body.len(),
            self.body
        )
    }
}

/// Byte length announced by a `Content-Length` header.
pub fn extract_content_length(head: &str) -> Option<usize> {
    head.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case("content-length")
            .then(|| value.trim().parse().ok())
            .flatten()
    })
}

pub fn parse_request(raw: &str) -> Option<HttpRequest> {
    let (head, body) = raw.split_once("\r\n\r\n").unwrap_or((raw, ""));
    let mut lines = head.lines();

    let mut parts = lines.next()?.split_whitespace();
    let method = parts.next()?.to_uppercase();
    let target = parts.next()?;

    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, Some(query.to_string())),
        None => (target, None),
    };
    // Normalize path (remove trailing slash except for root)
    let mut path = path.trim_end_matches('/').to_string();
    if path.is_empty() {
        path = "/".to_string();
    }

    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
        .collect();

    Some(HttpRequest {
        method,
        path,
        query,
        headers,
        body: body.to_string(),
    })
}

/// Caller mistakes are 400; everything else is 500.
pub fn status_for(err: &NlSqlError) -> u16 {
    if err.is_client_error() {
        400
    } else {
        500
    }
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    question: String,
    #[serde(default = "default_execute")]
    execute: bool,
}

fn default_execute() -> bool {
    true
}

pub async fn handle_request(orchestrator: &QueryOrchestrator, request: &HttpRequest) -> HttpResponse {
    debug!("Request: {} {}", request.method, request.path);

    match (request.method.as_str(), request.path.as_str()) {
        ("OPTIONS", _) => HttpResponse {
            status: 204,
            body: String::new(),
        },
        ("GET", "/api/health") => HttpResponse::json(200, &json!({"status": "ok", "service": "nl2sql"})),
        ("POST", "/api/query") => handle_query(orchestrator, &request.body).await,
        ("GET", "/api/catalog") => {
            let snapshot = orchestrator.catalog().snapshot();
            HttpResponse::json(
                200,
                &json!({
                    "dialect": snapshot.dialect(),
                    "default_schema": snapshot.default_schema(),
                    "objects": snapshot.entries(),
                    "schema_text": snapshot.schema_text(),
                }),
            )
        }
        ("POST", "/api/catalog/refresh") => match orchestrator.catalog().refresh() {
            Ok(snapshot) => HttpResponse::json(
                200,
                &json!({"status": "refreshed", "objects": snapshot.entries().len()}),
            ),
            Err(e) => {
                error!("Catalog refresh failed: {}", e);
                HttpResponse::error(status_for(&e), e.to_string())
            }
        },
        ("GET", "/api/history") => {
            let limit = request
                .query_param("limit")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_HISTORY_LIMIT);
            HttpResponse::json(200, &json!({ "entries": orchestrator.history().recent(limit) }))
        }
        (_, "/api/health" | "/api/query" | "/api/catalog" | "/api/catalog/refresh" | "/api/history") => {
            HttpResponse::error(405, format!("Method {} not allowed", request.method))
        }
        _ => HttpResponse::error(404, format!("No route for {}", request.path)),
    }
}

async fn handle_query(orchestrator: &QueryOrchestrator, body: &str) -> HttpResponse {
    let payload: QueryRequest = match serde_json::from_str(body.trim()) {
        Ok(payload) => payload,
        Err(e) => return HttpResponse::error(400, format!("Invalid request body: {}", e)),
    };

    match orchestrator.handle(&payload.question, payload.execute).await {
        Ok(response) => match serde_json::to_value(&response) {
            Ok(value) => HttpResponse::json(200, &value),
            Err(e) => HttpResponse::error(500, format!("Failed to serialize response: {}", e)),
        },
        Err(e) => {
            let status = status_for(&e);
            if status >= 500 {
                error!("Query failed: {}", e);
            }
            HttpResponse::error(status, e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SqlRejection;

    #[test]
    fn test_parse_request_with_body_and_query() {
        let raw = "POST /api/query/?trace=1 HTTP/1.1\r\nHost: x\r\nContent-Type: application/json\r\nContent-Length: 26\r\n\r\n{\"question\": \"top movies\"}";
        let request = parse_request(raw).unwrap();
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/api/query");
        assert_eq!(request.query_param("trace"), Some("1"));
        assert_eq!(request.headers.get("content-type").unwrap(), "application/json");
        assert_eq!(request.body, "{\"question\": \"top movies\"}");
    }

    #[test]
    fn test_parse_request_rejects_garbage() {
        assert!(parse_request("").is_none());
        assert!(parse_request("GET").is_none());
        assert_eq!(parse_request("GET / HTTP/1.1\r\n\r\n").unwrap().path, "/");
    }

    #[test]
    fn test_content_length() {
        assert_eq!(extract_content_length("POST / HTTP/1.1\r\ncontent-length: 42\r\n"), Some(42));
        assert_eq!(extract_content_length("GET / HTTP/1.1\r\nHost: x\r\n"), None);
    }

    #[test]
    fn test_response_framing() {
        let response = HttpResponse::error(400, "bad");
        let text = response.to_http_string();
        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(text.contains("Content-Length: 15\r\n"));
        assert!(text.ends_with("\r\n\r\n{\"error\":\"bad\"}"));
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(status_for(&NlSqlError::InvalidRequest("x".into())), 400);
        assert_eq!(
            status_for(&NlSqlError::UnroutableIntent {
                intent: "other".into(),
                reason: "LLM label: other".into()
            }),
            400
        );
        assert_eq!(status_for(&NlSqlError::ClassificationFailure("x".into())), 500);
        assert_eq!(status_for(&NlSqlError::SqlRejected(SqlRejection::NotSelect)), 500);
        assert_eq!(status_for(&NlSqlError::ChartSpecInvalid("x".into())), 500);
    }
}
