//! HTTP server for the NL-to-SQL service
//! Simple HTTP server using tokio and basic HTTP handling

use nl2sql::api::{extract_content_length, handle_request, parse_request, HttpResponse};
use nl2sql::bootstrap::bootstrap;
use nl2sql::config::ServiceConfig;
use nl2sql::execution_loop::QueryOrchestrator;
use nl2sql::observability::init_tracing;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Duration};
use tracing::{error, info, warn};

const MAX_REQUEST_BYTES: usize = 1_000_000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();
    init_tracing();

    let config = ServiceConfig::from_env()?;
    let bind_addr = config.bind_addr.clone();
    let state = bootstrap(config).await?;
    info!(
        "Catalog loaded with {} objects",
        state.catalog.snapshot().entries().len()
    );

    let listener = TcpListener::bind(&bind_addr).await?;
    info!("Server listening on http://{}", bind_addr);

    loop {
        let (stream, addr) = listener.accept().await?;
        info!("New connection from: {}", addr);
        tokio::spawn(handle_connection(stream, Arc::clone(&state.orchestrator)));
    }
}

/// Read until the headers and the announced body have arrived.
async fn read_request(stream: &mut TcpStream) -> std::io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut temp_buf = [0; 8192];

    loop {
        let n = stream.read(&mut temp_buf).await?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&temp_buf[..n]);

        if let Some(headers_end) = find_headers_end(&buffer) {
            let head = String::from_utf8_lossy(&buffer[..headers_end]);
            match extract_content_length(&head) {
                Some(content_length) if buffer.len() < headers_end + content_length => {}
                _ => break,
            }
        }
        // If buffer is getting too large, break to prevent memory issues
        if buffer.len() > MAX_REQUEST_BYTES {
            break;
        }
    }
    Ok(buffer)
}

fn find_headers_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

async fn handle_connection(mut stream: TcpStream, orchestrator: Arc<QueryOrchestrator>) {
    // Read request with timeout to prevent hanging
    let buffer = match timeout(Duration::from_secs(5), read_request(&mut stream)).await {
        Ok(Ok(buffer)) => buffer,
        Ok(Err(e)) => {
            error!("Failed to read from stream: {}", e);
            return;
        }
        Err(_) => {
            warn!("Request read timeout");
            return;
        }
    };
    if buffer.is_empty() {
        return;
    }

    let response = match String::from_utf8(buffer) {
        Ok(raw) => match parse_request(&raw) {
            Some(request) => handle_request(&orchestrator, &request).await,
            None => HttpResponse::error(400, "Malformed HTTP request"),
        },
        Err(e) => HttpResponse::error(400, format!("Request is not valid UTF-8: {}", e)),
    };

    if let Err(e) = stream.write_all(response.to_http_string().as_bytes()).await {
        error!("Failed to write response: {}", e);
    }
}
