//! Development backend
//!
//! Accepts the gateway's relay requests locally so the whole chain can be
//! run without the hosted endpoint. The raw query string is parsed with the
//! same codec the radio link uses.

use axum::{extract::RawQuery, http::StatusCode, routing::get, Router};
use electrometer::relay::RELAY_PATH;
use electrometer::TelemetryEnvelope;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Build the backend router
pub fn router() -> Router {
    Router::new()
        .route(RELAY_PATH, get(ingest_handler))
        .route("/health", get(health_handler))
}

/// Serve the backend on `addr` until the process stops
pub async fn serve(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Backend listening on http://{}{}", addr, RELAY_PATH);
    axum::serve(listener, router()).await?;
    Ok(())
}

/// Telemetry ingest - parses the query as a telemetry envelope.
async fn ingest_handler(RawQuery(query): RawQuery) -> (StatusCode, String) {
    let query = query.unwrap_or_default();
    match TelemetryEnvelope::parse(&query) {
        Ok(envelope) if envelope.is_empty() => {
            warn!("empty telemetry request");
            (StatusCode::BAD_REQUEST, "no records\n".to_string())
        }
        Ok(envelope) => {
            let device = envelope.get("deviceID").unwrap_or("unknown");
            info!(device, records = envelope.len(), "telemetry: {}", envelope);
            (StatusCode::OK, format!("{} records\n", envelope.len()))
        }
        Err(e) => {
            warn!("rejected telemetry {:?}: {}", query, e);
            (StatusCode::BAD_REQUEST, format!("{}\n", e))
        }
    }
}

/// Health check handler.
async fn health_handler() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn spawn_backend() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router()).await.unwrap();
        });
        addr
    }

    async fn get_raw(addr: SocketAddr, target: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            target
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_accepts_relay_request() {
        let addr = spawn_backend().await;
        let response = get_raw(
            addr,
            "/.netlify/functions/server?deviceID=X1&current=1.0&voltage=230.0",
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 200"), "{response}");
        assert!(response.ends_with("3 records\n"));
    }

    #[tokio::test]
    async fn test_rejects_malformed_query() {
        let addr = spawn_backend().await;
        let response = get_raw(addr, "/.netlify/functions/server?deviceID").await;
        assert!(response.starts_with("HTTP/1.1 400"), "{response}");

        let response = get_raw(addr, "/.netlify/functions/server").await;
        assert!(response.starts_with("HTTP/1.1 400"), "{response}");
    }

    #[tokio::test]
    async fn test_gateway_request_is_accepted() {
        use electrometer::{HttpClient, RelayRequest, TcpHttpClient};

        let addr = spawn_backend().await;
        let envelope =
            TelemetryEnvelope::from_pairs([("deviceID", "X1"), ("current", "0.482")]).unwrap();
        let request = RelayRequest::from_envelope("127.0.0.1", RELAY_PATH, &envelope).unwrap();

        let written = tokio::task::spawn_blocking(move || {
            TcpHttpClient::new(addr.port()).get(&request)
        })
        .await
        .unwrap()
        .unwrap();
        assert!(written > 0);
    }
}
