//! Request forwarding to the upstream daemon.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::http::{header, StatusCode};
use axum::response::Response;
use futures::StreamExt;
use sectorflux_core::{telemetry, Store};
use sectorflux_types::NewLogEntry;
use tokio::sync::mpsc;

/// Request header that bypasses cache lookup and cache fill for one call.
pub const NO_CACHE_HEADER: &str = "X-SectorFlux-No-Cache";
/// Response header added to every proxied POST: `HIT` or `MISS`.
pub const CACHE_STATUS_HEADER: &str = "X-SectorFlux-Cache";

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(60);
const INFO_TIMEOUT: Duration = Duration::from_secs(5);
const CHAT_TIMEOUT: Duration = Duration::from_secs(300);

/// Forwards generation and chat requests to the upstream daemon, streaming
/// responses through while measuring TTFT and recording telemetry.
///
/// The cache toggle is process-wide and visible to every request thread.
pub struct ProxyEngine {
    store: Arc<Store>,
    ollama_host: String,
    client: reqwest::Client,
    info_client: reqwest::Client,
    chat_client: reqwest::Client,
    cache_enabled: AtomicBool,
}

impl ProxyEngine {
    pub fn new(store: Arc<Store>, ollama_host: String) -> reqwest::Result<Self> {
        Ok(Self {
            store,
            ollama_host,
            client: reqwest::Client::builder()
                .connect_timeout(UPSTREAM_TIMEOUT)
                .read_timeout(UPSTREAM_TIMEOUT)
                .build()?,
            info_client: reqwest::Client::builder()
                .connect_timeout(INFO_TIMEOUT)
                .timeout(INFO_TIMEOUT)
                .build()?,
            chat_client: reqwest::Client::builder()
                .connect_timeout(CHAT_TIMEOUT)
                .read_timeout(CHAT_TIMEOUT)
                .build()?,
            cache_enabled: AtomicBool::new(true),
        })
    }

    pub fn set_cache_enabled(&self, enabled: bool) {
        self.cache_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_cache_enabled(&self) -> bool {
        self.cache_enabled.load(Ordering::Relaxed)
    }

    /// Long-timeout client for WebSocket chat turns.
    pub fn chat_client(&self) -> &reqwest::Client {
        &self.chat_client
    }

    pub fn ollama_host(&self) -> &str {
        &self.ollama_host
    }

    /// Forward a proxied POST to the upstream, streaming the response back.
    ///
    /// The body is captured into an owned string up front; the streaming path
    /// only ever sees that copy.
    pub async fn forward(&self, request_body: Bytes, target_path: &str, no_cache: bool) -> Response {
        let start = Instant::now();
        let request_body = String::from_utf8_lossy(&request_body).into_owned();
        let model = model_from_request(&request_body);

        let use_cache = self.is_cache_enabled() && !no_cache;

        if use_cache {
            if let Some((status, cached)) = self.store.cache_lookup(&request_body) {
                tracing::info!(target: "sectorflux::proxy", "Cache hit for {target_path}");
                let t = telemetry::extract(&cached);
                self.store.submit_log(NewLogEntry {
                    method: "POST".to_string(),
                    endpoint: target_path.to_string(),
                    model,
                    request_body,
                    response_status: status,
                    response_body: cached.clone(),
                    // 0 is the cache-hit sentinel
                    duration_ms: 0,
                    prompt_tokens: t.prompt_tokens,
                    completion_tokens: t.completion_tokens,
                    prompt_eval_duration_ms: 0,
                    eval_duration_ms: 0,
                    ttft_ms: 0,
                });
                let status = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
                return proxied_response(status, "HIT", Body::from(cached));
            }
        }

        tracing::info!(
            target: "sectorflux::proxy",
            "Forwarding request to {}{}",
            self.ollama_host,
            target_path
        );

        let result = self
            .client
            .post(format!("{}{}", self.ollama_host, target_path))
            .header(header::CONTENT_TYPE, "application/json")
            .body(request_body.clone())
            .send()
            .await;

        let upstream = match result {
            Ok(upstream) => upstream,
            Err(e) => {
                let message = format!("Error forwarding request to Ollama: {e}");
                tracing::warn!(target: "sectorflux::proxy", "{message}");
                self.store.submit_log(NewLogEntry {
                    method: "POST".to_string(),
                    endpoint: target_path.to_string(),
                    model,
                    request_body,
                    response_status: 500,
                    response_body: message.clone(),
                    duration_ms: elapsed_ms(start).max(1),
                    prompt_tokens: 0,
                    completion_tokens: 0,
                    prompt_eval_duration_ms: 0,
                    eval_duration_ms: 0,
                    ttft_ms: 0,
                });
                return proxied_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "MISS",
                    Body::from(message),
                );
            }
        };

        let status = upstream.status();
        let (tx, rx) = mpsc::channel::<Bytes>(16);
        let store = self.store.clone();
        let endpoint = target_path.to_string();

        // The relay task owns the upstream read so the log entry and cache
        // fill happen after the stream terminates, whether or not the client
        // stayed for the whole body.
        tokio::spawn(async move {
            let mut stream = upstream.bytes_stream();
            let mut accumulated = String::new();
            let mut ttft_ms: Option<i64> = None;
            let mut client_gone = false;

            while let Some(item) = stream.next().await {
                match item {
                    Ok(chunk) => {
                        if ttft_ms.is_none() {
                            ttft_ms = Some(elapsed_ms(start));
                        }
                        accumulated.push_str(&String::from_utf8_lossy(&chunk));
                        if !client_gone && tx.send(chunk).await.is_err() {
                            // Client went away; keep reading so the
                            // interaction is still logged and cached.
                            client_gone = true;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            target: "sectorflux::proxy",
                            "Upstream stream error on {endpoint}: {e}"
                        );
                        break;
                    }
                }
            }

            if use_cache && status == StatusCode::OK && !accumulated.is_empty() {
                store.cache_put(request_body.clone(), 200, accumulated.clone());
            }

            let t = telemetry::extract(&accumulated);
            store.submit_log(NewLogEntry {
                method: "POST".to_string(),
                endpoint,
                model,
                request_body,
                response_status: status.as_u16(),
                response_body: accumulated,
                // Clamp away from the cache-hit sentinel on sub-ms forwards.
                duration_ms: elapsed_ms(start).max(1),
                prompt_tokens: t.prompt_tokens,
                completion_tokens: t.completion_tokens,
                prompt_eval_duration_ms: t.prompt_eval_duration_ms,
                eval_duration_ms: t.eval_duration_ms,
                ttft_ms: ttft_ms.unwrap_or(0),
            });
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv()
                .await
                .map(|chunk| (Ok::<_, std::convert::Infallible>(chunk), rx))
        });
        proxied_response(status, "MISS", Body::from_stream(stream))
    }

    /// Proxy a read-only upstream endpoint (`/api/tags`, `/api/ps`).
    pub async fn forward_get(&self, target_path: &str) -> Response {
        let result = self
            .info_client
            .get(format!("{}{}", self.ollama_host, target_path))
            .send()
            .await;

        match result {
            Ok(upstream) if upstream.status() == StatusCode::OK => match upstream.text().await {
                Ok(body) => Response::builder()
                    .status(StatusCode::OK)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap(),
                Err(_) => fetch_failed(),
            },
            _ => fetch_failed(),
        }
    }
}

fn fetch_failed() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .body(Body::from("Failed to fetch from Ollama"))
        .unwrap()
}

fn proxied_response(status: StatusCode, cache_status: &'static str, body: Body) -> Response {
    Response::builder()
        .status(status)
        .header(CACHE_STATUS_HEADER, cache_status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .unwrap()
}

pub(crate) fn elapsed_ms(start: Instant) -> i64 {
    start.elapsed().as_millis() as i64
}

/// Model name from the request JSON, "unknown" when absent or unparsable.
pub(crate) fn model_from_request(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("model").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_extraction() {
        assert_eq!(model_from_request(r#"{"model":"llama3","prompt":"hi"}"#), "llama3");
        assert_eq!(model_from_request(r#"{"prompt":"hi"}"#), "unknown");
        assert_eq!(model_from_request(r#"{"model":7}"#), "unknown");
        assert_eq!(model_from_request("not json"), "unknown");
        assert_eq!(model_from_request(""), "unknown");
    }
}
