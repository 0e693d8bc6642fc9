//! Per-connection chat sessions over `/ws/chat`.
//!
//! Each connection accepts one JSON turn per text frame and forwards it to the
//! upstream `/api/chat` with streaming forced on, relaying chunks back as text
//! frames. The session's `active` flag is checked at every chunk boundary, so
//! closing the socket aborts the upstream read cooperatively.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use sectorflux_core::telemetry;
use sectorflux_types::{ChatTurn, ErrorFrame, NewLogEntry};
use tokio::sync::mpsc;

use crate::proxy::elapsed_ms;
use crate::state::AppState;

pub async fn handle_chat_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let active = Arc::new(AtomicBool::new(true));

    // Worker frames funnel through one channel so the socket sink has a
    // single writer.
    let (out_tx, mut out_rx) = mpsc::channel::<String>(32);
    let send_task = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    tracing::info!(target: "sectorflux::chat", "Chat client connected");

    let mut worker: Option<tokio::task::JoinHandle<()>> = None;

    while let Some(Ok(msg)) = ws_rx.next().await {
        match msg {
            Message::Text(text) => {
                if worker.as_ref().is_some_and(|w| !w.is_finished()) {
                    let _ = out_tx
                        .send(ErrorFrame::text("A request is already in progress"))
                        .await;
                    continue;
                }
                active.store(true, Ordering::SeqCst);
                let state = state.clone();
                let active = active.clone();
                let out = out_tx.clone();
                worker = Some(tokio::spawn(async move {
                    run_chat_turn(state, text.to_string(), active, out).await;
                }));
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    // Socket is gone: any in-flight forward aborts at its next chunk.
    active.store(false, Ordering::SeqCst);
    send_task.abort();
    tracing::info!(target: "sectorflux::chat", "Chat client disconnected");
}

/// Forward one chat turn upstream and stream the reply back to the client.
async fn run_chat_turn(
    state: Arc<AppState>,
    message: String,
    active: Arc<AtomicBool>,
    out: mpsc::Sender<String>,
) {
    let Ok(turn) = serde_json::from_str::<ChatTurn>(&message) else {
        let _ = out.send(ErrorFrame::text("Invalid JSON")).await;
        return;
    };
    let model = turn.model.clone().unwrap_or_else(|| "unknown".to_string());

    // Chat turns are cached under the raw inbound frame, not the body that
    // goes upstream.
    if state.proxy.is_cache_enabled() {
        if let Some((status, cached)) = state.store.cache_lookup(&message) {
            tracing::info!(target: "sectorflux::chat", "Cache hit for chat turn");
            let _ = out.send(cached.clone()).await;
            let t = telemetry::extract(&cached);
            state.store.submit_log(NewLogEntry {
                method: "POST".to_string(),
                endpoint: "/api/chat".to_string(),
                model,
                request_body: message,
                response_status: status,
                response_body: cached,
                duration_ms: 0,
                prompt_tokens: t.prompt_tokens,
                completion_tokens: t.completion_tokens,
                prompt_eval_duration_ms: 0,
                eval_duration_ms: 0,
                ttft_ms: 0,
            });
            return;
        }
    }

    let start = Instant::now();
    let body = serde_json::json!({
        "model": model,
        "messages": turn.messages.unwrap_or(serde_json::Value::Null),
        "stream": true,
    });

    let result = state
        .proxy
        .chat_client()
        .post(format!("{}/api/chat", state.proxy.ollama_host()))
        .json(&body)
        .send()
        .await;

    let upstream = match result {
        Ok(upstream) => upstream,
        Err(e) => {
            tracing::warn!(target: "sectorflux::chat", "Chat upstream request failed: {e}");
            if active.load(Ordering::SeqCst) {
                let _ = out.send(ErrorFrame::text("Failed to connect to Ollama")).await;
            }
            return;
        }
    };

    let status = upstream.status();
    let mut stream = upstream.bytes_stream();
    let mut accumulated = String::new();
    let mut ttft_ms: Option<i64> = None;
    let mut stream_failed = false;

    while let Some(item) = stream.next().await {
        let chunk = match item {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(target: "sectorflux::chat", "Chat stream error: {e}");
                stream_failed = true;
                break;
            }
        };

        if ttft_ms.is_none() {
            ttft_ms = Some(elapsed_ms(start));
        }

        // Dropping the stream here closes the upstream connection.
        if !active.load(Ordering::SeqCst) {
            tracing::debug!(target: "sectorflux::chat", "Chat turn aborted by socket close");
            return;
        }

        let text = String::from_utf8_lossy(&chunk).into_owned();
        accumulated.push_str(&text);
        if out.send(text).await.is_err() {
            return;
        }
    }

    if !active.load(Ordering::SeqCst) {
        return;
    }

    if stream_failed || status != reqwest::StatusCode::OK {
        let _ = out.send(ErrorFrame::text("Failed to connect to Ollama")).await;
        return;
    }

    let t = telemetry::extract(&accumulated);
    state.store.submit_log(NewLogEntry {
        method: "POST".to_string(),
        endpoint: "/api/chat".to_string(),
        model,
        request_body: message.clone(),
        response_status: 200,
        response_body: accumulated.clone(),
        duration_ms: elapsed_ms(start).max(1),
        prompt_tokens: t.prompt_tokens,
        completion_tokens: t.completion_tokens,
        prompt_eval_duration_ms: t.prompt_eval_duration_ms,
        eval_duration_ms: t.eval_duration_ms,
        ttft_ms: ttft_ms.unwrap_or(0),
    });

    if state.proxy.is_cache_enabled() && !accumulated.is_empty() {
        state.store.cache_put(message, 200, accumulated);
    }
}
