//! Endpoints proxied to the upstream daemon.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;

use crate::proxy::NO_CACHE_HEADER;
use crate::state::AppState;

pub async fn generate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state
        .proxy
        .forward(body, "/api/generate", bypass_requested(&headers))
        .await
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state
        .proxy
        .forward(body, "/api/chat", bypass_requested(&headers))
        .await
}

pub async fn tags(State(state): State<Arc<AppState>>) -> Response {
    state.proxy.forward_get("/api/tags").await
}

pub async fn ps(State(state): State<Arc<AppState>>) -> Response {
    state.proxy.forward_get("/api/ps").await
}

fn bypass_requested(headers: &HeaderMap) -> bool {
    headers
        .get(NO_CACHE_HEADER)
        .and_then(|value| value.to_str().ok())
        == Some("true")
}
