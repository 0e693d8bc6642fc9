//! Administrative endpoints: metrics, version, cache config, replay, shutdown.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sectorflux_types::AggregateMetrics;
use serde::Serialize;

use crate::state::AppState;

pub async fn metrics(
    State(state): State<Arc<AppState>>,
) -> Result<Json<AggregateMetrics>, (StatusCode, String)> {
    let metrics = state
        .store
        .aggregate_metrics()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(metrics))
}

#[derive(Serialize)]
pub struct VersionResponse {
    pub version: &'static str,
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

pub async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        major: env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0),
        minor: env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0),
        patch: env!("CARGO_PKG_VERSION_PATCH").parse().unwrap_or(0),
    })
}

#[derive(Serialize)]
pub struct CacheConfigResponse {
    pub enabled: bool,
}

pub async fn get_cache_config(State(state): State<Arc<AppState>>) -> Json<CacheConfigResponse> {
    Json(CacheConfigResponse {
        enabled: state.proxy.is_cache_enabled(),
    })
}

pub async fn set_cache_config(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<&'static str, (StatusCode, String)> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(&body) else {
        return Err((StatusCode::BAD_REQUEST, "Invalid JSON".to_string()));
    };
    let Some(enabled) = value.get("enabled").and_then(|v| v.as_bool()) else {
        return Err((StatusCode::BAD_REQUEST, "Missing 'enabled' field".to_string()));
    };

    state.proxy.set_cache_enabled(enabled);
    tracing::info!(target: "sectorflux::api", "Response cache {}", if enabled { "enabled" } else { "disabled" });
    Ok("Cache configuration updated")
}

/// Re-issue a stored request body against its original endpoint. Replays
/// bypass the cache to get a fresh upstream response.
pub async fn replay(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    let entry = match state.store.get_log(id) {
        Ok(Some(entry)) => entry,
        Ok(None) => return (StatusCode::NOT_FOUND, "Log entry not found").into_response(),
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };

    tracing::info!(target: "sectorflux::api", "Replaying log entry {id} against {}", entry.endpoint);
    state
        .proxy
        .forward(Bytes::from(entry.request_body), &entry.endpoint, true)
        .await
}

pub async fn shutdown(State(state): State<Arc<AppState>>) -> (StatusCode, &'static str) {
    tracing::info!(target: "sectorflux::api", "Shutdown requested via API");
    let _ = state.shutdown_tx.try_send(());
    (StatusCode::OK, "Server shutting down")
}
