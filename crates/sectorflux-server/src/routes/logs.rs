//! Log inspection routes.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sectorflux_types::LogEntry;
use serde::Serialize;

use crate::state::AppState;

const DEFAULT_LOG_LIMIT: i64 = 50;

pub async fn list(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<LogEntry>>, (StatusCode, String)> {
    let logs = state
        .store
        .get_logs(DEFAULT_LOG_LIMIT)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(logs))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<LogEntry>, (StatusCode, String)> {
    let entry = state
        .store
        .get_log(id)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .ok_or((StatusCode::NOT_FOUND, "Log not found".to_string()))?;
    Ok(Json(entry))
}

#[derive(Serialize)]
pub struct SetStarredResponse {
    pub id: i64,
    pub is_starred: bool,
}

pub async fn set_starred(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    body: String,
) -> Result<Json<SetStarredResponse>, (StatusCode, String)> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(&body) else {
        return Err((StatusCode::BAD_REQUEST, "Invalid JSON".to_string()));
    };
    let Some(starred) = value.get("starred").and_then(|v| v.as_bool()) else {
        return Err((StatusCode::BAD_REQUEST, "Missing 'starred' field".to_string()));
    };

    state
        .store
        .set_starred(id, starred)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(SetStarredResponse {
        id,
        is_starred: starred,
    }))
}
