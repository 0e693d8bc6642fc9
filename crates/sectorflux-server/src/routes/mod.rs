//! HTTP route handlers and the route table.

pub mod admin;
pub mod assets;
pub mod logs;
pub mod proxy;
pub mod ws;

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full route table.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Proxied to the upstream daemon
        .route("/api/generate", post(proxy::generate))
        .route("/api/chat", post(proxy::chat))
        .route("/api/tags", get(proxy::tags))
        .route("/api/ps", get(proxy::ps))
        // Administrative
        .route("/api/logs", get(logs::list))
        .route("/api/logs/{id}", get(logs::get))
        .route("/api/logs/{id}/starred", put(logs::set_starred))
        .route("/api/metrics", get(admin::metrics))
        .route("/api/version", get(admin::version))
        .route(
            "/api/config/cache",
            get(admin::get_cache_config).post(admin::set_cache_config),
        )
        .route("/api/replay/{id}", post(admin::replay))
        .route("/api/shutdown", post(admin::shutdown))
        // WebSockets
        .route("/ws/chat", get(ws::chat_upgrade))
        .route("/ws/dashboard", get(ws::dashboard_upgrade))
        // Embedded UI
        .route("/", get(assets::index))
        .route("/style.css", get(assets::stylesheet))
        .route("/app.js", get(assets::app_js))
        .route("/api.js", get(assets::api_js))
        .route("/favicon.ico", get(assets::favicon))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
