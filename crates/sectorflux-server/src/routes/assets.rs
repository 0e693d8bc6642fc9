//! Embedded dashboard UI, compiled into the binary.

use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse};

pub async fn index() -> Html<&'static str> {
    Html(include_str!("../../ui/index.html"))
}

pub async fn stylesheet() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/css")],
        include_str!("../../ui/style.css"),
    )
}

pub async fn app_js() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        include_str!("../../ui/app.js"),
    )
}

pub async fn api_js() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        include_str!("../../ui/api.js"),
    )
}

pub async fn favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}
