//! Tests of the `/ws/dashboard` broadcast channel.

mod common;

use std::time::Duration;

use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;

use common::{next_text, spawn_proxy, spawn_server};

fn ps_upstream() -> Router {
    Router::new().route(
        "/api/ps",
        get(|| async { Json(json!({"models": [{"name": "llama3:8b"}]})) }),
    )
}

#[tokio::test]
async fn observers_receive_periodic_snapshots() {
    let (upstream, _h) = spawn_server(ps_upstream());
    let proxy = spawn_proxy(format!("http://{upstream}"));
    proxy.state.broadcaster.spawn(
        proxy.state.store.clone(),
        proxy.state.config.ollama_host.clone(),
    );

    let (mut ws, _) = connect_async(proxy.ws_url("/ws/dashboard"))
        .await
        .expect("connect");

    let frame = timeout(Duration::from_secs(3), next_text(&mut ws))
        .await
        .expect("first snapshot");
    let snapshot: Value = serde_json::from_str(&frame).expect("snapshot json");
    assert!(snapshot["logs"].is_array());
    assert_eq!(snapshot["metrics"]["total_requests"], 0);
    assert_eq!(snapshot["running_model"], "llama3:8b");

    // Liveness: the next tick arrives on the one-second cadence.
    let frame = timeout(Duration::from_secs(2), next_text(&mut ws))
        .await
        .expect("second snapshot");
    assert!(frame.contains("running_model"));
}

#[tokio::test]
async fn offline_upstream_is_labelled() {
    let proxy = spawn_proxy(common::dead_upstream());
    proxy.state.broadcaster.spawn(
        proxy.state.store.clone(),
        proxy.state.config.ollama_host.clone(),
    );

    let (mut ws, _) = connect_async(proxy.ws_url("/ws/dashboard"))
        .await
        .expect("connect");

    let frame = timeout(Duration::from_secs(3), next_text(&mut ws))
        .await
        .expect("snapshot");
    let snapshot: Value = serde_json::from_str(&frame).expect("snapshot json");
    assert_eq!(snapshot["running_model"], "Ollama Offline");
}
