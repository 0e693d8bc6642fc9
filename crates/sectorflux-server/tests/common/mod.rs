//! Shared harness for integration tests: fake upstream servers and a fully
//! wired proxy instance.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tempfile::TempDir;
use tokio::sync::mpsc;

use sectorflux_server::config::Config;
use sectorflux_server::routes;
use sectorflux_server::state::AppState;

pub const NDJSON_SUMMARY: &str = "{\"done\":true,\"prompt_eval_count\":5,\"eval_count\":7,\
\"prompt_eval_duration\":200000000,\"eval_duration\":400000000}";

pub const GENERATE_BODY: &str = r#"{"model":"llama3","prompt":"hi"}"#;

pub fn ndjson_fixture() -> String {
    format!(
        "{}\n{}\n{}\n{}\n",
        r#"{"model":"llama3","response":"Hel","done":false}"#,
        r#"{"model":"llama3","response":"lo","done":false}"#,
        r#"{"model":"llama3","response":"!","done":false}"#,
        NDJSON_SUMMARY,
    )
}

pub fn spawn_server(app: Router) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    listener.set_nonblocking(true).expect("nonblocking");
    let listener = tokio::net::TcpListener::from_std(listener).expect("to tokio listener");
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (addr, handle)
}

pub struct TestProxy {
    pub addr: SocketAddr,
    pub state: Arc<AppState>,
    _db_dir: TempDir,
    _server: tokio::task::JoinHandle<()>,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    /// Wait for background relay tasks to queue their writes, then flush the
    /// store writer.
    pub async fn drain(&self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.state.store.flush().await;
    }
}

/// Spawn a proxy on an ephemeral port backed by a temp-dir store, pointed at
/// `ollama_host`.
pub fn spawn_proxy(ollama_host: String) -> TestProxy {
    let db_dir = TempDir::new().expect("tempdir");
    let config = Config {
        ollama_host,
        port: 0,
        db_path: db_dir.path().join("test.db"),
    };
    let (shutdown_tx, _shutdown_rx) = mpsc::channel(1);
    let state = Arc::new(AppState::new(config, shutdown_tx).expect("app state"));
    let (addr, server) = spawn_server(routes::router(state.clone()));

    TestProxy {
        addr,
        state,
        _db_dir: db_dir,
        _server: server,
    }
}

/// Top row of `/api/logs`, parsed.
pub async fn top_log(proxy: &TestProxy) -> serde_json::Value {
    let logs: serde_json::Value = reqwest::get(proxy.url("/api/logs"))
        .await
        .expect("get logs")
        .json()
        .await
        .expect("logs json");
    logs.as_array().expect("logs array")[0].clone()
}

pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Next text frame from a client websocket; panics if the socket closes first.
pub async fn next_text(ws: &mut WsStream) -> String {
    use futures::StreamExt;
    while let Some(msg) = ws.next().await {
        if let Ok(tokio_tungstenite::tungstenite::Message::Text(text)) = msg {
            return text.to_string();
        }
    }
    panic!("websocket closed before a text frame arrived");
}

/// An upstream host nothing is listening on.
pub fn dead_upstream() -> String {
    // Bind and immediately drop to find a port that is closed right now.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    drop(listener);
    format!("http://{addr}")
}
