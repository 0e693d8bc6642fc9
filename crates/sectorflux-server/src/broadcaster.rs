//! Periodic dashboard state fan-out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sectorflux_core::Store;
use sectorflux_types::{DashboardSnapshot, LogSummary};
use tokio::sync::mpsc;

const BROADCAST_INTERVAL: Duration = Duration::from_secs(1);
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(1);
const SNAPSHOT_LOG_ROWS: i64 = 50;

/// Fans a once-per-second state snapshot out to every subscribed dashboard
/// observer.
///
/// Observers are keyed by an id assigned at subscribe time; membership only
/// changes under the observer lock.
pub struct DashboardBroadcaster {
    observers: Mutex<HashMap<u64, mpsc::UnboundedSender<String>>>,
    next_id: AtomicU64,
    client: reqwest::Client,
}

impl DashboardBroadcaster {
    pub fn new() -> reqwest::Result<Self> {
        Ok(Self {
            observers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            client: reqwest::Client::builder()
                .connect_timeout(UPSTREAM_TIMEOUT)
                .timeout(UPSTREAM_TIMEOUT)
                .build()?,
        })
    }

    /// Register an observer; returns its id and the frame stream.
    pub fn subscribe(&self) -> (u64, mpsc::UnboundedReceiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.lock().unwrap().insert(id, tx);
        (id, rx)
    }

    pub fn unsubscribe(&self, id: u64) {
        self.observers.lock().unwrap().remove(&id);
    }

    fn broadcast(&self, frame: &str) {
        let mut observers = self.observers.lock().unwrap();
        observers.retain(|_, tx| tx.send(frame.to_string()).is_ok());
    }

    /// Start the ticker that snapshots the store and upstream status every
    /// second and pushes the result to all observers.
    pub fn spawn(self: &Arc<Self>, store: Arc<Store>, ollama_host: String) -> tokio::task::JoinHandle<()> {
        let broadcaster = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(BROADCAST_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;

                let Ok(logs) = store.get_logs(SNAPSHOT_LOG_ROWS) else {
                    continue;
                };
                let metrics = store.aggregate_metrics().unwrap_or_default();
                let running_model =
                    fetch_running_model(&broadcaster.client, &ollama_host).await;

                let snapshot = DashboardSnapshot {
                    logs: logs.iter().map(LogSummary::from).collect(),
                    metrics,
                    running_model,
                };
                match serde_json::to_string(&snapshot) {
                    Ok(frame) => broadcaster.broadcast(&frame),
                    Err(e) => tracing::error!(
                        target: "sectorflux::broadcast",
                        "Snapshot serialization failed: {e}"
                    ),
                }
            }
        })
    }
}

/// Name of the model currently loaded upstream. "None" when the upstream is
/// idle or returns something unreadable; "Ollama Offline" when it cannot be
/// reached at all.
async fn fetch_running_model(client: &reqwest::Client, ollama_host: &str) -> String {
    let response = match client.get(format!("{ollama_host}/api/ps")).send().await {
        Ok(response) if response.status() == reqwest::StatusCode::OK => response,
        _ => return "Ollama Offline".to_string(),
    };

    match response.json::<serde_json::Value>().await {
        Ok(value) => running_model_from_ps(&value),
        Err(_) => "None".to_string(),
    }
}

fn running_model_from_ps(value: &serde_json::Value) -> String {
    value
        .get("models")
        .and_then(|models| models.get(0))
        .and_then(|model| model.get("name"))
        .and_then(|name| name.as_str())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "None".to_string())
}
