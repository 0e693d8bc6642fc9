//! WebSocket wire types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AggregateMetrics, LogSummary};

/// One chat turn sent by the client over `/ws/chat`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatTurn {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub messages: Option<Value>,
}

/// The state pushed to every dashboard observer once per second.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub logs: Vec<LogSummary>,
    pub metrics: AggregateMetrics,
    /// Name of the model currently loaded upstream, "None" when idle, or
    /// "Ollama Offline" when the upstream cannot be reached.
    pub running_model: String,
}

/// Error frame sent to a chat client in place of stream chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorFrame {
    pub error: String,
}

impl ErrorFrame {
    pub fn text(error: &str) -> String {
        serde_json::to_string(&Self {
            error: error.to_string(),
        })
        .unwrap_or_else(|_| format!("{{\"error\": \"{error}\"}}"))
    }
}
