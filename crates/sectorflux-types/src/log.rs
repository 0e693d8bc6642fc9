//! Logged interaction records.

use serde::{Deserialize, Serialize};

/// One completed proxied interaction, as stored in the `requests` table.
///
/// `duration_ms == 0` is reserved: it marks a row that was served from the
/// response cache rather than forwarded upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Row id, assigned on insert, monotonically increasing.
    pub id: i64,
    /// UTC wall-clock at insert (SQLite `CURRENT_TIMESTAMP` text).
    pub timestamp: String,
    pub method: String,
    /// Upstream path the request targeted (e.g. "/api/generate").
    pub endpoint: String,
    /// Model name from the request JSON, or "unknown".
    pub model: String,
    pub request_body: String,
    pub response_status: u16,
    pub response_body: String,
    /// End-to-end wall time; 0 means served from cache.
    pub duration_ms: i64,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub prompt_eval_duration_ms: i64,
    pub eval_duration_ms: i64,
    /// Time to first upstream byte; measured only for forwarded requests.
    pub ttft_ms: i64,
    pub is_starred: bool,
}

/// A log row without its payloads, for the dashboard feed.
///
/// Bodies are fetched on demand via `/api/logs/{id}`; they never ride the
/// once-per-second snapshot channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSummary {
    pub id: i64,
    pub timestamp: String,
    pub method: String,
    pub endpoint: String,
    pub model: String,
    pub response_status: u16,
    pub duration_ms: i64,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub prompt_eval_duration_ms: i64,
    pub eval_duration_ms: i64,
    pub is_starred: bool,
}

impl From<&LogEntry> for LogSummary {
    fn from(entry: &LogEntry) -> Self {
        Self {
            id: entry.id,
            timestamp: entry.timestamp.clone(),
            method: entry.method.clone(),
            endpoint: entry.endpoint.clone(),
            model: entry.model.clone(),
            response_status: entry.response_status,
            duration_ms: entry.duration_ms,
            prompt_tokens: entry.prompt_tokens,
            completion_tokens: entry.completion_tokens,
            prompt_eval_duration_ms: entry.prompt_eval_duration_ms,
            eval_duration_ms: entry.eval_duration_ms,
            is_starred: entry.is_starred,
        }
    }
}

/// A log row as submitted to the store; `id` and `timestamp` are assigned on
/// insert.
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub method: String,
    pub endpoint: String,
    pub model: String,
    pub request_body: String,
    pub response_status: u16,
    pub response_body: String,
    pub duration_ms: i64,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub prompt_eval_duration_ms: i64,
    pub eval_duration_ms: i64,
    pub ttft_ms: i64,
}
