//! Derived metrics types.

use serde::{Deserialize, Serialize};

/// Aggregate view over the whole log table, computed on demand.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub total_requests: i64,
    /// Mean of `duration_ms` over all rows. Cache hits contribute their 0
    /// sentinel, which pulls the mean down when the hit rate is high.
    pub avg_latency_ms: f64,
    /// Fraction of rows with `duration_ms == 0`; 0 when the table is empty.
    pub cache_hit_rate: f64,
}

/// Token counts and phase durations parsed out of an upstream response body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseTelemetry {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub prompt_eval_duration_ms: i64,
    pub eval_duration_ms: i64,
}
