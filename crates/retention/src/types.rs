//! Core data types for the retention engine.

use {
    ebb_channels::TrackedMessage,
    serde::{Deserialize, Serialize},
};

/// A tracked message and the time it becomes eligible for deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub message: TrackedMessage,
    /// Epoch millis: `created_at_ms + lifetime`.
    pub due_at_ms: u64,
}

impl QueueEntry {
    #[must_use]
    pub fn is_due(&self, now_ms: u64) -> bool {
        self.due_at_ms <= now_ms
    }
}

/// How a delete request resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// Transport error or timeout. The entry is dropped, never retried.
    Failed(String),
}

/// Process-lifetime counters. Never reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeStats {
    pub deleted_count: u64,
    pub delete_attempted_count: u64,
    pub error_count: u64,
}

/// Snapshot of the purge scheduler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeStatus {
    pub running: bool,
    pub pending: usize,
    pub in_flight: usize,
    pub tick_interval_ms: u64,
    pub stats: PurgeStats,
}

/// Result of one history poll across every monitored channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// Messages returned by the transport.
    pub fetched: usize,
    /// Of those, how many were new to the pending queue.
    pub submitted: usize,
    /// Channels whose fetch failed or timed out this round.
    pub failed_channels: usize,
}
