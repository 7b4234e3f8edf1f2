//! Metric name constants, grouped by subsystem.

/// Purge scheduler metrics
pub mod purge {
    /// Entries waiting for their due date or for a delete slot
    pub const PENDING: &str = "ebb_purge_pending";
    /// Deletes issued but not yet resolved
    pub const IN_FLIGHT: &str = "ebb_purge_in_flight";
    /// Current tick interval in seconds
    pub const TICK_INTERVAL_SECONDS: &str = "ebb_purge_tick_interval_seconds";
    /// Delete requests issued
    pub const DELETE_ATTEMPTS_TOTAL: &str = "ebb_purge_delete_attempts_total";
    /// Delete requests that succeeded
    pub const DELETES_TOTAL: &str = "ebb_purge_deletes_total";
    /// Delete requests that failed or timed out
    pub const ERRORS_TOTAL: &str = "ebb_purge_errors_total";
    /// Ticks skipped because the previous batch was still outstanding
    pub const BACKLOG_BACKOFFS_TOTAL: &str = "ebb_purge_backlog_backoffs_total";
    /// Delete round-trip duration in seconds
    pub const DELETE_DURATION_SECONDS: &str = "ebb_purge_delete_duration_seconds";
}

/// Channel watcher metrics
pub mod watcher {
    /// Messages submitted from live notifications
    pub const PUSHED_TOTAL: &str = "ebb_watcher_pushed_total";
    /// Messages returned by history polls
    pub const POLLED_TOTAL: &str = "ebb_watcher_polled_total";
    /// History fetches that failed or timed out
    pub const FETCH_ERRORS_TOTAL: &str = "ebb_watcher_fetch_errors_total";
    /// Channels currently monitored
    pub const MONITORED_CHANNELS: &str = "ebb_watcher_monitored_channels";
}

/// Histogram buckets, in seconds
pub mod buckets {
    /// Discord REST round trips: mostly sub-second, with a rate-limit tail
    pub const DELETE_DURATION: &[f64] = &[
        0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
    ];
}
