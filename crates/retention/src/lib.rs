//! Message retention: discover messages in monitored channels, give each an
//! expiry, and delete expired ones in rate-limited batches.
//!
//! Two timer-driven components cooperate:
//! - [`watcher::Watcher`] resolves channels at startup and feeds messages in,
//!   both from live notifications and from a backward crawl of history.
//! - [`scheduler::PurgeScheduler`] owns the pending and in-flight sets and
//!   issues deletes, widening its tick interval when deletes back up.

pub mod engine;
pub mod error;
pub mod queue;
pub mod scheduler;
pub mod settings;
pub mod types;
pub mod watcher;

pub use {
    engine::RetentionEngine,
    error::{Error, Result},
    queue::{PurgeQueue, TickPlan},
    scheduler::PurgeScheduler,
    settings::{PurgeSettings, WatcherSettings},
    types::{DeleteOutcome, PollSummary, PurgeStats, PurgeStatus, QueueEntry},
    watcher::Watcher,
};
