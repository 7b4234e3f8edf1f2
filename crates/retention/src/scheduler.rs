//! Purge scheduler: timer loop, batch dispatch, delete completion.

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use {
    ebb_channels::{ChannelHistory, ChannelId, Error as ChannelError, TrackedMessage},
    ebb_common::now_ms,
    tokio::{
        sync::{Mutex as AsyncMutex, Notify, RwLock},
        task::JoinHandle,
    },
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use ebb_metrics::{counter, gauge, histogram, purge as purge_metrics};

use crate::{
    queue::{PurgeQueue, TickPlan},
    settings::PurgeSettings,
    types::{DeleteOutcome, PurgeStats, PurgeStatus, QueueEntry},
};

/// Drains the pending queue through rate-limited delete requests.
///
/// The scheduler is the only owner of the pending and in-flight sets; the
/// watcher reaches them through [`PurgeScheduler::submit`] and
/// [`PurgeScheduler::oldest_pending`]. The queue sits behind a std mutex
/// that is never held across an `.await`, so `submit` never waits on I/O.
pub struct PurgeScheduler {
    history: Arc<dyn ChannelHistory>,
    queue: Mutex<PurgeQueue>,
    delete_timeout: Duration,
    timer_handle: AsyncMutex<Option<JoinHandle<()>>>,
    wake_notify: Arc<Notify>,
    running: RwLock<bool>,
}

impl PurgeScheduler {
    pub fn new(history: Arc<dyn ChannelHistory>, settings: &PurgeSettings) -> Arc<Self> {
        Arc::new(Self {
            history,
            queue: Mutex::new(PurgeQueue::new(settings)),
            delete_timeout: settings.delete_timeout,
            timer_handle: AsyncMutex::new(None),
            wake_notify: Arc::new(Notify::new()),
            running: RwLock::new(false),
        })
    }

    fn queue(&self) -> MutexGuard<'_, PurgeQueue> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Track a message until `due_at_ms`. Idempotent per message id: a
    /// repeat submission keeps the first due time and returns `false`.
    pub fn submit(&self, message: TrackedMessage, due_at_ms: u64) -> bool {
        let inserted = self.queue().submit(message, due_at_ms);
        #[cfg(feature = "metrics")]
        {
            if inserted {
                gauge!(purge_metrics::PENDING).increment(1.0);
            }
        }
        inserted
    }

    /// The earliest-created message still tracked.
    pub fn oldest_pending(&self) -> Option<TrackedMessage> {
        self.queue().oldest_pending().cloned()
    }

    /// The earliest-created message still tracked for `channel`.
    pub fn oldest_pending_in(&self, channel: &ChannelId) -> Option<TrackedMessage> {
        self.queue().oldest_pending_in(channel).cloned()
    }

    pub fn stats(&self) -> PurgeStats {
        self.queue().stats()
    }

    pub async fn status(&self) -> PurgeStatus {
        let running = *self.running.read().await;
        let queue = self.queue();
        PurgeStatus {
            running,
            pending: queue.pending_len(),
            in_flight: queue.in_flight_len(),
            tick_interval_ms: queue.tick_interval().as_millis() as u64,
            stats: queue.stats(),
        }
    }

    /// Start the timer loop. The first tick fires one interval from now.
    pub async fn start(self: &Arc<Self>) {
        let mut handle = self.timer_handle.lock().await;
        if handle.is_some() {
            debug!("purge scheduler already running");
            return;
        }
        *self.running.write().await = true;

        let svc = Arc::clone(self);
        *handle = Some(tokio::spawn(async move {
            svc.timer_loop().await;
        }));

        info!(
            tick_interval_ms = self.queue().tick_interval().as_millis() as u64,
            "purge scheduler started"
        );
    }

    /// Stop the timer loop. Outstanding deletes still resolve.
    pub async fn stop(&self) {
        *self.running.write().await = false;
        self.wake_notify.notify_waiters();

        let mut handle = self.timer_handle.lock().await;
        if let Some(h) = handle.take() {
            h.abort();
        }
        let stats = self.stats();
        info!(
            deleted = stats.deleted_count,
            attempted = stats.delete_attempted_count,
            errors = stats.error_count,
            "purge scheduler stopped"
        );
    }

    /// Run one tick against the wall clock. Returns the delay until the next.
    pub fn tick(self: &Arc<Self>) -> Duration {
        self.tick_at(now_ms())
    }

    /// Run one tick as if the time were `now_ms`.
    ///
    /// Selected entries are deleted on spawned tasks; their outcomes land
    /// later through [`PurgeScheduler::complete`]. Must be called from
    /// within a Tokio runtime.
    pub fn tick_at(self: &Arc<Self>, now_ms: u64) -> Duration {
        let plan = self.queue().tick(now_ms);

        match plan {
            TickPlan::Backlog {
                in_flight,
                previous_interval,
                tick_interval,
                recheck_in,
            } => {
                warn!(
                    in_flight,
                    previous_interval_ms = previous_interval.as_millis() as u64,
                    tick_interval_ms = tick_interval.as_millis() as u64,
                    recheck_in_ms = recheck_in.as_millis() as u64,
                    "deletes backing up, widening purge interval"
                );
                #[cfg(feature = "metrics")]
                {
                    counter!(purge_metrics::BACKLOG_BACKOFFS_TOTAL).increment(1);
                    gauge!(purge_metrics::TICK_INTERVAL_SECONDS).set(tick_interval.as_secs_f64());
                }
                recheck_in
            },
            TickPlan::Dispatch { batch, next_tick } => {
                if !batch.is_empty() {
                    debug!(count = batch.len(), "dispatching purge batch");
                    #[cfg(feature = "metrics")]
                    {
                        counter!(purge_metrics::DELETE_ATTEMPTS_TOTAL)
                            .increment(batch.len() as u64);
                        gauge!(purge_metrics::IN_FLIGHT).set(batch.len() as f64);
                    }
                }
                for entry in batch {
                    self.spawn_delete(entry);
                }
                next_tick
            },
        }
    }

    /// Record the outcome of an in-flight delete.
    pub fn complete(&self, entry: &QueueEntry, outcome: DeleteOutcome) {
        let id = &entry.message.id;
        let mut queue = self.queue();
        if queue.complete(id, &outcome).is_none() {
            debug!(message_id = %id, "ignoring completion for message not in flight");
            return;
        }

        if let DeleteOutcome::Failed(reason) = &outcome {
            warn!(
                message_id = %id,
                channel = %entry.message.channel_id,
                error = %reason,
                "failed to delete expired message, dropping it"
            );
        }

        #[cfg(feature = "metrics")]
        {
            match outcome {
                DeleteOutcome::Deleted => counter!(purge_metrics::DELETES_TOTAL).increment(1),
                DeleteOutcome::Failed(_) => counter!(purge_metrics::ERRORS_TOTAL).increment(1),
            }
            gauge!(purge_metrics::PENDING).set(queue.pending_len() as f64);
            gauge!(purge_metrics::IN_FLIGHT).set(queue.in_flight_len() as f64);
        }

        if queue.in_flight_len() == 0 {
            debug!(pending = queue.pending_len(), "purge batch settled");
        }
    }

    // ── Internal ────────────────────────────────────────────────────────

    async fn timer_loop(self: &Arc<Self>) {
        let mut delay = self.queue().tick_interval();
        loop {
            let notify = Arc::clone(&self.wake_notify);
            tokio::select! {
                () = tokio::time::sleep(delay) => {},
                () = notify.notified() => {
                    debug!("purge timer woken by notify");
                },
            }

            if !*self.running.read().await {
                break;
            }

            delay = self.tick();
        }
    }

    fn spawn_delete(self: &Arc<Self>, entry: QueueEntry) {
        let svc = Arc::clone(self);
        tokio::spawn(async move {
            let started = Instant::now();
            let outcome = match tokio::time::timeout(
                svc.delete_timeout,
                svc.history
                    .delete_message(&entry.message.channel_id, &entry.message.id),
            )
            .await
            {
                Ok(Ok(())) => DeleteOutcome::Deleted,
                Ok(Err(e)) => DeleteOutcome::Failed(e.to_string()),
                Err(_) => DeleteOutcome::Failed(
                    ChannelError::timeout("delete message", svc.delete_timeout).to_string(),
                ),
            };

            #[cfg(feature = "metrics")]
            histogram!(purge_metrics::DELETE_DURATION_SECONDS)
                .record(started.elapsed().as_secs_f64());

            debug!(
                message_id = %entry.message.id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                ok = outcome == DeleteOutcome::Deleted,
                "delete resolved"
            );
            svc.complete(&entry, outcome);
        });
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        ebb_channels::{MessageId, memory::InMemoryChannels},
    };

    const T: u64 = 1_700_000_000_000;

    fn settings(batch_size: usize) -> PurgeSettings {
        PurgeSettings {
            batch_size,
            tick_interval: Duration::from_secs(60),
            backlog_recheck_unit: Duration::from_secs(1),
            delete_timeout: Duration::from_secs(5),
        }
    }

    fn seeded(count: u64) -> Arc<InMemoryChannels> {
        let channels = Arc::new(InMemoryChannels::new());
        channels.add_channel(7u64, "general");
        for id in 1..=count {
            channels.post(TrackedMessage::new(id, 7u64, T + id));
        }
        channels
    }

    async fn settled(svc: &PurgeScheduler) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while svc.status().await.in_flight > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("in-flight deletes did not resolve in time");
    }

    #[tokio::test]
    async fn expired_message_is_deleted() {
        let channels = seeded(1);
        let svc = PurgeScheduler::new(channels.clone(), &settings(15));

        let msg = TrackedMessage::new(1u64, 7u64, T);
        assert!(svc.submit(msg, T + 60_000));

        let next = svc.tick_at(T + 61_000);
        assert_eq!(next, Duration::from_secs(60));
        settled(&svc).await;

        let stats = svc.stats();
        assert_eq!(stats.deleted_count, 1);
        assert_eq!(stats.delete_attempted_count, 1);
        assert!(svc.oldest_pending().is_none());
        assert_eq!(channels.deleted(), vec![MessageId::from(1u64)]);
    }

    #[tokio::test]
    async fn not_yet_due_is_left_alone() {
        let channels = seeded(1);
        let svc = PurgeScheduler::new(channels.clone(), &settings(15));
        svc.submit(TrackedMessage::new(1u64, 7u64, T), T + 60_000);

        svc.tick_at(T + 59_000);
        settled(&svc).await;

        assert_eq!(svc.stats(), PurgeStats::default());
        assert!(channels.deleted().is_empty());
        assert_eq!(svc.status().await.pending, 1);
    }

    #[tokio::test]
    async fn failed_delete_counts_error_and_drops_entry() {
        let channels = seeded(2);
        channels.fail_delete(2u64);
        let svc = PurgeScheduler::new(channels.clone(), &settings(15));
        svc.submit(TrackedMessage::new(1u64, 7u64, T), T);
        svc.submit(TrackedMessage::new(2u64, 7u64, T), T);

        svc.tick_at(T + 1);
        settled(&svc).await;

        let status = svc.status().await;
        assert_eq!(status.stats.deleted_count, 1);
        assert_eq!(status.stats.error_count, 1);
        assert_eq!(status.pending, 0);

        // Not retried on the next tick.
        svc.tick_at(T + 2);
        settled(&svc).await;
        assert_eq!(svc.stats().delete_attempted_count, 2);
    }

    #[tokio::test]
    async fn backlog_blocks_new_batches_and_widens_interval() {
        let channels = seeded(4);
        channels.hold_deletes();
        let svc = PurgeScheduler::new(channels.clone(), &settings(2));
        for id in 1..=4u64 {
            svc.submit(TrackedMessage::new(id, 7u64, T + id), T + id);
        }

        assert_eq!(svc.tick_at(T + 10), Duration::from_secs(60));
        assert_eq!(svc.status().await.in_flight, 2);

        // Two outstanding, batch of two: interval doubles, recheck after 1s.
        let recheck = svc.tick_at(T + 20);
        assert_eq!(recheck, Duration::from_secs(1));
        let status = svc.status().await;
        assert_eq!(status.tick_interval_ms, 120_000);
        assert_eq!(status.stats.delete_attempted_count, 2);

        channels.release_deletes();
        settled(&svc).await;

        assert_eq!(svc.tick_at(T + 30), Duration::from_secs(120));
        settled(&svc).await;
        assert_eq!(svc.stats().deleted_count, 4);
        assert_eq!(
            channels.deleted().len(),
            4,
            "each message deleted exactly once"
        );
    }

    #[tokio::test]
    async fn stuck_delete_times_out_as_failure() {
        let channels = seeded(1);
        channels.hold_deletes();
        let svc = PurgeScheduler::new(channels.clone(), &PurgeSettings {
            delete_timeout: Duration::from_millis(20),
            ..settings(15)
        });
        svc.submit(TrackedMessage::new(1u64, 7u64, T), T);

        svc.tick_at(T + 1);
        settled(&svc).await;

        let stats = svc.stats();
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.deleted_count, 0);
        assert_eq!(svc.status().await.pending, 0);
    }

    #[tokio::test]
    async fn duplicate_completion_is_ignored() {
        let channels = seeded(0);
        let svc = PurgeScheduler::new(channels, &settings(15));
        let entry = QueueEntry {
            message: TrackedMessage::new(1u64, 7u64, T),
            due_at_ms: T,
        };
        svc.submit(entry.message.clone(), entry.due_at_ms);

        svc.complete(&entry, DeleteOutcome::Deleted);
        assert_eq!(svc.stats(), PurgeStats::default());
        assert_eq!(svc.status().await.pending, 1);
    }

    #[tokio::test]
    async fn start_stop() {
        let svc = PurgeScheduler::new(seeded(0), &settings(15));
        assert!(!svc.status().await.running);

        svc.start().await;
        assert!(svc.status().await.running);

        svc.stop().await;
        assert!(!svc.status().await.running);
    }

    #[tokio::test]
    async fn restart_after_stop_waits_a_full_interval() {
        let channels = seeded(1);
        let svc = PurgeScheduler::new(channels.clone(), &settings(15));
        svc.submit(TrackedMessage::new(1u64, 7u64, 0), 0);

        // Stopping with no loop parked must not leave a wakeup behind.
        svc.stop().await;
        svc.start().await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(svc.stats().delete_attempted_count, 0);
        assert!(channels.deleted().is_empty());
        svc.stop().await;
    }

    #[tokio::test]
    async fn timer_loop_purges_due_messages() {
        let channels = seeded(3);
        let svc = PurgeScheduler::new(channels.clone(), &PurgeSettings {
            tick_interval: Duration::from_millis(20),
            ..settings(15)
        });
        for id in 1..=3u64 {
            svc.submit(TrackedMessage::new(id, 7u64, 0), 0);
        }

        svc.start().await;
        tokio::time::timeout(Duration::from_secs(2), async {
            while svc.stats().deleted_count < 3 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timer loop did not purge due messages in time");
        svc.stop().await;

        assert_eq!(channels.remaining(&7u64.into()), 0);
    }
}
