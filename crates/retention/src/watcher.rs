//! Channel watcher: keeps the purge scheduler supplied with messages.

use std::{collections::HashSet, sync::Arc, time::Duration};

use {
    ebb_channels::{
        ChannelDirectory, ChannelHandle, ChannelHistory, ChannelId, ChannelRef,
        Error as ChannelError, FetchRequest, MessageSink, TrackedMessage,
    },
    tokio::{
        sync::{Mutex, Notify, RwLock},
        task::JoinHandle,
    },
    tracing::{debug, error, info, warn},
};

#[cfg(feature = "metrics")]
use ebb_metrics::{counter, gauge, watcher as watcher_metrics};

use crate::{scheduler::PurgeScheduler, settings::WatcherSettings, types::PollSummary};

/// Discovers messages in monitored channels and submits them for purging.
///
/// Messages arrive two ways: live, through [`MessageSink::on_message`], and
/// from a timer-driven crawl of channel history that walks backwards from
/// the oldest message already tracked.
pub struct Watcher {
    history: Arc<dyn ChannelHistory>,
    scheduler: Arc<PurgeScheduler>,
    channels: Vec<ChannelHandle>,
    channel_ids: HashSet<ChannelId>,
    settings: WatcherSettings,
    timer_handle: Mutex<Option<JoinHandle<()>>>,
    wake_notify: Arc<Notify>,
    running: RwLock<bool>,
}

impl Watcher {
    /// Resolve `refs` and build a watcher over the channels that exist.
    ///
    /// References that do not resolve, or whose lookup fails, are left out
    /// of the monitored set.
    pub async fn resolve(
        directory: &dyn ChannelDirectory,
        refs: impl IntoIterator<Item = ChannelRef>,
        history: Arc<dyn ChannelHistory>,
        scheduler: Arc<PurgeScheduler>,
        settings: WatcherSettings,
    ) -> Arc<Self> {
        let mut channels: Vec<ChannelHandle> = Vec::new();
        let mut dropped = 0usize;

        for channel_ref in refs {
            match directory.resolve_channel(&channel_ref).await {
                Ok(Some(handle)) => {
                    if channels.iter().any(|c| c.id == handle.id) {
                        debug!(channel = %channel_ref, "channel already monitored");
                        continue;
                    }
                    debug!(channel = %channel_ref, resolved = %handle, "monitoring channel");
                    channels.push(handle);
                },
                Ok(None) => {
                    debug!(channel = %channel_ref, "channel not found, skipping");
                    dropped += 1;
                },
                Err(e) => {
                    debug!(channel = %channel_ref, error = %e, "channel lookup failed, skipping");
                    dropped += 1;
                },
            }
        }

        info!(
            monitored = channels.len(),
            dropped,
            lifetime_secs = settings.lifetime.as_secs(),
            "watcher channels resolved"
        );
        #[cfg(feature = "metrics")]
        gauge!(watcher_metrics::MONITORED_CHANNELS).set(channels.len() as f64);

        Self::with_channels(channels, history, scheduler, settings)
    }

    /// Build a watcher over already-resolved channels.
    pub fn with_channels(
        channels: Vec<ChannelHandle>,
        history: Arc<dyn ChannelHistory>,
        scheduler: Arc<PurgeScheduler>,
        settings: WatcherSettings,
    ) -> Arc<Self> {
        let channel_ids = channels.iter().map(|c| c.id.clone()).collect();
        Arc::new(Self {
            history,
            scheduler,
            channels,
            channel_ids,
            settings,
            timer_handle: Mutex::new(None),
            wake_notify: Arc::new(Notify::new()),
            running: RwLock::new(false),
        })
    }

    pub fn monitored(&self) -> &[ChannelHandle] {
        &self.channels
    }

    pub fn is_monitored(&self, channel: &ChannelId) -> bool {
        self.channel_ids.contains(channel)
    }

    pub fn lifetime(&self) -> Duration {
        self.settings.lifetime
    }

    /// Due time for a message: creation time plus the configured lifetime.
    pub fn due_at_ms(&self, message: &TrackedMessage) -> u64 {
        let lifetime_ms = u64::try_from(self.settings.lifetime.as_millis()).unwrap_or(u64::MAX);
        message.created_at_ms.saturating_add(lifetime_ms)
    }

    /// Hand a message to the scheduler. Returns `false` if it was already
    /// tracked.
    pub fn submit(&self, message: TrackedMessage) -> bool {
        let due_at_ms = self.due_at_ms(&message);
        self.scheduler.submit(message, due_at_ms)
    }

    /// Crawl one page of history for every monitored channel.
    ///
    /// A channel with nothing pending gets its newest page. Otherwise the
    /// page just older than its oldest pending message, so each round
    /// reaches further back without refetching what is already tracked.
    /// Every cursor is taken before the first fetch of the round. Failed
    /// channels are skipped until the next round.
    pub async fn poll_once(&self) -> PollSummary {
        let mut summary = PollSummary::default();

        let requests: Vec<FetchRequest> = self
            .channels
            .iter()
            .map(|channel| self.request_for(&channel.id))
            .collect();

        for (channel, request) in self.channels.iter().zip(requests) {
            let before = request.before.clone();

            let fetched = match tokio::time::timeout(
                self.settings.fetch_timeout,
                self.history.fetch_messages(channel, request),
            )
            .await
            {
                Ok(Ok(messages)) => messages,
                Ok(Err(e)) => {
                    self.fetch_failed(channel, &e, &mut summary);
                    continue;
                },
                Err(_) => {
                    let e = ChannelError::timeout("fetch messages", self.settings.fetch_timeout);
                    self.fetch_failed(channel, &e, &mut summary);
                    continue;
                },
            };

            let count = fetched.len();
            let submitted = fetched
                .into_iter()
                .map(|message| self.submit(message))
                .filter(|inserted| *inserted)
                .count();

            debug!(
                channel = %channel,
                before = ?before,
                fetched = count,
                submitted,
                "polled channel history"
            );
            #[cfg(feature = "metrics")]
            counter!(watcher_metrics::POLLED_TOTAL).increment(count as u64);

            summary.fetched += count;
            summary.submitted += submitted;
        }

        summary
    }

    fn request_for(&self, channel: &ChannelId) -> FetchRequest {
        match self.scheduler.oldest_pending_in(channel) {
            Some(oldest) => FetchRequest::before(oldest.id, self.settings.fetch_limit),
            None => FetchRequest::latest(self.settings.fetch_limit),
        }
    }

    fn fetch_failed(
        &self,
        channel: &ChannelHandle,
        error: &ChannelError,
        summary: &mut PollSummary,
    ) {
        if error.is_transient() {
            warn!(channel = %channel, error = %error, "failed to fetch channel history");
        } else {
            error!(channel = %channel, error = %error, "channel history request rejected");
        }
        #[cfg(feature = "metrics")]
        counter!(watcher_metrics::FETCH_ERRORS_TOTAL).increment(1);
        summary.failed_channels += 1;
    }

    /// Start the poll loop. The first poll runs immediately.
    pub async fn start(self: &Arc<Self>) {
        let mut handle = self.timer_handle.lock().await;
        if handle.is_some() {
            debug!("watcher already running");
            return;
        }
        *self.running.write().await = true;

        let watcher = Arc::clone(self);
        *handle = Some(tokio::spawn(async move {
            watcher.poll_loop().await;
        }));
        info!(
            poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
            "watcher started"
        );
    }

    pub async fn stop(&self) {
        *self.running.write().await = false;
        self.wake_notify.notify_waiters();

        if let Some(h) = self.timer_handle.lock().await.take() {
            h.abort();
        }
        info!("watcher stopped");
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    async fn poll_loop(self: &Arc<Self>) {
        loop {
            if !*self.running.read().await {
                break;
            }

            let summary = self.poll_once().await;
            if summary.submitted > 0 || summary.failed_channels > 0 {
                info!(
                    fetched = summary.fetched,
                    submitted = summary.submitted,
                    failed_channels = summary.failed_channels,
                    "history poll finished"
                );
            }

            let notify = Arc::clone(&self.wake_notify);
            tokio::select! {
                () = tokio::time::sleep(self.settings.poll_interval) => {},
                () = notify.notified() => {
                    debug!("watcher woken by notify");
                },
            }
        }
    }
}

impl MessageSink for Watcher {
    fn on_message(&self, message: TrackedMessage) {
        if !self.is_monitored(&message.channel_id) {
            return;
        }
        let id = message.id.clone();
        if self.submit(message) {
            debug!(message_id = %id, "tracking live message");
            #[cfg(feature = "metrics")]
            counter!(watcher_metrics::PUSHED_TOTAL).increment(1);
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::settings::PurgeSettings,
        ebb_channels::{MessageId, memory::InMemoryChannels},
    };

    const T: u64 = 1_700_000_000_000;

    fn settings() -> WatcherSettings {
        WatcherSettings {
            poll_interval: Duration::from_millis(20),
            fetch_limit: 50,
            fetch_timeout: Duration::from_secs(2),
            lifetime: Duration::from_secs(60),
        }
    }

    /// One channel (id 7, "general") with `count` messages, ids 1..=count.
    fn seeded(count: u64) -> (Arc<InMemoryChannels>, Arc<PurgeScheduler>) {
        let channels = Arc::new(InMemoryChannels::new());
        channels.add_channel(7u64, "general");
        for id in 1..=count {
            channels.post(TrackedMessage::new(id, 7u64, T + id * 1_000));
        }
        let scheduler = PurgeScheduler::new(channels.clone(), &PurgeSettings::default());
        (channels, scheduler)
    }

    async fn watcher(
        channels: &Arc<InMemoryChannels>,
        scheduler: &Arc<PurgeScheduler>,
        refs: &[&str],
    ) -> Arc<Watcher> {
        Watcher::resolve(
            channels.as_ref(),
            refs.iter().map(|r| ChannelRef::parse(r)),
            channels.clone(),
            Arc::clone(scheduler),
            settings(),
        )
        .await
    }

    #[tokio::test]
    async fn unresolvable_channels_are_dropped() {
        let (channels, scheduler) = seeded(0);
        let w = watcher(&channels, &scheduler, &["#general", "#missing", "999", "7"]).await;
        assert_eq!(w.monitored().len(), 1, "duplicates and misses are dropped");
        assert!(w.is_monitored(&ChannelId::from(7u64)));
    }

    #[tokio::test]
    async fn push_path_submits_with_lifetime() {
        let (channels, scheduler) = seeded(0);
        let w = watcher(&channels, &scheduler, &["#general"]).await;

        w.on_message(TrackedMessage::new(1u64, 7u64, T));
        assert_eq!(scheduler.status().await.pending, 1);

        // Same id again keeps the original due time.
        w.on_message(TrackedMessage::new(1u64, 7u64, T + 5_000));
        assert_eq!(scheduler.status().await.pending, 1);
        assert_eq!(scheduler.oldest_pending().unwrap().created_at_ms, T);
    }

    #[tokio::test]
    async fn push_path_ignores_unmonitored_channels() {
        let (channels, scheduler) = seeded(0);
        let w = watcher(&channels, &scheduler, &["#general"]).await;
        w.on_message(TrackedMessage::new(1u64, 8u64, T));
        assert_eq!(scheduler.status().await.pending, 0);
    }

    #[tokio::test]
    async fn first_poll_takes_latest_page_then_crawls_back() {
        let (channels, scheduler) = seeded(120);
        let w = watcher(&channels, &scheduler, &["#general"]).await;

        let first = w.poll_once().await;
        assert_eq!(first.fetched, 50);
        assert_eq!(first.submitted, 50);
        assert_eq!(scheduler.oldest_pending().unwrap().id, MessageId::from(71u64));

        let second = w.poll_once().await;
        assert_eq!(second.submitted, 50);
        assert_eq!(scheduler.oldest_pending().unwrap().id, MessageId::from(21u64));

        let third = w.poll_once().await;
        assert_eq!(third.submitted, 20);
        let fourth = w.poll_once().await;
        assert_eq!(fourth.fetched, 0);

        let cursors: Vec<Option<MessageId>> =
            channels.fetch_log().into_iter().map(|(_, before)| before).collect();
        assert_eq!(cursors, vec![
            None,
            Some(MessageId::from(71u64)),
            Some(MessageId::from(21u64)),
            Some(MessageId::from(1u64)),
        ]);
        assert_eq!(scheduler.status().await.pending, 120);
    }

    #[tokio::test]
    async fn every_channel_bootstraps_from_its_latest_page() {
        let channels = Arc::new(InMemoryChannels::new());
        channels.add_channel(7u64, "a");
        channels.add_channel(8u64, "b");
        // Odd ids in #a, even ids in #b, so the two histories interleave.
        for id in (1..=119u64).step_by(2) {
            channels.post(TrackedMessage::new(id, 7u64, T + id * 1_000));
        }
        for id in (2..=40u64).step_by(2) {
            channels.post(TrackedMessage::new(id, 8u64, T + id * 1_000));
        }
        let scheduler = PurgeScheduler::new(channels.clone(), &PurgeSettings::default());
        let w = watcher(&channels, &scheduler, &["#a", "#b"]).await;

        let first = w.poll_once().await;
        assert_eq!(first.submitted, 70);
        assert_eq!(channels.fetch_log(), vec![
            (ChannelId::from(7u64), None),
            (ChannelId::from(8u64), None),
        ]);

        for _ in 0..3 {
            w.poll_once().await;
        }
        assert_eq!(scheduler.status().await.pending, 80);

        let log = channels.fetch_log();
        assert_eq!(log[2], (ChannelId::from(7u64), Some(MessageId::from(21u64))));
        assert_eq!(log[3], (ChannelId::from(8u64), Some(MessageId::from(2u64))));
    }

    #[tokio::test]
    async fn sparse_second_channel_is_not_skipped() {
        let channels = Arc::new(InMemoryChannels::new());
        channels.add_channel(7u64, "a");
        channels.add_channel(8u64, "b");
        for id in 1..=60u64 {
            channels.post(TrackedMessage::new(id, 7u64, T + id * 1_000));
        }
        for id in 100..=110u64 {
            channels.post(TrackedMessage::new(id, 8u64, T + id * 1_000));
        }
        let scheduler = PurgeScheduler::new(channels.clone(), &PurgeSettings::default());
        let w = watcher(&channels, &scheduler, &["#a", "#b"]).await;

        for _ in 0..5 {
            w.poll_once().await;
        }
        assert_eq!(scheduler.status().await.pending, 71);
        assert_eq!(channels.fetch_log()[1], (ChannelId::from(8u64), None));
    }

    #[tokio::test]
    async fn fetch_failure_skips_channel_until_next_round() {
        let (channels, scheduler) = seeded(10);
        let w = watcher(&channels, &scheduler, &["#general"]).await;

        channels.fail_next_fetches(1);
        let failed = w.poll_once().await;
        assert_eq!(failed.failed_channels, 1);
        assert_eq!(scheduler.status().await.pending, 0);

        let recovered = w.poll_once().await;
        assert_eq!(recovered.failed_channels, 0);
        assert_eq!(recovered.submitted, 10);
    }

    #[tokio::test]
    async fn due_time_saturates() {
        let (channels, scheduler) = seeded(0);
        let w = Watcher::with_channels(Vec::new(), channels, scheduler, WatcherSettings {
            lifetime: Duration::from_secs(u64::MAX),
            ..settings()
        });
        assert_eq!(w.due_at_ms(&TrackedMessage::new(1u64, 7u64, T)), u64::MAX);
    }

    #[tokio::test]
    async fn restart_after_stop_polls_once_then_sleeps() {
        let (channels, scheduler) = seeded(3);
        let w = Watcher::with_channels(
            vec![ChannelHandle::new(7u64, Some("general".into()))],
            channels.clone(),
            scheduler,
            WatcherSettings {
                poll_interval: Duration::from_secs(60),
                ..settings()
            },
        );

        // Stopping with no loop parked must not leave a wakeup behind.
        w.stop().await;
        w.start().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        w.stop().await;

        assert_eq!(channels.fetch_log().len(), 1);
    }

    #[tokio::test]
    async fn poll_loop_runs_until_stopped() {
        let (channels, scheduler) = seeded(3);
        let w = watcher(&channels, &scheduler, &["#general"]).await;

        w.start().await;
        assert!(w.is_running().await);
        tokio::time::timeout(Duration::from_secs(2), async {
            while scheduler.status().await.pending < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("poll loop did not pick up history in time");

        w.stop().await;
        assert!(!w.is_running().await);
    }
}
