//! Wiring of the watcher and the purge scheduler from config.

use std::sync::Arc;

use {
    ebb_channels::{ChannelDirectory, ChannelHistory, ChannelRef, MessageSink},
    ebb_config::EbbConfig,
    tracing::info,
};

use crate::{
    Result,
    scheduler::PurgeScheduler,
    settings::{PurgeSettings, WatcherSettings},
    types::PurgeStatus,
    watcher::Watcher,
};

/// A watcher and its purge scheduler, started and stopped together.
pub struct RetentionEngine {
    scheduler: Arc<PurgeScheduler>,
    watcher: Arc<Watcher>,
}

impl RetentionEngine {
    /// Derive settings, resolve the mapped channels, and build both
    /// components. Nothing runs until [`RetentionEngine::start`].
    pub async fn build(
        config: &EbbConfig,
        directory: &dyn ChannelDirectory,
        history: Arc<dyn ChannelHistory>,
    ) -> Result<Self> {
        let purge = PurgeSettings::from_config(&config.retention)?;
        let watch = WatcherSettings::from_config(&config.retention)?;

        let scheduler = PurgeScheduler::new(Arc::clone(&history), &purge);
        let refs = config.monitored_refs().map(ChannelRef::parse);
        let watcher = Watcher::resolve(directory, refs, history, Arc::clone(&scheduler), watch).await;

        Ok(Self { scheduler, watcher })
    }

    pub fn scheduler(&self) -> &Arc<PurgeScheduler> {
        &self.scheduler
    }

    pub fn watcher(&self) -> &Arc<Watcher> {
        &self.watcher
    }

    /// The live-message entry point for the transport's event handler.
    pub fn sink(&self) -> Arc<dyn MessageSink> {
        Arc::clone(&self.watcher) as Arc<dyn MessageSink>
    }

    pub async fn start(&self) {
        self.scheduler.start().await;
        self.watcher.start().await;
        info!(
            channels = self.watcher.monitored().len(),
            "retention engine started"
        );
    }

    pub async fn stop(&self) {
        self.watcher.stop().await;
        self.scheduler.stop().await;
    }

    pub async fn status(&self) -> PurgeStatus {
        self.scheduler.status().await
    }
}
