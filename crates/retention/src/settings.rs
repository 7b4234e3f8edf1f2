//! Runtime settings derived once from [`RetentionConfig`].

use std::time::Duration;

use ebb_config::RetentionConfig;

use crate::{Error, Result};

/// Purge scheduler pacing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeSettings {
    pub batch_size: usize,
    /// Starting tick interval. Grows on backlog, never shrinks.
    pub tick_interval: Duration,
    /// The backlog re-check fires after `in_flight / batch_size` of these.
    pub backlog_recheck_unit: Duration,
    pub delete_timeout: Duration,
}

impl Default for PurgeSettings {
    fn default() -> Self {
        Self {
            batch_size: 15,
            tick_interval: Duration::from_secs(60),
            backlog_recheck_unit: Duration::from_secs(1),
            delete_timeout: Duration::from_secs(30),
        }
    }
}

impl PurgeSettings {
    pub fn from_config(config: &RetentionConfig) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(Error::invalid_settings("batch_size must be at least 1"));
        }
        Ok(Self {
            batch_size: config.batch_size,
            tick_interval: config.tick_interval()?,
            backlog_recheck_unit: config.backlog_recheck_unit()?,
            delete_timeout: config.delete_timeout()?,
        })
    }
}

/// Watcher polling and expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherSettings {
    pub poll_interval: Duration,
    pub fetch_limit: u8,
    pub fetch_timeout: Duration,
    /// Added to a message's creation time to get its due time.
    pub lifetime: Duration,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            fetch_limit: 50,
            fetch_timeout: Duration::from_secs(30),
            lifetime: Duration::ZERO,
        }
    }
}

impl WatcherSettings {
    pub fn from_config(config: &RetentionConfig) -> Result<Self> {
        if config.fetch_limit == 0 {
            return Err(Error::invalid_settings("fetch_limit must be at least 1"));
        }
        Ok(Self {
            poll_interval: config.poll_interval()?,
            fetch_limit: config.fetch_limit,
            fetch_timeout: config.fetch_timeout()?,
            lifetime: config.lifetime.offset(),
        })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, ebb_config::LifetimeConfig};

    #[test]
    fn defaults_match_config_defaults() {
        let cfg = RetentionConfig::default();
        assert_eq!(PurgeSettings::from_config(&cfg).unwrap(), PurgeSettings::default());
        assert_eq!(
            WatcherSettings::from_config(&cfg).unwrap(),
            WatcherSettings::default()
        );
    }

    #[test]
    fn lifetime_flows_through() {
        let cfg = RetentionConfig {
            lifetime: LifetimeConfig {
                minutes: Some(1),
                ..Default::default()
            },
            ..Default::default()
        };
        let settings = WatcherSettings::from_config(&cfg).unwrap();
        assert_eq!(settings.lifetime, Duration::from_secs(60));
    }

    #[test]
    fn zero_batch_size_rejected() {
        let cfg = RetentionConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            PurgeSettings::from_config(&cfg),
            Err(Error::InvalidSettings { .. })
        ));
    }

    #[test]
    fn bad_duration_is_config_error() {
        let cfg = RetentionConfig {
            poll_interval: "often".into(),
            ..Default::default()
        };
        assert!(matches!(
            WatcherSettings::from_config(&cfg),
            Err(Error::Config(_))
        ));
    }
}
