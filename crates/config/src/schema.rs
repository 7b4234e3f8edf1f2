//! Config schema types: Discord connection, channel mapping, retention.

use std::{collections::BTreeMap, time::Duration};

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

use crate::{Result, duration::parse_duration_ms};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EbbConfig {
    pub discord: DiscordConfig,
    /// Discord channel reference -> IRC channel. The keys are the channels
    /// whose messages are subject to retention. A key starting with `#` is
    /// looked up by name; anything else is a literal channel id.
    pub channel_mapping: BTreeMap<String, String>,
    pub retention: RetentionConfig,
}

impl EbbConfig {
    /// Discord-side channel references that should be monitored.
    pub fn monitored_refs(&self) -> impl Iterator<Item = &str> {
        self.channel_mapping.keys().map(String::as_str)
    }
}

/// Discord bot connection.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    /// Bot token.
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,
    /// Guilds searched when resolving channels by name. Empty means every
    /// guild the bot is a member of.
    pub guild_ids: Vec<String>,
}

impl DiscordConfig {
    #[must_use]
    pub fn has_token(&self) -> bool {
        !self.token.expose_secret().trim().is_empty()
    }
}

impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("token", &"[REDACTED]")
            .field("guild_ids", &self.guild_ids)
            .finish()
    }
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            guild_ids: Vec::new(),
        }
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

/// Message retention: how long messages live and how fast they are purged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Whether the watcher and purge scheduler run at all. Defaults to true.
    pub enabled: bool,
    /// How often channel history is crawled for untracked messages. Defaults to "30s".
    pub poll_interval: String,
    /// Initial purge tick interval. Grows when deletes back up. Defaults to "60s".
    pub tick_interval: String,
    /// Maximum deletes issued per tick. Defaults to 15.
    pub batch_size: usize,
    /// Messages requested per channel per poll. Defaults to 50.
    pub fetch_limit: u8,
    /// Unit of the short backlog re-check delay (`in_flight / batch_size`
    /// units). Defaults to "1s".
    pub backlog_recheck_unit: String,
    /// Upper bound on a single delete request. Defaults to "30s".
    pub delete_timeout: String,
    /// Upper bound on a single history fetch. Defaults to "30s".
    pub fetch_timeout: String,
    /// Age at which a message becomes eligible for deletion.
    pub lifetime: LifetimeConfig,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: "30s".into(),
            tick_interval: "60s".into(),
            batch_size: 15,
            fetch_limit: 50,
            backlog_recheck_unit: "1s".into(),
            delete_timeout: "30s".into(),
            fetch_timeout: "30s".into(),
            lifetime: LifetimeConfig::default(),
        }
    }
}

impl RetentionConfig {
    pub fn poll_interval(&self) -> Result<Duration> {
        parse_duration_ms(&self.poll_interval).map(Duration::from_millis)
    }

    pub fn tick_interval(&self) -> Result<Duration> {
        parse_duration_ms(&self.tick_interval).map(Duration::from_millis)
    }

    pub fn backlog_recheck_unit(&self) -> Result<Duration> {
        parse_duration_ms(&self.backlog_recheck_unit).map(Duration::from_millis)
    }

    pub fn delete_timeout(&self) -> Result<Duration> {
        parse_duration_ms(&self.delete_timeout).map(Duration::from_millis)
    }

    pub fn fetch_timeout(&self) -> Result<Duration> {
        parse_duration_ms(&self.fetch_timeout).map(Duration::from_millis)
    }
}

/// Message lifetime. Unset fields count as zero; fields add up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifetimeConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hours: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minutes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds: Option<u64>,
}

impl LifetimeConfig {
    /// Total lifetime, saturating at `u64::MAX` seconds.
    #[must_use]
    pub fn offset(&self) -> Duration {
        let secs = [
            (self.days, 86_400u64),
            (self.hours, 3_600),
            (self.minutes, 60),
            (self.seconds, 1),
        ]
        .into_iter()
        .fold(0u64, |acc, (value, unit)| {
            acc.saturating_add(value.unwrap_or(0).saturating_mul(unit))
        });
        Duration::from_secs(secs)
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.offset().is_zero()
    }
}
