//! Identifiers and message records exchanged with a channel transport.

use serde::{Deserialize, Serialize};

use crate::Result;

/// Opaque message identifier as issued by the transport.
///
/// Discord ids are snowflakes, so [`MessageId::as_u64`] is how a transport
/// recovers the numeric form when it needs one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_u64(&self) -> Result<u64> {
        Ok(self.0.parse()?)
    }
}

impl From<u64> for MessageId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transport-issued channel identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_u64(&self) -> Result<u64> {
        Ok(self.0.parse()?)
    }
}

impl From<u64> for ChannelId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for ChannelId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A configured channel reference, before resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelRef {
    /// Literal transport id.
    Id(ChannelId),
    /// Channel name, looked up at startup (`#general` in config).
    Name(String),
}

impl ChannelRef {
    /// Parse a config key: `#name` is a name lookup, anything else is an id.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.strip_prefix('#') {
            Some(name) => Self::Name(name.to_string()),
            None => Self::Id(ChannelId::new(raw)),
        }
    }
}

impl std::fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => write!(f, "#{name}"),
        }
    }
}

/// A resolved, monitored channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelHandle {
    pub id: ChannelId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChannelHandle {
    pub fn new(id: impl Into<ChannelId>, name: Option<String>) -> Self {
        Self {
            id: id.into(),
            name,
        }
    }
}

impl std::fmt::Display for ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "#{name} ({})", self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

/// A message the retention engine is tracking. Immutable once captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    /// Creation time, epoch millis.
    pub created_at_ms: u64,
}

impl TrackedMessage {
    pub fn new(
        id: impl Into<MessageId>,
        channel_id: impl Into<ChannelId>,
        created_at_ms: u64,
    ) -> Self {
        Self {
            id: id.into(),
            channel_id: channel_id.into(),
            created_at_ms,
        }
    }
}

/// History page request: up to `limit` messages strictly older than
/// `before`, or the most recent `limit` when `before` is `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub before: Option<MessageId>,
    pub limit: u8,
}

impl FetchRequest {
    /// Discord caps history pages at 100.
    pub const MAX_LIMIT: u8 = 100;

    #[must_use]
    pub fn latest(limit: u8) -> Self {
        Self {
            before: None,
            limit: limit.min(Self::MAX_LIMIT),
        }
    }

    #[must_use]
    pub fn before(id: MessageId, limit: u8) -> Self {
        Self {
            before: Some(id),
            limit: limit.min(Self::MAX_LIMIT),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("#general", ChannelRef::Name("general".into()))]
    #[case("  #ops ", ChannelRef::Name("ops".into()))]
    #[case("123456789", ChannelRef::Id(ChannelId::new("123456789")))]
    #[case("not-a-number", ChannelRef::Id(ChannelId::new("not-a-number")))]
    fn parses_channel_refs(#[case] raw: &str, #[case] expected: ChannelRef) {
        assert_eq!(ChannelRef::parse(raw), expected);
    }

    #[test]
    fn channel_ref_display_roundtrips() {
        assert_eq!(ChannelRef::parse("#general").to_string(), "#general");
        assert_eq!(ChannelRef::parse("42").to_string(), "42");
    }

    #[test]
    fn message_id_numeric_form() {
        assert_eq!(MessageId::from(42u64).as_u64().unwrap(), 42);
        assert!(MessageId::from("abc").as_u64().is_err());
    }

    #[test]
    fn fetch_limit_is_capped() {
        assert_eq!(FetchRequest::latest(250).limit, 100);
        assert_eq!(FetchRequest::before(MessageId::from(1u64), 50).limit, 50);
    }

    #[test]
    fn tracked_message_serializes_flat_ids() {
        let msg = TrackedMessage::new(7u64, 9u64, 1_000);
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["id"], "7");
        assert_eq!(v["channel_id"], "9");
        assert_eq!(v["created_at_ms"], 1_000);
    }
}
