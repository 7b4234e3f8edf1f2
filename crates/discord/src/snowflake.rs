//! Discord snowflake helpers.

/// First second of 2015, the Discord epoch, in unix millis.
pub const DISCORD_EPOCH_MS: u64 = 1_420_070_400_000;

/// Creation time encoded in a snowflake, as unix millis.
#[must_use]
pub fn created_at_ms(snowflake: u64) -> u64 {
    (snowflake >> 22) + DISCORD_EPOCH_MS
}
