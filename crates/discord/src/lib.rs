//! Discord transport for the retention engine, built on serenity.
//!
//! [`DiscordChannels`] resolves, crawls, and prunes channels over the REST
//! API. [`DiscordHandler`] turns gateway `MESSAGE_CREATE` events into live
//! notifications for the watcher.

pub mod gateway;
pub mod handler;
pub mod snowflake;
pub mod transport;

pub use {
    gateway::DiscordGateway,
    handler::DiscordHandler,
    transport::DiscordChannels,
};
