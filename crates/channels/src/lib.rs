//! The channel collaborator seam.
//!
//! The retention engine never talks to a chat network directly. It resolves
//! channels through [`ChannelDirectory`], crawls and deletes through
//! [`ChannelHistory`], and receives live traffic through a [`MessageSink`]
//! that the transport (e.g. the Discord gateway handler) drives.

pub mod error;
pub mod memory;
pub mod plugin;
pub mod types;

pub use {
    error::{Error, Result},
    plugin::{ChannelDirectory, ChannelHistory, MessageSink},
    types::{ChannelHandle, ChannelId, ChannelRef, FetchRequest, MessageId, TrackedMessage},
};
