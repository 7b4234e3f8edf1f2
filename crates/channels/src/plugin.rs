use async_trait::async_trait;

use crate::{
    Result,
    types::{ChannelHandle, ChannelId, ChannelRef, FetchRequest, MessageId, TrackedMessage},
};

/// Resolve configured channel references into live handles.
#[async_trait]
pub trait ChannelDirectory: Send + Sync {
    /// `Ok(None)` when the channel does not exist or is not visible.
    async fn resolve_channel(&self, channel: &ChannelRef) -> Result<Option<ChannelHandle>>;
}

/// Read and prune channel history.
#[async_trait]
pub trait ChannelHistory: Send + Sync {
    /// Fetch one page of history, newest first.
    async fn fetch_messages(
        &self,
        channel: &ChannelHandle,
        request: FetchRequest,
    ) -> Result<Vec<TrackedMessage>>;

    /// Delete a single message.
    async fn delete_message(&self, channel: &ChannelId, id: &MessageId) -> Result<()>;
}

/// Receiver for live messages observed by the transport.
///
/// Called from the transport's event handler; implementations must not block.
pub trait MessageSink: Send + Sync {
    fn on_message(&self, message: TrackedMessage);
}
