//! In-memory channel transport for testing.

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use {async_trait::async_trait, tokio::sync::watch};

use crate::{
    Error, Result,
    plugin::{ChannelDirectory, ChannelHistory},
    types::{ChannelHandle, ChannelId, ChannelRef, FetchRequest, MessageId, TrackedMessage},
};

#[derive(Default)]
struct Inner {
    channels: Vec<ChannelHandle>,
    /// Per channel, kept sorted by numeric message id.
    messages: HashMap<ChannelId, Vec<TrackedMessage>>,
    fetch_log: Vec<(ChannelId, Option<MessageId>)>,
    failing_fetches: usize,
    failing_deletes: HashSet<MessageId>,
    deleted: Vec<MessageId>,
}

/// Channels and messages held in a `HashMap`. Ids must be numeric so that
/// `before` cursors compare the way snowflakes do. No persistence, for tests
/// only.
pub struct InMemoryChannels {
    inner: Mutex<Inner>,
    delete_gate: watch::Sender<bool>,
}

impl InMemoryChannels {
    pub fn new() -> Self {
        let (delete_gate, _) = watch::channel(true);
        Self {
            inner: Mutex::new(Inner::default()),
            delete_gate,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_channel(&self, id: impl Into<ChannelId>, name: &str) -> ChannelHandle {
        let handle = ChannelHandle::new(id, Some(name.to_string()));
        self.lock().channels.push(handle.clone());
        handle
    }

    pub fn post(&self, message: TrackedMessage) {
        let mut inner = self.lock();
        let list = inner.messages.entry(message.channel_id.clone()).or_default();
        list.push(message);
        list.sort_by_key(|m| m.id.as_u64().unwrap_or(u64::MAX));
    }

    /// Make the next `n` history fetches fail with a transport error.
    pub fn fail_next_fetches(&self, n: usize) {
        self.lock().failing_fetches = n;
    }

    /// Make deletes of `id` fail.
    pub fn fail_delete(&self, id: impl Into<MessageId>) {
        self.lock().failing_deletes.insert(id.into());
    }

    /// Park delete requests until [`InMemoryChannels::release_deletes`].
    pub fn hold_deletes(&self) {
        self.delete_gate.send_replace(false);
    }

    pub fn release_deletes(&self) {
        self.delete_gate.send_replace(true);
    }

    /// Ids successfully deleted so far, in completion order.
    pub fn deleted(&self) -> Vec<MessageId> {
        self.lock().deleted.clone()
    }

    /// Every fetch issued so far as `(channel, before)`.
    pub fn fetch_log(&self) -> Vec<(ChannelId, Option<MessageId>)> {
        self.lock().fetch_log.clone()
    }

    pub fn remaining(&self, channel: &ChannelId) -> usize {
        self.lock().messages.get(channel).map_or(0, Vec::len)
    }
}

impl Default for InMemoryChannels {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelDirectory for InMemoryChannels {
    async fn resolve_channel(&self, channel: &ChannelRef) -> Result<Option<ChannelHandle>> {
        let inner = self.lock();
        let found = inner.channels.iter().find(|h| match channel {
            ChannelRef::Id(id) => &h.id == id,
            ChannelRef::Name(name) => h.name.as_deref() == Some(name.as_str()),
        });
        Ok(found.cloned())
    }
}

#[async_trait]
impl ChannelHistory for InMemoryChannels {
    async fn fetch_messages(
        &self,
        channel: &ChannelHandle,
        request: FetchRequest,
    ) -> Result<Vec<TrackedMessage>> {
        let mut inner = self.lock();
        inner
            .fetch_log
            .push((channel.id.clone(), request.before.clone()));

        if inner.failing_fetches > 0 {
            inner.failing_fetches -= 1;
            return Err(Error::unavailable("scripted fetch failure"));
        }

        let before = request.before.as_ref().map(MessageId::as_u64).transpose()?;
        let Some(list) = inner.messages.get(&channel.id) else {
            return Ok(Vec::new());
        };

        Ok(list
            .iter()
            .rev()
            .filter(|m| match before {
                Some(cursor) => m.id.as_u64().is_ok_and(|id| id < cursor),
                None => true,
            })
            .take(usize::from(request.limit))
            .cloned()
            .collect())
    }

    async fn delete_message(&self, channel: &ChannelId, id: &MessageId) -> Result<()> {
        let mut gate = self.delete_gate.subscribe();
        // The sender lives as long as `self`, so this only errs on drop.
        let _ = gate.wait_for(|open| *open).await;

        let mut inner = self.lock();
        if inner.failing_deletes.contains(id) {
            return Err(Error::unavailable(format!("scripted delete failure for {id}")));
        }
        let removed = inner.messages.get_mut(channel).and_then(|list| {
            let pos = list.iter().position(|m| &m.id == id)?;
            Some(list.remove(pos))
        });
        if removed.is_none() {
            return Err(Error::invalid_input(format!("unknown message {id}")));
        }
        inner.deleted.push(id.clone());
        Ok(())
    }
}
