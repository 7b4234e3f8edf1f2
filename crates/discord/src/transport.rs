//! REST-backed channel directory and history.

use std::sync::Arc;

use {
    async_trait::async_trait,
    serenity::{
        all::{
            ChannelId as DiscordChannelId, GuildId, Http, MessageId as DiscordMessageId,
        },
        builder::GetMessages,
    },
    tracing::debug,
};

use ebb_channels::{
    ChannelDirectory, ChannelHandle, ChannelHistory, ChannelId, ChannelRef, Error, FetchRequest,
    MessageId, Result, TrackedMessage,
};

use crate::handler::tracked;

/// Discord channels reached through the bot's HTTP client.
pub struct DiscordChannels {
    http: Arc<Http>,
    /// Guilds searched for `#name` references. Empty means every guild the
    /// bot is in.
    guild_ids: Vec<GuildId>,
}

impl DiscordChannels {
    pub fn new(http: Arc<Http>, guild_ids: impl IntoIterator<Item = u64>) -> Self {
        Self {
            http,
            guild_ids: guild_ids
                .into_iter()
                .filter(|id| *id != 0)
                .map(GuildId::new)
                .collect(),
        }
    }

    async fn guilds(&self) -> Result<Vec<GuildId>> {
        if !self.guild_ids.is_empty() {
            return Ok(self.guild_ids.clone());
        }
        let guilds = self
            .http
            .get_guilds(None, None)
            .await
            .map_err(|e| Error::external("list guilds", e))?;
        Ok(guilds.into_iter().map(|g| g.id).collect())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<ChannelHandle>> {
        for guild in self.guilds().await? {
            let channels = guild
                .channels(self.http.as_ref())
                .await
                .map_err(|e| Error::external(format!("list channels of guild {guild}"), e))?;
            if let Some(channel) = channels.values().find(|c| c.name == name) {
                return Ok(Some(ChannelHandle::new(
                    channel.id.get(),
                    Some(channel.name.clone()),
                )));
            }
        }
        Ok(None)
    }

    async fn find_by_id(&self, id: &ChannelId) -> Result<Option<ChannelHandle>> {
        let channel_id = DiscordChannelId::new(nonzero(id.as_u64()?, "channel id")?);
        let channel = channel_id
            .to_channel(self.http.as_ref())
            .await
            .map_err(|e| Error::external(format!("fetch channel {id}"), e))?;
        Ok(channel
            .guild()
            .map(|c| ChannelHandle::new(c.id.get(), Some(c.name))))
    }
}

/// Serenity ids panic on zero.
fn nonzero(raw: u64, what: &str) -> Result<u64> {
    if raw == 0 {
        return Err(Error::invalid_input(format!("{what} must not be zero")));
    }
    Ok(raw)
}

#[async_trait]
impl ChannelDirectory for DiscordChannels {
    async fn resolve_channel(&self, channel: &ChannelRef) -> Result<Option<ChannelHandle>> {
        let found = match channel {
            ChannelRef::Id(id) => self.find_by_id(id).await?,
            ChannelRef::Name(name) => self.find_by_name(name).await?,
        };
        debug!(channel = %channel, found = found.is_some(), "resolved discord channel");
        Ok(found)
    }
}

#[async_trait]
impl ChannelHistory for DiscordChannels {
    async fn fetch_messages(
        &self,
        channel: &ChannelHandle,
        request: FetchRequest,
    ) -> Result<Vec<TrackedMessage>> {
        let channel_id = DiscordChannelId::new(nonzero(channel.id.as_u64()?, "channel id")?);
        let mut builder = GetMessages::new().limit(request.limit);
        if let Some(before) = &request.before {
            builder = builder.before(DiscordMessageId::new(nonzero(
                before.as_u64()?,
                "message id",
            )?));
        }

        let messages = channel_id
            .messages(self.http.as_ref(), builder)
            .await
            .map_err(|e| Error::external(format!("fetch history of {channel}"), e))?;

        Ok(messages
            .iter()
            .map(tracked)
            .collect())
    }

    async fn delete_message(&self, channel: &ChannelId, id: &MessageId) -> Result<()> {
        let channel_id = DiscordChannelId::new(nonzero(channel.as_u64()?, "channel id")?);
        let message_id = DiscordMessageId::new(nonzero(id.as_u64()?, "message id")?);
        channel_id
            .delete_message(self.http.as_ref(), message_id)
            .await
            .map_err(|e| Error::external(format!("delete message {id} in {channel}"), e))
    }
}
