//! Discord event handler for serenity.
//!
//! Forwards every guild message the gateway delivers to a [`MessageSink`].
//! Which channels are monitored is the sink's decision.

use std::sync::Arc;

use {
    serenity::{
        all::{Context, EventHandler, GatewayIntents, GuildId, Message, Ready},
        async_trait,
    },
    tracing::{debug, info},
};

use ebb_channels::{MessageSink, TrackedMessage};

use crate::snowflake::created_at_ms;

/// Handler for Discord gateway events.
pub struct DiscordHandler {
    sink: Arc<dyn MessageSink>,
}

impl DiscordHandler {
    pub fn new(sink: Arc<dyn MessageSink>) -> Self {
        Self { sink }
    }

    /// Required gateway intents for the bot.
    pub fn intents() -> GatewayIntents {
        GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES
    }
}

/// Reduce a gateway message to what retention tracks.
pub fn tracked(msg: &Message) -> TrackedMessage {
    TrackedMessage::new(msg.id.get(), msg.channel_id.get(), created_at_ms(msg.id.get()))
}

#[async_trait]
impl EventHandler for DiscordHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(
            bot_name = %ready.user.name,
            guilds = ready.guilds.len(),
            "discord bot ready"
        );
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        // Bot and bridge messages expire like everything else.
        if msg.guild_id.is_none() {
            return;
        }
        self.sink.on_message(tracked(&msg));
    }

    async fn cache_ready(&self, _ctx: Context, guilds: Vec<GuildId>) {
        debug!(guild_count = guilds.len(), "discord cache ready");
    }
}
