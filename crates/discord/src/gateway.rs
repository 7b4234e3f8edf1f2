//! Gateway connection lifecycle.

use std::sync::Arc;

use {
    secrecy::{ExposeSecret, Secret},
    serenity::{Client, gateway::ShardManager},
    tokio::task::JoinHandle,
    tracing::{info, warn},
};

use ebb_channels::{Error, MessageSink, Result};

use crate::handler::DiscordHandler;

/// A running gateway client whose events feed a [`MessageSink`].
pub struct DiscordGateway {
    shard_manager: Arc<ShardManager>,
    task: JoinHandle<()>,
}

impl DiscordGateway {
    /// Connect to the gateway in a background task.
    pub async fn connect(token: &Secret<String>, sink: Arc<dyn MessageSink>) -> Result<Self> {
        let mut client = Client::builder(token.expose_secret(), DiscordHandler::intents())
            .event_handler(DiscordHandler::new(sink))
            .await
            .map_err(|e| Error::external("build discord client", e))?;
        let shard_manager = Arc::clone(&client.shard_manager);

        let task = tokio::spawn(async move {
            if let Err(e) = client.start().await {
                warn!(error = %e, "discord gateway exited");
            }
        });
        info!("discord gateway connecting");

        Ok(Self {
            shard_manager,
            task,
        })
    }

    pub async fn shutdown(self) {
        self.shard_manager.shutdown_all().await;
        if let Err(e) = self.task.await {
            warn!(error = %e, "discord gateway task failed");
        }
        info!("discord gateway closed");
    }
}
