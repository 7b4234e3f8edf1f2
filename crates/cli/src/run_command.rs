use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    anyhow::{Context, Result, bail},
    ebb_config::{
        EbbConfig, apply_env_overrides, find_config_file, load_config, loader::TOKEN_ENV,
    },
    ebb_discord::{DiscordChannels, DiscordGateway},
    ebb_retention::RetentionEngine,
    secrecy::ExposeSecret,
    serenity::http::Http,
    tracing::info,
};

/// A config file that exists but does not load is fatal here, whether it
/// was named on the command line or discovered.
fn load(path: Option<PathBuf>) -> Result<EbbConfig> {
    let mut config = match path {
        Some(path) => {
            load_config(&path).with_context(|| format!("loading {}", path.display()))?
        },
        None => {
            info!("no config file found, using defaults");
            EbbConfig::default()
        },
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

fn guild_ids(config: &EbbConfig) -> Result<Vec<u64>> {
    config
        .discord
        .guild_ids
        .iter()
        .map(|id| {
            id.trim()
                .parse::<u64>()
                .with_context(|| format!("invalid guild id {id:?}"))
        })
        .collect()
}

/// Connect, run until Ctrl-C, then stop the engine before the gateway.
pub async fn run(path: Option<&Path>) -> Result<()> {
    let config = load(path.map(Path::to_path_buf).or_else(find_config_file))?;
    if !config.discord.has_token() {
        bail!("no discord token configured; set discord.token or {TOKEN_ENV}");
    }
    if !config.retention.enabled {
        info!("retention disabled in config, nothing to do");
        return Ok(());
    }

    let http = Arc::new(Http::new(config.discord.token.expose_secret()));
    let channels = Arc::new(DiscordChannels::new(http, guild_ids(&config)?));
    let engine = RetentionEngine::build(&config, channels.as_ref(), channels.clone()).await?;
    let gateway = DiscordGateway::connect(&config.discord.token, engine.sink()).await?;

    engine.start().await;
    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;
    info!("shutting down");

    engine.stop().await;
    gateway.shutdown().await;

    let status = engine.status().await;
    info!(
        deleted = status.stats.deleted_count,
        attempted = status.stats.delete_attempted_count,
        errors = status.stats.error_count,
        pending = status.pending,
        in_flight = status.in_flight,
        "retention stopped"
    );
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guild_ids_must_be_numeric() {
        let mut config = EbbConfig::default();
        config.discord.guild_ids = vec!["12".into(), " 34 ".into()];
        assert_eq!(guild_ids(&config).unwrap(), vec![12, 34]);

        config.discord.guild_ids.push("main".into());
        assert!(guild_ids(&config).is_err());
    }

    #[test]
    fn unparsable_config_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ebb.toml");
        std::fs::write(&path, "[retention\nbatch_size = 1\n").unwrap();

        let err = load(Some(path)).unwrap_err();
        assert!(err.to_string().contains("loading"), "{err:#}");
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let config = load(None).unwrap();
        assert!(config.retention.enabled);
        assert!(config.channel_mapping.is_empty());
    }

    #[tokio::test]
    async fn missing_token_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ebb.toml");
        std::fs::write(&path, "[retention.lifetime]\nhours = 1\n").unwrap();
        if std::env::var(TOKEN_ENV).is_ok() {
            return;
        }
        let err = run(Some(&path)).await.unwrap_err();
        assert!(err.to_string().contains("no discord token"));
    }
}
