use std::path::{Path, PathBuf};

use {secrecy::Secret, tracing::debug};

use crate::{
    Error, Result,
    env_subst::substitute_env,
    error::Context,
    schema::EbbConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["ebb.toml", "ebb.yaml", "ebb.yml", "ebb.json"];

/// Env var that overrides `discord.token`.
pub const TOKEN_ENV: &str = "EBB_DISCORD_TOKEN";

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<EbbConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    if let Some(p) = CONFIG_FILENAMES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
    {
        return Some(p);
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/ebb/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "ebb").map(|d| d.config_dir().to_path_buf())
}

/// Apply environment overrides on top of a loaded config.
pub fn apply_env_overrides(config: &mut EbbConfig) {
    apply_env_overrides_with(config, |name| std::env::var(name).ok());
}

fn apply_env_overrides_with(config: &mut EbbConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(token) = lookup(TOKEN_ENV).filter(|t| !t.trim().is_empty()) {
        debug!(var = TOKEN_ENV, "discord token taken from environment");
        config.discord.token = Secret::new(token);
    }
}

pub(crate) fn parse_config(raw: &str, path: &Path) -> Result<EbbConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    let parsed: Result<EbbConfig> = match ext {
        "toml" => toml::from_str(raw).map_err(Error::from),
        "yaml" | "yml" => serde_yaml::from_str(raw).map_err(Error::from),
        "json" => serde_json::from_str(raw).map_err(Error::from),
        _ => Err(Error::UnsupportedFormat {
            extension: ext.to_string(),
        }),
    };
    parsed.with_context(|| format!("parsing {}", path.display()))
}
