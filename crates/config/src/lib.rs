//! Configuration loading, validation, and env substitution.
//!
//! Config files: `ebb.toml`, `ebb.yaml`, or `ebb.json`
//! Searched in `./` then `~/.config/ebb/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod duration;
pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    duration::parse_duration_ms,
    error::{Error, Result},
    loader::{apply_env_overrides, config_dir, find_config_file, load_config},
    schema::{DiscordConfig, EbbConfig, LifetimeConfig, RetentionConfig},
    validate::{Diagnostic, Severity, ValidationResult},
};
