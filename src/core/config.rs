//! Environment-driven configuration
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0

use anyhow::{Context, Result};

/// Runtime configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Discord bot token (required).
    pub discord_token: String,
    /// When set, slash commands register against this guild only (instant,
    /// good for development) instead of globally.
    pub discord_guild_id: Option<String>,
    /// Path of the SQLite database file.
    pub database_path: String,
    /// Default log filter for env_logger.
    pub log_level: String,
}

impl Config {
    /// Load configuration from the environment (and `.env` via dotenvy,
    /// loaded by the caller).
    pub fn from_env() -> Result<Self> {
        let discord_token = std::env::var("DISCORD_TOKEN")
            .context("DISCORD_TOKEN must be set")?;

        let discord_guild_id = std::env::var("DISCORD_GUILD_ID")
            .ok()
            .filter(|s| !s.is_empty());

        let database_path =
            std::env::var("DATABASE_PATH").unwrap_or_else(|_| "chime.db".to_string());

        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            discord_token,
            discord_guild_id,
            database_path,
            log_level,
        })
    }
}
