//! Runtime configuration read from the environment.

use std::path::PathBuf;

use thiserror::Error;

use crate::permissions::RoleIds;
use crate::types::Snowflake;

pub const DEFAULT_DATABASE_PATH: &str = "./data.sqlite";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("DISCORD_TOKEN is not set")]
    MissingToken,
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub token: String,
    pub database_path: PathBuf,
    /// Register slash commands on this guild only (instant updates while
    /// developing) instead of globally.
    pub command_guild_id: Option<Snowflake>,
    pub role_ids: RoleIds,
}

impl BotConfig {
    /// Load from the process environment, reading `.env` first if present.
    #[cfg(feature = "io")]
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let token = var("DISCORD_TOKEN").ok_or(ConfigError::MissingToken)?;
        let database_path = var("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH));

        Ok(Self {
            token,
            database_path,
            command_guild_id: var("COMMAND_GUILD_ID"),
            role_ids: RoleIds {
                owner: var("OWNER_ROLE_ID"),
                admin: var("ADMIN_ROLE_ID"),
                moderator: var("MODERATOR_ROLE_ID"),
                staff: var("STAFF_ROLE_ID"),
                helper: var("HELPER_ROLE_ID"),
            },
        })
    }
}
