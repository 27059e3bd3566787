//! Runtime configuration, read from the environment (and `.env` via the
//! binary).

use std::path::PathBuf;
use std::str::FromStr;

use crate::types::{is_snowflake, Snowflake};

pub const DEFAULT_DB_PATH: &str = "players.db";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),
    #[error("invalid {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Where slash commands are registered on READY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandScope {
    /// Application-wide. Slow to propagate.
    #[default]
    Global,
    /// Only the guilds in `DEV_GUILD_IDS`. Immediate.
    Guild,
}

impl FromStr for CommandScope {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "global" => Ok(CommandScope::Global),
            "guild" => Ok(CommandScope::Guild),
            other => Err(ConfigError::Invalid {
                var: "SLASH_COMMAND_MODE",
                reason: format!("expected `global` or `guild`, got `{other}`"),
            }),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct BotConfig {
    pub token: String,
    pub db_path: PathBuf,
    pub command_scope: CommandScope,
    pub dev_guild_ids: Vec<Snowflake>,
    /// Members holding any of these roles count as moderators.
    pub moderator_role_ids: Vec<Snowflake>,
}

impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("token", &"[redacted]")
            .field("db_path", &self.db_path)
            .field("command_scope", &self.command_scope)
            .field("dev_guild_ids", &self.dev_guild_ids)
            .field("moderator_role_ids", &self.moderator_role_ids)
            .finish()
    }
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. `from_env` passes `std::env::var`.
    pub fn from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = var("DISCORD_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::Missing("DISCORD_TOKEN"))?;

        let db_path = var("FISHING_DB_PATH")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));

        let command_scope = match var("SLASH_COMMAND_MODE") {
            Some(raw) if !raw.trim().is_empty() => raw.parse()?,
            _ => CommandScope::default(),
        };

        let dev_guild_ids = id_list("DEV_GUILD_IDS", var("DEV_GUILD_IDS"))?;
        if command_scope == CommandScope::Guild && dev_guild_ids.is_empty() {
            return Err(ConfigError::Invalid {
                var: "DEV_GUILD_IDS",
                reason: "guild command mode needs at least one guild ID".to_string(),
            });
        }

        Ok(Self {
            token,
            db_path,
            command_scope,
            dev_guild_ids,
            moderator_role_ids: id_list("MODERATOR_ROLE_IDS", var("MODERATOR_ROLE_IDS"))?,
        })
    }
}

/// Comma-separated snowflakes. Blank entries are skipped.
fn id_list(var: &'static str, raw: Option<String>) -> Result<Vec<Snowflake>, ConfigError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            if is_snowflake(s) {
                Ok(s.to_string())
            } else {
                Err(ConfigError::Invalid {
                    var,
                    reason: format!("`{s}` is not a Discord ID"),
                })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<BotConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        BotConfig::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn token_is_required() {
        assert_eq!(config(&[]), Err(ConfigError::Missing("DISCORD_TOKEN")));
        assert_eq!(
            config(&[("DISCORD_TOKEN", "  ")]),
            Err(ConfigError::Missing("DISCORD_TOKEN"))
        );
    }

    #[test]
    fn defaults() {
        let cfg = config(&[("DISCORD_TOKEN", "abc")]).unwrap();
        assert_eq!(cfg.db_path, PathBuf::from(DEFAULT_DB_PATH));
        assert_eq!(cfg.command_scope, CommandScope::Global);
        assert!(cfg.dev_guild_ids.is_empty());
        assert!(cfg.moderator_role_ids.is_empty());
    }

    #[test]
    fn parses_lists_and_scope() {
        let cfg = config(&[
            ("DISCORD_TOKEN", "abc"),
            ("FISHING_DB_PATH", "/data/fish.db"),
            ("SLASH_COMMAND_MODE", "Guild"),
            ("DEV_GUILD_IDS", "111, 222,"),
            ("MODERATOR_ROLE_IDS", "333"),
        ])
        .unwrap();
        assert_eq!(cfg.db_path, PathBuf::from("/data/fish.db"));
        assert_eq!(cfg.command_scope, CommandScope::Guild);
        assert_eq!(cfg.dev_guild_ids, ["111", "222"]);
        assert_eq!(cfg.moderator_role_ids, ["333"]);
    }

    #[test]
    fn guild_mode_without_guilds_is_rejected() {
        let err = config(&[("DISCORD_TOKEN", "abc"), ("SLASH_COMMAND_MODE", "guild")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "DEV_GUILD_IDS", .. }));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(config(&[("DISCORD_TOKEN", "abc"), ("SLASH_COMMAND_MODE", "both")]).is_err());
        assert!(config(&[("DISCORD_TOKEN", "abc"), ("MODERATOR_ROLE_IDS", "mods")]).is_err());
    }

    #[test]
    fn debug_hides_token() {
        let cfg = config(&[("DISCORD_TOKEN", "super-secret")]).unwrap();
        assert!(!format!("{cfg:?}").contains("super-secret"));
    }
}
