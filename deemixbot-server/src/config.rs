// deemixbot-server/src/config.rs

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use deemixbot_common::error::Error;
use deemixbot_core::platforms::deezer::deemix::{DEFAULT_BITRATE, DEFAULT_DEEMIX_PATH};
use deemixbot_core::tasks::idle_reaper::{DEFAULT_PAUSE_TIMEOUT, DEFAULT_REAP_INTERVAL};

pub const TOKEN_ENV_VAR: &str = "DISCORD_TOKEN";

/// Contents of `config.json`. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub token: String,
    pub prefix: String,
    pub deemix_path: String,
    pub bitrate: String,
    pub search_limit: usize,
    /// Paused sessions older than this are stopped by the reaper.
    pub idle_timeout_secs: u64,
    pub reap_interval_secs: u64,
    /// How long shutdown waits for drivers to leave voice.
    pub shutdown_grace_secs: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            prefix: "?".to_string(),
            deemix_path: DEFAULT_DEEMIX_PATH.to_string(),
            bitrate: DEFAULT_BITRATE.to_string(),
            search_limit: 5,
            idle_timeout_secs: DEFAULT_PAUSE_TIMEOUT.as_secs(),
            reap_interval_secs: DEFAULT_REAP_INTERVAL.as_secs(),
            shutdown_grace_secs: 10,
        }
    }
}

impl BotConfig {
    /// Reads `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, Error> {
        if !path.exists() {
            warn!("Config file {} not found; using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config: BotConfig = serde_json::from_str(&raw)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Applies the command-line token, then `env_token` if the token is still empty.
    pub fn with_token_overrides(mut self, cli_token: Option<String>, env_token: Option<String>) -> Self {
        if let Some(token) = cli_token.filter(|t| !t.trim().is_empty()) {
            self.token = token;
        }
        if self.token.trim().is_empty() {
            if let Some(token) = env_token {
                self.token = token;
            }
        }
        self.token = self.token.trim().to_string();
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.token.is_empty() {
            return Err(Error::Config(format!(
                "no bot token: set \"token\" in the config file, pass --token or set {TOKEN_ENV_VAR}"
            )));
        }
        if self.prefix.is_empty() {
            return Err(Error::Config("prefix must not be empty".into()));
        }
        if self.search_limit == 0 {
            return Err(Error::Config("search_limit must be at least 1".into()));
        }
        if self.reap_interval_secs == 0 {
            return Err(Error::Config("reap_interval_secs must be at least 1".into()));
        }
        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"token": "abc", "prefix": "!"}"#).unwrap();

        let config = BotConfig::load(&path).unwrap();
        assert_eq!(config.token, "abc");
        assert_eq!(config.prefix, "!");
        assert_eq!(config.deemix_path, "deemix");
        assert_eq!(config.bitrate, "128");
        assert_eq!(config.search_limit, 5);
        assert_eq!(config.idle_timeout(), Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = BotConfig::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config, BotConfig::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ token: ").unwrap();
        assert!(matches!(BotConfig::load(&path), Err(Error::Json(_))));
    }

    #[test]
    fn token_precedence() {
        let from_cli = BotConfig::default()
            .with_token_overrides(Some("cli".into()), Some("env".into()));
        assert_eq!(from_cli.token, "cli");

        let from_env = BotConfig::default().with_token_overrides(None, Some(" env \n".into()));
        assert_eq!(from_env.token, "env");

        let file = BotConfig {
            token: "file".into(),
            ..BotConfig::default()
        };
        assert_eq!(file.with_token_overrides(None, Some("env".into())).token, "file");
    }

    #[test]
    fn empty_token_is_rejected() {
        let config = BotConfig::default().with_token_overrides(None, None);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
