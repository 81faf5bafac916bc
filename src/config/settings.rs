use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::bot::account::{to_user_id, BotAccount};

/// Prefix for per-account password environment overrides.
const PASSWORD_ENV_PREFIX: &str = "RINGSIDE_PASS_";

/// Configuration failure at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("account {name} has no password; set it in the config or via {env_key}")]
    MissingPassword { name: String, env_key: String },

    #[error("at least two accounts are required, found {0}")]
    NotEnoughAccounts(usize),
}

/// Server endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Simulator host for the WebSocket connection.
    pub host: String,
    pub port: u16,
    pub tls: bool,
    /// Fixed path prefix in front of the random entry segments.
    pub ws_path: String,
    /// HTTP endpoint for the login exchange.
    pub login_url: String,
    /// Base URL that session URLs are built from.
    pub client_base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "sim3.psim.us".into(),
            port: 443,
            tls: true,
            ws_path: "/showdown".into(),
            login_url: "https://play.pokemonshowdown.com/action.php".into(),
            client_base_url: "https://play.pokemonshowdown.com".into(),
        }
    }
}

/// One bot account entry.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub name: String,
    /// Credential; may instead come from `RINGSIDE_PASS_<USERID>`.
    #[serde(default)]
    pub password: Option<String>,
}

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub accounts: Vec<AccountConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// Resolve the configured accounts into login identities.
    ///
    /// An environment variable `RINGSIDE_PASS_<USERID>` (user id
    /// uppercased) overrides the password from the file, so credentials
    /// need not live on disk.
    pub fn bot_accounts(&self) -> Result<Vec<BotAccount>, ConfigError> {
        if self.accounts.len() < 2 {
            return Err(ConfigError::NotEnoughAccounts(self.accounts.len()));
        }
        self.accounts
            .iter()
            .map(|account| {
                let env_key = format!(
                    "{PASSWORD_ENV_PREFIX}{}",
                    to_user_id(&account.name).to_uppercase()
                );
                let password = std::env::var(&env_key)
                    .ok()
                    .or_else(|| account.password.clone())
                    .ok_or_else(|| ConfigError::MissingPassword {
                        name: account.name.clone(),
                        env_key,
                    })?;
                Ok(BotAccount::new(account.name.clone(), password))
            })
            .collect()
    }
}
