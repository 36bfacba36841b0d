//! Application configuration

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Top-level application config: optional `config.toml` in the working
/// directory, overridden by `CHAT_TRADER_*` environment variables
/// (e.g. `CHAT_TRADER_EXCHANGE__API_KEY`).
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub exchange: ExchangeConfig,
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub llm: Option<LlmConfig>,
    #[serde(default)]
    pub dialog: DialogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    pub api_key: String,
    pub api_secret: String,
    /// Simulate orders instead of submitting them
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DialogConfig {
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    #[serde(default = "default_context_ttl_secs")]
    pub context_ttl_secs: u64,
}

impl Default for DialogConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            context_ttl_secs: default_context_ttl_secs(),
        }
    }
}

fn default_dry_run() -> bool {
    true
}

fn default_max_history() -> usize {
    20
}

fn default_context_ttl_secs() -> u64 {
    300
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_file("config")
    }

    pub fn from_file(name: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(name).required(false))
            .add_source(Environment::with_prefix("CHAT_TRADER").separator("__"));

        builder.build()?.try_deserialize()
    }
}
