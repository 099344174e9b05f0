//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every section is optional; missing keys fall back to the defaults below.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

use crate::engine::RetrievalStrategy;

/// Environment variable that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "TRADESTORE_CONFIG";

/// Default config file location.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub sweeper: SweeperConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    pub database_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://data/trade_store.db".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct IngestionConfig {
    #[serde(default)]
    pub strategy: RetrievalStrategy,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SweeperConfig {
    /// Pause between sweep ticks, in milliseconds.
    pub interval_millis: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_millis: 86_400_000, // 24 hours
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        if config.sweeper.interval_millis == 0 {
            anyhow::bail!("sweeper.interval_millis must be greater than zero");
        }
        Ok(config)
    }

    /// Config path from `TRADESTORE_CONFIG`, or `config.toml`.
    pub fn default_path() -> String {
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
    }
}
