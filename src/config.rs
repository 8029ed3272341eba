//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

use crate::strategy::rules::RuleTable;
use crate::types::AllocationRule;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub asset: AssetConfig,
    #[serde(default)]
    pub price_feed: PriceFeedConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// The volatile asset being rebalanced and its tier table.
#[derive(Debug, Deserialize, Clone)]
pub struct AssetConfig {
    /// Ticker shown to the user, e.g. "BTC".
    pub symbol: String,
    #[serde(default = "default_stable_symbol")]
    pub stable_symbol: String,
    /// CoinGecko coin id, e.g. "bitcoin".
    pub coingecko_id: String,
    /// Binance trading pair; defaults to `{symbol}USDT`.
    #[serde(default)]
    pub binance_pair: Option<String>,
    /// Decimal places used when showing volatile-asset quantities.
    #[serde(default = "default_display_decimals")]
    pub display_decimals: u32,
    /// Repair legacy tables (1-unit gaps, bottom tier above 0) on load.
    #[serde(default)]
    pub normalize_rules: bool,
    pub rules: Vec<AllocationRule>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Coingecko,
    Binance,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PriceFeedConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_vs_currency")]
    pub vs_currency: String,
    /// Suppliers tried in order until one returns a price.
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderKind>,
    /// Env var holding an optional CoinGecko demo API key.
    #[serde(default)]
    pub coingecko_api_key_env: Option<String>,
    #[serde(default)]
    pub coingecko_base_url: Option<String>,
    #[serde(default)]
    pub binance_base_url: Option<String>,
}

impl Default for PriceFeedConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            timeout_secs: default_timeout_secs(),
            vs_currency: default_vs_currency(),
            providers: default_providers(),
            coingecko_api_key_env: None,
            coingecko_base_url: None,
            binance_base_url: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_state_path")]
    pub state_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { state_path: default_state_path() }
    }
}

fn default_stable_symbol() -> String {
    "USDC".to_string()
}

fn default_display_decimals() -> u32 {
    4
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_vs_currency() -> String {
    "usd".to_string()
}

fn default_providers() -> Vec<ProviderKind> {
    vec![ProviderKind::Coingecko]
}

fn default_state_path() -> String {
    "portfolio_state.json".to_string()
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
        if config.price_feed.poll_interval_secs == 0 {
            anyhow::bail!("price_feed.poll_interval_secs must be greater than zero");
        }
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

impl AssetConfig {
    /// Build the validated tier table for this asset.
    pub fn rule_table(&self) -> Result<RuleTable> {
        let rules = self.rules.clone();
        let table = if self.normalize_rules {
            RuleTable::normalize(rules)
        } else {
            RuleTable::new(rules)
        };
        table.with_context(|| format!("Invalid allocation rules for {}", self.symbol))
    }

    pub fn binance_pair(&self) -> String {
        self.binance_pair
            .clone()
            .unwrap_or_else(|| format!("{}USDT", self.symbol.to_uppercase()))
    }
}
