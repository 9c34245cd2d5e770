//! Configuration for the command router and its ABCI endpoint

use crate::cache::DEFAULT_TX_CACHE_CAPACITY;
use security::RateLimiterConfig;
use serde::{Deserialize, Serialize};

/// Consensus configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// ABCI listen address
    pub abci_addr: String,

    /// Validated-transaction cache capacity
    pub tx_cache_capacity: usize,

    /// CheckTx rate limiting
    pub rate_limit: RateLimiterConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            abci_addr: "127.0.0.1:26658".to_string(),
            tx_cache_capacity: DEFAULT_TX_CACHE_CAPACITY,
            rate_limit: RateLimiterConfig::default(),
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(addr) = std::env::var("CONSENSUS_ABCI_ADDR") {
            config.abci_addr = addr;
        }

        if let Ok(capacity) = std::env::var("CONSENSUS_TX_CACHE_CAPACITY") {
            config.tx_cache_capacity = parse_env("CONSENSUS_TX_CACHE_CAPACITY", &capacity)?;
        }

        if let Ok(requests) = std::env::var("CONSENSUS_RATE_LIMIT_REQUESTS") {
            config.rate_limit.requests = parse_env("CONSENSUS_RATE_LIMIT_REQUESTS", &requests)?;
        }

        if let Ok(window) = std::env::var("CONSENSUS_RATE_LIMIT_WINDOW_BLOCKS") {
            config.rate_limit.window_blocks =
                parse_env("CONSENSUS_RATE_LIMIT_WINDOW_BLOCKS", &window)?;
        }

        Ok(config)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> crate::Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| crate::Error::Config(format!("Invalid {}: {}", name, e)))
}
