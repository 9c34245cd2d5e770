//! Configuration for the null-chain and the node binary

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Null-chain configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Virtual time between consecutive blocks
    #[serde(with = "humantime_serde")]
    pub block_duration: Duration,

    /// Pending transactions that trigger a block
    pub transactions_per_block: usize,

    /// Genesis document
    pub genesis_file: PathBuf,

    /// Listen address of the time-forward endpoint
    pub http_addr: String,

    /// Record and replay
    pub replay: ReplayConfig,
}

/// Record/replay configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Append every produced block to the log
    pub record: bool,

    /// Re-drive the logged blocks at startup
    pub replay: bool,

    /// Replay log (newline-delimited JSON)
    pub replay_file: Option<PathBuf>,
}

impl ReplayConfig {
    /// Whether a replay log is needed at all
    pub fn enabled(&self) -> bool {
        self.record || self.replay
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            block_duration: Duration::from_secs(1),
            transactions_per_block: 10,
            genesis_file: PathBuf::from("./genesis.json"),
            http_addr: "0.0.0.0:3101".to_string(),
            replay: ReplayConfig::default(),
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(duration) = std::env::var("NULLCHAIN_BLOCK_DURATION") {
            config.block_duration = humantime::parse_duration(&duration)
                .map_err(|e| crate::Error::Config(format!("Invalid block duration: {}", e)))?;
        }

        if let Ok(count) = std::env::var("NULLCHAIN_TRANSACTIONS_PER_BLOCK") {
            config.transactions_per_block = count.parse().map_err(|e| {
                crate::Error::Config(format!("Invalid transactions per block: {}", e))
            })?;
        }

        if let Ok(path) = std::env::var("NULLCHAIN_GENESIS_FILE") {
            config.genesis_file = PathBuf::from(path);
        }

        if let Ok(addr) = std::env::var("NULLCHAIN_HTTP_ADDR") {
            config.http_addr = addr;
        }

        if let Ok(path) = std::env::var("NULLCHAIN_REPLAY_FILE") {
            config.replay.replay_file = Some(PathBuf::from(path));
        }

        config.replay.record |= env_flag("NULLCHAIN_RECORD");
        config.replay.replay |= env_flag("NULLCHAIN_REPLAY");

        Ok(config)
    }

    /// Reject settings the driver cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.block_duration.is_zero() {
            return Err(crate::Error::Config(
                "block duration must be positive".to_string(),
            ));
        }
        if self.transactions_per_block == 0 {
            return Err(crate::Error::Config(
                "transactions per block must be positive".to_string(),
            ));
        }
        if self.replay.enabled() && self.replay.replay_file.is_none() {
            return Err(crate::Error::ReplayFileRequired);
        }
        Ok(())
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Block source of the node binary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Local null-chain
    #[default]
    Null,
    /// External engine over the ABCI socket
    Abci,
}

/// Node binary configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Block source
    pub provider: Provider,

    /// Router settings
    pub consensus: consensus::Config,

    /// Null-chain settings
    pub nullchain: Config,
}

impl NodeConfig {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let provider = match std::env::var("TRADECHAIN_PROVIDER").as_deref() {
            Ok("abci") => Provider::Abci,
            Ok("null") | Err(_) => Provider::Null,
            Ok(other) => {
                return Err(crate::Error::Config(format!("Unknown provider: {}", other)))
            }
        };

        Ok(Self {
            provider,
            consensus: consensus::Config::from_env()?,
            nullchain: Config::from_env()?,
        })
    }
}
