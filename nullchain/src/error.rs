//! Error types for the null-chain

use thiserror::Error;

/// Result type for null-chain operations
pub type Result<T> = std::result::Result<T, Error>;

/// Null-chain errors
#[derive(Error, Debug)]
pub enum Error {
    /// Historical blocks are still being replayed
    #[error("chain is replaying")]
    ChainReplaying,

    /// Replayed block produced a different commit hash
    #[error("state divergence at height {height}: recorded {expected}, got {actual}")]
    StateDivergence {
        /// Block height
        height: u64,
        /// Hash in the replay log (hex)
        expected: String,
        /// Hash produced now (hex)
        actual: String,
    },

    /// Replay log ends before the application's state
    #[error("insufficient replay data: log ends at height {last}, application is at {required}")]
    InsufficientReplayData {
        /// Last height in the log
        last: u64,
        /// Height the application restored
        required: u64,
    },

    /// Record or replay requested without a log file
    #[error("replay file required when record or replay is enabled")]
    ReplayFileRequired,

    /// Malformed genesis file
    #[error("Invalid genesis: {0}")]
    Genesis(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Application error
    #[error("Application error: {0}")]
    Application(#[from] consensus::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Replay log encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
