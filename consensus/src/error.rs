//! Error types for consensus

use thiserror::Error;

/// Result type for consensus operations
pub type Result<T> = std::result::Result<T, Error>;

/// Consensus errors
#[derive(Error, Debug)]
pub enum Error {
    /// Genesis app state carries no `network` object
    #[error("no network genesis state")]
    NoNetworkGenesisState,

    /// Genesis app state could not be parsed
    #[error("Invalid genesis state: {0}")]
    Genesis(String),

    /// Embedder genesis hook rejected the app state
    #[error("InitChain hook failed: {0}")]
    InitChain(String),

    /// ABCI error
    #[error("ABCI error: {0}")]
    Abci(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Genesis(e.to_string())
    }
}

/// Business error returned by a transaction handler.
///
/// Rejects the transaction only; block processing continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxError {
    /// Command is invalid in the current state
    #[error("validation failed: {0}")]
    Validation(String),

    /// Command was applied in part
    #[error("partially processed: {0}")]
    PartialProcessing(String),

    /// Unexpected failure inside the handler
    #[error("internal error: {0}")]
    Internal(String),
}

impl TxError {
    /// Validation failure from any displayable reason
    pub fn validation(reason: impl std::fmt::Display) -> Self {
        TxError::Validation(reason.to_string())
    }

    /// Internal failure from any displayable reason
    pub fn internal(reason: impl std::fmt::Display) -> Self {
        TxError::Internal(reason.to_string())
    }
}
