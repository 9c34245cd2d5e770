//! Error types for transaction decoding

use thiserror::Error;

/// Protocol result type
pub type Result<T> = std::result::Result<T, Error>;

/// Protocol errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Raw bytes are not a well-formed envelope
    #[error("Malformed transaction: {0}")]
    Malformed(String),

    /// Envelope version not understood by this codec
    #[error("Unsupported transaction version: {0}")]
    UnsupportedVersion(u32),

    /// Command tag not part of the enumeration
    #[error("Unknown command tag: {0:#04x}")]
    UnknownCommand(u8),

    /// Public key has the wrong length or is not a curve point
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Signature bytes cannot be parsed
    #[error("Invalid signature encoding: {0}")]
    InvalidSignature(String),

    /// Signature does not verify for this chain and payload
    #[error("Signature verification failed")]
    SignatureMismatch,

    /// Encoding an envelope failed
    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Malformed(err.to_string())
    }
}
