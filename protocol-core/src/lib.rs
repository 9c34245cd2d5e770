//! # Trading Chain Protocol Core
//!
//! The transaction contract shared by every layer above it:
//! - `Command`: closed byte-tag enumeration, one tag per transaction kind
//! - `CommandPayload`: tagged union of concrete command messages
//! - `Tx`: immutable decoded envelope (submitter, hash, signature, TTL, PoW)
//! - `Codec`: pure `(raw bytes, chain ID) -> Tx` decoding
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   raw tx bytes  │ ← from the consensus engine
//! └────────┬────────┘
//!          │ Codec::decode(raw, chain_id)
//! ┌────────▼────────┐
//! │ SignedTransaction│ ← envelope + ed25519 verification
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │       Tx        │ ← command tag, payload, attributes
//! └─────────────────┘
//! ```
//!
//! ## Safety
//!
//! - `#![forbid(unsafe_code)]`: No unsafe operations
//! - Decoding is bounded (`MAX_TX_BYTES`) and rejects trailing bytes
//! - Signatures are bound to the chain ID

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    unused_qualifications,
    clippy::all
)]

pub mod codec;
pub mod command;
pub mod error;
pub mod payload;
pub mod tx;

pub use codec::{sign, Codec, EnvelopeCodec, SignedTransaction, TxSignature};
pub use command::Command;
pub use error::{Error, Result};
pub use payload::{CommandPayload, TxAttributes};
pub use tx::{InputData, ProofOfWork, Tx};
