//! # Null-chain
//!
//! A deterministic, single-node substitute for the consensus engine, with a
//! record/replay log that reproduces block histories bit for bit.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   POST /api/v1/forwardtime   ┌──────────────┐
//! │              │   POST /api/v1/transactions  │              │
//! │   clients    │ ───────────────────────────► │  HTTP server │
//! └──────┬───────┘                              └──────┬───────┘
//!        │ send_transaction                            │ forward_time
//! ┌──────▼─────────────────────────────────────────────▼───────┐
//! │                        NullChain                           │
//! │   pending txs  │  virtual clock  │  block height           │
//! └──────┬──────────────────────────────────────┬──────────────┘
//!        │ BeginBlock/DeliverTx/EndBlock/Commit │ BlockRecord
//! ┌──────▼───────┐                       ┌──────▼───────┐
//! │ Application  │                       │   Replayer   │ ─► blocks.ndjson
//! └──────────────┘                       └──────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - Blocks are produced under one lock, in arrival order
//! - Height and virtual time only move forward
//! - Replay verifies every recorded commit hash; a mismatch is fatal
//! - A block interrupted by a panic is still flushed to the log

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod driver;
pub mod error;
pub mod genesis;
pub mod journal;
pub mod replay;
pub mod server;

pub use config::{Config, NodeConfig, Provider, ReplayConfig};
pub use driver::{block_hash, ChainStatus, Clock, NullChain, SystemClock};
pub use error::{Error, Result};
pub use genesis::NullGenesis;
pub use journal::TxJournal;
pub use replay::{BlockRecord, Replayed, Replayer};
