//! Command router for the trading chain
//!
//! Implements the consensus engine lifecycle and routes decoded transactions
//! to per-command handlers registered by the embedder.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │       CometBFT (ABCI socket)  │  Null-chain driver   │
//! └────────────────────┬────────────────────────────────┘
//!                      │ Application trait
//!                      ↓
//! ┌─────────────────────────────────────────────────────┐
//! │                  App (router)                        │
//! │  Codec → TxCache → admission → handlers → events     │
//! └────────────────────┬────────────────────────────────┘
//!                      │ hooks
//!                      ↓
//! ┌─────────────────────────────────────────────────────┐
//! │     Embedder: business state, commit hash, snapshots │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Lifecycle
//!
//! - **Info**: last committed height and hash
//! - **InitChain**: genesis network state, validator set
//! - **BeginBlock**: block context, advances the admission windows
//! - **CheckTx**: mempool admission, caches the decoded transaction
//! - **DeliverTx**: block execution, consumes the cached transaction
//! - **EndBlock / Commit**: block boundary and state commitment
//!
//! # Determinism
//!
//! - Rate limits and replay windows tick on blocks, never on wall-clock time
//! - Every admitted transaction is decoded at most once
//! - Delivery state becomes visible to admission only after Commit

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod abci;
pub mod application;
pub mod cache;
pub mod config;
pub mod error;
pub mod genesis;
pub mod server;
pub mod snapshot;
pub mod spam;
pub mod types;

// Re-exports
pub use abci::{tx_events, App};
pub use application::Application;
pub use cache::TxCache;
pub use config::Config;
pub use error::{Error, Result, TxError};
pub use genesis::{load_genesis_state, GenesisState};
pub use server::AbciServer;
pub use snapshot::{NoSnapshots, SnapshotEngine, SnapshotInfo};
pub use spam::{SpamPolicy, SpamRejection};
pub use types::*;
