//! Admission control for the trading chain
//!
//! Deterministic filters the transaction router runs before a command
//! reaches its handler:
//! - Rate limiting per submitter over a sliding window of blocks
//! - Replay protection by declared block height and transaction hash
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Transaction Router                   │
//! │        CheckTx              │        DeliverTx       │
//! └──────────────┬──────────────┴───────────┬───────────┘
//!                ↓                          ↓
//! ┌─────────────────────────────────────────────────────┐
//! │                  Admission Layer                     │
//! │  Replay Protector (committed │ committed + pending)  │
//! │  Rate Limiter     (CheckTx only, validators exempt)  │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! Both filters are driven only by block boundaries, never by wall-clock
//! time, so every node reaches the same verdict for the same block sequence.
//!
//! # Usage
//!
//! ```rust
//! use security::{RateLimiter, RateLimiterConfig, ReplayProtector};
//!
//! let limiter = RateLimiter::new(RateLimiterConfig {
//!     requests: 2,
//!     window_blocks: 10,
//! });
//! assert!(limiter.allow("party"));
//! assert!(!limiter.allow("party"));
//! limiter.next_block();
//!
//! let mut replay = ReplayProtector::new(150);
//! replay.set_height(1);
//! assert!(replay.deliver_tx(1, &[0u8; 32]).is_ok());
//! assert!(replay.deliver_tx(1, &[0u8; 32]).is_err());
//! replay.commit();
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod rate_limiter;
pub mod replay_protector;

// Re-exports for convenience
pub use rate_limiter::{RateLimiter, RateLimiterConfig};
pub use replay_protector::{ReplayError, ReplayProtector, DEFAULT_REPLAY_TOLERANCE};
