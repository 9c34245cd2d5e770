//! Replay protection
//!
//! Rejects transactions whose declared block height falls outside a tolerance
//! window around the current height, and transactions whose hash was already
//! delivered within that window.
//!
//! ```text
//!        stale            accepted heights           future
//!  ───────────────┼───────────────────────────────┼─────────────
//!            current - T        current       current + T
//! ```
//!
//! A delivered hash is remembered for as long as its transaction could still
//! pass the height check, that is until the chain moves past
//! `declared height + T`. Hashes delivered during the current block stay in a
//! pending set until commit, so `CheckTx` only ever observes committed state.

use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::debug;

/// Default tolerance in blocks
pub const DEFAULT_REPLAY_TOLERANCE: u64 = 150;

/// Replay protection rejections
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplayError {
    /// Declared height is older than the tolerance allows
    #[error("transaction built against block {tx_height} is stale at height {current}")]
    Stale {
        /// Declared height
        tx_height: u64,
        /// Current height
        current: u64,
    },

    /// Declared height is further ahead than the tolerance allows
    #[error("transaction built against block {tx_height} is too far ahead of height {current}")]
    Future {
        /// Declared height
        tx_height: u64,
        /// Current height
        current: u64,
    },

    /// Hash already seen inside the window
    #[error("transaction {0} already delivered")]
    AlreadyDelivered(String),
}

/// Height-window and duplicate-hash filter.
///
/// A tolerance of zero disables every check.
#[derive(Debug, Clone)]
pub struct ReplayProtector {
    tolerance: u64,
    height: u64,
    /// Committed hash -> last height its transaction is admissible at
    seen: HashMap<[u8; 32], u64>,
    /// Same entries indexed by expiry, for pruning
    expiries: BTreeMap<u64, Vec<[u8; 32]>>,
    pending: HashMap<[u8; 32], u64>,
}

impl ReplayProtector {
    /// Create protector with tolerance `T`
    pub fn new(tolerance: u64) -> Self {
        Self {
            tolerance,
            height: 0,
            seen: HashMap::new(),
            expiries: BTreeMap::new(),
            pending: HashMap::new(),
        }
    }

    /// Configured tolerance
    pub fn tolerance(&self) -> u64 {
        self.tolerance
    }

    /// Current height
    pub fn height(&self) -> u64 {
        self.height
    }

    /// Whether checks are enabled
    pub fn is_enabled(&self) -> bool {
        self.tolerance > 0
    }

    /// Committed hashes still remembered
    pub fn tracked(&self) -> usize {
        self.seen.len()
    }

    fn expiry(&self, tx_height: u64) -> u64 {
        tx_height.saturating_add(self.tolerance)
    }

    /// Move to a new block height.
    ///
    /// Hashes whose transactions are stale at `height` are forgotten: the
    /// height check alone rejects them from now on.
    pub fn set_height(&mut self, height: u64) {
        self.height = height;
        if !self.is_enabled() {
            return;
        }

        let live = self.expiries.split_off(&height);
        let expired = std::mem::replace(&mut self.expiries, live);
        let mut pruned = 0usize;
        for hash in expired.into_values().flatten() {
            self.seen.remove(&hash);
            pruned += 1;
        }
        if pruned > 0 {
            debug!(height, pruned, "replay window pruned");
        }
    }

    fn check_height(&self, tx_height: u64) -> Result<(), ReplayError> {
        if tx_height.saturating_add(self.tolerance) < self.height {
            return Err(ReplayError::Stale {
                tx_height,
                current: self.height,
            });
        }
        if tx_height > self.height.saturating_add(self.tolerance) {
            return Err(ReplayError::Future {
                tx_height,
                current: self.height,
            });
        }
        Ok(())
    }

    /// Admission check against committed state only
    pub fn check_tx(&self, tx_height: u64, hash: &[u8; 32]) -> Result<(), ReplayError> {
        if !self.is_enabled() {
            return Ok(());
        }
        self.check_height(tx_height)?;
        if self.seen.contains_key(hash) {
            return Err(ReplayError::AlreadyDelivered(hex::encode(hash)));
        }
        Ok(())
    }

    /// Execution check against committed and pending state.
    ///
    /// On success the hash is recorded as pending for the current block.
    pub fn deliver_tx(&mut self, tx_height: u64, hash: &[u8; 32]) -> Result<(), ReplayError> {
        if !self.is_enabled() {
            return Ok(());
        }
        self.check_height(tx_height)?;
        if self.seen.contains_key(hash) || self.pending.contains_key(hash) {
            return Err(ReplayError::AlreadyDelivered(hex::encode(hash)));
        }
        self.pending.insert(*hash, self.expiry(tx_height));
        Ok(())
    }

    /// Make the hashes delivered in this block visible to admission
    pub fn commit(&mut self) {
        if !self.is_enabled() {
            return;
        }
        debug!(height = self.height, hashes = self.pending.len(), "replay window commit");
        for (hash, expiry) in self.pending.drain() {
            self.seen.insert(hash, expiry);
            self.expiries.entry(expiry).or_default().push(hash);
        }
    }
}

impl Default for ReplayProtector {
    fn default() -> Self {
        Self::new(DEFAULT_REPLAY_TOLERANCE)
    }
}
