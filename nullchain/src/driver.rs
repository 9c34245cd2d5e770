//! Null-chain driver
//!
//! A deterministic stand-in for the consensus engine. Transactions are
//! buffered locally and delivered in arrival order once a block is full, or
//! when virtual time is forwarded.
//!
//! ```text
//!  send_transaction ──► pending ──(full)──┐
//!  forward_time(d) ──► floor(d / duration) ┤
//!                                          ▼
//!     BeginBlock(height, now) ─► DeliverTx* ─► EndBlock ─► Commit
//!                                          │
//!                       height += 1, now += block_duration
//! ```
//!
//! One lock guards the clock, the height and the pending buffer, and blocks
//! are produced inside it: the caller that fills the last slot pays for the
//! block.

use crate::config::Config;
use crate::genesis::NullGenesis;
use crate::replay::Replayer;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use consensus::{
    Application, RequestBeginBlock, RequestCheckTx, RequestDeliverTx, RequestEndBlock,
    RequestInitChain, ResponseCheckTx, ValidatorUpdate,
};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Source of external wall-clock time
pub trait Clock: Send + Sync {
    /// Current time
    fn now(&self) -> DateTime<Utc>;
}

/// System wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Block hash of the null-chain.
///
/// SHA-256 of the decimal string of `height + unix nanos`. A reproducible
/// tag for replay comparison, not a commitment to any state.
pub fn block_hash(height: u64, time: DateTime<Utc>) -> Vec<u8> {
    let nanos = time.timestamp_nanos_opt().unwrap_or(i64::MAX);
    let tag = i128::from(height) + i128::from(nanos);
    Sha256::digest(tag.to_string().as_bytes()).to_vec()
}

/// Height and virtual time of the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainStatus {
    /// Last committed height
    pub height: u64,
    /// Time the next block will carry
    pub time: DateTime<Utc>,
}

struct ChainState {
    now: DateTime<Utc>,
    height: u64,
    pending: Vec<Vec<u8>>,
    replayer: Option<Replayer>,
}

/// Deterministic local block producer
pub struct NullChain {
    app: Arc<dyn Application>,
    clock: Arc<dyn Clock>,
    block_duration: Duration,
    transactions_per_block: usize,
    replay: bool,
    chain_id: String,
    genesis_time: DateTime<Utc>,
    app_state: Vec<u8>,
    validators: Vec<ValidatorUpdate>,
    replaying: AtomicBool,
    state: Mutex<ChainState>,
}

impl std::fmt::Debug for NullChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NullChain")
            .field("chain_id", &self.chain_id)
            .field("block_duration", &self.block_duration)
            .field("transactions_per_block", &self.transactions_per_block)
            .finish_non_exhaustive()
    }
}

impl NullChain {
    /// Create a driver for `app`.
    ///
    /// Opens the replay log when recording or replay is configured. Missing
    /// genesis fields default to the clock's time and a random chain ID.
    pub fn new(
        config: &Config,
        genesis: NullGenesis,
        app: Arc<dyn Application>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let replayer = match (&config.replay.replay_file, config.replay.enabled()) {
            (Some(path), true) => Some(Replayer::open(path, config.replay.replay)?),
            (None, true) => return Err(Error::ReplayFileRequired),
            (_, false) => None,
        };

        let genesis_time = genesis.genesis_time.unwrap_or_else(|| clock.now());
        let chain_id = genesis
            .chain_id
            .unwrap_or_else(|| format!("testnet-{}", uuid::Uuid::new_v4().simple()));

        Ok(Self {
            app,
            clock,
            block_duration: config.block_duration,
            transactions_per_block: config.transactions_per_block,
            replay: config.replay.replay,
            chain_id,
            genesis_time,
            app_state: genesis.app_state,
            validators: genesis.validators,
            replaying: AtomicBool::new(false),
            state: Mutex::new(ChainState {
                now: genesis_time,
                height: 1,
                pending: Vec::new(),
                replayer,
            }),
        })
    }

    /// Bring the application to the head of the chain.
    ///
    /// A fresh application gets InitChain. An application restored from a
    /// snapshot resumes at the next height with the clock one block ahead of
    /// wall-clock time. With replay enabled the logged blocks are re-driven
    /// before any transaction is accepted.
    pub fn start(&self) -> Result<()> {
        let info = self.app.info();
        let mut state = self.state.lock();

        if info.last_block_height > 0 {
            state.height = info.last_block_height + 1;
            state.now = self.clock.now() + self.block_duration;
            info!(
                height = info.last_block_height,
                "application restored from snapshot, skipping InitChain"
            );
        } else {
            info!(chain_id = %self.chain_id, validators = self.validators.len(), "InitChain");
            self.app.init_chain(RequestInitChain {
                chain_id: self.chain_id.clone(),
                time: self.genesis_time,
                validators: self.validators.clone(),
                app_state_bytes: self.app_state.clone(),
                initial_height: 1,
            })?;
            state.height = 1;
            state.now = self.genesis_time;
        }

        if self.replay {
            self.replaying.store(true, Ordering::SeqCst);
            let result = match state.replayer.as_mut() {
                Some(replayer) => {
                    replayer.replay_chain(self.app.as_ref(), info.last_block_height + 1, &self.chain_id)
                }
                None => Err(Error::ReplayFileRequired),
            };
            self.replaying.store(false, Ordering::SeqCst);

            if let Some(replayed) = result? {
                if replayed.height >= state.height {
                    state.height = replayed.height + 1;
                    state.now = replayed.time + self.block_duration;
                }
            }
        }

        info!(height = state.height, time = %state.now, "null-chain started");
        Ok(())
    }

    /// Flush the replay log and release it
    pub fn stop(&self) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(mut replayer) = state.replayer.take() {
            replayer.close()?;
        }
        info!("null-chain stopped");
        Ok(())
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Queue a transaction and return its SHA-256.
    ///
    /// Produces a block inside this call when the transaction fills it.
    pub fn send_transaction_sync(&self, tx: Vec<u8>) -> Result<[u8; 32]> {
        if self.is_replaying() {
            return Err(Error::ChainReplaying);
        }

        let hash: [u8; 32] = Sha256::digest(&tx).into();
        let mut state = self.state.lock();
        state.pending.push(tx);
        debug!(tx = %hex::encode(hash), pending = state.pending.len(), "queued transaction");

        if state.pending.len() >= self.transactions_per_block {
            self.produce_block(&mut state)?;
        }
        Ok(hash)
    }

    /// Same as [`send_transaction_sync`](Self::send_transaction_sync)
    pub fn send_transaction_async(&self, tx: Vec<u8>) -> Result<[u8; 32]> {
        self.send_transaction_sync(tx)
    }

    /// Run mempool admission without queueing
    pub fn check_transaction(&self, tx: Vec<u8>) -> ResponseCheckTx {
        self.app.check_tx(RequestCheckTx { tx })
    }

    /// Produce `floor(d / block_duration)` blocks, full or not.
    ///
    /// Returns the number of blocks produced. Shorter spans do nothing and
    /// leave the pending buffer untouched.
    pub fn forward_time(&self, d: Duration) -> Result<u64> {
        if self.is_replaying() {
            return Err(Error::ChainReplaying);
        }

        let blocks = u64::try_from(d.as_nanos() / self.block_duration.as_nanos()).unwrap_or(u64::MAX);
        if blocks == 0 {
            info!(forward = ?d, block_duration = ?self.block_duration, "time forward shorter than one block");
            return Ok(0);
        }

        info!(forward = ?d, blocks, "forwarding time");
        let mut state = self.state.lock();
        for _ in 0..blocks {
            self.produce_block(&mut state)?;
        }
        Ok(blocks)
    }

    fn produce_block(&self, state: &mut ChainState) -> Result<()> {
        let height = state.height;
        let now = state.now;
        let txs = std::mem::take(&mut state.pending);

        if let Some(replayer) = state.replayer.as_mut() {
            replayer.begin_block(height, now);
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.app.begin_block(RequestBeginBlock {
                height,
                time: now,
                hash: block_hash(height, now),
                chain_id: self.chain_id.clone(),
            });
            for tx in &txs {
                if let Some(replayer) = state.replayer.as_mut() {
                    replayer.deliver_tx(tx);
                }
                self.app.deliver_tx(RequestDeliverTx { tx: tx.clone() });
            }
            self.app.end_block(RequestEndBlock { height });
            self.app.commit()
        }));

        let commit = match outcome {
            Ok(commit) => commit,
            Err(panic) => {
                error!(height, "panic while producing block");
                if let Some(replayer) = state.replayer.as_mut() {
                    if let Err(e) = replayer.flush_tail() {
                        error!(error = %e, "failed to flush interrupted block");
                    }
                }
                panic::resume_unwind(panic);
            }
        };

        if let Some(replayer) = state.replayer.as_mut() {
            replayer.commit(&commit.data)?;
        }

        state.height += 1;
        state.now = now + self.block_duration;
        debug!(height, txs = txs.len(), "produced block");
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Transactions waiting for a block
    pub fn get_unconfirmed_tx_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Chain identifier
    pub fn get_chain_id(&self) -> &str {
        &self.chain_id
    }

    /// Genesis time
    pub fn get_genesis_time(&self) -> DateTime<Utc> {
        self.genesis_time
    }

    /// Last committed height and current virtual time
    pub fn get_status(&self) -> ChainStatus {
        let state = self.state.lock();
        ChainStatus {
            height: state.height.saturating_sub(1),
            time: state.now,
        }
    }

    /// Current virtual time
    pub fn now(&self) -> DateTime<Utc> {
        self.state.lock().now
    }

    /// Genesis validator set
    pub fn validators(&self) -> &[ValidatorUpdate] {
        &self.validators
    }

    /// Whether the driver accepts transactions
    pub fn health(&self) -> bool {
        !self.is_replaying()
    }

    /// Whether historical blocks are being re-driven
    pub fn is_replaying(&self) -> bool {
        self.replaying.load(Ordering::SeqCst)
    }
}
