//! Transaction journal
//!
//! The node binary has no business engines behind the router, so it accepts
//! every command and commits to the sequence of delivered transactions:
//!
//! ```text
//! root(h) = sha256(root(h-1) || height(h) || hash(tx1) || … || hash(txN))
//! ```
//!
//! The root is deterministic, which is all record and replay need.

use consensus::{App, BlockContext, TxContext};
use parking_lot::Mutex;
use protocol_core::{Command, Tx};
use sha2::{Digest, Sha256};
use std::sync::Arc;

#[derive(Debug, Default)]
struct JournalState {
    root: [u8; 32],
    block: Vec<[u8; 32]>,
    delivered: u64,
}

/// Rolling commitment over delivered transactions
#[derive(Debug, Default)]
pub struct TxJournal {
    state: Mutex<JournalState>,
}

impl TxJournal {
    /// Create empty journal
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register as the DeliverTx handler of every command and as the commit hook
    pub fn install(self: &Arc<Self>, app: &mut App) {
        for command in Command::ALL {
            let journal = Arc::clone(self);
            app.handle_deliver_tx(command, move |_: &TxContext, tx: &Tx| {
                journal.record(tx);
                Ok(())
            });
        }

        let journal = Arc::clone(self);
        app.on_commit(move |block: &BlockContext| journal.commit(block));
    }

    /// Add a delivered transaction to the current block
    pub fn record(&self, tx: &Tx) {
        let mut state = self.state.lock();
        state.block.push(*tx.hash());
        state.delivered += 1;
    }

    /// Fold the current block into the root and return it
    pub fn commit(&self, block: &BlockContext) -> Vec<u8> {
        let mut state = self.state.lock();
        let mut hasher = Sha256::new();
        hasher.update(state.root);
        hasher.update(block.height.to_be_bytes());
        for hash in state.block.drain(..) {
            hasher.update(hash);
        }
        state.root = hasher.finalize().into();
        state.root.to_vec()
    }

    /// Transactions delivered so far
    pub fn delivered(&self) -> u64 {
        self.state.lock().delivered
    }
}
