//! Lifecycle trait driven by a consensus engine
//!
//! ```text
//! Info ─► InitChain ─► ┌ BeginBlock ─► DeliverTx* ─► EndBlock ─► Commit ┐
//!                      └──────────────────────◄───────────────────────────┘
//!          CheckTx may arrive at any time between the calls above
//! ```
//!
//! Implemented by the command router and driven either by the ABCI socket
//! adapter or by a local null-chain.

use crate::types::*;
use crate::Result;

/// Deterministic application interface
pub trait Application: Send + Sync + 'static {
    /// Last committed height and hash
    fn info(&self) -> ResponseInfo;

    /// Called once before the first block unless resuming from a snapshot.
    ///
    /// An error is process-fatal.
    fn init_chain(&self, request: RequestInitChain) -> Result<ResponseInitChain>;

    /// Start a block
    fn begin_block(&self, request: RequestBeginBlock);

    /// Mempool admission
    fn check_tx(&self, request: RequestCheckTx) -> ResponseCheckTx;

    /// Block execution
    fn deliver_tx(&self, request: RequestDeliverTx) -> ResponseDeliverTx;

    /// End a block
    fn end_block(&self, request: RequestEndBlock) -> ResponseEndBlock;

    /// Commit the block and return its state commitment
    fn commit(&self) -> ResponseCommit;

    /// Available snapshots
    fn list_snapshots(&self) -> Vec<Snapshot> {
        Vec::new()
    }

    /// Snapshot offered by a peer
    fn offer_snapshot(&self, _request: RequestOfferSnapshot) -> ResponseOfferSnapshot {
        ResponseOfferSnapshot::default()
    }

    /// Serve a chunk to a peer
    fn load_snapshot_chunk(&self, _request: RequestLoadSnapshotChunk) -> ResponseLoadSnapshotChunk {
        ResponseLoadSnapshotChunk::default()
    }

    /// Apply a chunk received from a peer
    fn apply_snapshot_chunk(
        &self,
        _request: RequestApplySnapshotChunk,
    ) -> ResponseApplySnapshotChunk {
        ResponseApplySnapshotChunk::default()
    }
}
