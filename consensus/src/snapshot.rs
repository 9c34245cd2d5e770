//! State-sync passthrough
//!
//! The router holds no business state, so snapshot operations are forwarded
//! verbatim to an embedder supplied engine.

use crate::types::*;

/// Height and hash the snapshot engine restored, if any
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotInfo {
    /// Height of the loaded state
    pub height: u64,
    /// Hash of the loaded state
    pub hash: Vec<u8>,
}

/// Snapshot engine collaborator
pub trait SnapshotEngine: Send + Sync {
    /// State loaded at startup
    fn info(&self) -> SnapshotInfo;

    /// Local snapshots
    fn list(&self) -> Vec<Snapshot>;

    /// Judge a snapshot offered by a peer
    fn offer(&self, request: RequestOfferSnapshot) -> ResponseOfferSnapshot;

    /// Read a local chunk
    fn load_chunk(&self, request: RequestLoadSnapshotChunk) -> ResponseLoadSnapshotChunk;

    /// Apply a remote chunk
    fn apply_chunk(&self, request: RequestApplySnapshotChunk) -> ResponseApplySnapshotChunk;
}

/// Engine for nodes without state sync: empty state, rejects every offer
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSnapshots;

impl SnapshotEngine for NoSnapshots {
    fn info(&self) -> SnapshotInfo {
        SnapshotInfo::default()
    }

    fn list(&self) -> Vec<Snapshot> {
        Vec::new()
    }

    fn offer(&self, _request: RequestOfferSnapshot) -> ResponseOfferSnapshot {
        ResponseOfferSnapshot {
            result: OfferSnapshotResult::Reject,
        }
    }

    fn load_chunk(&self, _request: RequestLoadSnapshotChunk) -> ResponseLoadSnapshotChunk {
        ResponseLoadSnapshotChunk::default()
    }

    fn apply_chunk(&self, _request: RequestApplySnapshotChunk) -> ResponseApplySnapshotChunk {
        ResponseApplySnapshotChunk {
            result: ApplySnapshotChunkResult::Abort,
            ..Default::default()
        }
    }
}
