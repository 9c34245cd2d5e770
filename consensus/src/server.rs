//! ABCI socket adapter
//!
//! Serves any [`Application`] to a CometBFT v0.38 engine over the ABCI 2.0
//! socket protocol. `FinalizeBlock` is unpacked into the begin/deliver/end
//! sequence of the application and the block is committed before the
//! response goes out, since ABCI 2.0 expects the app hash in
//! `ResponseFinalizeBlock`. The engine's later `Commit` only reports the
//! retain height. The mempool stays locked from `FinalizeBlock` through
//! `Commit`, so no `CheckTx` observes the half-finished state.

use crate::application::Application;
use crate::types::*;
use crate::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use tendermint_abci::ServerBuilder;
use tendermint_proto::abci as pb;
use tendermint_proto::abci::response_process_proposal::ProposalStatus;
use tendermint_proto::crypto::{public_key, PublicKey};
use tendermint_proto::google::protobuf::Timestamp;
use tracing::{debug, error, info};

/// ABCI adapter around a shared application
#[derive(Clone)]
pub struct AbciServer {
    app: Arc<dyn Application>,
}

impl std::fmt::Debug for AbciServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbciServer").finish_non_exhaustive()
    }
}

impl AbciServer {
    /// Wrap `app`
    pub fn new(app: Arc<dyn Application>) -> Self {
        Self { app }
    }

    /// Bind `addr` and serve connections until the listener fails.
    ///
    /// Blocks the calling thread.
    pub fn serve(self, addr: &str) -> Result<()> {
        let server = ServerBuilder::default()
            .bind(addr, self)
            .map_err(|e| Error::Abci(e.to_string()))?;

        info!(addr, "ABCI server listening");
        server.listen().map_err(|e| Error::Abci(e.to_string()))
    }
}

// ============================================================================
// Conversions
// ============================================================================

fn to_time(ts: Option<Timestamp>) -> DateTime<Utc> {
    ts.and_then(|t| {
        Utc.timestamp_opt(t.seconds, u32::try_from(t.nanos).unwrap_or(0))
            .single()
    })
    .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn to_height(height: i64) -> u64 {
    u64::try_from(height).unwrap_or(0)
}

fn from_height(height: u64) -> i64 {
    i64::try_from(height).unwrap_or(i64::MAX)
}

fn to_validator(update: &pb::ValidatorUpdate) -> ValidatorUpdate {
    let pub_key = match update.pub_key.as_ref().and_then(|k| k.sum.as_ref()) {
        Some(public_key::Sum::Ed25519(bytes)) => bytes.to_vec(),
        _ => Vec::new(),
    };
    ValidatorUpdate {
        pub_key,
        power: update.power,
    }
}

fn from_validator(update: ValidatorUpdate) -> pb::ValidatorUpdate {
    pb::ValidatorUpdate {
        pub_key: Some(PublicKey {
            sum: Some(public_key::Sum::Ed25519(update.pub_key.into())),
        }),
        power: update.power,
    }
}

fn from_events(events: Vec<Event>) -> Vec<pb::Event> {
    events
        .into_iter()
        .map(|e| pb::Event {
            r#type: e.kind,
            attributes: e
                .attributes
                .into_iter()
                .map(|a| pb::EventAttribute {
                    key: a.key,
                    value: a.value,
                    index: a.index,
                })
                .collect(),
        })
        .collect()
}

fn to_snapshot(s: pb::Snapshot) -> Snapshot {
    Snapshot {
        height: s.height,
        format: s.format,
        chunks: s.chunks,
        hash: s.hash.to_vec(),
        metadata: s.metadata.to_vec(),
    }
}

fn from_snapshot(s: Snapshot) -> pb::Snapshot {
    pb::Snapshot {
        height: s.height,
        format: s.format,
        chunks: s.chunks,
        hash: s.hash.into(),
        metadata: s.metadata.into(),
    }
}

fn offer_result_code(result: OfferSnapshotResult) -> i32 {
    match result {
        OfferSnapshotResult::Unknown => 0,
        OfferSnapshotResult::Accept => 1,
        OfferSnapshotResult::Abort => 2,
        OfferSnapshotResult::Reject => 3,
        OfferSnapshotResult::RejectFormat => 4,
        OfferSnapshotResult::RejectSender => 5,
    }
}

fn apply_result_code(result: ApplySnapshotChunkResult) -> i32 {
    match result {
        ApplySnapshotChunkResult::Unknown => 0,
        ApplySnapshotChunkResult::Accept => 1,
        ApplySnapshotChunkResult::Abort => 2,
        ApplySnapshotChunkResult::Retry => 3,
        ApplySnapshotChunkResult::RetrySnapshot => 4,
        ApplySnapshotChunkResult::RejectSnapshot => 5,
    }
}

// ============================================================================
// Engine interface
// ============================================================================

impl tendermint_abci::Application for AbciServer {
    fn info(&self, _request: pb::RequestInfo) -> pb::ResponseInfo {
        let info = self.app.info();
        pb::ResponseInfo {
            data: info.data,
            version: info.version,
            app_version: info.app_version,
            last_block_height: from_height(info.last_block_height),
            last_block_app_hash: info.last_block_app_hash.into(),
        }
    }

    fn init_chain(&self, request: pb::RequestInitChain) -> pb::ResponseInitChain {
        let converted = RequestInitChain {
            chain_id: request.chain_id.clone(),
            time: to_time(request.time.clone()),
            validators: request.validators.iter().map(to_validator).collect(),
            app_state_bytes: request.app_state_bytes.to_vec(),
            initial_height: to_height(request.initial_height),
        };

        match self.app.init_chain(converted) {
            Ok(response) => pb::ResponseInitChain {
                consensus_params: request.consensus_params,
                validators: response.validators.into_iter().map(from_validator).collect(),
                app_hash: response.app_hash.into(),
            },
            Err(e) => {
                // The engine offers no way to refuse genesis
                error!(error = %e, "InitChain failed, aborting");
                std::process::abort();
            }
        }
    }

    fn check_tx(&self, request: pb::RequestCheckTx) -> pb::ResponseCheckTx {
        let response = self.app.check_tx(RequestCheckTx {
            tx: request.tx.to_vec(),
        });
        pb::ResponseCheckTx {
            code: response.code.code(),
            data: response.data.into(),
            log: response.log,
            events: from_events(response.events),
            ..Default::default()
        }
    }

    fn prepare_proposal(&self, request: pb::RequestPrepareProposal) -> pb::ResponsePrepareProposal {
        let budget = usize::try_from(request.max_tx_bytes).unwrap_or(0);
        let mut used = 0usize;
        let txs: Vec<_> = request
            .txs
            .into_iter()
            .take_while(|tx| {
                used = used.saturating_add(tx.len());
                used <= budget
            })
            .collect();

        debug!(height = request.height, txs = txs.len(), "PrepareProposal");
        pb::ResponsePrepareProposal { txs }
    }

    fn process_proposal(&self, _request: pb::RequestProcessProposal) -> pb::ResponseProcessProposal {
        // Every transaction is validated again at delivery
        pb::ResponseProcessProposal {
            status: ProposalStatus::Accept as i32,
        }
    }

    fn finalize_block(&self, request: pb::RequestFinalizeBlock) -> pb::ResponseFinalizeBlock {
        let height = to_height(request.height);
        self.app.begin_block(RequestBeginBlock {
            height,
            time: to_time(request.time),
            hash: request.hash.to_vec(),
            // Not carried by FinalizeBlock; the application keeps the one from InitChain
            chain_id: String::new(),
        });

        let tx_results = request
            .txs
            .iter()
            .map(|tx| {
                let response = self.app.deliver_tx(RequestDeliverTx { tx: tx.to_vec() });
                pb::ExecTxResult {
                    code: response.code.code(),
                    data: response.data.into(),
                    log: response.log,
                    events: from_events(response.events),
                    ..Default::default()
                }
            })
            .collect();

        let end = self.app.end_block(RequestEndBlock { height });
        let commit = self.app.commit();

        pb::ResponseFinalizeBlock {
            events: from_events(end.events),
            tx_results,
            validator_updates: end
                .validator_updates
                .into_iter()
                .map(from_validator)
                .collect(),
            consensus_param_updates: None,
            app_hash: commit.data.into(),
        }
    }

    fn commit(&self) -> pb::ResponseCommit {
        pb::ResponseCommit::default()
    }

    fn list_snapshots(&self) -> pb::ResponseListSnapshots {
        pb::ResponseListSnapshots {
            snapshots: self
                .app
                .list_snapshots()
                .into_iter()
                .map(from_snapshot)
                .collect(),
        }
    }

    fn offer_snapshot(&self, request: pb::RequestOfferSnapshot) -> pb::ResponseOfferSnapshot {
        let response = self.app.offer_snapshot(RequestOfferSnapshot {
            snapshot: request.snapshot.map(to_snapshot),
            app_hash: request.app_hash.to_vec(),
        });
        pb::ResponseOfferSnapshot {
            result: offer_result_code(response.result),
        }
    }

    fn load_snapshot_chunk(
        &self,
        request: pb::RequestLoadSnapshotChunk,
    ) -> pb::ResponseLoadSnapshotChunk {
        let response = self.app.load_snapshot_chunk(RequestLoadSnapshotChunk {
            height: request.height,
            format: request.format,
            chunk: request.chunk,
        });
        pb::ResponseLoadSnapshotChunk {
            chunk: response.chunk.into(),
        }
    }

    fn apply_snapshot_chunk(
        &self,
        request: pb::RequestApplySnapshotChunk,
    ) -> pb::ResponseApplySnapshotChunk {
        let response = self.app.apply_snapshot_chunk(RequestApplySnapshotChunk {
            index: request.index,
            chunk: request.chunk.to_vec(),
            sender: request.sender,
        });
        pb::ResponseApplySnapshotChunk {
            result: apply_result_code(response.result),
            refetch_chunks: response.refetch_chunks,
            reject_senders: response.reject_senders,
        }
    }
}
