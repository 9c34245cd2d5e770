//! Lifecycle request and response types
//!
//! Engine-neutral renditions of the ABCI messages. The socket adapter in
//! [`crate::server`] converts them to and from the CometBFT wire types.

use crate::error::TxError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Response codes
// ============================================================================

/// Fixed numeric response taxonomy shared with clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum ResponseCode {
    /// Accepted
    Ok = 0,
    /// Handler rejected the command
    ValidationFailure = 51,
    /// Raw bytes did not decode
    DecodingFailure = 60,
    /// Unexpected failure
    InternalError = 70,
    /// Command applied in part
    PartialProcessingError = 71,
    /// No delivery handler for the command
    UnknownCommandError = 80,
    /// Rate limit, replay or spam policy rejection
    SpamError = 89,
}

impl ResponseCode {
    /// Numeric value on the wire
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Whether the code reports success
    pub fn is_ok(self) -> bool {
        self == ResponseCode::Ok
    }
}

impl From<&TxError> for ResponseCode {
    fn from(err: &TxError) -> Self {
        match err {
            TxError::Validation(_) => ResponseCode::ValidationFailure,
            TxError::PartialProcessing(_) => ResponseCode::PartialProcessingError,
            TxError::Internal(_) => ResponseCode::InternalError,
        }
    }
}

// ============================================================================
// Events
// ============================================================================

/// Key/value attribute of an [`Event`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAttribute {
    /// Attribute key
    pub key: String,
    /// Attribute value
    pub value: String,
    /// Whether the engine should index the attribute
    pub index: bool,
}

impl EventAttribute {
    /// Indexed attribute
    pub fn indexed(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            index: true,
        }
    }
}

/// Typed event attached to a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event type
    pub kind: String,
    /// Attributes
    pub attributes: Vec<EventAttribute>,
}

impl Event {
    /// Value of the first attribute named `key`
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.as_str())
    }
}

// ============================================================================
// Block context
// ============================================================================

/// Per-block context set at BeginBlock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockContext {
    /// Block height
    pub height: u64,
    /// Block time
    pub time: DateTime<Utc>,
    /// Block hash
    pub hash: Vec<u8>,
    /// Chain identifier
    pub chain_id: String,
}

impl Default for BlockContext {
    fn default() -> Self {
        Self {
            height: 0,
            time: DateTime::<Utc>::UNIX_EPOCH,
            hash: Vec::new(),
            chain_id: String::new(),
        }
    }
}

/// Context handed to transaction handlers
#[derive(Debug, Clone)]
pub struct TxContext {
    /// Block the transaction is checked or delivered in
    pub block: BlockContext,
    /// Trace identifier (hex transaction hash)
    pub trace_id: String,
    /// Signature-derived ID, the same on every node
    pub deterministic_id: String,
}

// ============================================================================
// Requests and responses
// ============================================================================

/// Validator power change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorUpdate {
    /// Raw ed25519 public key
    pub pub_key: Vec<u8>,
    /// Voting power
    pub power: i64,
}

/// Info response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseInfo {
    /// Application name
    pub data: String,
    /// Application version
    pub version: String,
    /// Protocol version of the application
    pub app_version: u64,
    /// Last committed height
    pub last_block_height: u64,
    /// Hash returned by the last commit
    pub last_block_app_hash: Vec<u8>,
}

/// InitChain request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInitChain {
    /// Chain identifier
    pub chain_id: String,
    /// Genesis time
    pub time: DateTime<Utc>,
    /// Genesis validator set
    pub validators: Vec<ValidatorUpdate>,
    /// Raw genesis app state (JSON)
    pub app_state_bytes: Vec<u8>,
    /// First block height
    pub initial_height: u64,
}

/// InitChain response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseInitChain {
    /// Validator set the application settled on
    pub validators: Vec<ValidatorUpdate>,
    /// Initial application hash
    pub app_hash: Vec<u8>,
}

/// BeginBlock request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestBeginBlock {
    /// Block height
    pub height: u64,
    /// Block time
    pub time: DateTime<Utc>,
    /// Block hash
    pub hash: Vec<u8>,
    /// Chain identifier
    pub chain_id: String,
}

/// CheckTx request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestCheckTx {
    /// Raw transaction bytes
    pub tx: Vec<u8>,
}

/// DeliverTx request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDeliverTx {
    /// Raw transaction bytes
    pub tx: Vec<u8>,
}

/// Outcome of CheckTx or DeliverTx
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseTx {
    /// Response code
    pub code: ResponseCode,
    /// Opaque result data
    pub data: Vec<u8>,
    /// Human readable log
    pub log: String,
    /// Events
    pub events: Vec<Event>,
}

impl ResponseTx {
    /// Successful response
    pub fn ok() -> Self {
        Self {
            code: ResponseCode::Ok,
            data: Vec::new(),
            log: String::new(),
            events: Vec::new(),
        }
    }

    /// Rejection with `code` and a log line
    pub fn error(code: ResponseCode, log: impl std::fmt::Display) -> Self {
        Self {
            code,
            data: Vec::new(),
            log: log.to_string(),
            events: Vec::new(),
        }
    }

    /// Whether the transaction was accepted
    pub fn is_ok(&self) -> bool {
        self.code.is_ok()
    }

    /// Events of type `kind`
    pub fn events_of<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Event> + 'a {
        self.events.iter().filter(move |e| e.kind == kind)
    }
}

/// CheckTx response
pub type ResponseCheckTx = ResponseTx;

/// DeliverTx response
pub type ResponseDeliverTx = ResponseTx;

/// EndBlock request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestEndBlock {
    /// Block height
    pub height: u64,
}

/// EndBlock response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseEndBlock {
    /// Validator changes
    pub validator_updates: Vec<ValidatorUpdate>,
    /// Events
    pub events: Vec<Event>,
}

/// Commit response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseCommit {
    /// State commitment of the block
    pub data: Vec<u8>,
}

// ============================================================================
// State sync
// ============================================================================

/// Snapshot descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Height the snapshot was taken at
    pub height: u64,
    /// Format version
    pub format: u32,
    /// Number of chunks
    pub chunks: u32,
    /// Snapshot hash
    pub hash: Vec<u8>,
    /// Engine metadata
    pub metadata: Vec<u8>,
}

/// OfferSnapshot request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOfferSnapshot {
    /// Offered snapshot
    pub snapshot: Option<Snapshot>,
    /// Light-client verified app hash
    pub app_hash: Vec<u8>,
}

/// Verdict on an offered snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OfferSnapshotResult {
    /// Unknown
    #[default]
    Unknown,
    /// Restore this snapshot
    Accept,
    /// Abort state sync
    Abort,
    /// Try another snapshot
    Reject,
    /// Reject every snapshot of this format
    RejectFormat,
    /// Reject every snapshot from this sender
    RejectSender,
}

/// OfferSnapshot response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseOfferSnapshot {
    /// Verdict
    pub result: OfferSnapshotResult,
}

/// LoadSnapshotChunk request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestLoadSnapshotChunk {
    /// Snapshot height
    pub height: u64,
    /// Snapshot format
    pub format: u32,
    /// Chunk index
    pub chunk: u32,
}

/// LoadSnapshotChunk response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseLoadSnapshotChunk {
    /// Chunk bytes
    pub chunk: Vec<u8>,
}

/// ApplySnapshotChunk request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestApplySnapshotChunk {
    /// Chunk index
    pub index: u32,
    /// Chunk bytes
    pub chunk: Vec<u8>,
    /// Peer that sent the chunk
    pub sender: String,
}

/// Verdict on an applied chunk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ApplySnapshotChunkResult {
    /// Unknown
    #[default]
    Unknown,
    /// Chunk applied
    Accept,
    /// Abort state sync
    Abort,
    /// Refetch and retry this chunk
    Retry,
    /// Restart the snapshot
    RetrySnapshot,
    /// Reject the snapshot
    RejectSnapshot,
}

/// ApplySnapshotChunk response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseApplySnapshotChunk {
    /// Verdict
    pub result: ApplySnapshotChunkResult,
    /// Chunks to refetch
    pub refetch_chunks: Vec<u32>,
    /// Senders to ban
    pub reject_senders: Vec<String>,
}
