//! Concrete command messages
//!
//! `CommandPayload` is the decoded body of a transaction. Each variant knows
//! its own tag and the identifiers it exposes for indexing, so routing never
//! has to inspect a message at runtime to discover what it carries.

use crate::Command;
use serde::{Deserialize, Serialize};

// =========================================================================
// INDEXABLE ATTRIBUTES
// =========================================================================

/// Identifiers a command exposes for event indexing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxAttributes {
    /// Market the command targets
    pub market: Option<String>,
    /// Asset the command moves
    pub asset: Option<String>,
    /// Governance proposal the command refers to
    pub proposal: Option<String>,
    /// Client supplied reference
    pub reference: Option<String>,
}

impl TxAttributes {
    /// No identifier present
    pub fn is_empty(&self) -> bool {
        self.market.is_none()
            && self.asset.is_none()
            && self.proposal.is_none()
            && self.reference.is_none()
    }

    fn market(mut self, market: &str) -> Self {
        self.market = non_empty(market);
        self
    }

    fn asset(mut self, asset: &str) -> Self {
        self.asset = non_empty(asset);
        self
    }

    fn proposal(mut self, proposal: &str) -> Self {
        self.proposal = non_empty(proposal);
        self
    }

    fn reference(mut self, reference: &str) -> Self {
        self.reference = non_empty(reference);
        self
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

// =========================================================================
// MESSAGES
// =========================================================================

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    /// Bid
    Buy,
    /// Ask
    Sell,
}

/// New order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSubmission {
    /// Market ID
    pub market_id: String,
    /// Limit price (decimal string, empty for market orders)
    pub price: String,
    /// Size in market units
    pub size: u64,
    /// Side
    pub side: Side,
    /// Client reference
    pub reference: String,
}

/// Order cancellation (empty IDs cancel everything in scope)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancellation {
    /// Market ID
    pub market_id: String,
    /// Order ID
    pub order_id: String,
}

/// Order amendment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAmendment {
    /// Market ID
    pub market_id: String,
    /// Order ID
    pub order_id: String,
    /// New price, if changed
    pub price: Option<String>,
    /// Signed size change
    pub size_delta: i64,
}

/// Withdrawal request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawSubmission {
    /// Asset ID
    pub asset: String,
    /// Amount (decimal string)
    pub amount: String,
}

/// Governance proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalSubmission {
    /// Client reference
    pub reference: String,
    /// Encoded proposal terms
    pub terms: Vec<u8>,
}

/// Governance vote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteSubmission {
    /// Proposal ID
    pub proposal_id: String,
    /// Vote value
    pub accept: bool,
}

/// Validator vote on an external resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeVote {
    /// Resource reference
    pub reference: String,
}

/// Validator signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSignature {
    /// Signed resource ID
    pub id: String,
    /// Signature bytes
    pub sig: Vec<u8>,
}

/// Liquidity commitment (used for submit and amend)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityProvision {
    /// Market ID
    pub market_id: String,
    /// Commitment amount (decimal string)
    pub commitment_amount: String,
    /// Proposed fee (decimal string)
    pub fee: String,
    /// Client reference
    pub reference: String,
}

/// Liquidity commitment cancellation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityProvisionCancellation {
    /// Market ID
    pub market_id: String,
}

/// Event observed on a bridged chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEvent {
    /// Bridge transaction ID
    pub tx_id: String,
    /// Event nonce
    pub nonce: u64,
    /// Encoded event
    pub payload: Vec<u8>,
}

/// Oracle data submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleDataSubmission {
    /// Oracle source identifier
    pub source: String,
    /// Encoded oracle payload
    pub payload: Vec<u8>,
}

/// Stake delegation or undelegation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    /// Validator node ID
    pub node_id: String,
    /// Amount (decimal string)
    pub amount: String,
}

/// Validator key rotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRotateSubmission {
    /// Index of the new key
    pub new_pub_key_index: u32,
    /// Height at which the new key applies
    pub target_block: u64,
    /// New public key (hex)
    pub new_pub_key: String,
    /// Hash of the key being replaced
    pub current_pub_key_hash: String,
}

/// Validator proposal for a state variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateVariableProposal {
    /// State variable ID
    pub state_variable_id: String,
    /// Calculation event ID
    pub event_id: String,
    /// Encoded key/value bundle
    pub kvb: Vec<u8>,
}

/// Funds transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// Destination party (hex public key)
    pub to: String,
    /// Asset ID
    pub asset: String,
    /// Amount (decimal string)
    pub amount: String,
    /// Client reference
    pub reference: String,
}

/// Recurring transfer cancellation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelTransfer {
    /// Transfer ID
    pub transfer_id: String,
}

/// Checkpoint restore
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreSnapshot {
    /// Encoded checkpoint
    pub data: Vec<u8>,
}

// =========================================================================
// TAGGED UNION
// =========================================================================

/// Decoded command body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandPayload {
    /// See [`Command::SubmitOrder`]
    SubmitOrder(OrderSubmission),
    /// See [`Command::CancelOrder`]
    CancelOrder(OrderCancellation),
    /// See [`Command::AmendOrder`]
    AmendOrder(OrderAmendment),
    /// See [`Command::Withdraw`]
    Withdraw(WithdrawSubmission),
    /// See [`Command::Propose`]
    Propose(ProposalSubmission),
    /// See [`Command::Vote`]
    Vote(VoteSubmission),
    /// See [`Command::NodeVote`]
    NodeVote(NodeVote),
    /// See [`Command::NodeSignature`]
    NodeSignature(NodeSignature),
    /// See [`Command::LiquidityProvision`]
    LiquidityProvision(LiquidityProvision),
    /// See [`Command::CancelLiquidityProvision`]
    CancelLiquidityProvision(LiquidityProvisionCancellation),
    /// See [`Command::AmendLiquidityProvision`]
    AmendLiquidityProvision(LiquidityProvision),
    /// See [`Command::ChainEvent`]
    ChainEvent(ChainEvent),
    /// See [`Command::SubmitOracleData`]
    SubmitOracleData(OracleDataSubmission),
    /// See [`Command::Delegate`]
    Delegate(Delegation),
    /// See [`Command::Undelegate`]
    Undelegate(Delegation),
    /// See [`Command::KeyRotateSubmission`]
    KeyRotateSubmission(KeyRotateSubmission),
    /// See [`Command::StateVariableProposal`]
    StateVariableProposal(StateVariableProposal),
    /// See [`Command::TransferFunds`]
    TransferFunds(Transfer),
    /// See [`Command::CancelTransferFunds`]
    CancelTransferFunds(CancelTransfer),
    /// See [`Command::CheckpointRestore`]
    CheckpointRestore(RestoreSnapshot),
}

impl CommandPayload {
    /// Tag of this command
    pub fn command(&self) -> Command {
        match self {
            CommandPayload::SubmitOrder(_) => Command::SubmitOrder,
            CommandPayload::CancelOrder(_) => Command::CancelOrder,
            CommandPayload::AmendOrder(_) => Command::AmendOrder,
            CommandPayload::Withdraw(_) => Command::Withdraw,
            CommandPayload::Propose(_) => Command::Propose,
            CommandPayload::Vote(_) => Command::Vote,
            CommandPayload::NodeVote(_) => Command::NodeVote,
            CommandPayload::NodeSignature(_) => Command::NodeSignature,
            CommandPayload::LiquidityProvision(_) => Command::LiquidityProvision,
            CommandPayload::CancelLiquidityProvision(_) => Command::CancelLiquidityProvision,
            CommandPayload::AmendLiquidityProvision(_) => Command::AmendLiquidityProvision,
            CommandPayload::ChainEvent(_) => Command::ChainEvent,
            CommandPayload::SubmitOracleData(_) => Command::SubmitOracleData,
            CommandPayload::Delegate(_) => Command::Delegate,
            CommandPayload::Undelegate(_) => Command::Undelegate,
            CommandPayload::KeyRotateSubmission(_) => Command::KeyRotateSubmission,
            CommandPayload::StateVariableProposal(_) => Command::StateVariableProposal,
            CommandPayload::TransferFunds(_) => Command::TransferFunds,
            CommandPayload::CancelTransferFunds(_) => Command::CancelTransferFunds,
            CommandPayload::CheckpointRestore(_) => Command::CheckpointRestore,
        }
    }

    /// Identifiers carried by this command
    pub fn attributes(&self) -> TxAttributes {
        let attrs = TxAttributes::default();
        match self {
            CommandPayload::SubmitOrder(o) => attrs.market(&o.market_id).reference(&o.reference),
            CommandPayload::CancelOrder(o) => attrs.market(&o.market_id),
            CommandPayload::AmendOrder(o) => attrs.market(&o.market_id),
            CommandPayload::Withdraw(w) => attrs.asset(&w.asset),
            CommandPayload::Propose(p) => attrs.reference(&p.reference),
            CommandPayload::Vote(v) => attrs.proposal(&v.proposal_id),
            CommandPayload::NodeVote(v) => attrs.reference(&v.reference),
            CommandPayload::LiquidityProvision(lp) | CommandPayload::AmendLiquidityProvision(lp) => {
                attrs.market(&lp.market_id).reference(&lp.reference)
            }
            CommandPayload::CancelLiquidityProvision(c) => attrs.market(&c.market_id),
            CommandPayload::TransferFunds(t) => attrs.asset(&t.asset).reference(&t.reference),
            CommandPayload::NodeSignature(_)
            | CommandPayload::ChainEvent(_)
            | CommandPayload::SubmitOracleData(_)
            | CommandPayload::Delegate(_)
            | CommandPayload::Undelegate(_)
            | CommandPayload::KeyRotateSubmission(_)
            | CommandPayload::StateVariableProposal(_)
            | CommandPayload::CancelTransferFunds(_)
            | CommandPayload::CheckpointRestore(_) => attrs,
        }
    }
}
