//! Command tags
//!
//! One byte-sized tag per transaction kind. Tags are additive: a retired
//! command keeps its byte forever and new commands take unused values.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transaction command tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Command {
    /// Submit a new order
    SubmitOrder = 0x40,
    /// Cancel one or more orders
    CancelOrder = 0x41,
    /// Amend an existing order
    AmendOrder = 0x42,
    /// Withdraw funds to an external account
    Withdraw = 0x44,
    /// Submit a governance proposal
    Propose = 0x45,
    /// Vote on a governance proposal
    Vote = 0x46,
    /// Validator vote on an external resource
    NodeVote = 0x48,
    /// Validator signature over a bundle
    NodeSignature = 0x49,
    /// Submit a liquidity commitment
    LiquidityProvision = 0x4A,
    /// Cancel a liquidity commitment
    CancelLiquidityProvision = 0x4B,
    /// Amend a liquidity commitment
    AmendLiquidityProvision = 0x4C,
    /// Event observed on a bridged chain
    ChainEvent = 0x50,
    /// Oracle data submission
    SubmitOracleData = 0x51,
    /// Delegate stake to a validator
    Delegate = 0x52,
    /// Undelegate stake from a validator
    Undelegate = 0x53,
    /// Rotate a validator key
    KeyRotateSubmission = 0x54,
    /// Validator proposal for a state variable value
    StateVariableProposal = 0x55,
    /// Transfer funds between accounts
    TransferFunds = 0x56,
    /// Cancel a recurring transfer
    CancelTransferFunds = 0x57,
    /// Restore network state from a checkpoint
    CheckpointRestore = 0x58,
}

impl Command {
    /// Every known command, in tag order
    pub const ALL: [Command; 20] = [
        Command::SubmitOrder,
        Command::CancelOrder,
        Command::AmendOrder,
        Command::Withdraw,
        Command::Propose,
        Command::Vote,
        Command::NodeVote,
        Command::NodeSignature,
        Command::LiquidityProvision,
        Command::CancelLiquidityProvision,
        Command::AmendLiquidityProvision,
        Command::ChainEvent,
        Command::SubmitOracleData,
        Command::Delegate,
        Command::Undelegate,
        Command::KeyRotateSubmission,
        Command::StateVariableProposal,
        Command::TransferFunds,
        Command::CancelTransferFunds,
        Command::CheckpointRestore,
    ];

    /// Wire tag
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Human readable name, used in response events
    pub fn name(self) -> &'static str {
        match self {
            Command::SubmitOrder => "Submit Order",
            Command::CancelOrder => "Cancel Order",
            Command::AmendOrder => "Amend Order",
            Command::Withdraw => "Withdraw",
            Command::Propose => "Proposal",
            Command::Vote => "Vote on Proposal",
            Command::NodeVote => "Node Vote",
            Command::NodeSignature => "Node Signature",
            Command::LiquidityProvision => "Liquidity Provision Order",
            Command::CancelLiquidityProvision => "Cancel LiquidityProvision Order",
            Command::AmendLiquidityProvision => "Amend LiquidityProvision Order",
            Command::ChainEvent => "Chain Event",
            Command::SubmitOracleData => "Submit Oracle Data",
            Command::Delegate => "Delegate",
            Command::Undelegate => "Undelegate",
            Command::KeyRotateSubmission => "Key Rotate Submission",
            Command::StateVariableProposal => "State Variable Proposal",
            Command::TransferFunds => "Transfer Funds",
            Command::CancelTransferFunds => "Cancel Transfer Funds",
            Command::CheckpointRestore => "Checkpoint Restore",
        }
    }

    /// Commands whose submitter must be a key of the current validator set
    pub fn requires_validator_key(self) -> bool {
        matches!(
            self,
            Command::NodeVote
                | Command::NodeSignature
                | Command::ChainEvent
                | Command::KeyRotateSubmission
                | Command::StateVariableProposal
        )
    }
}

impl TryFrom<u8> for Command {
    type Error = Error;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Command::ALL
            .iter()
            .copied()
            .find(|cmd| cmd.as_byte() == tag)
            .ok_or(Error::UnknownCommand(tag))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
