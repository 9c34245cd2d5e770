//! Pluggable spam policy

use protocol_core::Tx;
use thiserror::Error;

/// Spam policy verdict against a transaction
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct SpamRejection(pub String);

/// External spam policy consulted by the router
pub trait SpamPolicy: Send + Sync {
    /// Mempool admission (CheckTx)
    fn pre_block_accept(&self, tx: &Tx) -> Result<(), SpamRejection>;

    /// Block execution (DeliverTx)
    fn post_block_accept(&self, tx: &Tx) -> Result<(), SpamRejection>;

    /// Block boundary (EndBlock)
    fn end_of_block(&self, height: u64);
}
