//! Decoded transaction envelope
//!
//! A `Tx` is produced once per decode and never mutated afterwards.

use crate::{Command, CommandPayload, TxAttributes};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Signed portion of a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputData {
    /// Client nonce, makes otherwise identical commands distinct
    pub nonce: u64,
    /// Block height the client built the transaction against (anti-replay TTL)
    pub block_height: u64,
    /// Command body
    pub command: CommandPayload,
}

/// Proof-of-work attached by the client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofOfWork {
    /// Transaction ID the work was computed for
    pub tid: String,
    /// Nonce solving the puzzle
    pub nonce: u64,
}

/// Decoded, verified transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tx {
    input: InputData,
    hash: [u8; 32],
    id: [u8; 32],
    pub_key: Vec<u8>,
    pub_key_hex: String,
    signature: Vec<u8>,
    pow: ProofOfWork,
    attributes: TxAttributes,
}

impl Tx {
    /// Assemble a transaction from its decoded parts.
    ///
    /// `raw` is the exact byte string received from the engine; the hash is
    /// computed over it. The ID covers only the key and the signature, so
    /// re-encoding unsigned envelope fields does not change it.
    pub fn new(
        raw: &[u8],
        input: InputData,
        pub_key: Vec<u8>,
        signature: Vec<u8>,
        pow: ProofOfWork,
    ) -> Self {
        let hash: [u8; 32] = Sha256::digest(raw).into();
        let mut hasher = Sha256::new();
        hasher.update(&pub_key);
        hasher.update(&signature);
        let id: [u8; 32] = hasher.finalize().into();
        let pub_key_hex = hex::encode(&pub_key);
        let attributes = input.command.attributes();

        Self {
            input,
            hash,
            id,
            pub_key,
            pub_key_hex,
            signature,
            pow,
            attributes,
        }
    }

    /// Command tag
    pub fn command(&self) -> Command {
        self.input.command.command()
    }

    /// Decoded command body
    pub fn payload(&self) -> &CommandPayload {
        &self.input.command
    }

    /// SHA-256 of the raw bytes
    pub fn hash(&self) -> &[u8; 32] {
        &self.hash
    }

    /// Hex encoded hash
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }

    /// Submitter public key
    pub fn pub_key(&self) -> &[u8] {
        &self.pub_key
    }

    /// Submitter public key (hex)
    pub fn pub_key_hex(&self) -> &str {
        &self.pub_key_hex
    }

    /// Party the transaction acts for
    pub fn party(&self) -> &str {
        &self.pub_key_hex
    }

    /// Signature bytes
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Declared block height
    pub fn block_height(&self) -> u64 {
        self.input.block_height
    }

    /// Client nonce
    pub fn nonce(&self) -> u64 {
        self.input.nonce
    }

    /// Proof-of-work
    pub fn pow(&self) -> &ProofOfWork {
        &self.pow
    }

    /// Indexable identifiers of the command
    pub fn attributes(&self) -> &TxAttributes {
        &self.attributes
    }

    /// SHA-256 of the submitter key and signature.
    ///
    /// Identical on every node and for every encoding of the same signed
    /// command. Replay protection keys on it.
    pub fn id(&self) -> &[u8; 32] {
        &self.id
    }

    /// Hex encoded [`id`](Self::id), handed to handlers
    pub fn deterministic_id(&self) -> String {
        hex::encode(self.id)
    }
}
