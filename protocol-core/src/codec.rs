//! Codec contract and the signed-envelope reference codec
//!
//! # Wire format
//!
//! ```text
//! SignedTransaction (bincode, varint, no trailing bytes)
//! ├── version: u32
//! ├── input_data: bytes ──► InputData { nonce, block_height, command }
//! ├── signature: { value, algo, version }
//! ├── public_key: bytes (ed25519, 32 bytes)
//! └── pow: { tid, nonce }
//! ```
//!
//! The signature covers `chain_id || 0x00 || input_data`, which binds every
//! transaction to a single chain. `pow` is not signed, so anything keyed on
//! the identity of a command uses [`Tx::id`], never the raw hash.

use crate::{Error, InputData, ProofOfWork, Result, Tx};
use bincode::Options;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};

/// Current envelope version
pub const TX_VERSION: u32 = 2;

/// Signature algorithm accepted by the reference codec
pub const ED25519_ALGO: &str = "ed25519";

/// Signature scheme version accepted by the reference codec
pub const SIGNATURE_VERSION: u32 = 1;

/// Upper bound for a single encoded transaction
pub const MAX_TX_BYTES: u64 = 1024 * 1024;

/// Turns raw engine bytes into a [`Tx`].
///
/// Implementations must be pure: the same `(raw, chain_id)` always yields the
/// same `Tx` or the same error. The router relies on this to decode each
/// admitted transaction at most once.
pub trait Codec: Send + Sync {
    /// Decode and verify a transaction
    fn decode(&self, raw: &[u8], chain_id: &str) -> Result<Tx>;
}

/// Signature block of an envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSignature {
    /// Signature bytes
    pub value: Vec<u8>,
    /// Algorithm name
    pub algo: String,
    /// Algorithm version
    pub version: u32,
}

/// Outer envelope as it travels through the mempool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    /// Envelope version
    pub version: u32,
    /// Encoded [`InputData`]
    pub input_data: Vec<u8>,
    /// Signature over chain ID and input data
    pub signature: TxSignature,
    /// Submitter public key
    pub public_key: Vec<u8>,
    /// Client proof-of-work
    pub pow: ProofOfWork,
}

fn wire_options() -> impl Options {
    bincode::DefaultOptions::new().with_limit(MAX_TX_BYTES)
}

fn signing_message(chain_id: &str, input_data: &[u8]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(chain_id.len() + 1 + input_data.len());
    msg.extend_from_slice(chain_id.as_bytes());
    msg.push(0);
    msg.extend_from_slice(input_data);
    msg
}

/// Build and sign an envelope for `chain_id`
pub fn sign(
    key: &SigningKey,
    chain_id: &str,
    input: &InputData,
    pow: ProofOfWork,
) -> Result<Vec<u8>> {
    let input_data = wire_options()
        .serialize(input)
        .map_err(|e| Error::Encoding(e.to_string()))?;
    let signature = key.sign(&signing_message(chain_id, &input_data));

    let envelope = SignedTransaction {
        version: TX_VERSION,
        input_data,
        signature: TxSignature {
            value: signature.to_bytes().to_vec(),
            algo: ED25519_ALGO.to_string(),
            version: SIGNATURE_VERSION,
        },
        public_key: key.verifying_key().to_bytes().to_vec(),
        pow,
    };

    wire_options()
        .serialize(&envelope)
        .map_err(|e| Error::Encoding(e.to_string()))
}

/// Reference codec for [`SignedTransaction`] envelopes
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvelopeCodec;

impl EnvelopeCodec {
    /// Create codec
    pub fn new() -> Self {
        Self
    }

    fn verify(envelope: &SignedTransaction, chain_id: &str) -> Result<()> {
        if envelope.signature.algo != ED25519_ALGO {
            return Err(Error::InvalidSignature(format!(
                "unsupported algorithm {}",
                envelope.signature.algo
            )));
        }
        if envelope.signature.version != SIGNATURE_VERSION {
            return Err(Error::InvalidSignature(format!(
                "unsupported signature version {}",
                envelope.signature.version
            )));
        }

        let key_bytes: [u8; 32] = envelope.public_key.as_slice().try_into().map_err(|_| {
            Error::InvalidPublicKey(format!(
                "expected 32 bytes, got {}",
                envelope.public_key.len()
            ))
        })?;
        let key = VerifyingKey::from_bytes(&key_bytes)
            .map_err(|e| Error::InvalidPublicKey(e.to_string()))?;
        let signature = Signature::from_slice(&envelope.signature.value)
            .map_err(|e| Error::InvalidSignature(e.to_string()))?;

        key.verify_strict(&signing_message(chain_id, &envelope.input_data), &signature)
            .map_err(|_| Error::SignatureMismatch)
    }
}

impl Codec for EnvelopeCodec {
    fn decode(&self, raw: &[u8], chain_id: &str) -> Result<Tx> {
        let envelope: SignedTransaction = wire_options().deserialize(raw)?;

        if envelope.version != TX_VERSION {
            return Err(Error::UnsupportedVersion(envelope.version));
        }

        Self::verify(&envelope, chain_id)?;

        let input: InputData = wire_options().deserialize(&envelope.input_data)?;

        tracing::trace!(command = %input.command.command(), "decoded transaction");

        Ok(Tx::new(
            raw,
            input,
            envelope.public_key,
            envelope.signature.value,
            envelope.pow,
        ))
    }
}
