//! Genesis document of the null-chain
//!
//! ```json
//! {
//!   "genesis_time": "2024-01-01T00:00:00Z",
//!   "chain_id": "testnet",
//!   "app_state": {
//!     "network": { "replay_attack_threshold": 150 },
//!     "validators": { "<base64 ed25519 key>": { ... } }
//!   }
//! }
//! ```
//!
//! `genesis_time` and `chain_id` are optional; `app_state` is handed to
//! InitChain untouched.

use crate::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use consensus::ValidatorUpdate;
use serde::Deserialize;
use std::path::Path;

/// Voting power given to every genesis validator
pub const VALIDATOR_POWER: i64 = 10;

#[derive(Deserialize)]
struct GenesisDoc {
    #[serde(default)]
    genesis_time: Option<DateTime<Utc>>,
    #[serde(default)]
    chain_id: Option<String>,
    app_state: serde_json::Value,
}

/// Parsed genesis document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NullGenesis {
    /// Genesis time, if fixed by the document
    pub genesis_time: Option<DateTime<Utc>>,
    /// Chain identifier, if fixed by the document
    pub chain_id: Option<String>,
    /// Raw app state (JSON)
    pub app_state: Vec<u8>,
    /// Validators keyed in `app_state.validators`, ordered by key
    pub validators: Vec<ValidatorUpdate>,
}

impl NullGenesis {
    /// Parse a genesis document
    pub fn from_json(raw: &[u8]) -> Result<Self> {
        let doc: GenesisDoc =
            serde_json::from_slice(raw).map_err(|e| Error::Genesis(e.to_string()))?;

        if !doc.app_state.is_object() {
            return Err(Error::Genesis("app_state must be an object".to_string()));
        }

        let validators = match doc.app_state.get("validators") {
            None | Some(serde_json::Value::Null) => Vec::new(),
            Some(serde_json::Value::Object(map)) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                keys.into_iter()
                    .map(|key| {
                        STANDARD
                            .decode(key)
                            .map(|pub_key| ValidatorUpdate {
                                pub_key,
                                power: VALIDATOR_POWER,
                            })
                            .map_err(|e| {
                                Error::Genesis(format!("invalid validator key {}: {}", key, e))
                            })
                    })
                    .collect::<Result<Vec<_>>>()?
            }
            Some(_) => {
                return Err(Error::Genesis(
                    "app_state.validators must be an object".to_string(),
                ))
            }
        };

        Ok(Self {
            genesis_time: doc.genesis_time,
            chain_id: doc.chain_id.filter(|id| !id.is_empty()),
            app_state: serde_json::to_vec(&doc.app_state)?,
            validators,
        })
    }

    /// Read and parse a genesis file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read(path)?;
        Self::from_json(&raw)
    }
}
