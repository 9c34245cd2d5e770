//! Genesis bootstrap reader
//!
//! The network section of the genesis app state:
//!
//! ```json
//! { "network": { "replay_attack_threshold": 150 } }
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Replay tolerance used when no genesis value has been loaded
pub use security::DEFAULT_REPLAY_TOLERANCE as DEFAULT_REPLAY_ATTACK_THRESHOLD;

/// Network parameters fixed at genesis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisState {
    /// Blocks a transaction stays valid after the height it was built against
    pub replay_attack_threshold: u64,
}

impl Default for GenesisState {
    fn default() -> Self {
        Self {
            replay_attack_threshold: DEFAULT_REPLAY_ATTACK_THRESHOLD,
        }
    }
}

#[derive(Deserialize)]
struct AppState {
    #[serde(default)]
    network: Option<GenesisState>,
}

/// Parse the `network` section out of a genesis app state document.
///
/// Parsing is strict: every field must be present.
pub fn load_genesis_state(app_state: &[u8]) -> Result<GenesisState> {
    let state: AppState = serde_json::from_slice(app_state)?;
    state.network.ok_or(Error::NoNetworkGenesisState)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_network_state() {
        let state =
            load_genesis_state(br#"{"network":{"replay_attack_threshold":150}}"#).unwrap();
        assert_eq!(
            state,
            GenesisState {
                replay_attack_threshold: 150
            }
        );
    }

    #[test]
    fn test_other_sections_ignored() {
        let state = load_genesis_state(
            br#"{"validators":{},"network":{"replay_attack_threshold":7},"assets":[]}"#,
        )
        .unwrap();
        assert_eq!(state.replay_attack_threshold, 7);
    }

    #[test]
    fn test_missing_network() {
        let err = load_genesis_state(br#"{"validators":{}}"#).unwrap_err();
        assert!(matches!(err, Error::NoNetworkGenesisState));
        assert_eq!(err.to_string(), "no network genesis state");
    }

    #[test]
    fn test_parsing_is_strict() {
        let err = load_genesis_state(br#"{"network":{}}"#).unwrap_err();
        assert!(matches!(err, Error::Genesis(_)));

        let err = load_genesis_state(b"not json").unwrap_err();
        assert!(matches!(err, Error::Genesis(_)));
    }

    #[test]
    fn test_fresh_state_uses_default() {
        assert_eq!(GenesisState::default().replay_attack_threshold, 150);
        assert_eq!(
            security::ReplayProtector::default().tolerance(),
            GenesisState::default().replay_attack_threshold
        );
    }
}
