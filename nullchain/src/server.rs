//! Null-chain HTTP endpoint
//!
//! `POST /api/v1/forwardtime` with `{"forward": "<duration>"}` or
//! `{"forward": "<RFC3339 timestamp>"}`. A timestamp is turned into the span
//! between the chain's virtual clock and that instant; moving backwards is a
//! bad request.
//!
//! `POST /api/v1/transactions` with `{"tx": "<base64>"}` queues a raw
//! transaction and answers with its hex SHA-256.
//!
//! While the chain replays its log both routes answer 503 without touching
//! chain state.

use crate::driver::NullChain;
use crate::Error;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardTimeRequest {
    /// Duration (`"10s"`, `"1h 30m"`) or RFC3339 timestamp
    pub forward: String,
}

/// Response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardTimeResponse {
    /// Blocks produced
    pub blocks: u64,
    /// Last committed height
    pub height: u64,
    /// Virtual time after forwarding
    pub time: DateTime<Utc>,
}

/// Transaction submission body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitTxRequest {
    /// Base64 encoded raw transaction
    pub tx: String,
}

/// Transaction submission answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitTxResponse {
    /// Hex SHA-256 of the raw transaction
    pub hash: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    chain_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    height: Option<u64>,
}

/// Endpoint errors
#[derive(Debug)]
pub enum ApiError {
    /// Malformed body or unusable target
    BadRequest(String),
    /// Chain is replaying
    Unavailable(String),
    /// Block production failed
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::ChainReplaying => ApiError::Unavailable(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

/// Turn a `forward` value into a span relative to `now`
pub fn parse_forward(value: &str, now: DateTime<Utc>) -> Result<Duration, String> {
    let value = value.trim();
    if let Ok(d) = humantime::parse_duration(value) {
        return Ok(d);
    }

    let target = DateTime::parse_from_rfc3339(value)
        .map_err(|_| format!("not a duration or RFC3339 timestamp: {}", value))?
        .with_timezone(&Utc);

    (target - now)
        .to_std()
        .map_err(|_| format!("cannot move time backwards to {}", target.to_rfc3339()))
}

fn ensure_live(chain: &NullChain) -> Result<(), ApiError> {
    // Replay holds the chain state until it finishes
    if chain.is_replaying() {
        return Err(Error::ChainReplaying.into());
    }
    Ok(())
}

async fn forward_time(
    State(chain): State<Arc<NullChain>>,
    body: Bytes,
) -> Result<Json<ForwardTimeResponse>, ApiError> {
    ensure_live(&chain)?;

    let request: ForwardTimeRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid body: {}", e)))?;

    let span = parse_forward(&request.forward, chain.now()).map_err(|msg| {
        warn!(forward = %request.forward, "rejected time forward");
        ApiError::BadRequest(msg)
    })?;

    let worker = Arc::clone(&chain);
    let blocks = tokio::task::spawn_blocking(move || worker.forward_time(span))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    let status = chain.get_status();
    info!(blocks, height = status.height, "time forwarded");
    Ok(Json(ForwardTimeResponse {
        blocks,
        height: status.height,
        time: status.time,
    }))
}

async fn submit_transaction(
    State(chain): State<Arc<NullChain>>,
    body: Bytes,
) -> Result<Json<SubmitTxResponse>, ApiError> {
    ensure_live(&chain)?;

    let request: SubmitTxRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid body: {}", e)))?;
    let tx = STANDARD
        .decode(request.tx.trim())
        .map_err(|e| ApiError::BadRequest(format!("invalid base64 transaction: {}", e)))?;

    let worker = Arc::clone(&chain);
    let hash = tokio::task::spawn_blocking(move || worker.send_transaction_sync(tx))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    let hash = hex::encode(hash);
    debug!(tx = %hash, "transaction submitted");
    Ok(Json(SubmitTxResponse { hash }))
}

async fn health(State(chain): State<Arc<NullChain>>) -> Json<HealthResponse> {
    let live = chain.health();
    Json(HealthResponse {
        status: if live { "healthy" } else { "replaying" },
        chain_id: chain.get_chain_id().to_string(),
        height: live.then(|| chain.get_status().height),
    })
}

/// Routes of the null-chain endpoint
pub fn router(chain: Arc<NullChain>) -> Router {
    Router::new()
        .route("/api/v1/forwardtime", post(forward_time))
        .route("/api/v1/transactions", post(submit_transaction))
        .route("/health", get(health))
        .with_state(chain)
}
