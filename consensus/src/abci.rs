//! Command router
//!
//! `App` implements the lifecycle and dispatches decoded transactions to
//! handlers registered per command at startup.
//!
//! # CheckTx
//!
//! ```text
//! raw ─► cache hit? ──no──► Codec::decode ──err──► DecodingFailure
//!           │yes                 │
//!           └────────┬───────────┘
//!                    ▼
//!   replay protector ─► rate limiter ─► spam policy ──err──► SpamError
//!                    ▼
//!            pre-check hook ─► handler (optional) ──err──► TxError code
//!                    ▼
//!               cache.insert ─► events
//! ```
//!
//! # DeliverTx
//!
//! The cached `Tx` is taken out (or decoded on a miss), the replay and spam
//! checks run against committed plus pending state, and a handler is
//! required. A missing handler means CheckTx and DeliverTx disagree on the
//! registry, so the transaction is rejected with `UnknownCommandError` and
//! logged as an error.

use crate::application::Application;
use crate::cache::TxCache;
use crate::config::Config;
use crate::error::TxError;
use crate::genesis::{load_genesis_state, GenesisState};
use crate::snapshot::{NoSnapshots, SnapshotEngine};
use crate::spam::SpamPolicy;
use crate::types::*;
use crate::{Error, Result};
use parking_lot::{Mutex, RwLock};
use protocol_core::{Codec, Command, Tx};
use security::{RateLimiter, ReplayProtector};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Handler for one command in one phase
pub type TxHandler =
    Box<dyn Fn(&TxContext, &Tx) -> std::result::Result<(), TxError> + Send + Sync>;

/// Phase-wide check run before the command handler
pub type PreCheckHook =
    Box<dyn Fn(&TxContext, &Tx) -> std::result::Result<(), TxError> + Send + Sync>;

/// Genesis app-state consumer
pub type InitChainHook =
    Box<dyn Fn(&RequestInitChain) -> std::result::Result<(), String> + Send + Sync>;

/// Block boundary hook
pub type BlockHook = Box<dyn Fn(&BlockContext) + Send + Sync>;

/// Produces the state commitment of a block
pub type CommitHook = Box<dyn Fn(&BlockContext) -> Vec<u8> + Send + Sync>;

#[derive(Debug, Default)]
struct ChainState {
    block: BlockContext,
    chain_id: String,
    validators: HashSet<String>,
    genesis: GenesisState,
    last_height: u64,
    last_hash: Vec<u8>,
}

/// Lifecycle implementation and command dispatcher
pub struct App {
    codec: Arc<dyn Codec>,
    cache: TxCache,
    rates: RateLimiter,
    replay: Mutex<ReplayProtector>,
    state: RwLock<ChainState>,

    check_handlers: HashMap<Command, TxHandler>,
    deliver_handlers: HashMap<Command, TxHandler>,

    on_check_tx: Option<PreCheckHook>,
    on_deliver_tx: Option<PreCheckHook>,
    on_init_chain: Option<InitChainHook>,
    on_begin_block: Option<BlockHook>,
    on_end_block: Option<BlockHook>,
    on_commit: Option<CommitHook>,

    spam: Option<Arc<dyn SpamPolicy>>,
    snapshots: Arc<dyn SnapshotEngine>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("check_handlers", &self.check_handlers.len())
            .field("deliver_handlers", &self.deliver_handlers.len())
            .field("cached_txs", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl App {
    /// Create router decoding with `codec`
    pub fn new(config: &Config, codec: Arc<dyn Codec>) -> Self {
        let genesis = GenesisState::default();
        Self {
            codec,
            cache: TxCache::new(config.tx_cache_capacity),
            rates: RateLimiter::new(config.rate_limit.clone()),
            replay: Mutex::new(ReplayProtector::new(genesis.replay_attack_threshold)),
            state: RwLock::new(ChainState {
                genesis,
                ..Default::default()
            }),
            check_handlers: HashMap::new(),
            deliver_handlers: HashMap::new(),
            on_check_tx: None,
            on_deliver_tx: None,
            on_init_chain: None,
            on_begin_block: None,
            on_end_block: None,
            on_commit: None,
            spam: None,
            snapshots: Arc::new(NoSnapshots),
        }
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register the CheckTx handler of `command`, replacing any previous one
    pub fn handle_check_tx(
        &mut self,
        command: Command,
        handler: impl Fn(&TxContext, &Tx) -> std::result::Result<(), TxError> + Send + Sync + 'static,
    ) -> &mut Self {
        self.check_handlers.insert(command, Box::new(handler));
        self
    }

    /// Register the DeliverTx handler of `command`, replacing any previous one
    pub fn handle_deliver_tx(
        &mut self,
        command: Command,
        handler: impl Fn(&TxContext, &Tx) -> std::result::Result<(), TxError> + Send + Sync + 'static,
    ) -> &mut Self {
        self.deliver_handlers.insert(command, Box::new(handler));
        self
    }

    /// Check run for every transaction at CheckTx
    pub fn on_check_tx(
        &mut self,
        hook: impl Fn(&TxContext, &Tx) -> std::result::Result<(), TxError> + Send + Sync + 'static,
    ) -> &mut Self {
        self.on_check_tx = Some(Box::new(hook));
        self
    }

    /// Check run for every transaction at DeliverTx
    pub fn on_deliver_tx(
        &mut self,
        hook: impl Fn(&TxContext, &Tx) -> std::result::Result<(), TxError> + Send + Sync + 'static,
    ) -> &mut Self {
        self.on_deliver_tx = Some(Box::new(hook));
        self
    }

    /// Genesis app-state consumer; an error halts startup
    pub fn on_init_chain(
        &mut self,
        hook: impl Fn(&RequestInitChain) -> std::result::Result<(), String> + Send + Sync + 'static,
    ) -> &mut Self {
        self.on_init_chain = Some(Box::new(hook));
        self
    }

    /// Hook run at BeginBlock
    pub fn on_begin_block(&mut self, hook: impl Fn(&BlockContext) + Send + Sync + 'static) -> &mut Self {
        self.on_begin_block = Some(Box::new(hook));
        self
    }

    /// Hook run at EndBlock
    pub fn on_end_block(&mut self, hook: impl Fn(&BlockContext) + Send + Sync + 'static) -> &mut Self {
        self.on_end_block = Some(Box::new(hook));
        self
    }

    /// State commitment producer; without one Commit returns an empty hash
    pub fn on_commit(&mut self, hook: impl Fn(&BlockContext) -> Vec<u8> + Send + Sync + 'static) -> &mut Self {
        self.on_commit = Some(Box::new(hook));
        self
    }

    /// Install a spam policy
    pub fn with_spam_policy(&mut self, policy: Arc<dyn SpamPolicy>) -> &mut Self {
        self.spam = Some(policy);
        self
    }

    /// Install a snapshot engine and adopt the state it loaded
    pub fn with_snapshot_engine(&mut self, engine: Arc<dyn SnapshotEngine>) -> &mut Self {
        let loaded = engine.info();
        {
            let mut state = self.state.write();
            state.last_height = loaded.height;
            state.last_hash = loaded.hash;
        }
        self.snapshots = engine;
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Context of the current block
    pub fn block_context(&self) -> BlockContext {
        self.state.read().block.clone()
    }

    /// Chain identifier, empty before InitChain or the first block
    pub fn chain_id(&self) -> String {
        self.state.read().chain_id.clone()
    }

    /// Genesis network parameters in force
    pub fn genesis_state(&self) -> GenesisState {
        self.state.read().genesis.clone()
    }

    /// Number of admitted transactions awaiting delivery
    pub fn cached_txs(&self) -> usize {
        self.cache.len()
    }

    // ========================================================================
    // Pipeline
    // ========================================================================

    fn decode(&self, raw: &[u8]) -> std::result::Result<Arc<Tx>, ResponseTx> {
        let chain_id = self.chain_id();
        self.codec.decode(raw, &chain_id).map(Arc::new).map_err(|e| {
            warn!(error = %e, "failed to decode transaction");
            ResponseTx::error(ResponseCode::DecodingFailure, e)
        })
    }

    fn tx_context(&self, tx: &Tx) -> TxContext {
        TxContext {
            block: self.block_context(),
            trace_id: tx.hash_hex(),
            deterministic_id: tx.deterministic_id(),
        }
    }

    fn is_validator(&self, tx: &Tx) -> bool {
        self.state.read().validators.contains(tx.pub_key_hex())
    }

    fn require_validator(&self, tx: &Tx) -> std::result::Result<(), ResponseTx> {
        if tx.command().requires_validator_key() && !self.is_validator(tx) {
            warn!(party = tx.party(), command = %tx.command(), "validator command from non-validator");
            return Err(ResponseTx::error(
                ResponseCode::ValidationFailure,
                format!("{} requires a validator key", tx.command()),
            ));
        }
        Ok(())
    }

    fn check_spam(&self, tx: &Tx) -> std::result::Result<(), ResponseTx> {
        if let Err(e) = self.replay.lock().check_tx(tx.block_height(), tx.id()) {
            warn!(tx = %tx.hash_hex(), error = %e, "replay protection rejected transaction");
            return Err(ResponseTx::error(ResponseCode::SpamError, e));
        }

        if !self.is_validator(tx) && !self.rates.allow(tx.pub_key_hex()) {
            warn!(party = tx.party(), "rate limit exceeded");
            return Err(ResponseTx::error(
                ResponseCode::SpamError,
                format!("rate limit exceeded for {}", tx.party()),
            ));
        }

        if let Some(policy) = &self.spam {
            if let Err(e) = policy.pre_block_accept(tx) {
                warn!(tx = %tx.hash_hex(), error = %e, "spam policy rejected transaction");
                return Err(ResponseTx::error(ResponseCode::SpamError, e));
            }
        }

        Ok(())
    }

    fn deliver_spam(&self, tx: &Tx) -> std::result::Result<(), ResponseTx> {
        if let Err(e) = self.replay.lock().deliver_tx(tx.block_height(), tx.id()) {
            warn!(tx = %tx.hash_hex(), error = %e, "replay protection rejected transaction");
            return Err(ResponseTx::error(ResponseCode::SpamError, e));
        }

        if let Some(policy) = &self.spam {
            if let Err(e) = policy.post_block_accept(tx) {
                warn!(tx = %tx.hash_hex(), error = %e, "spam policy rejected transaction");
                return Err(ResponseTx::error(ResponseCode::SpamError, e));
            }
        }

        Ok(())
    }

    fn run_handler(
        handler: &TxHandler,
        ctx: &TxContext,
        tx: &Tx,
    ) -> std::result::Result<(), ResponseTx> {
        handler(ctx, tx).map_err(|e| {
            debug!(tx = %ctx.trace_id, command = %tx.command(), error = %e, "handler rejected transaction");
            ResponseTx::error(ResponseCode::from(&e), e)
        })
    }

    fn run_hook(
        hook: Option<&PreCheckHook>,
        ctx: &TxContext,
        tx: &Tx,
    ) -> std::result::Result<(), ResponseTx> {
        match hook {
            Some(hook) => hook(ctx, tx).map_err(|e| ResponseTx::error(ResponseCode::from(&e), e)),
            None => Ok(()),
        }
    }

    fn admit(&self, raw: &[u8], tx: &Arc<Tx>) -> std::result::Result<(), ResponseTx> {
        self.check_spam(tx)?;
        self.require_validator(tx)?;

        let ctx = self.tx_context(tx);
        Self::run_hook(self.on_check_tx.as_ref(), &ctx, tx)?;

        if let Some(handler) = self.check_handlers.get(&tx.command()) {
            Self::run_handler(handler, &ctx, tx)?;
        }

        self.cache.insert(raw, Arc::clone(tx));
        Ok(())
    }

    fn execute(&self, tx: &Tx) -> std::result::Result<(), ResponseTx> {
        self.deliver_spam(tx)?;
        self.require_validator(tx)?;

        let ctx = self.tx_context(tx);
        Self::run_hook(self.on_deliver_tx.as_ref(), &ctx, tx)?;

        let Some(handler) = self.deliver_handlers.get(&tx.command()) else {
            error!(
                command = %tx.command(),
                tx = %ctx.trace_id,
                "no DeliverTx handler for command accepted at CheckTx"
            );
            return Err(ResponseTx::error(
                ResponseCode::UnknownCommandError,
                format!("unknown command {}", tx.command()),
            ));
        };

        Self::run_handler(handler, &ctx, tx)
    }
}

/// Standard events describing a decoded transaction
pub fn tx_events(tx: &Tx) -> Vec<Event> {
    let mut events = vec![Event {
        kind: "tx".to_string(),
        attributes: vec![
            EventAttribute::indexed("submitter", tx.pub_key_hex()),
            EventAttribute::indexed("type", tx.command().name()),
        ],
    }];

    let attrs = tx.attributes();
    if !attrs.is_empty() {
        let attributes = [
            ("market", &attrs.market),
            ("asset", &attrs.asset),
            ("proposal", &attrs.proposal),
            ("reference", &attrs.reference),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_ref().map(|v| EventAttribute::indexed(key, v.as_str())))
        .collect();

        events.push(Event {
            kind: "command".to_string(),
            attributes,
        });
    }

    events
}

fn with_events(mut response: ResponseTx, tx: &Tx) -> ResponseTx {
    response.events.extend(tx_events(tx));
    response
}

impl Application for App {
    fn info(&self) -> ResponseInfo {
        let state = self.state.read();
        ResponseInfo {
            data: "tradechain".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            app_version: 1,
            last_block_height: state.last_height,
            last_block_app_hash: state.last_hash.clone(),
        }
    }

    fn init_chain(&self, request: RequestInitChain) -> Result<ResponseInitChain> {
        info!(
            chain_id = %request.chain_id,
            validators = request.validators.len(),
            "InitChain"
        );

        let genesis = load_genesis_state(&request.app_state_bytes)?;
        *self.replay.lock() = ReplayProtector::new(genesis.replay_attack_threshold);

        {
            let mut state = self.state.write();
            state.chain_id = request.chain_id.clone();
            state.block.chain_id = request.chain_id.clone();
            state.block.time = request.time;
            state.validators = request
                .validators
                .iter()
                .map(|v| hex::encode(&v.pub_key))
                .collect();
            state.genesis = genesis;
        }

        if let Some(hook) = &self.on_init_chain {
            hook(&request).map_err(Error::InitChain)?;
        }

        Ok(ResponseInitChain {
            validators: request.validators,
            app_hash: Vec::new(),
        })
    }

    fn begin_block(&self, request: RequestBeginBlock) {
        debug!(height = request.height, time = %request.time, "BeginBlock");

        let block = BlockContext {
            height: request.height,
            time: request.time,
            hash: request.hash,
            chain_id: request.chain_id,
        };
        {
            let mut state = self.state.write();
            if !block.chain_id.is_empty() {
                state.chain_id = block.chain_id.clone();
            }
            state.block = block.clone();
        }

        self.rates.next_block();
        self.replay.lock().set_height(block.height);

        if let Some(hook) = &self.on_begin_block {
            hook(&block);
        }
    }

    fn check_tx(&self, request: RequestCheckTx) -> ResponseCheckTx {
        let tx = match self.cache.get(&request.tx) {
            Some(tx) => tx,
            None => match self.decode(&request.tx) {
                Ok(tx) => tx,
                Err(response) => return response,
            },
        };

        let response = match self.admit(&request.tx, &tx) {
            Ok(()) => ResponseTx::ok(),
            Err(response) => response,
        };
        with_events(response, &tx)
    }

    fn deliver_tx(&self, request: RequestDeliverTx) -> ResponseDeliverTx {
        let tx = match self.cache.take(&request.tx) {
            Some(tx) => tx,
            None => match self.decode(&request.tx) {
                Ok(tx) => tx,
                Err(response) => return response,
            },
        };

        let response = match self.execute(&tx) {
            Ok(()) => ResponseTx::ok(),
            Err(response) => response,
        };
        with_events(response, &tx)
    }

    fn end_block(&self, request: RequestEndBlock) -> ResponseEndBlock {
        debug!(height = request.height, "EndBlock");

        if let Some(policy) = &self.spam {
            policy.end_of_block(request.height);
        }
        if let Some(hook) = &self.on_end_block {
            hook(&self.block_context());
        }

        ResponseEndBlock::default()
    }

    fn commit(&self) -> ResponseCommit {
        let block = self.block_context();
        let hash = match &self.on_commit {
            Some(hook) => hook(&block),
            None => Vec::new(),
        };

        self.replay.lock().commit();
        {
            let mut state = self.state.write();
            state.last_height = block.height;
            state.last_hash = hash.clone();
        }

        info!(height = block.height, hash = %hex::encode(&hash), "Committed block");
        ResponseCommit { data: hash }
    }

    fn list_snapshots(&self) -> Vec<Snapshot> {
        self.snapshots.list()
    }

    fn offer_snapshot(&self, request: RequestOfferSnapshot) -> ResponseOfferSnapshot {
        self.snapshots.offer(request)
    }

    fn load_snapshot_chunk(&self, request: RequestLoadSnapshotChunk) -> ResponseLoadSnapshotChunk {
        self.snapshots.load_chunk(request)
    }

    fn apply_snapshot_chunk(&self, request: RequestApplySnapshotChunk) -> ResponseApplySnapshotChunk {
        self.snapshots.apply_chunk(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use ed25519_dalek::SigningKey;
    use protocol_core::payload::{NodeVote, OrderSubmission, Side, WithdrawSubmission};
    use protocol_core::{sign, CommandPayload, EnvelopeCodec, InputData, ProofOfWork};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const CHAIN: &str = "test-chain";

    /// Codec wrapper counting decode calls
    #[derive(Default)]
    struct CountingCodec {
        inner: EnvelopeCodec,
        calls: AtomicUsize,
    }

    impl Codec for CountingCodec {
        fn decode(&self, raw: &[u8], chain_id: &str) -> protocol_core::Result<Tx> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.decode(raw, chain_id)
        }
    }

    fn key(seed: u8) -> SigningKey {
        SigningKey::from_bytes(&[seed; 32])
    }

    fn order(key: &SigningKey, nonce: u64, block_height: u64) -> Vec<u8> {
        let input = InputData {
            nonce,
            block_height,
            command: CommandPayload::SubmitOrder(OrderSubmission {
                market_id: "BTC-USD".to_string(),
                price: "100".to_string(),
                size: 1,
                side: Side::Buy,
                reference: "ref-1".to_string(),
            }),
        };
        sign(key, CHAIN, &input, ProofOfWork::default()).unwrap()
    }

    fn withdraw(key: &SigningKey, nonce: u64) -> Vec<u8> {
        let input = InputData {
            nonce,
            block_height: 1,
            command: CommandPayload::Withdraw(WithdrawSubmission {
                asset: "USDT".to_string(),
                amount: "5".to_string(),
            }),
        };
        sign(key, CHAIN, &input, ProofOfWork::default()).unwrap()
    }

    fn node_vote(key: &SigningKey, nonce: u64) -> Vec<u8> {
        let input = InputData {
            nonce,
            block_height: 1,
            command: CommandPayload::NodeVote(NodeVote {
                reference: "deposit-7".to_string(),
            }),
        };
        sign(key, CHAIN, &input, ProofOfWork::default()).unwrap()
    }

    fn app_with(codec: Arc<dyn Codec>, config: &Config) -> App {
        let mut app = App::new(config, codec);
        app.handle_deliver_tx(Command::SubmitOrder, |_: &TxContext, _: &Tx| Ok(()));
        app
    }

    fn start(app: &App, validators: Vec<ValidatorUpdate>) {
        app.init_chain(RequestInitChain {
            chain_id: CHAIN.to_string(),
            time: Utc.timestamp_opt(0, 0).unwrap(),
            validators,
            app_state_bytes: br#"{"network":{"replay_attack_threshold":10}}"#.to_vec(),
            initial_height: 1,
        })
        .unwrap();
        begin(app, 1);
    }

    fn begin(app: &App, height: u64) {
        app.begin_block(RequestBeginBlock {
            height,
            time: Utc.timestamp_opt(height as i64, 0).unwrap(),
            hash: vec![height as u8],
            chain_id: CHAIN.to_string(),
        });
    }

    fn check(app: &App, raw: &[u8]) -> ResponseTx {
        app.check_tx(RequestCheckTx { tx: raw.to_vec() })
    }

    fn deliver(app: &App, raw: &[u8]) -> ResponseTx {
        app.deliver_tx(RequestDeliverTx { tx: raw.to_vec() })
    }

    #[test]
    fn test_decodes_once_across_phases() {
        let codec = Arc::new(CountingCodec::default());
        let app = app_with(codec.clone(), &Config::default());
        start(&app, vec![]);

        let raw = order(&key(1), 1, 1);
        assert!(check(&app, &raw).is_ok());
        assert!(deliver(&app, &raw).is_ok());

        assert_eq!(codec.calls.load(Ordering::SeqCst), 1);
        assert_eq!(app.cached_txs(), 0);
    }

    #[test]
    fn test_decoding_failure() {
        let app = app_with(Arc::new(EnvelopeCodec::new()), &Config::default());
        start(&app, vec![]);

        let response = check(&app, b"garbage");
        assert_eq!(response.code, ResponseCode::DecodingFailure);
        assert!(response.events.is_empty());
        assert_eq!(deliver(&app, b"garbage").code, ResponseCode::DecodingFailure);
    }

    #[test]
    fn test_unknown_command_at_delivery() {
        let app = app_with(Arc::new(EnvelopeCodec::new()), &Config::default());
        start(&app, vec![]);

        let raw = withdraw(&key(1), 1);
        // No CheckTx handler is fine
        assert!(check(&app, &raw).is_ok());

        let response = deliver(&app, &raw);
        assert_eq!(response.code, ResponseCode::UnknownCommandError);
        assert_eq!(app.cached_txs(), 0);
    }

    #[test]
    fn test_handler_error_codes() {
        let mut app = App::new(&Config::default(), Arc::new(EnvelopeCodec::new()));
        app.handle_check_tx(Command::Withdraw, |_: &TxContext, _: &Tx| {
            Err(TxError::validation("insufficient balance"))
        });
        app.handle_deliver_tx(Command::SubmitOrder, |_: &TxContext, _: &Tx| {
            Err(TxError::PartialProcessing("half filled".to_string()))
        });
        start(&app, vec![]);

        let response = check(&app, &withdraw(&key(1), 1));
        assert_eq!(response.code, ResponseCode::ValidationFailure);
        assert_eq!(response.log, "validation failed: insufficient balance");
        assert_eq!(app.cached_txs(), 0);

        let response = deliver(&app, &order(&key(1), 1, 1));
        assert_eq!(response.code, ResponseCode::PartialProcessingError);
    }

    #[test]
    fn test_failed_delivery_still_clears_cache() {
        let mut app = App::new(&Config::default(), Arc::new(EnvelopeCodec::new()));
        app.handle_deliver_tx(Command::SubmitOrder, |_: &TxContext, _: &Tx| {
            Err(TxError::internal("boom"))
        });
        start(&app, vec![]);

        let raw = order(&key(1), 1, 1);
        assert!(check(&app, &raw).is_ok());
        assert_eq!(app.cached_txs(), 1);

        assert_eq!(deliver(&app, &raw).code, ResponseCode::InternalError);
        assert_eq!(app.cached_txs(), 0);
    }

    #[test]
    fn test_response_events() {
        let app = app_with(Arc::new(EnvelopeCodec::new()), &Config::default());
        start(&app, vec![]);

        let signer = key(3);
        let response = check(&app, &order(&signer, 1, 1));

        let tx_event = response.events_of("tx").next().unwrap();
        assert_eq!(
            tx_event.attribute("submitter"),
            Some(hex::encode(signer.verifying_key().to_bytes()).as_str())
        );
        assert_eq!(tx_event.attribute("type"), Some("Submit Order"));

        let command = response.events_of("command").next().unwrap();
        assert_eq!(command.attribute("market"), Some("BTC-USD"));
        assert_eq!(command.attribute("reference"), Some("ref-1"));
        assert_eq!(command.attribute("asset"), None);
        assert!(command.attributes.iter().all(|a| a.index));
    }

    #[test]
    fn test_handler_context_carries_trace_id() {
        let seen = Arc::new(Mutex::new(None));
        let mut app = App::new(&Config::default(), Arc::new(EnvelopeCodec::new()));
        let sink = seen.clone();
        app.handle_deliver_tx(Command::SubmitOrder, move |ctx: &TxContext, tx: &Tx| {
            assert_eq!(ctx.trace_id, tx.hash_hex());
            *sink.lock() = Some(ctx.block.height);
            Ok(())
        });
        start(&app, vec![]);

        assert!(deliver(&app, &order(&key(1), 1, 1)).is_ok());
        assert_eq!(*seen.lock(), Some(1));
    }

    #[test]
    fn test_pre_check_hooks() {
        let mut app = app_with(Arc::new(EnvelopeCodec::new()), &Config::default());
        app.on_check_tx(|_: &TxContext, _: &Tx| Err(TxError::validation("closed")));
        app.on_deliver_tx(|_: &TxContext, _: &Tx| Err(TxError::internal("closed")));
        start(&app, vec![]);

        let raw = order(&key(1), 1, 1);
        assert_eq!(check(&app, &raw).code, ResponseCode::ValidationFailure);
        assert_eq!(deliver(&app, &raw).code, ResponseCode::InternalError);
    }

    #[test]
    fn test_rate_limit_in_check_tx_only() {
        let mut config = Config::default();
        config.rate_limit.requests = 2;
        config.rate_limit.window_blocks = 5;
        let app = app_with(Arc::new(EnvelopeCodec::new()), &config);
        start(&app, vec![]);

        let signer = key(4);
        assert!(check(&app, &order(&signer, 1, 1)).is_ok());
        let response = check(&app, &order(&signer, 2, 1));
        assert_eq!(response.code, ResponseCode::SpamError);

        // Delivery is never rate limited
        assert!(deliver(&app, &order(&signer, 3, 1)).is_ok());
        assert!(deliver(&app, &order(&signer, 4, 1)).is_ok());
    }

    #[test]
    fn test_validators_exempt_from_rate_limit() {
        let mut config = Config::default();
        config.rate_limit.requests = 1;
        let app = app_with(Arc::new(EnvelopeCodec::new()), &config);

        let validator = key(5);
        start(
            &app,
            vec![ValidatorUpdate {
                pub_key: validator.verifying_key().to_bytes().to_vec(),
                power: 10,
            }],
        );

        for nonce in 0..5 {
            assert!(check(&app, &order(&validator, nonce, 1)).is_ok());
        }
        assert_eq!(check(&app, &order(&key(6), 1, 1)).code, ResponseCode::SpamError);
    }

    #[test]
    fn test_replay_rejected() {
        let app = app_with(Arc::new(EnvelopeCodec::new()), &Config::default());
        start(&app, vec![]);

        let raw = order(&key(1), 1, 1);
        assert!(deliver(&app, &raw).is_ok());
        assert_eq!(deliver(&app, &raw).code, ResponseCode::SpamError);

        // Pending state is not visible to admission before commit
        assert!(check(&app, &raw).is_ok());
        app.end_block(RequestEndBlock { height: 1 });
        app.commit();
        begin(&app, 2);
        assert_eq!(check(&app, &raw).code, ResponseCode::SpamError);
    }

    #[test]
    fn test_stale_transaction_rejected() {
        let app = app_with(Arc::new(EnvelopeCodec::new()), &Config::default());
        start(&app, vec![]);
        begin(&app, 20);

        // Genesis threshold is 10
        assert_eq!(check(&app, &order(&key(1), 1, 9)).code, ResponseCode::SpamError);
        assert!(check(&app, &order(&key(1), 2, 10)).is_ok());
    }

    #[test]
    fn test_resent_with_new_pow_is_replay() {
        let app = app_with(Arc::new(EnvelopeCodec::new()), &Config::default());
        start(&app, vec![]);

        let signer = key(1);
        let input = InputData {
            nonce: 1,
            block_height: 1,
            command: CommandPayload::SubmitOrder(OrderSubmission {
                market_id: "BTC-USD".to_string(),
                price: "100".to_string(),
                size: 1,
                side: Side::Buy,
                reference: "ref-1".to_string(),
            }),
        };
        let raw = sign(&signer, CHAIN, &input, ProofOfWork::default()).unwrap();
        let resent = sign(
            &signer,
            CHAIN,
            &input,
            ProofOfWork {
                tid: "other".to_string(),
                nonce: 7,
            },
        )
        .unwrap();
        assert_ne!(raw, resent);

        assert!(deliver(&app, &raw).is_ok());
        assert_eq!(deliver(&app, &resent).code, ResponseCode::SpamError);

        app.end_block(RequestEndBlock { height: 1 });
        app.commit();
        begin(&app, 2);
        assert_eq!(check(&app, &resent).code, ResponseCode::SpamError);
    }

    #[test]
    fn test_validator_commands_need_validator_key() {
        let mut app = App::new(&Config::default(), Arc::new(EnvelopeCodec::new()));
        app.handle_deliver_tx(Command::NodeVote, |_: &TxContext, _: &Tx| Ok(()));

        let validator = key(5);
        start(
            &app,
            vec![ValidatorUpdate {
                pub_key: validator.verifying_key().to_bytes().to_vec(),
                power: 10,
            }],
        );

        let outsider = node_vote(&key(6), 1);
        let response = check(&app, &outsider);
        assert_eq!(response.code, ResponseCode::ValidationFailure);
        assert_eq!(app.cached_txs(), 0);
        assert_eq!(deliver(&app, &outsider).code, ResponseCode::ValidationFailure);

        let vote = node_vote(&validator, 1);
        assert!(check(&app, &vote).is_ok());
        assert!(deliver(&app, &vote).is_ok());
    }

    #[test]
    fn test_handler_context_carries_deterministic_id() {
        let seen = Arc::new(Mutex::new(None));
        let mut app = App::new(&Config::default(), Arc::new(EnvelopeCodec::new()));
        let sink = seen.clone();
        app.handle_deliver_tx(Command::SubmitOrder, move |ctx: &TxContext, tx: &Tx| {
            assert_eq!(ctx.deterministic_id, tx.deterministic_id());
            assert_ne!(ctx.deterministic_id, ctx.trace_id);
            *sink.lock() = Some(ctx.deterministic_id.clone());
            Ok(())
        });
        start(&app, vec![]);

        assert!(deliver(&app, &order(&key(1), 1, 1)).is_ok());
        assert_eq!(seen.lock().as_ref().map(String::len), Some(64));
    }

    #[test]
    fn test_init_chain_requires_network_state() {
        let app = app_with(Arc::new(EnvelopeCodec::new()), &Config::default());
        let err = app
            .init_chain(RequestInitChain {
                chain_id: CHAIN.to_string(),
                time: Utc::now(),
                validators: vec![],
                app_state_bytes: br#"{"validators":{}}"#.to_vec(),
                initial_height: 1,
            })
            .unwrap_err();
        assert!(matches!(err, Error::NoNetworkGenesisState));
    }

    #[test]
    fn test_init_chain_hook_failure_is_fatal() {
        let mut app = app_with(Arc::new(EnvelopeCodec::new()), &Config::default());
        app.on_init_chain(|_: &RequestInitChain| Err("bad assets".to_string()));

        let err = app
            .init_chain(RequestInitChain {
                chain_id: CHAIN.to_string(),
                time: Utc::now(),
                validators: vec![],
                app_state_bytes: br#"{"network":{"replay_attack_threshold":1}}"#.to_vec(),
                initial_height: 1,
            })
            .unwrap_err();
        assert!(matches!(err, Error::InitChain(_)));
    }

    #[test]
    fn test_commit_hook_and_info() {
        let mut app = app_with(Arc::new(EnvelopeCodec::new()), &Config::default());
        app.on_commit(|block: &BlockContext| block.height.to_be_bytes().to_vec());
        start(&app, vec![]);

        assert_eq!(app.info().last_block_height, 0);
        let response = app.commit();
        assert_eq!(response.data, 1u64.to_be_bytes().to_vec());

        let info = app.info();
        assert_eq!(info.last_block_height, 1);
        assert_eq!(info.last_block_app_hash, response.data);
    }

    #[test]
    fn test_commit_without_hook_is_empty() {
        let app = app_with(Arc::new(EnvelopeCodec::new()), &Config::default());
        start(&app, vec![]);
        assert!(app.commit().data.is_empty());
    }

    #[test]
    fn test_snapshot_engine_seeds_info() {
        struct Loaded;
        impl SnapshotEngine for Loaded {
            fn info(&self) -> crate::snapshot::SnapshotInfo {
                crate::snapshot::SnapshotInfo {
                    height: 42,
                    hash: vec![4, 2],
                }
            }
            fn list(&self) -> Vec<Snapshot> {
                vec![Snapshot {
                    height: 42,
                    ..Default::default()
                }]
            }
            fn offer(&self, _: RequestOfferSnapshot) -> ResponseOfferSnapshot {
                ResponseOfferSnapshot {
                    result: OfferSnapshotResult::Accept,
                }
            }
            fn load_chunk(&self, _: RequestLoadSnapshotChunk) -> ResponseLoadSnapshotChunk {
                ResponseLoadSnapshotChunk { chunk: vec![1] }
            }
            fn apply_chunk(&self, _: RequestApplySnapshotChunk) -> ResponseApplySnapshotChunk {
                ResponseApplySnapshotChunk {
                    result: ApplySnapshotChunkResult::Accept,
                    ..Default::default()
                }
            }
        }

        let mut app = app_with(Arc::new(EnvelopeCodec::new()), &Config::default());
        app.with_snapshot_engine(Arc::new(Loaded));

        assert_eq!(app.info().last_block_height, 42);
        assert_eq!(app.list_snapshots().len(), 1);
        assert_eq!(
            app.offer_snapshot(RequestOfferSnapshot::default()).result,
            OfferSnapshotResult::Accept
        );
        assert_eq!(
            app.load_snapshot_chunk(RequestLoadSnapshotChunk::default()).chunk,
            vec![1]
        );
    }

    #[test]
    fn test_spam_policy_consulted() {
        use crate::spam::SpamRejection;
        use std::sync::atomic::AtomicU64;

        #[derive(Default)]
        struct DenyDeliver {
            ended: AtomicU64,
        }
        impl SpamPolicy for DenyDeliver {
            fn pre_block_accept(&self, _: &Tx) -> std::result::Result<(), SpamRejection> {
                Ok(())
            }
            fn post_block_accept(&self, _: &Tx) -> std::result::Result<(), SpamRejection> {
                Err(SpamRejection("too many votes".to_string()))
            }
            fn end_of_block(&self, height: u64) {
                self.ended.store(height, Ordering::SeqCst);
            }
        }

        let policy = Arc::new(DenyDeliver::default());
        let mut app = app_with(Arc::new(EnvelopeCodec::new()), &Config::default());
        app.with_spam_policy(policy.clone());
        start(&app, vec![]);

        let raw = order(&key(1), 1, 1);
        assert!(check(&app, &raw).is_ok());
        assert_eq!(deliver(&app, &raw).code, ResponseCode::SpamError);

        app.end_block(RequestEndBlock { height: 1 });
        assert_eq!(policy.ended.load(Ordering::SeqCst), 1);
    }
}
