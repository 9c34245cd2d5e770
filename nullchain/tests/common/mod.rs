//! Shared fixtures: a recording application and a fixed clock

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use consensus::*;
use nullchain::{Clock, Config, NullChain, NullGenesis, ReplayConfig};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle call seen by [`Recorder`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    InitChain {
        chain_id: String,
        validators: usize,
    },
    BeginBlock {
        height: u64,
        time: DateTime<Utc>,
    },
    DeliverTx(Vec<u8>),
    EndBlock(u64),
    Commit {
        height: u64,
        hash: Vec<u8>,
    },
}

#[derive(Default)]
struct RecorderState {
    calls: Vec<Call>,
    height: u64,
    hash: Vec<u8>,
    block: Vec<Vec<u8>>,
}

/// Application recording every lifecycle call.
///
/// Commit hashes chain the previous hash, the height and the delivered
/// transactions, so identical histories give identical hashes.
pub struct Recorder {
    state: Mutex<RecorderState>,
    restored_height: u64,
    panic_on: Option<Vec<u8>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Self::restored(0)
    }

    /// Application that reports `height` as already committed
    pub fn restored(height: u64) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(RecorderState::default()),
            restored_height: height,
            panic_on: None,
        })
    }

    /// Application panicking when `tx` is delivered
    pub fn panicking_on(tx: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(RecorderState::default()),
            restored_height: 0,
            panic_on: Some(tx.to_vec()),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn commits(&self) -> Vec<(u64, Vec<u8>)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Commit { height, hash } => Some((height, hash)),
                _ => None,
            })
            .collect()
    }

    pub fn begin_blocks(&self) -> Vec<(u64, DateTime<Utc>)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::BeginBlock { height, time } => Some((height, time)),
                _ => None,
            })
            .collect()
    }

    pub fn delivered(&self) -> Vec<Vec<u8>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::DeliverTx(tx) => Some(tx),
                _ => None,
            })
            .collect()
    }

    pub fn init_chains(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::InitChain { .. }))
            .count()
    }
}

impl Application for Recorder {
    fn info(&self) -> ResponseInfo {
        let state = self.state.lock();
        ResponseInfo {
            last_block_height: state.height.max(self.restored_height),
            last_block_app_hash: state.hash.clone(),
            ..Default::default()
        }
    }

    fn init_chain(&self, request: RequestInitChain) -> consensus::Result<ResponseInitChain> {
        load_genesis_state(&request.app_state_bytes)?;
        self.state.lock().calls.push(Call::InitChain {
            chain_id: request.chain_id,
            validators: request.validators.len(),
        });
        Ok(ResponseInitChain::default())
    }

    fn begin_block(&self, request: RequestBeginBlock) {
        let mut state = self.state.lock();
        state.height = request.height;
        state.calls.push(Call::BeginBlock {
            height: request.height,
            time: request.time,
        });
    }

    fn check_tx(&self, _request: RequestCheckTx) -> ResponseCheckTx {
        ResponseTx::ok()
    }

    fn deliver_tx(&self, request: RequestDeliverTx) -> ResponseDeliverTx {
        if self.panic_on.as_deref() == Some(request.tx.as_slice()) {
            panic!("poisoned transaction");
        }
        let mut state = self.state.lock();
        state.block.push(request.tx.clone());
        state.calls.push(Call::DeliverTx(request.tx));
        ResponseTx::ok()
    }

    fn end_block(&self, request: RequestEndBlock) -> ResponseEndBlock {
        self.state.lock().calls.push(Call::EndBlock(request.height));
        ResponseEndBlock::default()
    }

    fn commit(&self) -> ResponseCommit {
        let mut state = self.state.lock();
        let mut hasher = Sha256::new();
        hasher.update(&state.hash);
        hasher.update(state.height.to_be_bytes());
        for tx in state.block.drain(..) {
            hasher.update(tx);
        }
        state.hash = hasher.finalize().to_vec();

        let call = Call::Commit {
            height: state.height,
            hash: state.hash.clone(),
        };
        state.calls.push(call);
        ResponseCommit {
            data: state.hash.clone(),
        }
    }
}

type Intercept = Box<dyn Fn(&Arc<NullChain>) + Send + Sync>;

/// [`Recorder`] that runs a callback against the driving chain from inside
/// its first DeliverTx, while the chain is busy delivering
pub struct Intercepting {
    pub inner: Arc<Recorder>,
    chain: Mutex<Option<Arc<NullChain>>>,
    fired: AtomicBool,
    intercept: Intercept,
}

impl Intercepting {
    pub fn new(intercept: impl Fn(&Arc<NullChain>) + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            inner: Recorder::new(),
            chain: Mutex::new(None),
            fired: AtomicBool::new(false),
            intercept: Box::new(intercept),
        })
    }

    /// Hand over the chain driving this application
    pub fn attach(&self, chain: Arc<NullChain>) {
        *self.chain.lock() = Some(chain);
    }

    pub fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

impl Application for Intercepting {
    fn info(&self) -> ResponseInfo {
        self.inner.info()
    }

    fn init_chain(&self, request: RequestInitChain) -> consensus::Result<ResponseInitChain> {
        self.inner.init_chain(request)
    }

    fn begin_block(&self, request: RequestBeginBlock) {
        self.inner.begin_block(request)
    }

    fn check_tx(&self, request: RequestCheckTx) -> ResponseCheckTx {
        self.inner.check_tx(request)
    }

    fn deliver_tx(&self, request: RequestDeliverTx) -> ResponseDeliverTx {
        if !self.fired.swap(true, Ordering::SeqCst) {
            let chain = self.chain.lock().clone();
            if let Some(chain) = chain {
                (self.intercept)(&chain);
            }
        }
        self.inner.deliver_tx(request)
    }

    fn end_block(&self, request: RequestEndBlock) -> ResponseEndBlock {
        self.inner.end_block(request)
    }

    fn commit(&self) -> ResponseCommit {
        self.inner.commit()
    }
}

/// Clock frozen at one instant
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub fn genesis_time() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

pub fn genesis() -> NullGenesis {
    NullGenesis::from_json(
        br#"{
            "genesis_time": "2023-11-14T22:13:20Z",
            "chain_id": "nullchain-test",
            "app_state": {
                "network": {"replay_attack_threshold": 150},
                "validators": {"AQID": {}}
            }
        }"#,
    )
    .unwrap()
}

pub fn config(block_duration: Duration, transactions_per_block: usize) -> Config {
    Config {
        block_duration,
        transactions_per_block,
        ..Config::default()
    }
}

pub fn recording(mut config: Config, path: &Path, replay: bool) -> Config {
    config.replay = ReplayConfig {
        record: true,
        replay,
        replay_file: Some(path.to_path_buf()),
    };
    config
}

pub fn chain(config: &Config, app: Arc<dyn Application>) -> NullChain {
    NullChain::new(config, genesis(), app, Arc::new(FixedClock(genesis_time()))).unwrap()
}
