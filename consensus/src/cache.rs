//! Validated-transaction cache
//!
//! Bridges CheckTx and DeliverTx: a transaction admitted to the mempool is
//! kept decoded, keyed by its exact raw bytes, until the block that delivers
//! it takes the entry out again.

use lru::LruCache;
use parking_lot::Mutex;
use protocol_core::Tx;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Default capacity
pub const DEFAULT_TX_CACHE_CAPACITY: usize = 10_000;

/// LRU bounded map from raw bytes to decoded [`Tx`], internally synchronized
#[derive(Debug)]
pub struct TxCache {
    entries: Mutex<LruCache<Vec<u8>, Arc<Tx>>>,
}

impl TxCache {
    /// Create cache holding at most `capacity` entries (minimum one)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Look up an entry, refreshing its recency
    pub fn get(&self, raw: &[u8]) -> Option<Arc<Tx>> {
        self.entries.lock().get(raw).cloned()
    }

    /// Insert or refresh an entry
    pub fn insert(&self, raw: &[u8], tx: Arc<Tx>) {
        self.entries.lock().put(raw.to_vec(), tx);
    }

    /// Remove and return an entry
    pub fn take(&self, raw: &[u8]) -> Option<Arc<Tx>> {
        self.entries.lock().pop(raw)
    }

    /// Whether `raw` is cached
    pub fn contains(&self, raw: &[u8]) -> bool {
        self.entries.lock().contains(raw)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TxCache {
    fn default() -> Self {
        Self::new(DEFAULT_TX_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol_core::payload::VoteSubmission;
    use protocol_core::{CommandPayload, InputData, ProofOfWork};

    fn tx(raw: &[u8]) -> Arc<Tx> {
        let input = InputData {
            nonce: 1,
            block_height: 1,
            command: CommandPayload::Vote(VoteSubmission {
                proposal_id: "p".to_string(),
                accept: true,
            }),
        };
        Arc::new(Tx::new(raw, input, vec![1], vec![2], ProofOfWork::default()))
    }

    #[test]
    fn test_take_removes_entry() {
        let cache = TxCache::new(4);
        cache.insert(b"a", tx(b"a"));

        assert!(cache.contains(b"a"));
        assert!(cache.take(b"a").is_some());
        assert!(cache.take(b"a").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = TxCache::new(2);
        cache.insert(b"a", tx(b"a"));
        cache.insert(b"b", tx(b"b"));

        // Touch "a" so "b" becomes the eviction candidate
        assert!(cache.get(b"a").is_some());
        cache.insert(b"c", tx(b"c"));

        assert!(cache.contains(b"a"));
        assert!(!cache.contains(b"b"));
        assert!(cache.contains(b"c"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let cache = TxCache::new(0);
        cache.insert(b"a", tx(b"a"));
        cache.insert(b"b", tx(b"b"));
        assert_eq!(cache.len(), 1);
    }
}
