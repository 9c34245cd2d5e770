//! Block-ticked admission rate limiting
//!
//! Sliding window over the last `W` blocks, capacity `R` per key. Each key
//! owns a ring of `W` per-block counters; the window count is the sum of the
//! ring. The ring advances only on block boundaries, never on a timer, so
//! admission decisions are identical on every node and on every replay.
//!
//! ```text
//!  key "ab12…"   [ 3 | 0 | 1 | 2 ]   sum = 6
//!                        ▲
//!                        ptr (current block)
//! ```

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Rate limiter configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Capacity per key over the window (R)
    pub requests: u32,

    /// Window length in blocks (W)
    pub window_blocks: usize,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests: 500,
            window_blocks: 10,
        }
    }
}

#[derive(Debug)]
struct Windows {
    /// Slot of the current block
    ptr: usize,

    /// Per-key counters, each `window` slots long
    counters: HashMap<String, Vec<u32>>,
}

/// Per-key sliding window limiter, internally synchronized
#[derive(Debug)]
pub struct RateLimiter {
    max: u32,
    window: usize,
    inner: Mutex<Windows>,
}

impl RateLimiter {
    /// Create new rate limiter
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            max: config.requests,
            window: config.window_blocks.max(1),
            inner: Mutex::new(Windows {
                ptr: 0,
                counters: HashMap::new(),
            }),
        }
    }

    /// Record an attempt for `key` and report whether it is admitted.
    ///
    /// The attempt is counted even when it is rejected. A key is rejected
    /// once its window count, including this attempt, reaches the capacity.
    pub fn allow(&self, key: &str) -> bool {
        let mut inner = self.inner.lock();
        let ptr = inner.ptr;
        let window = self.window;

        let slots = inner
            .counters
            .entry(key.to_string())
            .or_insert_with(|| vec![0; window]);
        slots[ptr] = slots[ptr].saturating_add(1);

        let count: u32 = slots.iter().fold(0u32, |acc, c| acc.saturating_add(*c));
        if count >= self.max {
            debug!(key, count, max = self.max, "rate limit exceeded");
            return false;
        }
        true
    }

    /// Window count for `key`
    pub fn count(&self, key: &str) -> u32 {
        self.inner
            .lock()
            .counters
            .get(key)
            .map(|slots| slots.iter().fold(0u32, |acc, c| acc.saturating_add(*c)))
            .unwrap_or(0)
    }

    /// Advance the window by one block.
    ///
    /// Zeroes the new current slot of every key and forgets keys whose whole
    /// window is empty.
    pub fn next_block(&self) {
        let mut inner = self.inner.lock();
        let ptr = (inner.ptr + 1) % self.window;
        inner.ptr = ptr;

        inner.counters.retain(|_, slots| {
            slots[ptr] = 0;
            slots.iter().any(|c| *c > 0)
        });
    }

    /// Number of keys with a non-empty window
    pub fn tracked_keys(&self) -> usize {
        self.inner.lock().counters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(requests: u32, window_blocks: usize) -> RateLimiter {
        RateLimiter::new(RateLimiterConfig {
            requests,
            window_blocks,
        })
    }

    #[test]
    fn test_rejects_at_capacity() {
        let limiter = limiter(3, 2);

        assert!(limiter.allow("a"));
        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));
        assert_eq!(limiter.count("a"), 3);

        // Other keys are independent
        assert!(limiter.allow("b"));
    }

    #[test]
    fn test_rejected_attempts_are_counted() {
        let limiter = limiter(2, 3);

        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));
        assert!(!limiter.allow("a"));
        assert_eq!(limiter.count("a"), 3);
    }

    #[test]
    fn test_window_slides() {
        let limiter = limiter(3, 3);

        assert!(limiter.allow("a"));
        limiter.next_block();
        assert!(limiter.allow("a"));
        limiter.next_block();
        assert!(!limiter.allow("a"));

        // The first slot drops out
        limiter.next_block();
        assert_eq!(limiter.count("a"), 2);
    }

    #[test]
    fn test_recovers_after_full_window() {
        let limiter = limiter(5, 4);

        for _ in 0..20 {
            limiter.allow("a");
        }
        assert!(!limiter.allow("a"));

        for _ in 0..4 {
            limiter.next_block();
        }
        assert!(limiter.allow("a"));
    }

    #[test]
    fn test_next_block_without_keys() {
        let limiter = limiter(10, 5);
        for _ in 0..10_000 {
            limiter.next_block();
        }
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[test]
    fn test_idle_keys_are_forgotten() {
        let limiter = limiter(10, 2);
        limiter.allow("a");
        assert_eq!(limiter.tracked_keys(), 1);

        limiter.next_block();
        assert_eq!(limiter.tracked_keys(), 1);
        limiter.next_block();
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[test]
    fn test_zero_window_is_single_block() {
        let limiter = limiter(2, 0);
        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));
        limiter.next_block();
        assert!(limiter.allow("a"));
    }
}
