//! Suppression of redelivered real-time events.
//!
//! The WebSocket stream may deliver the same post event more than once (after a
//! reconnect, or on a duplicate push). Relaying each copy would post duplicates
//! on the other side of the bridge, so every post payload is reduced to a
//! [`DedupKey`] and checked against a bounded [`DedupCache`] of recently seen
//! keys.
//!
//! # Key Format
//!
//! A key is the lowercase hex SHA-256 digest of the serialized post string
//! exactly as it arrived. Identical payloads map to the same key regardless of
//! arrival order. An edit changes the payload (`message`, `update_at`,
//! `edit_at`), so it yields a new key.
//!
//! # Eviction
//!
//! The cache holds membership only. When full, inserting a new key evicts the
//! least-recently-touched one; a hit counts as a touch.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Default number of keys remembered.
pub const DEFAULT_DEDUP_CAPACITY: usize = 5000;

/// A content digest identifying one serialized post payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DedupKey(String);

impl DedupKey {
    /// Computes the key of a serialized post payload.
    pub fn digest(payload: &str) -> Self {
        DedupKey(hex::encode(Sha256::digest(payload.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// LRU bookkeeping: key → last touch, and last touch → key.
#[derive(Debug, Default)]
struct LruState {
    touched: HashMap<DedupKey, u64>,
    by_recency: BTreeMap<u64, DedupKey>,
    clock: u64,
}

impl LruState {
    fn touch(&mut self, key: &DedupKey) -> bool {
        self.clock += 1;
        let stamp = self.clock;
        match self.touched.get_mut(key) {
            Some(previous) => {
                self.by_recency.remove(&*previous);
                *previous = stamp;
                self.by_recency.insert(stamp, key.clone());
                true
            }
            None => false,
        }
    }

    fn insert(&mut self, key: DedupKey, capacity: usize) {
        while self.touched.len() >= capacity {
            let Some((_, oldest)) = self.by_recency.pop_first() else {
                break;
            };
            self.touched.remove(&oldest);
        }
        self.clock += 1;
        self.touched.insert(key.clone(), self.clock);
        self.by_recency.insert(self.clock, key);
    }
}

/// A bounded, thread-safe set of recently seen [`DedupKey`]s.
#[derive(Debug)]
pub struct DedupCache {
    capacity: usize,
    state: Mutex<LruState>,
}

impl DedupCache {
    /// Creates a cache remembering at most `capacity` keys (at least one).
    pub fn new(capacity: usize) -> Self {
        DedupCache {
            capacity: capacity.max(1),
            state: Mutex::new(LruState::default()),
        }
    }

    /// Records `key` as seen and returns whether it had already been seen.
    ///
    /// The check and the insert happen under one lock acquisition, so two
    /// concurrent callers with the same key cannot both get `false`.
    pub fn seen(&self, key: &DedupKey) -> bool {
        let mut state = self.lock();
        if state.touch(key) {
            return true;
        }
        state.insert(key.clone(), self.capacity);
        false
    }

    /// Returns whether `key` is present, without recording or touching it.
    pub fn contains(&self, key: &DedupKey) -> bool {
        self.lock().touched.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().touched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, LruState> {
        // Every mutation completes before the guard drops, so a poisoned
        // state is still valid.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY)
    }
}
