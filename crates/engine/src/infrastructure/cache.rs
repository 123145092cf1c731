//! Bounded cache for remote upload URLs.
//!
//! Keyed by `(absolute path, content hash)`, so editing a file in place yields a
//! fresh key. Entries are evicted least-recently-used once the capacity is
//! reached, and optionally expire after a TTL measured against the injected clock.

use std::collections::HashMap;
use std::hash::Hash;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::infrastructure::ports::ClockPort;

/// Default number of cached uploads.
pub const DEFAULT_CAPACITY: usize = 128;

/// Cache key for a previously uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UploadKey {
    pub path: PathBuf,
    pub content_hash: String,
}

impl UploadKey {
    pub fn new(path: impl Into<PathBuf>, content_hash: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content_hash: content_hash.into(),
        }
    }
}

/// A thread-safe LRU cache with optional time-to-live expiration.
pub struct LruCache<K, V> {
    state: RwLock<LruState<K, V>>,
    capacity: usize,
    ttl: Option<Duration>,
    clock: Arc<dyn ClockPort>,
}

struct LruState<K, V> {
    entries: HashMap<K, LruEntry<V>>,
    tick: u64,
}

struct LruEntry<V> {
    value: V,
    inserted_at: DateTime<Utc>,
    last_used: u64,
}

/// Remote URLs of uploaded input files.
pub type UploadCache = LruCache<UploadKey, String>;

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    /// Create a cache holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize, clock: Arc<dyn ClockPort>) -> Self {
        Self {
            state: RwLock::new(LruState {
                entries: HashMap::new(),
                tick: 0,
            }),
            capacity: capacity.max(1),
            ttl: None,
            clock,
        }
    }

    /// Expire entries older than `ttl`.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    fn is_fresh(&self, entry: &LruEntry<V>, now: DateTime<Utc>) -> bool {
        match self.ttl {
            None => true,
            Some(ttl) => match chrono::Duration::from_std(ttl) {
                Ok(ttl) => now - entry.inserted_at < ttl,
                Err(_) => true,
            },
        }
    }

    /// Get a value if present and not expired, marking it most recently used.
    pub async fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let fresh = match state.entries.get(key) {
            None => return None,
            Some(entry) => self.is_fresh(entry, now),
        };
        if !fresh {
            state.entries.remove(key);
            return None;
        }

        state.tick += 1;
        let tick = state.tick;
        state.entries.get_mut(key).map(|entry| {
            entry.last_used = tick;
            entry.value.clone()
        })
    }

    /// Insert a value, evicting the least recently used entry when full.
    ///
    /// Replacing an existing key keeps the last written value.
    pub async fn insert(&self, key: K, value: V) {
        let now = self.clock.now();
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        if !state.entries.contains_key(&key) && state.entries.len() >= self.capacity {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                state.entries.remove(&oldest);
            }
        }

        state.tick += 1;
        let entry = LruEntry {
            value,
            inserted_at: now,
            last_used: state.tick,
        };
        state.entries.insert(key, entry);
    }

    /// Current number of entries (including expired ones not yet dropped).
    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
