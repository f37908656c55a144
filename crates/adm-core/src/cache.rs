//! Generic TTL cache: in-memory tier over the durable key-value store.
//!
//! Reads check memory first and fall back to the durable tier, re-populating
//! memory on a hit. Writes go to memory synchronously and to the durable tier
//! best-effort; a durable failure is logged and never surfaces to the caller.
//! After every write, expired entries are purged and the oldest entries (by
//! write timestamp) are evicted until `max_entries` holds.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::store::{unix_timestamp, KvStore};

/// Per-instance cache tuning.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// Entries older than this are treated as absent.
    pub ttl: Duration,
    /// Upper bound on entries held; oldest are evicted past it.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            max_entries: 50,
        }
    }
}

/// A cached value with its write timestamp and time-to-live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub value: T,
    pub stored_at: i64,
    pub ttl_secs: u64,
}

impl<T> CacheEntry<T> {
    /// An entry is valid iff `now - stored_at < ttl`.
    fn is_valid(&self, now: i64) -> bool {
        now - self.stored_at < self.ttl_secs as i64
    }
}

/// Memory-tier slot: the entry plus an insertion sequence so same-second
/// writes still evict in write order.
struct MemEntry<T> {
    entry: CacheEntry<T>,
    seq: u64,
}

/// Two-tier TTL cache. Values are serde-serialized into the durable tier
/// under `cache/<namespace>/<key>`.
pub struct TtlCache<T> {
    namespace: String,
    memory: Mutex<HashMap<String, MemEntry<T>>>,
    store: KvStore,
    ttl: Duration,
    max_entries: usize,
    next_seq: AtomicU64,
}

impl<T: Clone + Serialize + DeserializeOwned> TtlCache<T> {
    pub fn new(store: KvStore, namespace: impl Into<String>, cfg: CacheConfig) -> Self {
        Self {
            namespace: namespace.into(),
            memory: Mutex::new(HashMap::new()),
            store,
            ttl: cfg.ttl,
            max_entries: cfg.max_entries.max(1),
            next_seq: AtomicU64::new(0),
        }
    }

    fn durable_key(&self, key: &str) -> String {
        format!("cache/{}/{}", self.namespace, key)
    }

    /// Number of entries currently held in the memory tier.
    pub fn len(&self) -> usize {
        self.memory.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up `key`: memory tier first, then durable. A durable hit
    /// re-populates memory; a stale or unreadable durable row is dropped.
    pub async fn get(&self, key: &str) -> Option<T> {
        let now = unix_timestamp();
        {
            let mut mem = self.memory.lock().unwrap();
            match mem.get(key) {
                Some(slot) if slot.entry.is_valid(now) => return Some(slot.entry.value.clone()),
                Some(_) => {
                    mem.remove(key);
                }
                None => {}
            }
        }

        let dkey = self.durable_key(key);
        match self.store.get(&dkey).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<CacheEntry<T>>(&bytes) {
                Ok(entry) if entry.is_valid(now) => {
                    let value = entry.value.clone();
                    let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                    self.memory
                        .lock()
                        .unwrap()
                        .insert(key.to_string(), MemEntry { entry, seq });
                    Some(value)
                }
                _ => {
                    if let Err(e) = self.store.delete(&dkey).await {
                        tracing::warn!(key, "could not drop stale cache entry: {e:#}");
                    }
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key, "cache durable read failed: {e:#}");
                None
            }
        }
    }

    /// Store `value` under `key` with the instance TTL.
    pub async fn set(&self, key: &str, value: T) {
        self.set_with_ttl(key, value, self.ttl).await;
    }

    /// Store `value` under `key` with an explicit TTL. Memory is updated
    /// synchronously; the durable write and eviction cleanup are best-effort.
    pub async fn set_with_ttl(&self, key: &str, value: T, ttl: Duration) {
        let entry = CacheEntry {
            value,
            stored_at: unix_timestamp(),
            ttl_secs: ttl.as_secs(),
        };
        let bytes = serde_json::to_vec(&entry);

        let dropped = {
            let mut mem = self.memory.lock().unwrap();
            let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
            mem.insert(key.to_string(), MemEntry { entry, seq });
            purge_and_evict(&mut mem, self.max_entries)
        };

        match bytes {
            Ok(b) => {
                if let Err(e) = self.store.put(&self.durable_key(key), &b).await {
                    tracing::warn!(key, "cache durable write failed: {e:#}");
                }
            }
            Err(e) => tracing::warn!(key, "cache entry not serializable: {e}"),
        }
        for k in dropped {
            if let Err(e) = self.store.delete(&self.durable_key(&k)).await {
                tracing::debug!(key = %k, "evicted cache entry not dropped from store: {e:#}");
            }
        }
    }

    /// Remove `key` from both tiers.
    pub async fn remove(&self, key: &str) {
        self.memory.lock().unwrap().remove(key);
        if let Err(e) = self.store.delete(&self.durable_key(key)).await {
            tracing::warn!(key, "cache durable delete failed: {e:#}");
        }
    }

    /// Drop every entry in both tiers.
    pub async fn clear(&self) {
        self.memory.lock().unwrap().clear();
        let prefix = format!("cache/{}/", self.namespace);
        if let Err(e) = self.store.delete_prefix(&prefix).await {
            tracing::warn!(namespace = %self.namespace, "cache durable clear failed: {e:#}");
        }
    }
}

/// Drop expired entries, then evict oldest-by-`(stored_at, seq)` until the
/// bound holds. Returns the removed keys so durable rows can be cleaned up.
fn purge_and_evict<T>(
    mem: &mut HashMap<String, MemEntry<T>>,
    max_entries: usize,
) -> Vec<String> {
    let now = unix_timestamp();
    let mut dropped: Vec<String> = mem
        .iter()
        .filter(|(_, slot)| !slot.entry.is_valid(now))
        .map(|(k, _)| k.clone())
        .collect();
    for k in &dropped {
        mem.remove(k);
    }

    while mem.len() > max_entries {
        let oldest = mem
            .iter()
            .min_by_key(|(_, slot)| (slot.entry.stored_at, slot.seq))
            .map(|(k, _)| k.clone());
        match oldest {
            Some(k) => {
                mem.remove(&k);
                dropped.push(k);
            }
            None => break,
        }
    }
    dropped
}
