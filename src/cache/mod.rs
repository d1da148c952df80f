//! Bounded TTL store for responses.
//!
//! The store serves two roles. On the normal read path ([`ResponseCache::get`])
//! it is a forward cache: entries older than their TTL are deleted on access
//! and never returned. During outages it is the fallback source of truth:
//! [`ResponseCache::peek_stale`] deliberately ignores TTL so the client can
//! serve the last-known-good value after a failed call.
//!
//! Capacity is bounded. A new key entering a full store evicts the
//! oldest-inserted entry (insertion order, not recency of use); replacing an
//! existing key keeps its place in that order.

use std::{
    collections::{HashMap, VecDeque},
    time::{Duration, Instant},
};

use tokio::sync::RwLock;

/// Size and contents summary, as returned by
/// [`crate::ApiClient::cache_stats`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of resident entries, expired or not.
    pub size: usize,
    /// Resident keys, oldest insertion first.
    pub keys: Vec<String>,
}

#[derive(Debug)]
struct CacheEntry<T> {
    data: T,
    created_at: Instant,
    ttl: Duration,
}

impl<T> CacheEntry<T> {
    fn expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) > self.ttl
    }
}

#[derive(Debug)]
struct CacheInner<T> {
    map: HashMap<String, CacheEntry<T>>,
    order: VecDeque<String>,
}

/// Bounded TTL store keyed by strings; `T` is whatever the owner caches.
///
/// Expiry is lazy: nothing is evicted on a timer, entries are checked (and
/// deleted) when read. [`len`] therefore counts expired entries until they are
/// next touched.
///
/// [`len`]: ResponseCache::len
#[derive(Debug)]
pub struct ResponseCache<T> {
    inner: RwLock<CacheInner<T>>,
    default_ttl: Duration,
    max_entries: usize,
}

impl<T: Clone> ResponseCache<T> {
    /// A cache holding at most `max_entries` values for `default_ttl` each.
    pub fn new(default_ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner: RwLock::new(CacheInner {
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
            default_ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Fresh read: returns the value for `key` unless its TTL has elapsed, in
    /// which case the entry is deleted and `None` is returned.
    pub async fn get(&self, key: &str) -> Option<T> {
        let mut inner = self.inner.write().await;
        let expired = inner
            .map
            .get(key)
            .is_some_and(|entry| entry.expired(Instant::now()));
        if expired {
            inner.map.remove(key);
            inner.order.retain(|k| k != key);
            return None;
        }
        inner.map.get(key).map(|entry| entry.data.clone())
    }

    /// Fresh read that leaves expired entries in place instead of deleting
    /// them, so a later [`peek_stale`] on the same key can still rescue the
    /// old value.
    ///
    /// [`peek_stale`]: ResponseCache::peek_stale
    pub(crate) async fn get_fresh(&self, key: &str) -> Option<T> {
        let inner = self.inner.read().await;
        inner
            .map
            .get(key)
            .filter(|entry| !entry.expired(Instant::now()))
            .map(|entry| entry.data.clone())
    }

    /// Stale read for the fallback path: returns whatever is stored for `key`,
    /// however old, without touching it. Normal reads must use [`get`].
    ///
    /// [`get`]: ResponseCache::get
    pub async fn peek_stale(&self, key: &str) -> Option<T> {
        let inner = self.inner.read().await;
        inner.map.get(key).map(|entry| entry.data.clone())
    }

    /// Insert with the cache-wide default TTL.
    pub async fn insert(&self, key: impl Into<String>, data: T) {
        self.insert_with_ttl(key, data, self.default_ttl).await;
    }

    /// Insert or replace the entry for `key` with an explicit TTL.
    ///
    /// A new key entering a full store evicts the single oldest-inserted entry
    /// first. Replacing an existing key keeps its position in the eviction
    /// order and restarts its TTL.
    pub async fn insert_with_ttl(&self, key: impl Into<String>, data: T, ttl: Duration) {
        let key = key.into();
        let mut inner = self.inner.write().await;
        if !inner.map.contains_key(&key) {
            while inner.map.len() >= self.max_entries {
                let Some(oldest) = inner.order.pop_front() else {
                    break;
                };
                inner.map.remove(&oldest);
            }
            inner.order.push_back(key.clone());
        }
        inner.map.insert(
            key,
            CacheEntry {
                data,
                created_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Remove a single key, e.g. to invalidate after a known mutation.
    pub async fn remove(&self, key: &str) {
        let mut inner = self.inner.write().await;
        if inner.map.remove(key).is_some() {
            inner.order.retain(|k| k != key);
        }
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.map.clear();
        inner.order.clear();
    }

    /// Number of resident entries, expired or not.
    pub async fn len(&self) -> usize {
        self.inner.read().await.map.len()
    }

    /// Whether the store currently holds nothing.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.map.is_empty()
    }

    /// Resident size and keys in insertion order.
    pub async fn stats(&self) -> CacheStats {
        let inner = self.inner.read().await;
        CacheStats {
            size: inner.map.len(),
            keys: inner.order.iter().cloned().collect(),
        }
    }
}
