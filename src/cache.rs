//! Short-TTL in-memory cache for upstream metadata fetches.
//!
//! Cache-aside with no single-flight: concurrent misses for the same key
//! may each invoke the fetch, which is fine because gallery metadata
//! reads are idempotent. Failed fetches are never cached.

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::Result;

struct CachedEntry<V> {
    fetched_at: Instant,
    value: V,
}

/// TTL-bounded map from lookup key to fetched value
///
/// Entries older than the TTL are treated as absent and replaced on the
/// next successful fetch. Expiry is lazy; call [`purge_expired`] to
/// reclaim memory from keys that are never looked up again.
///
/// [`purge_expired`]: MetadataCache::purge_expired
pub struct MetadataCache<V> {
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedEntry<V>>>,
}

impl<V: Clone> MetadataCache<V> {
    /// Create a cache whose entries live for `ttl`
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Return the cached value for `key`, fetching on miss or expiry
    ///
    /// A successful fetch is stored with a fresh expiry and returned. A
    /// failed fetch propagates the error and leaves the cache unchanged,
    /// so the next caller retries.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(key)
                && entry.fetched_at.elapsed() < self.ttl
            {
                tracing::debug!(key, "Metadata cache hit");
                return Ok(entry.value.clone());
            }
        }

        tracing::debug!(key, "Metadata cache miss");
        let value = fetch().await?;

        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            CachedEntry {
                fetched_at: Instant::now(),
                value: value.clone(),
            },
        );

        Ok(value)
    }

    /// Drop every entry older than the TTL
    pub async fn purge_expired(&self) {
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.fetched_at.elapsed() < self.ttl);
    }

    /// Number of entries currently held, expired or not
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// True when the cache holds no entries
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
