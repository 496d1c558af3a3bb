// Copyright (c) 2026 surf contributors
//
// SPDX-License-Identifier: Apache-2.0
//!
//! In-memory screenshot cache, strictly LRU and bounded by total bytes
//! rather than entry count. Built on `lru`, used unbounded by entry
//! count so eviction can be driven by the byte budget instead.
use lru::LruCache;
use surf_protocol::ScreenshotEntry;
use tokio::sync::Mutex;

struct Inner {
    cache: LruCache<String, ScreenshotEntry>,
    total_bytes: u64,
}

pub struct ScreenshotCache {
    inner: Mutex<Inner>,
    max_bytes: u64,
}

impl ScreenshotCache {
    pub fn new(max_bytes: u64) -> Self {
        Self { inner: Mutex::new(Inner { cache: LruCache::unbounded(), total_bytes: 0 }), max_bytes }
    }

    /// Stores `bytes` under a fresh unguessable id, evicting the least
    /// recently used entries until the cache is back under its byte
    /// budget, and returns the new id.
    pub async fn insert(&self, bytes: Vec<u8>, mime: impl Into<String>) -> String {
        let id = generate_id();
        let size = bytes.len() as u64;
        let entry = ScreenshotEntry { id: id.clone(), bytes, mime: mime.into(), created_at: chrono::Utc::now() };

        let mut inner = self.inner.lock().await;
        inner.cache.put(id.clone(), entry);
        inner.total_bytes += size;
        // Never evict down to nothing: a single entry larger than the
        // budget on its own still has to live somewhere.
        while inner.total_bytes > self.max_bytes && inner.cache.len() > 1 {
            match inner.cache.pop_lru() {
                Some((_, evicted)) => inner.total_bytes -= evicted.bytes.len() as u64,
                None => break,
            }
        }
        id
    }

    /// Resolves `id`, promoting it to most-recently-used on a hit —
    /// matches the cache's own eviction order to subsequent access
    /// recency.
    pub async fn get(&self, id: &str) -> Option<ScreenshotEntry> {
        let mut inner = self.inner.lock().await;
        inner.cache.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.cache.len()
    }
}

fn generate_id() -> String {
    let value: u64 = rand::random();
    format!("{value:016x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let cache = ScreenshotCache::new(1_000_000);
        let id = cache.insert(vec![1, 2, 3], "image/png").await;
        let entry = cache.get(&id).await.unwrap();
        assert_eq!(entry.bytes, vec![1, 2, 3]);
        assert_eq!(entry.mime, "image/png");
    }

    #[tokio::test]
    async fn unknown_id_resolves_to_none() {
        let cache = ScreenshotCache::new(1_000_000);
        assert!(cache.get("deadbeef").await.is_none());
    }

    #[tokio::test]
    async fn ids_are_sixteen_hex_chars() {
        let cache = ScreenshotCache::new(1_000_000);
        let id = cache.insert(vec![0u8; 4], "image/png").await;
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn byte_cap_evicts_oldest_entry_first() {
        let cache = ScreenshotCache::new(1500);
        let first = cache.insert(vec![0u8; 1000], "image/png").await;
        let second = cache.insert(vec![0u8; 1000], "image/png").await;
        assert!(cache.get(&first).await.is_none());
        assert!(cache.get(&second).await.is_some());
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn an_entry_larger_than_the_budget_is_kept_alone() {
        let cache = ScreenshotCache::new(500);
        let id = cache.insert(vec![0u8; 1000], "image/png").await;
        assert!(cache.get(&id).await.is_some());
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn accessing_an_entry_protects_it_from_the_next_eviction() {
        let cache = ScreenshotCache::new(1500);
        let first = cache.insert(vec![0u8; 700], "image/png").await;
        let second = cache.insert(vec![0u8; 700], "image/png").await;
        // Touch `first` so it becomes most-recently-used ahead of `second`.
        assert!(cache.get(&first).await.is_some());
        let _third = cache.insert(vec![0u8; 700], "image/png").await;
        assert!(cache.get(&first).await.is_some());
        assert!(cache.get(&second).await.is_none());
    }
}
