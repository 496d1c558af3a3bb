// Copyright (c) 2026 surf contributors
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The pending-request map and the per-site FIFO queue.
//!
//! A single shared mutable map guarded by a `tokio::sync::Mutex` with
//! hold times bounded to one map operation.
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use surf_protocol::PendingRequest;
use tokio::sync::{oneshot, Mutex};

/// A pending entry plus the AI-site key it entered, if any — kept
/// alongside the request so reply/timeout handling can release the site
/// queue without a second lookup.
struct Entry {
    pending: PendingRequest,
    site_key: Option<String>,
}

/// Maps upstream ids to pending requests.
/// Invariant: every upstream id in flight has exactly one entry; reply
/// delivery removes it; timeout removal synthesizes an error reply.
pub struct RequestRegistry {
    entries: Mutex<HashMap<String, Entry>>,
    counter: AtomicU64,
    prefix: String,
}

impl RequestRegistry {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { entries: Mutex::new(HashMap::new()), counter: AtomicU64::new(0), prefix: prefix.into() }
    }

    /// Generates `<prefix>-<monotonic-counter>`, guaranteeing uniqueness
    /// across every client connection.
    pub fn next_upstream_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{n}", self.prefix)
    }

    pub async fn insert(&self, pending: PendingRequest, site_key: Option<String>) {
        let mut entries = self.entries.lock().await;
        entries.insert(pending.upstream_id.clone(), Entry { pending, site_key });
    }

    /// Removes and returns the entry for `upstream_id`, restoring the
    /// correlation needed to deliver a reply (or a late-reply no-op if
    /// the id is unknown, e.g. already timed out or the connection
    /// closed).
    pub async fn remove(&self, upstream_id: &str) -> Option<(PendingRequest, Option<String>)> {
        let mut entries = self.entries.lock().await;
        entries.remove(upstream_id).map(|e| (e.pending, e.site_key))
    }

    /// Drops every entry belonging to `conn_id` — called when a client
    /// disconnects, so late upstream replies for that connection are
    /// discarded silently instead of misdelivered.
    pub async fn purge_conn(&self, conn_id: u64) -> Vec<(PendingRequest, Option<String>)> {
        let mut entries = self.entries.lock().await;
        let ids: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.pending.conn_id == conn_id)
            .map(|(id, _)| id.clone())
            .collect();
        ids.into_iter().filter_map(|id| entries.remove(&id)).map(|e| (e.pending, e.site_key)).collect()
    }

    /// Removes every entry whose deadline has passed `now`, for the
    /// daemon's periodic timeout sweep.
    pub async fn sweep_expired(&self, now: chrono::DateTime<chrono::Utc>) -> Vec<(PendingRequest, Option<String>)> {
        let mut entries = self.entries.lock().await;
        let ids: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.pending.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();
        ids.into_iter().filter_map(|id| entries.remove(&id)).map(|e| (e.pending, e.site_key)).collect()
    }

    /// Drains every in-flight entry, for upstream EOF: the extension is
    /// gone, so none of these will ever receive a reply.
    pub async fn drain_all(&self) -> Vec<(PendingRequest, Option<String>)> {
        let mut entries = self.entries.lock().await;
        entries.drain().map(|(_, e)| (e.pending, e.site_key)).collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

struct SiteQueue {
    busy: bool,
    waiters: VecDeque<oneshot::Sender<()>>,
}

/// One FIFO queue per AI-site key.
/// Entering the queue is the suspension point; leaving wakes the next
/// waiter, if any, keeping it at the head.
pub struct AiQueueTable {
    sites: Mutex<HashMap<String, SiteQueue>>,
}

impl Default for AiQueueTable {
    fn default() -> Self {
        Self::new()
    }
}

impl AiQueueTable {
    pub fn new() -> Self {
        Self { sites: Mutex::new(HashMap::new()) }
    }

    /// Suspends until the caller reaches the head of `site_key`'s queue.
    /// Must be paired with a later call to [`AiQueueTable::leave`].
    pub async fn enter(&self, site_key: &str) {
        let waiting = {
            let mut sites = self.sites.lock().await;
            let queue =
                sites.entry(site_key.to_string()).or_insert_with(|| SiteQueue { busy: false, waiters: VecDeque::new() });
            if queue.busy {
                let (tx, rx) = oneshot::channel();
                queue.waiters.push_back(tx);
                Some(rx)
            } else {
                queue.busy = true;
                None
            }
        };
        if let Some(rx) = waiting {
            let _ = rx.await;
        }
    }

    /// Releases the head position for `site_key`, waking the next
    /// waiter if one is queued. Drops the site's entry entirely once it
    /// goes idle with no waiters, so a long-running daemon doesn't
    /// accumulate one map entry per distinct site key ever seen.
    pub async fn leave(&self, site_key: &str) {
        let mut sites = self.sites.lock().await;
        if let Some(queue) = sites.get_mut(site_key) {
            match queue.waiters.pop_front() {
                Some(tx) => {
                    let _ = tx.send(());
                }
                None => {
                    sites.remove(site_key);
                }
            }
        }
    }
}
