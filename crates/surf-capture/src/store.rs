// Copyright (c) 2026 surf contributors
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Append-only, content-addressed network capture store.
//!
//! On-disk layout under `base`:
//! ```text
//! requests.jsonl     one entry per line
//! bodies/<hash>.req  request bodies
//! bodies/<hash>.res  response bodies
//! .meta              { lastCleanup: <ms> }
//! .lock              append serialisation
//! ```
//!
//! Appends are serialised with an advisory lock that has a 5-second
//! staleness bound: if the lock is held by a writer that has not renewed
//! it within that window, it is treated as abandoned and a new writer
//! proceeds without waiting. If the lock cannot be acquired and is *not*
//! stale, append proceeds anyway without it — filesystem appends of a
//! single JSON line are atomic for writes well under the kernel's pipe
//! buffer size, and the reader already tolerates torn lines by skipping
//! anything that fails to parse. This mirrors a POSIX append-atomicity
//! assumption; platforms without that guarantee should tighten this to
//! always wait.
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fs4::tokio::AsyncFileExt;
use sha2::{Digest, Sha256};
use surf_protocol::{CleanupMeta, NetworkEntry};
use tokio::fs as tfs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::CaptureError;
use crate::filter::Filter;

/// How long a stale append lock is tolerated before a new writer
/// proceeds without it.
const LOCK_STALENESS: Duration = Duration::from_secs(5);

/// Auto-cleanup runs at most once per hour per process.
const AUTO_CLEANUP_INTERVAL_MS: i64 = 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Request,
    Response,
}

impl BodyKind {
    fn extension(self) -> &'static str {
        match self {
            BodyKind::Request => "req",
            BodyKind::Response => "res",
        }
    }
}

impl std::fmt::Display for BodyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub entry_count: usize,
    pub body_count: usize,
    pub total_bytes: u64,
    pub last_cleanup_ms: i64,
}

#[derive(Clone)]
pub struct CaptureStore {
    base: PathBuf,
    ttl: Duration,
    size_cap_bytes: u64,
}

impl CaptureStore {
    /// Opens (creating if needed) the store rooted at `base`, and spawns
    /// an asynchronous stale-check that runs `cleanup()` in the
    /// background if it is due (see [`Self::maybe_cleanup`]) — the
    /// "on boot a stale check is triggered asynchronously" behavior.
    /// This does not delay `open()` itself.
    pub async fn open(base: impl Into<PathBuf>, ttl: Duration, size_cap_bytes: u64) -> Result<Self, CaptureError> {
        let base = base.into();
        tfs::create_dir_all(base.join("bodies")).await?;
        let store = Self { base, ttl, size_cap_bytes };
        if !store.requests_path().exists() {
            tfs::write(store.requests_path(), b"").await?;
        }

        let boot_check = store.clone();
        tokio::spawn(async move {
            if let Err(e) = boot_check.maybe_cleanup().await {
                warn!(error = %e, "boot stale-check cleanup failed");
            }
        });

        Ok(store)
    }

    /// Runs `cleanup()` only if more than [`AUTO_CLEANUP_INTERVAL_MS`]
    /// has elapsed since the last recorded cleanup (or none has run yet
    /// for this store), gating the at-most-once-per-hour auto-cleanup
    /// policy. Returns `None` without touching the log when the gate
    /// holds.
    pub async fn maybe_cleanup(&self) -> Result<Option<StoreStats>, CaptureError> {
        let meta = self.read_meta().await?;
        let now_ms = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as i64;
        if now_ms - meta.last_cleanup_ms < AUTO_CLEANUP_INTERVAL_MS {
            return Ok(None);
        }
        self.cleanup().await.map(Some)
    }

    fn requests_path(&self) -> PathBuf {
        self.base.join("requests.jsonl")
    }

    fn meta_path(&self) -> PathBuf {
        self.base.join(".meta")
    }

    fn lock_path(&self) -> PathBuf {
        self.base.join(".lock")
    }

    fn body_path(&self, hash: &str, kind: BodyKind) -> PathBuf {
        self.base.join("bodies").join(format!("{hash}.{}", kind.extension()))
    }

    /// Hashes `bytes`, writes the body file if not already present (dedup
    /// by content hash), and returns the hash.
    pub async fn write_body(&self, bytes: &[u8], kind: BodyKind) -> Result<String, CaptureError> {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let hash = hex::encode(hasher.finalize());
        let path = self.body_path(&hash, kind);
        if !path.exists() {
            tfs::write(&path, bytes).await?;
        }
        Ok(hash)
    }

    pub async fn read_body(&self, hash: &str, kind: BodyKind) -> Result<Vec<u8>, CaptureError> {
        let path = self.body_path(hash, kind);
        tfs::read(&path).await.map_err(|_| CaptureError::BodyNotFound {
            hash: hash.to_string(),
            kind: kind.to_string(),
        })
    }

    /// Appends one entry, serialised by the best-effort lock described
    /// above.
    pub async fn append(&self, entry: &NetworkEntry) -> Result<(), CaptureError> {
        let line = serde_json::to_string(entry)?;
        let _guard = self.try_acquire_lock().await;
        let mut file = tfs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.requests_path())
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(())
    }

    /// Attempts to take the advisory append lock. Returns `None` if it is
    /// already held by another writer, stale or not — see the module
    /// docs for why a contested-but-live lock doesn't block the append
    /// either. The stale check only changes which message gets logged.
    async fn try_acquire_lock(&self) -> Option<tfs::File> {
        let path = self.lock_path();
        let file = tfs::OpenOptions::new().create(true).write(true).truncate(false).open(&path).await.ok()?;
        match file.try_lock_exclusive() {
            Ok(()) => Some(file),
            Err(_) => {
                if self.lock_is_stale(&path).await {
                    debug!("append lock is stale, proceeding without acquiring it");
                } else {
                    debug!("append lock contested and not stale, proceeding without it");
                }
                None
            }
        }
    }

    async fn lock_is_stale(&self, path: &Path) -> bool {
        match tfs::metadata(path).await {
            Ok(meta) => match meta.modified() {
                Ok(modified) => SystemTime::now().duration_since(modified).unwrap_or_default() > LOCK_STALENESS,
                Err(_) => true,
            },
            Err(_) => true,
        }
    }

    /// Reads all entries, skipping malformed lines.
    pub async fn read_all(&self) -> Result<Vec<NetworkEntry>, CaptureError> {
        let text = tfs::read_to_string(self.requests_path()).await.unwrap_or_default();
        let mut entries = Vec::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<NetworkEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(error = %e, "skipping malformed capture line"),
            }
        }
        Ok(entries)
    }

    pub async fn query(&self, filter: &Filter) -> Result<Vec<NetworkEntry>, CaptureError> {
        let entries = self.read_all().await?;
        let filtered: Vec<NetworkEntry> = entries.into_iter().filter(|e| filter.matches(e)).collect();
        Ok(filter.apply_tail(&filtered).to_vec())
    }

    pub async fn stats(&self) -> Result<StoreStats, CaptureError> {
        let entries = self.read_all().await?;
        let mut total_bytes = 0u64;
        let mut body_count = 0usize;
        let mut dir = tfs::read_dir(self.base.join("bodies")).await?;
        while let Some(file) = dir.next_entry().await? {
            if let Ok(meta) = file.metadata().await {
                total_bytes += meta.len();
                body_count += 1;
            }
        }
        let last_cleanup_ms = self.read_meta().await.unwrap_or_default().last_cleanup_ms;
        Ok(StoreStats { entry_count: entries.len(), body_count, total_bytes, last_cleanup_ms })
    }

    async fn read_meta(&self) -> Result<CleanupMeta, CaptureError> {
        match tfs::read_to_string(self.meta_path()).await {
            Ok(text) => Ok(serde_json::from_str(&text).unwrap_or_default()),
            Err(_) => Ok(CleanupMeta::default()),
        }
    }

    async fn write_meta(&self, meta: &CleanupMeta) -> Result<(), CaptureError> {
        let text = serde_json::to_string(meta)?;
        tfs::write(self.meta_path(), text).await?;
        Ok(())
    }

    /// Drops all entries matching `filter` (or all entries if `None`),
    /// leaving body files untouched until the next `cleanup()`.
    pub async fn clear(&self, filter: Option<&Filter>) -> Result<usize, CaptureError> {
        let entries = self.read_all().await?;
        let (dropped, kept): (Vec<_>, Vec<_>) = entries.into_iter().partition(|e| match filter {
            Some(f) => f.matches(e),
            None => true,
        });
        self.rewrite(&kept).await?;
        Ok(dropped.len())
    }

    /// Atomic rewrite: drop entries older than TTL, then drop the
    /// oldest survivors while the on-disk total exceeds the size cap,
    /// delete orphaned body files, then rename the rewritten log into
    /// place. Bodies are deleted before the rename so a crash mid-way
    /// leaves only entries with missing bodies, never dangling bodies.
    pub async fn cleanup(&self) -> Result<StoreStats, CaptureError> {
        let mut entries = self.read_all().await?;
        let now = chrono::Utc::now();
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::zero());
        entries.retain(|e| now.signed_duration_since(e.timestamp) <= ttl);
        entries.sort_by_key(|e| e.timestamp);

        let mut body_sizes: std::collections::HashMap<String, u64> = std::collections::HashMap::new();
        let mut dir = tfs::read_dir(self.base.join("bodies")).await?;
        while let Some(file) = dir.next_entry().await? {
            if let Ok(meta) = file.metadata().await {
                if let Some(name) = file.file_name().to_str().map(str::to_string) {
                    body_sizes.insert(name, meta.len());
                }
            }
        }
        let size_of_entry = |e: &NetworkEntry| -> u64 {
            let mut total = 0u64;
            if let Some(h) = &e.request_body_hash {
                total += body_sizes.get(&format!("{h}.req")).copied().unwrap_or(0);
            }
            if let Some(h) = &e.response_body_hash {
                total += body_sizes.get(&format!("{h}.res")).copied().unwrap_or(0);
            }
            total
        };

        let mut total: u64 = entries.iter().map(size_of_entry).sum();
        let mut start = 0usize;
        while total > self.size_cap_bytes && start < entries.len() {
            total -= size_of_entry(&entries[start]);
            start += 1;
        }
        let surviving: Vec<NetworkEntry> = entries.split_off(start);

        let mut surviving_hashes = std::collections::HashSet::new();
        for e in &surviving {
            if let Some(h) = &e.request_body_hash {
                surviving_hashes.insert(format!("{h}.req"));
            }
            if let Some(h) = &e.response_body_hash {
                surviving_hashes.insert(format!("{h}.res"));
            }
        }

        let mut dir = tfs::read_dir(self.base.join("bodies")).await?;
        while let Some(file) = dir.next_entry().await? {
            if let Some(name) = file.file_name().to_str().map(str::to_string) {
                if !surviving_hashes.contains(&name) {
                    let _ = tfs::remove_file(file.path()).await;
                }
            }
        }

        self.rewrite(&surviving).await?;

        let now_ms = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as i64;
        self.write_meta(&CleanupMeta { last_cleanup_ms: now_ms }).await?;

        self.stats().await
    }

    /// Writes `entries` to a temp file in the same directory and renames
    /// it over `requests.jsonl`, so a reader never observes a half
    /// written log.
    async fn rewrite(&self, entries: &[NetworkEntry]) -> Result<(), CaptureError> {
        let tmp_path = self.base.join("requests.jsonl.tmp");
        {
            let mut tmp = tfs::File::create(&tmp_path).await?;
            for entry in entries {
                let line = serde_json::to_string(entry)?;
                tmp.write_all(line.as_bytes()).await?;
                tmp.write_all(b"\n").await?;
            }
            tmp.flush().await?;
        }
        tfs::rename(&tmp_path, self.requests_path()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_entry(id: &str, ts: chrono::DateTime<chrono::Utc>) -> NetworkEntry {
        serde_json::from_value(json!({
            "id": id,
            "timestamp": ts.to_rfc3339(),
            "url": "https://a.test/x",
            "method": "GET",
            "status": 200,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn append_then_query_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CaptureStore::open(dir.path(), Duration::from_secs(3600), 1_000_000).await.unwrap();
        let entry = make_entry("a", chrono::Utc::now());
        store.append(&entry).await.unwrap();
        let found = store.query(&Filter::default()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "a");
    }

    #[tokio::test]
    async fn query_skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let store = CaptureStore::open(dir.path(), Duration::from_secs(3600), 1_000_000).await.unwrap();
        store.append(&make_entry("ok", chrono::Utc::now())).await.unwrap();
        let mut file =
            std::fs::OpenOptions::new().append(true).open(store.requests_path()).unwrap();
        file.write_all(b"{not valid json\n").unwrap();
        let found = store.query(&Filter::default()).await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn body_dedup_by_hash() {
        let dir = tempfile::tempdir().unwrap();
        let store = CaptureStore::open(dir.path(), Duration::from_secs(3600), 1_000_000).await.unwrap();
        let h1 = store.write_body(b"hello", BodyKind::Request).await.unwrap();
        let h2 = store.write_body(b"hello", BodyKind::Request).await.unwrap();
        assert_eq!(h1, h2);
        let back = store.read_body(&h1, BodyKind::Request).await.unwrap();
        assert_eq!(back, b"hello");
    }

    #[tokio::test]
    async fn cleanup_drops_expired_entries_and_orphan_bodies() {
        let dir = tempfile::tempdir().unwrap();
        let store = CaptureStore::open(dir.path(), Duration::from_secs(3600), 10_000_000).await.unwrap();

        let old_hash = store.write_body(&vec![b'x'; 1024], BodyKind::Request).await.unwrap();
        let mut old_entry = make_entry("old", chrono::Utc::now() - chrono::Duration::hours(25));
        old_entry.request_body_hash = Some(old_hash.clone());
        store.append(&old_entry).await.unwrap();

        let fresh_hash = store.write_body(&vec![b'y'; 1024], BodyKind::Request).await.unwrap();
        let mut fresh_entry = make_entry("fresh", chrono::Utc::now());
        fresh_entry.request_body_hash = Some(fresh_hash.clone());
        store.append(&fresh_entry).await.unwrap();

        let stats = store.cleanup().await.unwrap();
        assert_eq!(stats.entry_count, 1);

        let surviving = store.query(&Filter::default()).await.unwrap();
        assert_eq!(surviving.len(), 1);
        assert_eq!(surviving[0].id, "fresh");

        assert!(store.body_path(&fresh_hash, BodyKind::Request).exists());
        assert!(!store.body_path(&old_hash, BodyKind::Request).exists());
    }

    #[tokio::test]
    async fn cleanup_enforces_size_cap_by_dropping_oldest() {
        let dir = tempfile::tempdir().unwrap();
        // Cap small enough that only the newest of two 1 KB bodies fits.
        let store = CaptureStore::open(dir.path(), Duration::from_secs(3600), 1200).await.unwrap();

        let h1 = store.write_body(&vec![b'a'; 1024], BodyKind::Request).await.unwrap();
        let mut e1 = make_entry("first", chrono::Utc::now() - chrono::Duration::seconds(10));
        e1.request_body_hash = Some(h1);
        store.append(&e1).await.unwrap();

        let h2 = store.write_body(&vec![b'b'; 1024], BodyKind::Request).await.unwrap();
        let mut e2 = make_entry("second", chrono::Utc::now());
        e2.request_body_hash = Some(h2);
        store.append(&e2).await.unwrap();

        let stats = store.cleanup().await.unwrap();
        assert_eq!(stats.entry_count, 1);
        let surviving = store.query(&Filter::default()).await.unwrap();
        assert_eq!(surviving[0].id, "second");
    }

    #[tokio::test]
    async fn clear_with_filter_removes_only_matching_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = CaptureStore::open(dir.path(), Duration::from_secs(3600), 1_000_000).await.unwrap();
        store.append(&make_entry("keep", chrono::Utc::now())).await.unwrap();
        let mut drop_me = make_entry("drop", chrono::Utc::now());
        drop_me.method = "POST".into();
        store.append(&drop_me).await.unwrap();

        let filter = Filter { method: Some("POST".into()), ..Default::default() };
        let dropped = store.clear(Some(&filter)).await.unwrap();
        assert_eq!(dropped, 1);

        let remaining = store.query(&Filter::default()).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "keep");
    }

    #[tokio::test]
    async fn maybe_cleanup_runs_on_first_call_with_no_prior_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let store = CaptureStore::open(dir.path(), Duration::from_secs(3600), 1_000_000).await.unwrap();
        store.append(&make_entry("old", chrono::Utc::now() - chrono::Duration::hours(25))).await.unwrap();

        let stats = store.maybe_cleanup().await.unwrap();
        assert!(stats.is_some(), "no prior lastCleanup should not gate the first run");
        assert_eq!(stats.unwrap().entry_count, 0);
    }

    #[tokio::test]
    async fn maybe_cleanup_is_a_noop_within_the_hour() {
        let dir = tempfile::tempdir().unwrap();
        let store = CaptureStore::open(dir.path(), Duration::from_secs(3600), 1_000_000).await.unwrap();
        store.append(&make_entry("old", chrono::Utc::now() - chrono::Duration::hours(25))).await.unwrap();

        // First call runs cleanup and stamps lastCleanup to now.
        assert!(store.maybe_cleanup().await.unwrap().is_some());
        // A second call moments later must not run cleanup again.
        store.append(&make_entry("old2", chrono::Utc::now() - chrono::Duration::hours(25))).await.unwrap();
        let second = store.maybe_cleanup().await.unwrap();
        assert!(second.is_none());
        // The un-cleaned stale entry from the second append is still there.
        let entries = store.read_all().await.unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn open_triggers_an_asynchronous_boot_stale_check() {
        let dir = tempfile::tempdir().unwrap();
        let store = CaptureStore::open(dir.path(), Duration::from_secs(3600), 1_000_000).await.unwrap();

        // The boot task races the test; give it a moment to complete.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let stats = store.stats().await.unwrap();
        assert!(stats.last_cleanup_ms > 0, "boot stale-check should have run cleanup asynchronously");
    }

    #[tokio::test]
    async fn stats_reports_entry_and_body_counts() {
        let dir = tempfile::tempdir().unwrap();
        let store = CaptureStore::open(dir.path(), Duration::from_secs(3600), 1_000_000).await.unwrap();
        let hash = store.write_body(b"payload", BodyKind::Response).await.unwrap();
        let mut entry = make_entry("x", chrono::Utc::now());
        entry.response_body_hash = Some(hash);
        store.append(&entry).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.body_count, 1);
    }
}
