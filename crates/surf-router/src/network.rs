// Copyright (c) 2026 surf contributors
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Bridges the router's network-event intake into the [`surf_capture`]
//! store. Request and response arrive as separate events correlated by
//! the browser protocol's own request id, so entries are staged here
//! until the response lands, then appended as one `NetworkEntry`. Body
//! hashing reuses `surf_capture::CaptureStore::write_body`'s streaming
//! SHA-256.
use std::collections::HashMap;

use surf_capture::{BodyKind, CaptureStore};
use surf_protocol::NetworkEntry;
use tokio::sync::Mutex;

use crate::error::RouterError;

/// Raw request-leg data observed by the debugger-protocol network
/// listener, before a response has arrived.
#[derive(Debug, Clone)]
pub struct NetworkRequestEvent {
    pub request_id: String,
    pub url: String,
    pub method: String,
    pub request_headers: HashMap<String, String>,
    pub request_body: Option<Vec<u8>>,
}

/// The response leg, correlated back to its request by `request_id`.
#[derive(Debug, Clone)]
pub struct NetworkResponseEvent {
    pub request_id: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub response_headers: HashMap<String, String>,
    pub response_body: Option<Vec<u8>>,
}

struct Pending {
    url: String,
    method: String,
    timestamp: chrono::DateTime<chrono::Utc>,
    request_headers: HashMap<String, String>,
    request_body_hash: Option<String>,
}

/// Per-tab network capture intake. One instance is created when a tab's
/// capture state transitions `Off -> Starting` and torn down on
/// `Stopping -> Off` (see [`crate::state::TabCaptureState`]).
pub struct NetworkIntake {
    store: CaptureStore,
    pending: Mutex<HashMap<String, Pending>>,
}

impl NetworkIntake {
    pub fn new(store: CaptureStore) -> Self {
        Self { store, pending: Mutex::new(HashMap::new()) }
    }

    /// Stages the request leg, hashing and deduplicating its body if
    /// present. Returns once the body (if any) is durably written —
    /// intentionally not fire-and-forget, so a crash between this call
    /// and `on_response` never loses a written body.
    pub async fn on_request(&self, ev: NetworkRequestEvent) -> Result<(), RouterError> {
        let request_body_hash = match ev.request_body {
            Some(bytes) => Some(self.store.write_body(&bytes, BodyKind::Request).await?),
            None => None,
        };
        let pending = Pending {
            url: ev.url,
            method: ev.method,
            timestamp: chrono::Utc::now(),
            request_headers: ev.request_headers,
            request_body_hash,
        };
        self.pending.lock().await.insert(ev.request_id, pending);
        Ok(())
    }

    /// Completes a request/response pair and appends it to the capture
    /// store. A response with no staged request (e.g. the tab's capture
    /// was started mid-flight) is silently dropped rather than appended
    /// half-formed.
    pub async fn on_response(&self, ev: NetworkResponseEvent) -> Result<(), RouterError> {
        let staged = self.pending.lock().await.remove(&ev.request_id);
        let Some(staged) = staged else {
            return Ok(());
        };

        let response_body_hash = match ev.response_body {
            Some(bytes) => Some(self.store.write_body(&bytes, BodyKind::Response).await?),
            None => None,
        };

        let entry = NetworkEntry {
            id: generate_entry_id(),
            timestamp: staged.timestamp,
            url: staged.url,
            method: staged.method,
            status: Some(ev.status),
            content_type: ev.content_type,
            request_headers: staged.request_headers,
            response_headers: ev.response_headers,
            request_body_hash: staged.request_body_hash,
            response_body_hash,
        };
        self.store.append(&entry).await?;
        Ok(())
    }

    pub fn store(&self) -> &CaptureStore {
        &self.store
    }
}

/// `<timestamp>-<random>` id shape for a network entry.
fn generate_entry_id() -> String {
    format!("{:x}-{:x}", chrono::Utc::now().timestamp_millis(), rand::random::<u32>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn request(id: &str, url: &str) -> NetworkRequestEvent {
        NetworkRequestEvent {
            request_id: id.into(),
            url: url.into(),
            method: "GET".into(),
            request_headers: HashMap::new(),
            request_body: None,
        }
    }

    fn response(id: &str, status: u16) -> NetworkResponseEvent {
        NetworkResponseEvent {
            request_id: id.into(),
            status,
            content_type: Some("application/json".into()),
            response_headers: HashMap::new(),
            response_body: Some(b"{}".to_vec()),
        }
    }

    async fn intake() -> (NetworkIntake, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = CaptureStore::open(dir.path(), Duration::from_secs(3600), 10_000_000).await.unwrap();
        (NetworkIntake::new(store), dir)
    }

    #[tokio::test]
    async fn request_then_response_appends_one_entry() {
        let (intake, _dir) = intake().await;
        intake.on_request(request("r1", "https://a.test/x")).await.unwrap();
        intake.on_response(response("r1", 200)).await.unwrap();

        let entries = intake.store().query(&surf_capture::Filter::default()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].url, "https://a.test/x");
        assert_eq!(entries[0].status, Some(200));
        assert!(entries[0].response_body_hash.is_some());
    }

    #[tokio::test]
    async fn response_without_staged_request_is_dropped() {
        let (intake, _dir) = intake().await;
        intake.on_response(response("ghost", 404)).await.unwrap();
        let entries = intake.store().query(&surf_capture::Filter::default()).await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn request_body_is_hashed_and_deduplicated() {
        let (intake, _dir) = intake().await;
        let mut req = request("r2", "https://a.test/submit");
        req.method = "POST".into();
        req.request_body = Some(b"payload".to_vec());
        intake.on_request(req).await.unwrap();
        intake.on_response(response("r2", 201)).await.unwrap();

        let entries = intake.store().query(&surf_capture::Filter::default()).await.unwrap();
        let hash = entries[0].request_body_hash.as_ref().unwrap();
        let body = intake.store().read_body(hash, BodyKind::Request).await.unwrap();
        assert_eq!(body, b"payload");
    }
}
