// Copyright (c) 2026 surf contributors
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Per-tab debugger session pool.
//!
//! Attach is idempotent: concurrent callers for the same tab await a
//! single shared future rather than racing independent attach attempts,
//! one shared attach-in-flight future per tab rather than one global
//! supervisor.
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::future::{FutureExt, Shared};
use surf_protocol::TabSession;
use tokio::sync::Mutex;

use crate::error::RouterError;

type AttachFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;

struct TabEntry {
    session: TabSession,
    inflight: Option<Shared<AttachFuture>>,
}

/// Owns one [`TabSession`] per driven tab and arbitrates concurrent
/// attach attempts.
pub struct DebuggerPool {
    tabs: Mutex<HashMap<u32, Arc<Mutex<TabEntry>>>>,
}

impl Default for DebuggerPool {
    fn default() -> Self {
        Self::new()
    }
}

impl DebuggerPool {
    pub fn new() -> Self {
        Self { tabs: Mutex::new(HashMap::new()) }
    }

    async fn entry(&self, tab_id: u32) -> Arc<Mutex<TabEntry>> {
        let mut tabs = self.tabs.lock().await;
        tabs.entry(tab_id)
            .or_insert_with(|| Arc::new(Mutex::new(TabEntry { session: TabSession::new(tab_id), inflight: None })))
            .clone()
    }

    /// Attaches the debugger protocol to `tab_id`, running `do_attach`
    /// exactly once even if many callers race this method for the same
    /// tab. Already-attached tabs return immediately without running
    /// `do_attach` again.
    pub async fn attach<F, Fut>(&self, tab_id: u32, do_attach: F) -> Result<(), RouterError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        let entry = self.entry(tab_id).await;

        let shared = {
            let mut guard = entry.lock().await;
            if guard.session.debugger_attached {
                return Ok(());
            }
            if let Some(existing) = &guard.inflight {
                existing.clone()
            } else {
                let fut: AttachFuture = Box::pin(do_attach());
                let shared = fut.shared();
                guard.inflight = Some(shared.clone());
                shared
            }
        };

        let result = shared.await;

        let mut guard = entry.lock().await;
        guard.inflight = None;
        match result {
            Ok(()) => {
                guard.session.debugger_attached = true;
                guard.session.last_used = chrono::Utc::now();
                Ok(())
            }
            Err(message) => Err(RouterError::Capability(message)),
        }
    }

    pub async fn detach(&self, tab_id: u32) {
        if let Some(entry) = self.tabs.lock().await.get(&tab_id).cloned() {
            entry.lock().await.session.debugger_attached = false;
        }
    }

    pub async fn is_attached(&self, tab_id: u32) -> bool {
        match self.tabs.lock().await.get(&tab_id) {
            Some(entry) => entry.lock().await.session.debugger_attached,
            None => false,
        }
    }

    pub async fn touch(&self, tab_id: u32) {
        if let Some(entry) = self.tabs.lock().await.get(&tab_id).cloned() {
            entry.lock().await.session.last_used = chrono::Utc::now();
        }
    }

    /// Runs `probe` against a tab believed to be attached and, if it
    /// reports the underlying transport dead, resets the session so the
    /// next [`attach`](Self::attach) call recreates it instead of
    /// trusting a stale `debugger_attached` flag forever. Mirrors the
    /// reference bridge's supervisor health check (`_server_task.is_finished()`
    /// before deciding whether to recreate) generalized from "one global
    /// bridge" to "one session per tab" — this is resilience for a
    /// transport that died underneath an attached session, not a new
    /// tool-vocabulary entry.
    ///
    /// A no-op for tabs that are not currently attached, or unknown
    /// tabs, since there is nothing to recreate.
    pub async fn ensure_healthy<F, Fut>(&self, tab_id: u32, probe: F)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = bool>,
    {
        let Some(entry) = self.tabs.lock().await.get(&tab_id).cloned() else {
            return;
        };
        let was_attached = entry.lock().await.session.debugger_attached;
        if !was_attached {
            return;
        }
        if !probe().await {
            let mut guard = entry.lock().await;
            guard.session.debugger_attached = false;
            guard.inflight = None;
        }
    }
}
