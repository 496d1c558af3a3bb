// Copyright (c) 2026 surf contributors
//
// SPDX-License-Identifier: Apache-2.0
//!
//! State machines for per-tab capture and per-tool-request lifecycle,
//! following the guarded-transition shape of a session-state enum: each
//! state only accepts a fixed set of next states, and an illegal
//! transition is an error rather than a silent overwrite.
use std::sync::Arc;

use surf_protocol::TabSession;
use tokio::sync::Mutex;

use crate::error::RouterError;

/// A tab's capture subscription lifecycle (§4.D "State machines").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabCaptureState {
    Off,
    Starting,
    On,
    Stopping,
}

impl TabCaptureState {
    pub fn transition(&mut self, target: TabCaptureState) -> Result<(), RouterError> {
        let allowed = matches!(
            (*self, target),
            (TabCaptureState::Off, TabCaptureState::Starting)
                | (TabCaptureState::Starting, TabCaptureState::On)
                | (TabCaptureState::Starting, TabCaptureState::Off)
                | (TabCaptureState::On, TabCaptureState::Stopping)
                | (TabCaptureState::Stopping, TabCaptureState::Off)
        );
        if !allowed {
            return Err(RouterError::IllegalTransition(format!("{self:?} -> {target:?}")));
        }
        *self = target;
        Ok(())
    }
}

/// Lifecycle of a single tool request as it moves through the router
/// (§4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    Dispatched,
    AwaitingBrowser,
    Replying,
    Done,
}

impl RequestState {
    pub fn transition(&mut self, target: RequestState) -> Result<(), RouterError> {
        let allowed = matches!(
            (*self, target),
            (RequestState::Received, RequestState::Dispatched)
                | (RequestState::Dispatched, RequestState::AwaitingBrowser)
                | (RequestState::AwaitingBrowser, RequestState::Replying)
                | (RequestState::Replying, RequestState::Done)
                // An error at any stage produces a reply directly.
                | (RequestState::Received, RequestState::Replying)
                | (RequestState::Dispatched, RequestState::Replying)
                | (RequestState::AwaitingBrowser, RequestState::Done)
        );
        if !allowed {
            return Err(RouterError::IllegalTransition(format!("{self:?} -> {target:?}")));
        }
        *self = target;
        Ok(())
    }
}

/// Everything a tool handler needs to act on one tab: its session
/// record and a back-reference to the shared capture state, passed by
/// reference so the handler can't outlive the call.
pub struct TabContext {
    pub tab_id: u32,
    pub session: Arc<Mutex<TabSession>>,
    pub capture_state: Arc<Mutex<TabCaptureState>>,
}

impl TabContext {
    pub fn new(tab_id: u32) -> Self {
        Self {
            tab_id,
            session: Arc::new(Mutex::new(TabSession::new(tab_id))),
            capture_state: Arc::new(Mutex::new(TabCaptureState::Off)),
        }
    }
}
