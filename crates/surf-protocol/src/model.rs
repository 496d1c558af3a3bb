// Copyright (c) 2026 surf contributors
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Wire data model shared by every transport in the bridge: the local
//! socket (client ↔ daemon) and the framed native-messaging pipe
//! (daemon ↔ router).
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ── Tool requests / replies ───────────────────────────────────────────────────

/// A request written by a client on the local socket, one JSON object per
/// line. `id` is client-chosen and unique per connection; the daemon
/// rewrites it to a globally-unique upstream id before forwarding and
/// restores the original on reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRequest {
    #[serde(rename = "type")]
    pub kind: ToolRequestKind,
    pub method: RequestMethod,
    pub params: ToolParams,
    pub id: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolRequestKind {
    ToolRequest,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestMethod {
    ExecuteTool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParams {
    pub tool: String,
    #[serde(default)]
    pub args: serde_json::Value,
    #[serde(rename = "tabId", skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<u32>,
    #[serde(rename = "windowId", skip_serializing_if = "Option::is_none")]
    pub window_id: Option<u32>,
    /// When set, a capability failure with no fallback produces a warning
    /// reply instead of a hard error.
    #[serde(default, rename = "softFail")]
    pub soft_fail: bool,
    /// Opts this request out of the auto-screenshot policy that would
    /// otherwise append a post-action screenshot to a qualifying tool's
    /// reply.
    #[serde(default, rename = "suppressScreenshot")]
    pub suppress_screenshot: bool,
}

impl ToolRequest {
    pub fn new(id: impl Into<String>, tool: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            kind: ToolRequestKind::ToolRequest,
            method: RequestMethod::ExecuteTool,
            params: ToolParams {
                tool: tool.into(),
                args,
                tab_id: None,
                window_id: None,
                soft_fail: false,
                suppress_screenshot: false,
            },
            id: id.into(),
        }
    }
}

/// A single part of rich reply content: either text or a base64-encoded
/// image. Order within `content` is significant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image { data: String, #[serde(rename = "mimeType")] mime_type: String },
}

impl ContentPart {
    pub fn text(s: impl Into<String>) -> Self {
        ContentPart::Text { text: s.into() }
    }

    pub fn image(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        ContentPart::Image { data: data.into(), mime_type: mime_type.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolOutcome {
    pub content: Vec<ContentPart>,
}

impl ToolOutcome {
    pub fn text(s: impl Into<String>) -> Self {
        Self { content: vec![ContentPart::text(s)] }
    }
}

/// A reply written by the daemon back to the originating client. Exactly
/// one of `result`/`error` is set — never both, never neither. Partial
/// or streaming replies are not permitted: every request produces
/// exactly one reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolReply {
    #[serde(rename = "type")]
    pub kind: ToolReplyKind,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolOutcome>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolReplyKind {
    ToolResponse,
}

impl ToolReply {
    pub fn ok(id: impl Into<String>, result: ToolOutcome) -> Self {
        Self { kind: ToolReplyKind::ToolResponse, id: id.into(), result: Some(result), error: None }
    }

    pub fn err(id: impl Into<String>, error: ToolOutcome) -> Self {
        Self { kind: ToolReplyKind::ToolResponse, id: id.into(), result: None, error: Some(error) }
    }

    pub fn err_text(id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::err(id, ToolOutcome::text(msg))
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Reply-extraction precedence used by the workflow engine: a single
    /// JSON-parsable text content becomes the parsed value; otherwise
    /// the raw text; otherwise the whole reply.
    pub fn extract_value(&self) -> serde_json::Value {
        let outcome = self.result.as_ref().or(self.error.as_ref());
        let Some(outcome) = outcome else {
            return serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        };
        if let [ContentPart::Text { text }] = outcome.content.as_slice() {
            if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(text) {
                return parsed;
            }
            return serde_json::Value::String(text.clone());
        }
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

// ── Pending request (daemon registry) ─────────────────────────────────────────

/// Bookkeeping kept by the daemon for a request forwarded upstream.
/// Invariant: every upstream id in flight has exactly one `PendingRequest`;
/// reply delivery removes it; timeout removal synthesizes an error reply.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub upstream_id: String,
    pub original_id: String,
    pub conn_id: u64,
    pub deadline: chrono::DateTime<chrono::Utc>,
    pub tool: String,
}

// ── Tab session (router) ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct TabCapabilities {
    pub debugger: bool,
    pub scripting: bool,
}

/// Kept by the router. Invariant: at most one attach operation per tab is
/// in flight; subsequent attempts await the same shared future.
#[derive(Debug, Clone)]
pub struct TabSession {
    pub tab_id: u32,
    pub debugger_attached: bool,
    pub last_used: chrono::DateTime<chrono::Utc>,
    pub capabilities: TabCapabilities,
}

impl TabSession {
    pub fn new(tab_id: u32) -> Self {
        Self {
            tab_id,
            debugger_attached: false,
            last_used: chrono::Utc::now(),
            capabilities: TabCapabilities::default(),
        }
    }
}

// ── Screenshot entry (router) ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ScreenshotEntry {
    pub id: String,
    pub bytes: Vec<u8>,
    pub mime: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

// ── Network entry (capture store) ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkEntry {
    pub id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub url: String,
    pub method: String,
    pub status: Option<u16>,
    #[serde(rename = "contentType", default)]
    pub content_type: Option<String>,
    #[serde(rename = "requestHeaders", default)]
    pub request_headers: HashMap<String, String>,
    #[serde(rename = "responseHeaders", default)]
    pub response_headers: HashMap<String, String>,
    #[serde(rename = "requestBodyHash", default)]
    pub request_body_hash: Option<String>,
    #[serde(rename = "responseBodyHash", default)]
    pub response_body_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CleanupMeta {
    #[serde(rename = "lastCleanup")]
    pub last_cleanup_ms: i64,
}

// ── Workflow steps ────────────────────────────────────────────────────────────

/// A single step of a workflow: either a leaf tool call or a loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkflowStep {
    Loop(LoopStep),
    Leaf(LeafStep),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeafStep {
    pub cmd: String,
    #[serde(default)]
    pub args: serde_json::Value,
    #[serde(rename = "as", default)]
    pub capture_as: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopStep {
    #[serde(default)]
    pub repeat: Option<u32>,
    #[serde(default)]
    pub each: Option<String>,
    #[serde(default, rename = "as")]
    pub bind_as: Option<String>,
    pub steps: Vec<WorkflowStep>,
    #[serde(default)]
    pub until: Option<Box<LeafStep>>,
}

/// Hard cap on loop iterations, regardless of `repeat`/`each` length
/// (e.g. `repeat: 200` runs exactly 100 times).
pub const MAX_LOOP_ITERATIONS: u32 = 100;
