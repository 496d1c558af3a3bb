// Copyright (c) 2026 surf contributors
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Ties the tool dispatch table, per-tab state, debugger pool and
//! screenshot cache together into one entry point the daemon calls per
//! request: a name -> handler map that also threads tab lifecycle and
//! capability fallback through each call.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::Value;
use surf_protocol::{ContentPart, ToolOutcome};
use tokio::sync::Mutex;
use tracing::debug;

use crate::debugger::DebuggerPool;
use crate::error::RouterError;
use crate::fallback::FallbackPolicy;
use crate::screenshot::ScreenshotCache;
use crate::state::TabContext;
use crate::tool::{RouterTool, Tool};

/// Default screenshot cache budget.
pub const DEFAULT_SCREENSHOT_CACHE_BYTES: u64 = 64 * 1024 * 1024;

/// The handler name the auto-screenshot policy calls to produce the
/// post-action image it appends to qualifying replies.
const AUTO_SCREENSHOT_HANDLER: &str = "screenshot.viewport";

pub struct Router {
    tools: HashMap<String, Arc<dyn RouterTool>>,
    tabs: Mutex<HashMap<u32, Arc<TabContext>>>,
    debugger: Arc<DebuggerPool>,
    screenshots: Arc<ScreenshotCache>,
    auto_screenshot_tools: HashSet<String>,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    pub fn debugger(&self) -> &Arc<DebuggerPool> {
        &self.debugger
    }

    pub fn screenshots(&self) -> &Arc<ScreenshotCache> {
        &self.screenshots
    }

    async fn tab(&self, tab_id: u32) -> Arc<TabContext> {
        let mut tabs = self.tabs.lock().await;
        tabs.entry(tab_id).or_insert_with(|| Arc::new(TabContext::new(tab_id))).clone()
    }

    /// Executes one tool call. `soft_fail` mirrors the per-request
    /// `softFail` flag: when set, a capability failure that survives
    /// fallback is downgraded to a warning-bearing success instead of
    /// propagating as an error. `suppress_screenshot` mirrors the
    /// request's own opt-out of the auto-screenshot policy below.
    ///
    /// Unknown tool names fail immediately regardless of `soft_fail` —
    /// softFail governs capability outcomes, not protocol-level lookup
    /// failures.
    pub async fn execute(
        &self,
        tool_name: &str,
        tab_id: u32,
        args: Value,
        soft_fail: bool,
        suppress_screenshot: bool,
    ) -> Result<ToolOutcome, RouterError> {
        let handler = self
            .tools
            .get(tool_name)
            .cloned()
            .ok_or_else(|| RouterError::UnknownTool(tool_name.to_string()))?;
        let tool = Tool::parse(tool_name);
        let ctx = self.tab(tab_id).await;

        let mut outcome = FallbackPolicy::dispatch(
            &tool,
            soft_fail,
            || handler.call(&ctx, args.clone()),
            Some(|| handler.call_scripting(&ctx, args.clone())),
        )
        .await?;

        if !suppress_screenshot && self.auto_screenshot_tools.contains(&tool.name()) {
            self.append_auto_screenshot(&ctx, &mut outcome).await;
        }

        Ok(outcome)
    }

    /// Calls the viewport-screenshot handler, caches any image content it
    /// returns, and appends that content to `outcome` — the "navigation,
    /// click, type, scroll, key automatically produce a post-action
    /// screenshot appended to the reply content" policy. Best-effort: a
    /// missing handler or a capture failure leaves `outcome` untouched
    /// rather than failing the triggering tool call.
    async fn append_auto_screenshot(&self, ctx: &Arc<TabContext>, outcome: &mut ToolOutcome) {
        let Some(handler) = self.tools.get(AUTO_SCREENSHOT_HANDLER).cloned() else {
            return;
        };
        match handler.call(ctx, Value::Null).await {
            Ok(shot) => {
                for part in shot.content {
                    if let ContentPart::Image { data, mime_type } = &part {
                        if let Ok(bytes) = BASE64.decode(data) {
                            self.screenshots.insert(bytes, mime_type.clone()).await;
                        }
                    }
                    outcome.content.push(part);
                }
            }
            Err(e) => debug!(error = %e, "auto-screenshot capture failed, leaving reply unaugmented"),
        }
    }
}

pub struct RouterBuilder {
    tools: HashMap<String, Arc<dyn RouterTool>>,
    screenshot_cache_bytes: u64,
    auto_screenshot_tools: HashSet<String>,
}

impl Default for RouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            screenshot_cache_bytes: DEFAULT_SCREENSHOT_CACHE_BYTES,
            auto_screenshot_tools: HashSet::new(),
        }
    }

    pub fn register(mut self, handler: Arc<dyn RouterTool>) -> Self {
        self.tools.insert(handler.name().to_string(), handler);
        self
    }

    pub fn screenshot_cache_bytes(mut self, bytes: u64) -> Self {
        self.screenshot_cache_bytes = bytes;
        self
    }

    /// Tool names (dotted form, e.g. `"nav.go"`) that trigger the
    /// auto-screenshot policy on success. Typically seeded from
    /// `Config::auto_screenshot_tools`.
    pub fn auto_screenshot_tools(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.auto_screenshot_tools = names.into_iter().collect();
        self
    }

    pub fn build(self) -> Router {
        Router {
            tools: self.tools,
            tabs: Mutex::new(HashMap::new()),
            debugger: Arc::new(DebuggerPool::new()),
            screenshots: Arc::new(ScreenshotCache::new(self.screenshot_cache_bytes)),
            auto_screenshot_tools: self.auto_screenshot_tools,
        }
    }
}
