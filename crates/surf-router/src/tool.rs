// Copyright (c) 2026 surf contributors
//
// SPDX-License-Identifier: Apache-2.0
//!
//! `RouterTool` is the trait every handler implements, and `Capability`
//! names the browser-side primitive a handler needs to run. Kept close
//! to a generic tool-registry shape: a name, a required-capability set,
//! and an async `call`.
use async_trait::async_trait;
use serde_json::Value;
use surf_protocol::ToolOutcome;

use crate::error::RouterError;
use crate::state::TabContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Debugger,
    Scripting,
    /// Either capability suffices; the fallback policy tries debugger
    /// first.
    Either,
}

#[async_trait]
pub trait RouterTool: Send + Sync {
    fn name(&self) -> &'static str;
    fn capabilities(&self) -> Capability;
    /// Hardware-level input (real key presses, OS clipboard) that
    /// scripting cannot fake; such tools refuse fallback even when they
    /// declare `Either`.
    fn requires_trusted_input(&self) -> bool {
        false
    }
    async fn call(&self, ctx: &TabContext, args: Value) -> Result<ToolOutcome, RouterError>;

    /// The scripting-capability counterpart of [`call`](Self::call),
    /// tried by [`crate::fallback::FallbackPolicy`] when the debugger
    /// path fails with a `Capability` error. Handlers that only ever run
    /// through the debugger (or that have no restricted-session
    /// equivalent) can leave this at its default, which refuses with a
    /// capability error and so never survives the fallback.
    async fn call_scripting(&self, _ctx: &TabContext, _args: Value) -> Result<ToolOutcome, RouterError> {
        Err(RouterError::Capability(format!("{} has no scripting fallback", self.name())))
    }
}

/// The closed tool vocabulary, grouped exactly as the handler groups in
/// the dispatch table: tab management, navigation, input, page
/// inspection, screenshots, storage, waiting, JavaScript evaluation and
/// emulation. Carrying a typed enum (instead of a bare tool-name string)
/// makes group membership and capability requirements explicit at the
/// type level; unrecognised names still round-trip as `Tool::Other` so a
/// client can forward-reference a tool this build doesn't implement yet
/// without the wire format changing.
#[derive(Debug, Clone, PartialEq)]
pub enum Tool {
    Tab(TabTool),
    Nav(NavTool),
    Input(InputTool),
    Inspect(InspectTool),
    Screenshot(ScreenshotTool),
    Storage(StorageTool),
    Wait(WaitTool),
    Eval(EvalTool),
    Emulate(EmulateTool),
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabTool {
    New,
    Close,
    List,
    Activate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavTool {
    Go,
    Back,
    Forward,
    Reload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputTool {
    Click,
    Type,
    Key,
    Hover,
    Drag,
    Scroll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InspectTool {
    AccessibilityTree,
    PageText,
    PageState,
    Search,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenshotTool {
    Viewport,
    Region,
    FullPage,
    Annotated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageTool {
    Cookies,
    Bookmarks,
    History,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTool {
    Element,
    Url,
    NetworkIdle,
    DomStable,
    Load,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalTool {
    Js,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmulateTool {
    Network,
    Cpu,
    Geolocation,
}

impl Tool {
    /// Parses a dotted tool name (`"tab.new"`, `"wait.load"`, ...) into
    /// its typed variant, falling back to `Other` for anything this
    /// build doesn't recognise.
    pub fn parse(name: &str) -> Tool {
        match name {
            "tab.new" => Tool::Tab(TabTool::New),
            "tab.close" => Tool::Tab(TabTool::Close),
            "tab.list" => Tool::Tab(TabTool::List),
            "tab.activate" => Tool::Tab(TabTool::Activate),

            "nav.go" => Tool::Nav(NavTool::Go),
            "nav.back" => Tool::Nav(NavTool::Back),
            "nav.forward" => Tool::Nav(NavTool::Forward),
            "nav.reload" => Tool::Nav(NavTool::Reload),

            "input.click" => Tool::Input(InputTool::Click),
            "input.type" => Tool::Input(InputTool::Type),
            "input.key" => Tool::Input(InputTool::Key),
            "input.hover" => Tool::Input(InputTool::Hover),
            "input.drag" => Tool::Input(InputTool::Drag),
            "input.scroll" => Tool::Input(InputTool::Scroll),

            "inspect.tree" => Tool::Inspect(InspectTool::AccessibilityTree),
            "inspect.text" => Tool::Inspect(InspectTool::PageText),
            "inspect.state" => Tool::Inspect(InspectTool::PageState),
            "inspect.search" => Tool::Inspect(InspectTool::Search),

            "screenshot.viewport" => Tool::Screenshot(ScreenshotTool::Viewport),
            "screenshot.region" => Tool::Screenshot(ScreenshotTool::Region),
            "screenshot.full_page" => Tool::Screenshot(ScreenshotTool::FullPage),
            "screenshot.annotated" => Tool::Screenshot(ScreenshotTool::Annotated),

            "storage.cookies" => Tool::Storage(StorageTool::Cookies),
            "storage.bookmarks" => Tool::Storage(StorageTool::Bookmarks),
            "storage.history" => Tool::Storage(StorageTool::History),

            "wait.element" => Tool::Wait(WaitTool::Element),
            "wait.url" => Tool::Wait(WaitTool::Url),
            "wait.network_idle" => Tool::Wait(WaitTool::NetworkIdle),
            "wait.dom" => Tool::Wait(WaitTool::DomStable),
            "wait.load" => Tool::Wait(WaitTool::Load),

            "eval.js" => Tool::Eval(EvalTool::Js),

            "emulate.network" => Tool::Emulate(EmulateTool::Network),
            "emulate.cpu" => Tool::Emulate(EmulateTool::Cpu),
            "emulate.geolocation" => Tool::Emulate(EmulateTool::Geolocation),

            other => Tool::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Tool::Tab(t) => match t {
                TabTool::New => "tab.new",
                TabTool::Close => "tab.close",
                TabTool::List => "tab.list",
                TabTool::Activate => "tab.activate",
            }
            .to_string(),
            Tool::Nav(t) => match t {
                NavTool::Go => "nav.go",
                NavTool::Back => "nav.back",
                NavTool::Forward => "nav.forward",
                NavTool::Reload => "nav.reload",
            }
            .to_string(),
            Tool::Input(t) => match t {
                InputTool::Click => "input.click",
                InputTool::Type => "input.type",
                InputTool::Key => "input.key",
                InputTool::Hover => "input.hover",
                InputTool::Drag => "input.drag",
                InputTool::Scroll => "input.scroll",
            }
            .to_string(),
            Tool::Inspect(t) => match t {
                InspectTool::AccessibilityTree => "inspect.tree",
                InspectTool::PageText => "inspect.text",
                InspectTool::PageState => "inspect.state",
                InspectTool::Search => "inspect.search",
            }
            .to_string(),
            Tool::Screenshot(t) => match t {
                ScreenshotTool::Viewport => "screenshot.viewport",
                ScreenshotTool::Region => "screenshot.region",
                ScreenshotTool::FullPage => "screenshot.full_page",
                ScreenshotTool::Annotated => "screenshot.annotated",
            }
            .to_string(),
            Tool::Storage(t) => match t {
                StorageTool::Cookies => "storage.cookies",
                StorageTool::Bookmarks => "storage.bookmarks",
                StorageTool::History => "storage.history",
            }
            .to_string(),
            Tool::Wait(t) => match t {
                WaitTool::Element => "wait.element",
                WaitTool::Url => "wait.url",
                WaitTool::NetworkIdle => "wait.network_idle",
                WaitTool::DomStable => "wait.dom",
                WaitTool::Load => "wait.load",
            }
            .to_string(),
            Tool::Eval(EvalTool::Js) => "eval.js".to_string(),
            Tool::Emulate(t) => match t {
                EmulateTool::Network => "emulate.network",
                EmulateTool::Cpu => "emulate.cpu",
                EmulateTool::Geolocation => "emulate.geolocation",
            }
            .to_string(),
            Tool::Other(name) => name.clone(),
        }
    }

    /// Required capability per group, matching §4.D's handler-group
    /// capability declarations.
    pub fn capability(&self) -> Capability {
        match self {
            Tool::Tab(_) => Capability::Either,
            Tool::Nav(_) => Capability::Either,
            Tool::Input(InputTool::Key) => Capability::Debugger,
            Tool::Input(_) => Capability::Either,
            Tool::Inspect(_) => Capability::Either,
            Tool::Screenshot(_) => Capability::Debugger,
            Tool::Storage(_) => Capability::Debugger,
            Tool::Wait(_) => Capability::Either,
            Tool::Eval(_) => Capability::Either,
            Tool::Emulate(_) => Capability::Debugger,
            Tool::Other(_) => Capability::Either,
        }
    }

    /// Hardware-level key tool cannot be faked via scripting per §4.D
    /// fallback policy ("tools that require them... fail hard without
    /// fallback").
    pub fn requires_trusted_input(&self) -> bool {
        matches!(self, Tool::Input(InputTool::Key))
    }
}
