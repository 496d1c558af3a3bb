// Copyright (c) 2026 surf contributors
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Sequential step executor: runs a workflow's steps in order against a
//! running bridge daemon, resolving loops and auto-wait follow-ups as it
//! goes.
use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use surf_protocol::{LeafStep, LoopStep, WorkflowStep, MAX_LOOP_ITERATIONS};

use crate::client::ToolIssuer;
use crate::error::{FailurePolicy, WorkflowError};
use crate::template::resolve_vars;

/// Maps a leaf step's tool name to the follow-up wait tool issued
/// automatically afterward: navigation tools wait for `wait.load`,
/// mutation-causing input tools wait for `wait.dom`. Matched by exact
/// tool name, not prefix — the tool vocabulary is closed, so there is no
/// open-ended family to prefix-match.
const AUTO_WAIT: &[(&str, &str)] = &[
    ("nav.go", "wait.load"),
    ("nav.back", "wait.load"),
    ("nav.forward", "wait.load"),
    ("nav.reload", "wait.load"),
    ("tab.new", "wait.load"),
    ("tab.activate", "wait.load"),
    ("input.click", "wait.dom"),
    ("input.key", "wait.dom"),
];

/// Default timeout (as a tool arg, not a transport deadline) applied to
/// the synthesized auto-wait step — small, since it is a convenience
/// guard rather than the caller's own wait budget.
const AUTO_WAIT_TIMEOUT_MS: u64 = 2_000;

/// Outcome of a single executed leaf step, used for `--json` output mode
/// on `surf run` (SPEC_FULL.md §4.E).
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub cmd: String,
    pub label: Option<String>,
    pub success: bool,
    pub message: Option<String>,
    pub captured_as: Option<String>,
}

/// Whether execution should continue to the next step. A policy-driven
/// stop is not an error — it is reported through the collected
/// [`StepOutcome`]s, not an `Err`, so a caller always sees the full
/// trace of what ran before a `stop`-policy failure ended the run.
enum Flow {
    Continue,
    Stop,
}

/// Drives a list of [`WorkflowStep`]s against a [`ToolIssuer`], threading
/// a rolling variable map through leaf calls and loops.
pub struct WorkflowEngine<I: ToolIssuer> {
    issuer: I,
    policy: FailurePolicy,
    auto_wait: bool,
}

impl<I: ToolIssuer> WorkflowEngine<I> {
    pub fn new(issuer: I, policy: FailurePolicy) -> Self {
        Self { issuer, policy, auto_wait: true }
    }

    /// Disables auto-wait (used by tests that want deterministic step
    /// counts).
    pub fn without_auto_wait(mut self) -> Self {
        self.auto_wait = false;
        self
    }

    pub async fn run(
        &mut self,
        steps: &[WorkflowStep],
        vars: &mut HashMap<String, Value>,
    ) -> Result<Vec<StepOutcome>, WorkflowError> {
        let mut outcomes = Vec::new();
        for step in steps {
            if let Flow::Stop = self.run_step(step, vars, &mut outcomes).await? {
                break;
            }
        }
        Ok(outcomes)
    }

    async fn run_step(
        &mut self,
        step: &WorkflowStep,
        vars: &mut HashMap<String, Value>,
        outcomes: &mut Vec<StepOutcome>,
    ) -> Result<Flow, WorkflowError> {
        match step {
            WorkflowStep::Leaf(leaf) => self.run_leaf(leaf, vars, outcomes).await,
            WorkflowStep::Loop(loop_step) => self.run_loop(loop_step, vars, outcomes).await,
        }
    }

    async fn run_leaf(
        &mut self,
        leaf: &LeafStep,
        vars: &mut HashMap<String, Value>,
        outcomes: &mut Vec<StepOutcome>,
    ) -> Result<Flow, WorkflowError> {
        let resolved_args = resolve_vars(&leaf.args, vars)?;
        debug!(cmd = %leaf.cmd, "issuing workflow step");
        let reply = self.issuer.call(&leaf.cmd, resolved_args, None).await?;

        if let Some(name) = &leaf.capture_as {
            vars.insert(name.clone(), reply.extract_value());
        }

        let success = !reply.is_error();
        outcomes.push(StepOutcome {
            cmd: leaf.cmd.clone(),
            label: None,
            success,
            message: error_message(&reply),
            captured_as: leaf.capture_as.clone(),
        });

        if self.auto_wait {
            self.issue_auto_wait(&leaf.cmd).await;
        }

        if !success && self.policy == FailurePolicy::Stop {
            return Ok(Flow::Stop);
        }
        Ok(Flow::Continue)
    }

    /// Issues the auto-wait follow-up for `cmd`, if any. Failures are
    /// swallowed — it never affects the leaf step's own outcome.
    async fn issue_auto_wait(&mut self, cmd: &str) {
        let Some((_, wait_tool)) = AUTO_WAIT.iter().find(|(name, _)| *name == cmd) else {
            return;
        };
        let args = serde_json::json!({"timeoutMs": AUTO_WAIT_TIMEOUT_MS});
        if let Err(e) = self.issuer.call(wait_tool, args, None).await {
            warn!(wait_tool, error = %e, "auto-wait failed, ignoring");
        }
    }

    async fn run_loop(
        &mut self,
        loop_step: &LoopStep,
        vars: &mut HashMap<String, Value>,
        outcomes: &mut Vec<StepOutcome>,
    ) -> Result<Flow, WorkflowError> {
        let bind_name = loop_step.bind_as.clone().unwrap_or_else(|| "item".to_string());
        let iterations = self.plan_iterations(loop_step, vars)?;

        for item in iterations.into_iter().take(MAX_LOOP_ITERATIONS as usize) {
            if let Some(item) = item {
                vars.insert(bind_name.clone(), item);
            }
            for inner in &loop_step.steps {
                if let Flow::Stop = self.run_step(inner, vars, outcomes).await? {
                    return Ok(Flow::Stop);
                }
            }
            if let Some(until) = &loop_step.until {
                let args = resolve_vars(&until.args, vars)?;
                let reply = self.issuer.call(&until.cmd, args, None).await?;
                if truthy(&reply.extract_value()) {
                    break;
                }
            }
        }
        Ok(Flow::Continue)
    }

    /// Expands a loop's `repeat`/`each` clause into the sequence of
    /// per-iteration bind values (`None` for `repeat`, `Some(item)` for
    /// `each`), capped at [`MAX_LOOP_ITERATIONS`] regardless of the
    /// requested count or array length (e.g. `repeat: 200` runs exactly
    /// 100 times).
    fn plan_iterations(
        &self,
        loop_step: &LoopStep,
        vars: &HashMap<String, Value>,
    ) -> Result<Vec<Option<Value>>, WorkflowError> {
        if let Some(each_expr) = &loop_step.each {
            let name = each_expr
                .strip_prefix("%{")
                .and_then(|s| s.strip_suffix('}'))
                .unwrap_or(each_expr.as_str());
            let value = vars
                .get(name)
                .ok_or_else(|| WorkflowError::UnknownVariable(name.to_string()))?;
            let array = value
                .as_array()
                .ok_or_else(|| WorkflowError::NotAnArray(name.to_string()))?;
            return Ok(array.iter().cloned().map(Some).collect());
        }
        let count = loop_step.repeat.unwrap_or(0);
        Ok(std::iter::repeat(None).take(count as usize).collect())
    }
}

fn error_message(reply: &surf_protocol::ToolReply) -> Option<String> {
    let outcome = reply.error.as_ref()?;
    outcome.content.iter().find_map(|part| match part {
        surf_protocol::ContentPart::Text { text } => Some(text.clone()),
        _ => None,
    })
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty() && s != "false",
        Value::Array(a) => !a.is_empty(),
        Value::Object(m) => !m.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use surf_protocol::{ToolOutcome, ToolReply};
    use tokio::sync::Mutex as AsyncMutex;

    /// Records every `(tool, args)` call it receives and replies with a
    /// fixed value, standing in for a live daemon connection.
    struct MockIssuer {
        calls: Arc<AsyncMutex<Vec<(String, Value)>>>,
        next_reply: Arc<AtomicUsize>,
        scripted: Vec<ToolReply>,
    }

    impl MockIssuer {
        fn new(scripted: Vec<ToolReply>) -> Self {
            Self { calls: Arc::new(AsyncMutex::new(Vec::new())), next_reply: Arc::new(AtomicUsize::new(0)), scripted }
        }

        fn echoing() -> Self {
            Self::new(Vec::new())
        }

        fn calls(&self) -> Arc<AsyncMutex<Vec<(String, Value)>>> {
            self.calls.clone()
        }
    }

    #[async_trait]
    impl ToolIssuer for MockIssuer {
        async fn call(&mut self, tool: &str, args: Value, _tab_id: Option<u32>) -> Result<ToolReply, WorkflowError> {
            self.calls.lock().await.push((tool.to_string(), args));
            if self.scripted.is_empty() {
                return Ok(ToolReply::ok(uuid::Uuid::new_v4().to_string(), ToolOutcome::text("ok")));
            }
            let idx = self.next_reply.fetch_add(1, Ordering::Relaxed);
            Ok(self.scripted[idx.min(self.scripted.len() - 1)].clone())
        }
    }

    fn leaf(cmd: &str, args: Value) -> WorkflowStep {
        WorkflowStep::Leaf(LeafStep { cmd: cmd.to_string(), args, capture_as: None })
    }

    fn leaf_as(cmd: &str, args: Value, as_name: &str) -> WorkflowStep {
        WorkflowStep::Leaf(LeafStep { cmd: cmd.to_string(), args, capture_as: Some(as_name.to_string()) })
    }

    #[tokio::test]
    async fn leaf_step_issues_call_with_resolved_vars() {
        let issuer = MockIssuer::echoing();
        let calls = issuer.calls();
        let mut engine = WorkflowEngine::new(issuer, FailurePolicy::Stop).without_auto_wait();
        let mut vars = HashMap::from([("name".to_string(), Value::String("world".to_string()))]);
        let steps = vec![leaf("eval.js", serde_json::json!({"expr": "hi %{name}"}))];

        engine.run(&steps, &mut vars).await.unwrap();

        let calls = calls.lock().await;
        assert_eq!(calls[0].0, "eval.js");
        assert_eq!(calls[0].1["expr"], serde_json::json!("hi world"));
    }

    #[tokio::test]
    async fn capture_as_stores_extracted_reply() {
        let scripted = vec![ToolReply::ok("x", ToolOutcome::text(r#""hello title""#))];
        let issuer = MockIssuer::new(scripted);
        let mut engine = WorkflowEngine::new(issuer, FailurePolicy::Stop).without_auto_wait();
        let mut vars = HashMap::new();
        let steps = vec![leaf_as("eval.js", serde_json::json!({}), "t")];

        engine.run(&steps, &mut vars).await.unwrap();
        assert_eq!(vars["t"], serde_json::json!("hello title"));
    }

    #[tokio::test]
    async fn repeat_caps_at_max_iterations() {
        let issuer = MockIssuer::echoing();
        let calls = issuer.calls();
        let mut engine = WorkflowEngine::new(issuer, FailurePolicy::Stop).without_auto_wait();
        let mut vars = HashMap::new();
        let loop_step = WorkflowStep::Loop(LoopStep {
            repeat: Some(200),
            each: None,
            bind_as: None,
            steps: vec![leaf("nav.go", serde_json::json!({}))],
            until: None,
        });

        engine.run(&[loop_step], &mut vars).await.unwrap();
        assert_eq!(calls.lock().await.len(), MAX_LOOP_ITERATIONS as usize);
    }

    #[tokio::test]
    async fn each_loop_binds_variable_and_iterates_in_order() {
        let issuer = MockIssuer::echoing();
        let calls = issuer.calls();
        let mut engine = WorkflowEngine::new(issuer, FailurePolicy::Stop).without_auto_wait();
        let mut vars = HashMap::from([(
            "urls".to_string(),
            serde_json::json!(["https://a", "https://b", "https://c"]),
        )]);
        let loop_step = WorkflowStep::Loop(LoopStep {
            repeat: None,
            each: Some("%{urls}".to_string()),
            bind_as: Some("u".to_string()),
            steps: vec![leaf("nav.go", serde_json::json!({"url": "%{u}"}))],
            until: None,
        });

        engine.run(&[loop_step], &mut vars).await.unwrap();

        let calls = calls.lock().await;
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].1["url"], serde_json::json!("https://a"));
        assert_eq!(calls[1].1["url"], serde_json::json!("https://b"));
        assert_eq!(calls[2].1["url"], serde_json::json!("https://c"));
    }

    #[tokio::test]
    async fn stop_policy_halts_on_first_failure() {
        let scripted = vec![ToolReply::err_text("x", "boom")];
        let issuer = MockIssuer::new(scripted);
        let calls = issuer.calls();
        let mut engine = WorkflowEngine::new(issuer, FailurePolicy::Stop).without_auto_wait();
        let mut vars = HashMap::new();
        let steps = vec![leaf("nav.go", serde_json::json!({})), leaf("nav.go", serde_json::json!({}))];

        let outcomes = engine.run(&steps, &mut vars).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].success);
        assert_eq!(calls.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn continue_policy_runs_every_step_despite_failure() {
        let scripted =
            vec![ToolReply::err_text("x", "boom"), ToolReply::ok("y", ToolOutcome::text("ok"))];
        let issuer = MockIssuer::new(scripted);
        let calls = issuer.calls();
        let mut engine = WorkflowEngine::new(issuer, FailurePolicy::Continue).without_auto_wait();
        let mut vars = HashMap::new();
        let steps = vec![leaf("nav.go", serde_json::json!({})), leaf("nav.go", serde_json::json!({}))];

        engine.run(&steps, &mut vars).await.unwrap();
        assert_eq!(calls.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn auto_wait_issues_follow_up_without_affecting_outcome_count() {
        let issuer = MockIssuer::echoing();
        let calls = issuer.calls();
        let mut engine = WorkflowEngine::new(issuer, FailurePolicy::Stop);
        let mut vars = HashMap::new();
        let steps = vec![leaf("nav.go", serde_json::json!({}))];

        let outcomes = engine.run(&steps, &mut vars).await.unwrap();
        assert_eq!(outcomes.len(), 1);

        let calls = calls.lock().await;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].0, "wait.load");
    }
}
