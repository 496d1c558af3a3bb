// Copyright (c) 2026 surf contributors
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("transport error talking to the daemon: {0}")]
    Transport(String),

    #[error("malformed reply from daemon: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("variable {0:?} not found")]
    UnknownVariable(String),

    #[error("each-loop target {0:?} is not a JSON array")]
    NotAnArray(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-step failure policy: stop the run or continue past a failed step.
/// Carried per workflow run rather than per step — a single configured
/// policy, not a per-step override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    #[default]
    Stop,
    Continue,
}
