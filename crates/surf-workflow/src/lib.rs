// Copyright (c) 2026 surf contributors
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Client-side workflow sequencer: resolves `%{name}`
//! variable references, issues each step as a separate tool request
//! against a running bridge daemon, and captures replies into a rolling
//! variable map.
pub mod client;
pub mod engine;
pub mod error;
pub mod template;

pub use client::{ToolIssuer, UnixSocketClient};
pub use engine::{StepOutcome, WorkflowEngine};
pub use error::{FailurePolicy, WorkflowError};
pub use template::{parse_var, resolve_vars};
