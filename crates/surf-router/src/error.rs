// Copyright (c) 2026 surf contributors
//
// SPDX-License-Identifier: Apache-2.0
use surf_protocol::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("capability unavailable: {0}")]
    Capability(String),

    #[error("target not controllable: {0}")]
    Target(String),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("illegal state transition: {0}")]
    IllegalTransition(String),

    #[error("capture store error: {0}")]
    Capture(#[from] surf_capture::CaptureError),

    #[error("malformed arguments: {0}")]
    Args(#[from] serde_json::Error),
}

impl RouterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RouterError::UnknownTool(_) | RouterError::Args(_) => ErrorKind::Protocol,
            RouterError::Capability(_) => ErrorKind::Capability,
            RouterError::Target(_) | RouterError::IllegalTransition(_) => ErrorKind::Target,
            RouterError::Timeout(_) => ErrorKind::Timeout,
            RouterError::Capture(_) => ErrorKind::Store,
        }
    }
}
