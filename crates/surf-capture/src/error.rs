// Copyright (c) 2026 surf contributors
//
// SPDX-License-Identifier: Apache-2.0
use surf_protocol::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed capture entry: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid url pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("body {hash} not found for kind {kind}")]
    BodyNotFound { hash: String, kind: String },

    #[error("lock error: {0}")]
    Lock(String),
}

impl CaptureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CaptureError::Io(_) | CaptureError::Lock(_) => ErrorKind::Store,
            CaptureError::Json(_) | CaptureError::Pattern(_) => ErrorKind::Protocol,
            CaptureError::BodyNotFound { .. } => ErrorKind::Target,
        }
    }
}
