// Copyright (c) 2026 surf contributors
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

/// Errors shared by every piece that speaks the wire protocol: the framed
/// stdio codec and the request/reply data model.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame exceeds the {limit} byte limit ({actual} bytes)")]
    FrameTooLarge { limit: usize, actual: usize },

    #[error("native pipe closed cleanly")]
    Eof,

    #[error("partial frame: connection closed mid-message")]
    PartialFrame,

    #[error("malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),
}

/// Classification used to render a `ProtocolError` (or any downstream
/// crate's error) as a `result.error`/`error.content` wire shape. Each
/// crate's own error type implements `kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Protocol,
    Capability,
    Target,
    Timeout,
    Store,
}

impl ProtocolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProtocolError::FrameTooLarge { .. }
            | ProtocolError::Eof
            | ProtocolError::PartialFrame
            | ProtocolError::Io(_) => ErrorKind::Transport,
            ProtocolError::Json(_) => ErrorKind::Protocol,
            ProtocolError::Config(_) => ErrorKind::Store,
        }
    }
}
