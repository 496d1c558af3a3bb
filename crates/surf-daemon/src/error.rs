// Copyright (c) 2026 surf contributors
//
// SPDX-License-Identifier: Apache-2.0
use surf_protocol::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Protocol(#[from] surf_protocol::ProtocolError),

    #[error("malformed request: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("duplicate id {0:?} still in flight on this connection")]
    DuplicateId(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DaemonError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DaemonError::Transport(_) | DaemonError::Io(_) => ErrorKind::Transport,
            DaemonError::Protocol(e) => e.kind(),
            DaemonError::Malformed(_) | DaemonError::DuplicateId(_) => ErrorKind::Protocol,
            DaemonError::Timeout(_) => ErrorKind::Timeout,
        }
    }
}
