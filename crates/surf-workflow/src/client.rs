// Copyright (c) 2026 surf contributors
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The workflow engine's view of a bridge daemon: one call in, one
//! reply out. [`ToolIssuer`] is the seam the engine is built against so
//! tests can swap a mock for the real Unix-socket client, the same way
//! `sven-ci::runner` is built against `sven_model::ModelProvider` rather
//! than a concrete provider.
use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use surf_protocol::{ToolReply, ToolRequest};

use crate::error::WorkflowError;

/// Issues one tool request and returns its reply. Implementations own
/// whatever correlation is needed to match a reply back to the request
/// that produced it; the engine only ever has one call in flight per
/// workflow, so a simple read-after-write suffices for the real client.
#[async_trait]
pub trait ToolIssuer: Send + Sync {
    async fn call(&mut self, tool: &str, args: Value, tab_id: Option<u32>) -> Result<ToolReply, WorkflowError>;
}

/// A [`ToolIssuer`] that speaks the local-socket wire protocol directly:
/// one JSON object per line, matching the daemon's own reader/writer
/// shape from the client side of the exchange.
pub struct UnixSocketClient {
    write_half: tokio::net::unix::OwnedWriteHalf,
    reader: BufReader<tokio::net::unix::OwnedReadHalf>,
}

impl UnixSocketClient {
    pub async fn connect(socket_path: &str) -> Result<Self, WorkflowError> {
        let stream = UnixStream::connect(socket_path)
            .await
            .map_err(|e| WorkflowError::Transport(format!("connecting to {socket_path}: {e}")))?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self { write_half, reader: BufReader::new(read_half) })
    }
}

#[async_trait]
impl ToolIssuer for UnixSocketClient {
    async fn call(&mut self, tool: &str, args: Value, tab_id: Option<u32>) -> Result<ToolReply, WorkflowError> {
        let id = uuid::Uuid::new_v4().to_string();
        let mut request = ToolRequest::new(id.clone(), tool, args);
        request.params.tab_id = tab_id;

        let mut line = serde_json::to_vec(&request)?;
        line.push(b'\n');
        self.write_half
            .write_all(&line)
            .await
            .map_err(|e| WorkflowError::Transport(e.to_string()))?;

        let mut buf = String::new();
        loop {
            buf.clear();
            let n = self
                .reader
                .read_line(&mut buf)
                .await
                .map_err(|e| WorkflowError::Transport(e.to_string()))?;
            if n == 0 {
                return Err(WorkflowError::Transport("daemon closed the connection".to_string()));
            }
            let trimmed = buf.trim();
            if trimmed.is_empty() {
                continue;
            }
            let reply: ToolReply = serde_json::from_str(trimmed)?;
            if reply.id == id {
                return Ok(reply);
            }
            // A reply for a stale id (e.g. a previous connection's
            // request id reused by this same process) is skipped rather
            // than treated as a protocol error — at most one call is ever
            // truly in flight from this client.
        }
    }
}
