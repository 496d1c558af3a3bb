// Copyright (c) 2026 surf contributors
//
// SPDX-License-Identifier: Apache-2.0
//!
//! One task per local-socket client connection: a JSON-line reader that
//! dispatches requests without blocking on their replies, and a writer
//! fed by the connection's own reply channel. The local socket exchanges
//! one JSON object per line.
use std::collections::HashSet;
use std::sync::Arc;

use surf_protocol::{ToolReply, ToolRequest};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::daemon::DaemonHandle;

type InFlight = Arc<Mutex<HashSet<String>>>;

/// Drives one client connection until it disconnects. Malformed lines are
/// logged and skipped rather than killing the connection — the daemon
/// never crashes on a malformed message.
pub async fn run(stream: UnixStream, handle: DaemonHandle) {
    let (conn_id, reply_rx) = handle.register_connection().await;
    let (read_half, write_half) = stream.into_split();
    let in_flight: InFlight = Arc::new(Mutex::new(HashSet::new()));
    let (reject_tx, reject_rx) = tokio::sync::mpsc::unbounded_channel::<ToolReply>();

    let writer_task = tokio::spawn(writer_loop(write_half, reply_rx, reject_rx, in_flight.clone()));
    reader_loop(read_half, conn_id, handle.clone(), in_flight, reject_tx).await;

    handle.unregister_connection(conn_id).await;
    writer_task.abort();
}

/// Writes every reply as it arrives. Replies on `replies` resolve a real
/// in-flight reservation and release the id at the same moment — the
/// point at which reuse on this connection becomes legal again. Replies
/// on `rejections` are synthetic "duplicate id" errors for a request
/// that was never admitted into `in_flight`, so writing them must not
/// touch the reservation the still-pending original holds.
async fn writer_loop(
    mut write_half: OwnedWriteHalf,
    mut replies: UnboundedReceiver<ToolReply>,
    mut rejections: UnboundedReceiver<ToolReply>,
    in_flight: InFlight,
) {
    loop {
        let (reply, releases) = tokio::select! {
            Some(reply) = replies.recv() => (reply, true),
            Some(reply) = rejections.recv() => (reply, false),
            else => break,
        };
        if releases {
            in_flight.lock().await.remove(&reply.id);
        }
        let Ok(mut line) = serde_json::to_vec(&reply) else {
            warn!("failed to serialize reply, dropping");
            continue;
        };
        line.push(b'\n');
        if write_half.write_all(&line).await.is_err() {
            break;
        }
    }
}

async fn reader_loop(
    read_half: OwnedReadHalf,
    conn_id: u64,
    handle: DaemonHandle,
    in_flight: InFlight,
    reject_tx: UnboundedSender<ToolReply>,
) {
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(conn_id, error = %e, "client connection read error");
                break;
            }
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let request: ToolRequest = match serde_json::from_str(trimmed) {
            Ok(r) => r,
            Err(e) => {
                warn!(conn_id, error = %e, "dropping malformed client request");
                continue;
            }
        };

        // Id reuse is permitted once the prior request with that id has
        // resolved, but never while it is still in flight; reject the
        // latter with a protocol error reply.
        {
            let mut ids = in_flight.lock().await;
            if !ids.insert(request.id.clone()) {
                warn!(conn_id, id = %request.id, "rejecting duplicate in-flight id");
                let reply = ToolReply::err_text(request.id.clone(), "duplicate id already in flight on this connection");
                let _ = reject_tx.send(reply);
                continue;
            }
        }

        let handle = handle.clone();
        tokio::spawn(async move {
            if let Err(e) = handle.dispatch(conn_id, request.id.clone(), request.params).await {
                handle.deliver_error(conn_id, request.id, e.to_string()).await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::Daemon;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::io::AsyncReadExt;
    use tokio::net::UnixListener;

    #[tokio::test]
    async fn malformed_line_is_skipped_and_connection_stays_open() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("surf.sock");
        let listener = UnixListener::bind(&socket_path).unwrap();
        let daemon = Daemon::new(Duration::from_secs(30));
        let handle = daemon.handle();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            run(stream, handle).await;
        });

        let mut client = UnixStream::connect(&socket_path).await.unwrap();
        client.write_all(b"not json at all\n").await.unwrap();
        client
            .write_all(format!("{}\n", json!({"type": "tool_request", "method": "execute_tool", "params": {"tool": "nav.go", "args": {}}, "id": "a1"})).as_bytes())
            .await
            .unwrap();

        // No upstream attached: the daemon replies with a transport error
        // rather than silently hanging.
        let mut buf = vec![0u8; 512];
        let n = tokio::time::timeout(Duration::from_secs(1), client.read(&mut buf)).await.unwrap().unwrap();
        assert!(n > 0);
        let reply: ToolReply = serde_json::from_slice(&buf[..n]).unwrap();
        assert_eq!(reply.id, "a1");
        assert!(reply.is_error());

        drop(client);
        let _ = tokio::time::timeout(Duration::from_secs(1), server).await;
    }

    #[tokio::test]
    async fn duplicate_id_while_in_flight_is_rejected() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("surf.sock");
        let listener = UnixListener::bind(&socket_path).unwrap();
        let daemon = Arc::new(Daemon::new(Duration::from_secs(30)));
        let handle = daemon.handle();

        // Keep the upstream pipe attached but silent, so the first "dup"
        // request is accepted and parked in the registry rather than
        // racing a reply back before the second line is read.
        let (_ext_reader, daemon_reader) = tokio::io::duplex(8192);
        let (daemon_writer, _ext_writer) = tokio::io::duplex(8192);
        let upstream_task = tokio::spawn({
            let daemon = daemon.clone();
            async move { daemon.run_upstream(daemon_reader, daemon_writer).await }
        });

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            run(stream, handle).await;
        });

        let mut client = UnixStream::connect(&socket_path).await.unwrap();
        let req = json!({"type": "tool_request", "method": "execute_tool", "params": {"tool": "nav.go", "args": {}}, "id": "dup"});
        client.write_all(format!("{req}\n").as_bytes()).await.unwrap();
        client.write_all(format!("{req}\n").as_bytes()).await.unwrap();

        // Give the reader loop a moment to process both lines, then
        // confirm the registry holds exactly one pending entry: the
        // duplicate was dropped rather than creating a second one.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(daemon.handle().pending_count().await, 1);

        drop(client);
        upstream_task.abort();
        let _ = tokio::time::timeout(Duration::from_secs(1), server).await;
    }

    #[tokio::test]
    async fn rejecting_a_duplicate_does_not_free_the_originals_slot() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("surf.sock");
        let listener = UnixListener::bind(&socket_path).unwrap();
        let daemon = Arc::new(Daemon::new(Duration::from_secs(30)));
        let handle = daemon.handle();

        let (_ext_reader, daemon_reader) = tokio::io::duplex(8192);
        let (daemon_writer, _ext_writer) = tokio::io::duplex(8192);
        let upstream_task = tokio::spawn({
            let daemon = daemon.clone();
            async move { daemon.run_upstream(daemon_reader, daemon_writer).await }
        });

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            run(stream, handle).await;
        });

        let mut client = UnixStream::connect(&socket_path).await.unwrap();
        let req = json!({"type": "tool_request", "method": "execute_tool", "params": {"tool": "nav.go", "args": {}}, "id": "dup"});
        // Original, then two duplicates while it is still in flight.
        client.write_all(format!("{req}\n").as_bytes()).await.unwrap();
        client.write_all(format!("{req}\n").as_bytes()).await.unwrap();
        client.write_all(format!("{req}\n").as_bytes()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        // Both duplicates were rejected, not just the first: the
        // original's reservation survived writing their error replies.
        assert_eq!(daemon.handle().pending_count().await, 1);

        let mut buf = vec![0u8; 4096];
        let n = tokio::time::timeout(Duration::from_secs(1), client.read(&mut buf)).await.unwrap().unwrap();
        let text = String::from_utf8_lossy(&buf[..n]);
        let rejections = text.lines().filter(|l| l.contains("duplicate id already in flight")).count();
        assert_eq!(rejections, 2);

        drop(client);
        upstream_task.abort();
        let _ = tokio::time::timeout(Duration::from_secs(1), server).await;
    }
}
