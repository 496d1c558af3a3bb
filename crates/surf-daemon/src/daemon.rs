// Copyright (c) 2026 surf contributors
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The bridge daemon: a native-pipe supervisor plus a cheap-clone handle
//! distributed to per-client-connection tasks, correlating replies back
//! to their originating connection point-to-point by upstream id.
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use surf_protocol::{
    FramedCodec, PendingRequest, RequestMethod, ToolParams, ToolReply, ToolRequest, ToolRequestKind,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixListener;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

use crate::error::DaemonError;
use crate::registry::{AiQueueTable, RequestRegistry};

/// Tools whose dotted name starts with this prefix are serialised per
/// `args.site` — queries to third-party AI sites that drive a browser
/// tab through long UI sequences. Not part of the closed tool
/// vocabulary, so the convention is fixed here rather than left to each
/// tool author.
const AI_SITE_TOOL_PREFIX: &str = "ai_site.";

fn ai_site_key(tool: &str, args: &Value) -> Option<String> {
    if !tool.starts_with(AI_SITE_TOOL_PREFIX) {
        return None;
    }
    args.get("site").and_then(Value::as_str).map(str::to_string)
}

/// Cheap-to-clone handle distributed to per-connection tasks. Every
/// client-facing operation goes through this handle; [`Daemon`] itself
/// only drives the upstream pipe and the timeout sweeper.
#[derive(Clone)]
pub struct DaemonHandle {
    registry: Arc<RequestRegistry>,
    ai_queues: Arc<AiQueueTable>,
    upstream_tx: mpsc::UnboundedSender<Vec<u8>>,
    connections: Arc<Mutex<HashMap<u64, mpsc::UnboundedSender<ToolReply>>>>,
    next_conn_id: Arc<AtomicU64>,
    upstream_connected: Arc<AtomicBool>,
    default_timeout: Duration,
}

impl DaemonHandle {
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Number of requests currently awaiting an upstream reply, across
    /// every connection. Used by tests to observe registry effects
    /// without racing on reply delivery.
    pub async fn pending_count(&self) -> usize {
        self.registry.len().await
    }

    /// Registers a new client connection and returns its id plus the
    /// channel its writer task should drain for outgoing replies.
    pub async fn register_connection(&self) -> (u64, mpsc::UnboundedReceiver<ToolReply>) {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.lock().await.insert(conn_id, tx);
        (conn_id, rx)
    }

    /// Drops a closed connection's reply sender and purges its
    /// in-flight registry entries, so late upstream replies for it are
    /// discarded rather than misdelivered.
    pub async fn unregister_connection(&self, conn_id: u64) {
        self.connections.lock().await.remove(&conn_id);
        for (pending, site_key) in self.registry.purge_conn(conn_id).await {
            debug!(conn_id, upstream_id = %pending.upstream_id, "dropping in-flight request for closed connection");
            if let Some(key) = site_key {
                self.ai_queues.leave(&key).await;
            }
        }
    }

    /// Forwards one request upstream, rewriting its id to a
    /// globally-unique upstream id and registering the pending entry.
    /// Fails fast with a transport error if no native pipe is currently
    /// attached, rather than queueing silently.
    pub async fn dispatch(&self, conn_id: u64, original_id: String, params: ToolParams) -> Result<(), DaemonError> {
        if !self.upstream_connected.load(Ordering::Acquire) {
            return Err(DaemonError::Transport("native host disconnected".to_string()));
        }

        let upstream_id = self.registry.next_upstream_id();
        let site_key = ai_site_key(&params.tool, &params.args);
        if let Some(key) = &site_key {
            self.ai_queues.enter(key).await;
        }

        let pending = PendingRequest {
            upstream_id: upstream_id.clone(),
            original_id,
            conn_id,
            deadline: chrono::Utc::now() + chrono::Duration::from_std(self.default_timeout).unwrap_or_default(),
            tool: params.tool.clone(),
        };
        self.registry.insert(pending, site_key.clone()).await;

        let request = ToolRequest {
            kind: ToolRequestKind::ToolRequest,
            method: RequestMethod::ExecuteTool,
            params,
            id: upstream_id,
        };
        let payload = serde_json::to_vec(&request).map_err(DaemonError::Malformed)?;
        if self.upstream_tx.send(payload).is_err() {
            return Err(DaemonError::Transport("native host disconnected".to_string()));
        }
        Ok(())
    }

    /// Delivers `reply` (synthetic or real) to the connection it
    /// belongs to, if it is still open.
    async fn deliver(&self, conn_id: u64, reply: ToolReply) {
        let connections = self.connections.lock().await;
        if let Some(tx) = connections.get(&conn_id) {
            let _ = tx.send(reply);
        }
    }

    /// Delivers a synthetic error reply for a request that never made it
    /// upstream (e.g. no native pipe attached). Used by the client session
    /// reader so a dispatch failure still frees the id the same way a real
    /// reply would.
    pub async fn deliver_error(&self, conn_id: u64, original_id: String, message: String) {
        self.deliver(conn_id, ToolReply::err_text(original_id, message)).await;
    }

    /// Parses one upstream frame as a [`ToolReply`], restores the
    /// client's original id, and delivers it to the right connection.
    async fn handle_upstream_frame(&self, payload: &[u8]) {
        let reply: ToolReply = match serde_json::from_slice(payload) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "dropping malformed upstream frame");
                return;
            }
        };
        let Some((pending, site_key)) = self.registry.remove(&reply.id).await else {
            debug!(upstream_id = %reply.id, "reply for unknown or already-resolved upstream id, dropping");
            return;
        };
        if let Some(key) = site_key {
            self.ai_queues.leave(&key).await;
        }
        let restored = ToolReply { id: pending.original_id, ..reply };
        self.deliver(pending.conn_id, restored).await;
    }

    /// Synthesizes and delivers a timeout error reply for `pending`.
    async fn handle_timeout(&self, pending: PendingRequest, site_key: Option<String>) {
        if let Some(key) = site_key {
            self.ai_queues.leave(&key).await;
        }
        let reply = ToolReply::err_text(pending.original_id, format!("tool {} timed out", pending.tool));
        self.deliver(pending.conn_id, reply).await;
    }

    /// Aborts every in-flight request with a transport error — called
    /// when the upstream pipe EOFs, so they resolve with a native host
    /// disconnected error instead of hanging forever.
    async fn abort_in_flight(&self) {
        for (pending, site_key) in self.registry.drain_all().await {
            if let Some(key) = site_key {
                self.ai_queues.leave(&key).await;
            }
            let reply = ToolReply::err_text(pending.original_id, "native host disconnected");
            self.deliver(pending.conn_id, reply).await;
        }
    }
}

/// Owns the upstream native-messaging pipe and the periodic timeout
/// sweep. A single `Daemon` may drive many successive upstream
/// reader/writer pairs over its lifetime — the browser relaunches the
/// native-messaging host independently of the daemon's local socket.
pub struct Daemon {
    handle: DaemonHandle,
    upstream_rx: Arc<Mutex<mpsc::UnboundedReceiver<Vec<u8>>>>,
}

impl Daemon {
    pub fn new(default_timeout: Duration) -> Self {
        let (upstream_tx, upstream_rx) = mpsc::unbounded_channel();
        let handle = DaemonHandle {
            registry: Arc::new(RequestRegistry::new("surf")),
            ai_queues: Arc::new(AiQueueTable::new()),
            upstream_tx,
            connections: Arc::new(Mutex::new(HashMap::new())),
            next_conn_id: Arc::new(AtomicU64::new(0)),
            upstream_connected: Arc::new(AtomicBool::new(false)),
            default_timeout,
        };
        Self { handle, upstream_rx: Arc::new(Mutex::new(upstream_rx)) }
    }

    pub fn handle(&self) -> DaemonHandle {
        self.handle.clone()
    }

    /// Drives one upstream stdio connection until EOF or a protocol
    /// error, then aborts all in-flight requests and marks the pipe
    /// disconnected. Call again with a fresh pair once the browser
    /// relaunches the native-messaging host.
    pub async fn run_upstream<R, W>(&self, mut reader: R, writer: W)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        self.handle.upstream_connected.store(true, Ordering::Release);
        info!("upstream native pipe attached");

        let rx = self.upstream_rx.clone();
        let mut writer = writer;
        let writer_task = tokio::spawn(async move {
            let codec = FramedCodec;
            let mut rx = rx.lock().await;
            while let Some(payload) = rx.recv().await {
                if let Err(e) = codec.write_message(&mut writer, &payload).await {
                    warn!(error = %e, "upstream write failed");
                    break;
                }
            }
        });

        let codec = FramedCodec;
        loop {
            match codec.read_next(&mut reader).await {
                Ok(payload) => self.handle.handle_upstream_frame(&payload).await,
                Err(e) => {
                    info!(error = %e, "upstream pipe closed");
                    break;
                }
            }
        }

        writer_task.abort();
        self.handle.upstream_connected.store(false, Ordering::Release);
        self.handle.abort_in_flight().await;
    }

    /// Spawns the periodic timeout sweep, running until `shutdown`
    /// reports `true`.
    pub fn spawn_timeout_sweeper(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        let handle = self.handle.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now = chrono::Utc::now();
                        for (pending, site_key) in handle.registry.sweep_expired(now).await {
                            handle.handle_timeout(pending, site_key).await;
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Accepts client connections on `listener` until `shutdown` reports
    /// `true`, spawning a session task per connection.
    pub async fn serve_socket(&self, listener: UnixListener, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _addr)) => {
                            let handle = self.handle.clone();
                            tokio::spawn(async move {
                                crate::client_session::run(stream, handle).await;
                            });
                        }
                        Err(e) => warn!(error = %e, "accept failed"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("socket listener shutting down");
                        break;
                    }
                }
            }
        }
    }
}

/// Binds the local-domain socket at `path`, resolving a bind conflict by
/// probing whether the existing socket answers within 200 ms: a live
/// daemon owns the bus and this process should exit; an unresponsive
/// stale socket file is unlinked and the bind retried once.
pub async fn bind_socket(path: &Path) -> Result<UnixListener, DaemonError> {
    match UnixListener::bind(path) {
        Ok(listener) => Ok(listener),
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            if probe_existing_socket(path).await {
                Err(DaemonError::Transport(format!("another daemon already owns {}", path.display())))
            } else {
                let _ = std::fs::remove_file(path);
                Ok(UnixListener::bind(path)?)
            }
        }
        Err(e) => Err(DaemonError::Io(e)),
    }
}

async fn probe_existing_socket(path: &Path) -> bool {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    let Ok(stream) = tokio::net::UnixStream::connect(path).await else {
        return false;
    };
    let (read_half, mut write_half) = stream.into_split();
    let ping = serde_json::json!({
        "type": "tool_request",
        "method": "execute_tool",
        "params": {"tool": "ping", "args": {}},
        "id": "bind-probe",
    });
    let Ok(line) = serde_json::to_vec(&ping) else { return false };
    if write_half.write_all(&line).await.is_err() || write_half.write_all(b"\n").await.is_err() {
        return false;
    }
    let mut reader = BufReader::new(read_half);
    let mut buf = String::new();
    matches!(
        tokio::time::timeout(Duration::from_millis(200), reader.read_line(&mut buf)).await,
        Ok(Ok(n)) if n > 0
    )
}
