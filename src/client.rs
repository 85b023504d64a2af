//! RPC client: call issue, response correlation, timeouts, teardown.
//!
//! Every outstanding call lives in a pending table keyed by message id.
//! Exactly one of three paths resolves an entry: the response arrives, the
//! deadline fires, or the connection is torn down. Whichever path removes
//! the entry delivers the outcome; the others observe it gone and become
//! no-ops.
//!
//! Synchronous calls park the calling task on a oneshot rendezvous.
//! Asynchronous calls register a callback and a deadline; deadlines are
//! kept in a single min-heap serviced by one timer task per client rather
//! than a timer per call.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, Duration, Instant};

use crate::codec::{JsonCodec, RpcMessage};
use crate::connection::{write_frame, FrameReader};
use crate::error::{Result, RpcError};
use crate::message::{ErrorCode, Request, Response};
use crate::stats::{RpcStats, StatsSnapshot};
use crate::RpcConfig;

/// How an outstanding call's outcome reaches its waiter.
enum Delivery {
    /// Synchronous caller parked on a oneshot.
    Rendezvous(oneshot::Sender<Response>),
    /// Callback invoked on the delivering task.
    Callback(Box<dyn FnOnce(Response) + Send + 'static>),
}

/// Per-outstanding-request record.
struct PendingCall {
    started: Instant,
    deadline: Instant,
    delivery: Delivery,
}

impl PendingCall {
    /// Hand the outcome to the waiter. Consumes the record, so every
    /// entry delivers at most once.
    fn fulfill(self, response: Response) {
        match self.delivery {
            Delivery::Rendezvous(tx) => {
                let _ = tx.send(response);
            }
            Delivery::Callback(callback) => callback(response),
        }
    }
}

struct ClientShared {
    host: String,
    port: u16,
    next_id: AtomicU32,
    connected: AtomicBool,
    pending: Mutex<HashMap<u32, PendingCall>>,
    /// Wake schedule for async-call deadlines. Entries may be stale; the
    /// pending table is authoritative.
    deadlines: Mutex<BinaryHeap<Reverse<(Instant, u32)>>>,
    timer_wake: Notify,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    stats: RpcStats,
}

/// RPC client for one server endpoint.
///
/// Connects on demand; all failures surface as a [`Response`] carrying a
/// non-SUCCESS [`ErrorCode`], never as a panic or a hung waiter.
pub struct RpcClient {
    shared: Arc<ClientShared>,
    timer_task: JoinHandle<()>,
}

impl RpcClient {
    /// Create a client for `host:port`. Must be called from within a
    /// tokio runtime; the connection is established lazily on first use.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let shared = Arc::new(ClientShared {
            host: host.into(),
            port,
            next_id: AtomicU32::new(1),
            connected: AtomicBool::new(false),
            pending: Mutex::new(HashMap::new()),
            deadlines: Mutex::new(BinaryHeap::new()),
            timer_wake: Notify::new(),
            writer: tokio::sync::Mutex::new(None),
            reader_task: Mutex::new(None),
            stats: RpcStats::new(),
        });
        let timer_task = tokio::spawn(timer_loop(shared.clone()));
        Self { shared, timer_task }
    }

    /// Create a client taking the port from a configuration value.
    pub fn from_config(host: impl Into<String>, config: &RpcConfig) -> Self {
        Self::new(host, config.port)
    }

    /// True while a connection is established.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Number of calls currently awaiting an outcome.
    pub fn pending_calls(&self) -> usize {
        self.shared.pending.lock().expect("pending lock poisoned").len()
    }

    /// Current call counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Establish the connection now instead of on first call.
    pub async fn connect(&self) -> Result<()> {
        let mut writer = self.shared.writer.lock().await;
        if writer.is_some() {
            self.shared.connected.store(true, Ordering::SeqCst);
            return Ok(());
        }

        let stream =
            TcpStream::connect((self.shared.host.as_str(), self.shared.port)).await?;
        let (read_half, write_half) = stream.into_split();
        *writer = Some(write_half);
        self.shared.connected.store(true, Ordering::SeqCst);

        let handle = tokio::spawn(read_loop(self.shared.clone(), read_half));
        *self
            .shared
            .reader_task
            .lock()
            .expect("reader lock poisoned") = Some(handle);

        tracing::info!(
            host = %self.shared.host,
            port = self.shared.port,
            "connected to RPC server"
        );
        Ok(())
    }

    /// Tear the connection down and fail every outstanding call with
    /// NETWORK_ERROR. Idempotent.
    pub async fn disconnect(&self) {
        self.shared.connected.store(false, Ordering::SeqCst);
        if let Some(handle) = self
            .shared
            .reader_task
            .lock()
            .expect("reader lock poisoned")
            .take()
        {
            handle.abort();
        }
        self.shared.writer.lock().await.take();
        fail_all_pending(&self.shared);
        tracing::info!("disconnected from RPC server");
    }

    /// Invoke `method` and wait for its response or the deadline.
    ///
    /// Never returns an error: connection, send, and timeout failures all
    /// come back as a failure [`Response`].
    pub async fn call(&self, method: &str, params: &str, timeout_ms: u32) -> Response {
        if self.ensure_connected().await.is_err() {
            return Response::failure(0, ErrorCode::NetworkError, "Not connected to server");
        }

        let message_id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();
        let deadline = started + Duration::from_millis(u64::from(timeout_ms));
        let (tx, mut rx) = oneshot::channel();
        self.insert_pending(
            message_id,
            PendingCall {
                started,
                deadline,
                delivery: Delivery::Rendezvous(tx),
            },
        );

        let request = Request {
            message_id,
            method: method.to_owned(),
            params: params.to_owned(),
            timeout_ms,
        };
        if let Err(e) = self.send_request(&request).await {
            tracing::warn!(message_id, error = %e, "failed to send request");
            self.remove_pending(message_id);
            self.connection_lost().await;
            return Response::failure(message_id, ErrorCode::NetworkError, "Failed to send request");
        }

        match timeout(Duration::from_millis(u64::from(timeout_ms)), &mut rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                Response::failure(message_id, ErrorCode::NetworkError, "Connection closed")
            }
            Err(_) => match self.remove_pending(message_id) {
                Some(call) => {
                    self.shared.stats.record_timeout(elapsed_ms(call.started));
                    Response::failure(message_id, ErrorCode::TimeoutError, "Request timeout")
                }
                // The response won the race with the deadline; its
                // delivery is already in flight on the rendezvous.
                None => rx.await.unwrap_or_else(|_| {
                    Response::failure(message_id, ErrorCode::NetworkError, "Connection closed")
                }),
            },
        }
    }

    /// Invoke `method` and deliver the outcome to `callback` without
    /// blocking the caller. The callback fires exactly once: with the
    /// response, a TIMEOUT_ERROR, or a NETWORK_ERROR.
    pub async fn async_call<F>(&self, method: &str, params: &str, callback: F, timeout_ms: u32)
    where
        F: FnOnce(Response) + Send + 'static,
    {
        if self.ensure_connected().await.is_err() {
            callback(Response::failure(
                0,
                ErrorCode::NetworkError,
                "Not connected to server",
            ));
            return;
        }

        let message_id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();
        let deadline = started + Duration::from_millis(u64::from(timeout_ms));
        self.insert_pending(
            message_id,
            PendingCall {
                started,
                deadline,
                delivery: Delivery::Callback(Box::new(callback)),
            },
        );
        self.shared
            .deadlines
            .lock()
            .expect("deadline lock poisoned")
            .push(Reverse((deadline, message_id)));
        self.shared.timer_wake.notify_one();

        let request = Request {
            message_id,
            method: method.to_owned(),
            params: params.to_owned(),
            timeout_ms,
        };
        if let Err(e) = self.send_request(&request).await {
            tracing::warn!(message_id, error = %e, "failed to send request");
            if let Some(call) = self.remove_pending(message_id) {
                call.fulfill(Response::failure(
                    message_id,
                    ErrorCode::NetworkError,
                    "Failed to send request",
                ));
            }
            self.connection_lost().await;
        }
    }

    /// Send a fire-and-forget notification (message id 0). No pending
    /// entry is created and no response will arrive.
    pub async fn notify(&self, method: &str, params: &str) -> Result<()> {
        self.ensure_connected().await?;
        let request = Request::new(method, params);
        let frame = JsonCodec::encode_request(&request)?;
        if let Err(e) = self.send_frame(&frame).await {
            self.connection_lost().await;
            return Err(e);
        }
        Ok(())
    }

    /// Send a heartbeat probe. The server echoes it; the echo is ignored.
    pub async fn send_heartbeat(&self) -> Result<()> {
        self.ensure_connected().await?;
        let frame = JsonCodec::encode_heartbeat(0);
        if let Err(e) = self.send_frame(&frame).await {
            self.connection_lost().await;
            return Err(e);
        }
        Ok(())
    }

    /// Resolve every entry whose deadline has passed with TIMEOUT_ERROR.
    ///
    /// Idempotent and safe against concurrent response delivery: only the
    /// path that removes an entry delivers its outcome.
    pub fn cleanup_expired(&self) {
        cleanup_expired(&self.shared);
    }

    async fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        self.connect().await
    }

    fn insert_pending(&self, message_id: u32, call: PendingCall) {
        let previous = self
            .shared
            .pending
            .lock()
            .expect("pending lock poisoned")
            .insert(message_id, call);
        debug_assert!(previous.is_none(), "duplicate message id {}", message_id);
    }

    fn remove_pending(&self, message_id: u32) -> Option<PendingCall> {
        self.shared
            .pending
            .lock()
            .expect("pending lock poisoned")
            .remove(&message_id)
    }

    async fn send_request(&self, request: &Request) -> Result<()> {
        let frame = JsonCodec::encode_request(request)?;
        self.send_frame(&frame).await
    }

    async fn send_frame(&self, frame: &[u8]) -> Result<()> {
        let mut guard = self.shared.writer.lock().await;
        let writer = guard.as_mut().ok_or(RpcError::ConnectionClosed)?;
        write_frame(writer, frame).await
    }

    /// Run the disconnect path after an I/O failure: the caller has
    /// already resolved its own entry, everything else fails with
    /// NETWORK_ERROR.
    async fn connection_lost(&self) {
        self.shared.connected.store(false, Ordering::SeqCst);
        if let Some(handle) = self
            .shared
            .reader_task
            .lock()
            .expect("reader lock poisoned")
            .take()
        {
            handle.abort();
        }
        self.shared.writer.lock().await.take();
        fail_all_pending(&self.shared);
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.timer_task.abort();
        if let Some(handle) = self
            .shared
            .reader_task
            .lock()
            .expect("reader lock poisoned")
            .take()
        {
            handle.abort();
        }
        if let Ok(mut writer) = self.shared.writer.try_lock() {
            writer.take();
        }
    }
}

/// Reads frames until EOF or error, then runs the disconnect path.
async fn read_loop(shared: Arc<ClientShared>, read_half: OwnedReadHalf) {
    let mut reader = FrameReader::new(read_half);
    loop {
        match reader.next_frame().await {
            Ok(Some(frame)) => handle_frame(&shared, &frame),
            Ok(None) => {
                tracing::debug!("server closed the connection");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "client read failed");
                break;
            }
        }
    }
    shared.connected.store(false, Ordering::SeqCst);
    shared.writer.lock().await.take();
    fail_all_pending(&shared);
}

fn handle_frame(shared: &ClientShared, frame: &[u8]) {
    match JsonCodec::decode(frame) {
        Ok(RpcMessage::Response(response)) => handle_response(shared, response),
        Ok(RpcMessage::Heartbeat(message_id)) => {
            tracing::trace!(message_id, "heartbeat echo received");
        }
        Ok(other) => {
            tracing::warn!(message = ?other, "dropping unexpected inbound frame");
        }
        Err(e) => {
            // A corrupt frame is dropped; the stream itself is still
            // framed, so later responses remain deliverable.
            tracing::warn!(error = %e, "dropping undecodable frame");
        }
    }
}

/// Correlate a response to its pending call. Unknown ids (late, duplicate,
/// or already timed out) are dropped silently.
fn handle_response(shared: &ClientShared, response: Response) {
    let entry = shared
        .pending
        .lock()
        .expect("pending lock poisoned")
        .remove(&response.message_id);
    let Some(call) = entry else {
        tracing::trace!(
            message_id = response.message_id,
            "dropping response with no pending call"
        );
        return;
    };

    let elapsed = elapsed_ms(call.started);
    if response.is_success() {
        shared.stats.record_success(elapsed);
    } else {
        shared.stats.record_error(elapsed);
    }
    call.fulfill(response);
}

/// Drain the pending table and fail every waiter with NETWORK_ERROR.
fn fail_all_pending(shared: &ClientShared) {
    let drained: Vec<(u32, PendingCall)> = shared
        .pending
        .lock()
        .expect("pending lock poisoned")
        .drain()
        .collect();
    shared
        .deadlines
        .lock()
        .expect("deadline lock poisoned")
        .clear();

    for (message_id, call) in drained {
        call.fulfill(Response::failure(
            message_id,
            ErrorCode::NetworkError,
            "Connection closed",
        ));
    }
}

/// Resolve expired entries with TIMEOUT_ERROR carrying their original id.
fn cleanup_expired(shared: &ClientShared) {
    let now = Instant::now();

    {
        let mut deadlines = shared.deadlines.lock().expect("deadline lock poisoned");
        while matches!(deadlines.peek(), Some(Reverse((at, _))) if *at <= now) {
            deadlines.pop();
        }
    }

    let expired: Vec<(u32, PendingCall)> = {
        let mut pending = shared.pending.lock().expect("pending lock poisoned");
        let ids: Vec<u32> = pending
            .iter()
            .filter(|(_, call)| now >= call.deadline)
            .map(|(id, _)| *id)
            .collect();
        ids.into_iter()
            .filter_map(|id| pending.remove(&id).map(|call| (id, call)))
            .collect()
    };

    for (message_id, call) in expired {
        shared.stats.record_timeout(elapsed_ms(call.started));
        call.fulfill(Response::failure(
            message_id,
            ErrorCode::TimeoutError,
            "Request timeout",
        ));
    }
}

/// Services the deadline heap: sleeps until the earliest deadline, wakes
/// early when a new one is scheduled.
async fn timer_loop(shared: Arc<ClientShared>) {
    loop {
        let next = shared
            .deadlines
            .lock()
            .expect("deadline lock poisoned")
            .peek()
            .map(|Reverse((at, _))| *at);

        match next {
            Some(at) => {
                tokio::select! {
                    _ = sleep_until(at) => cleanup_expired(&shared),
                    _ = shared.timer_wake.notified() => {}
                }
            }
            None => shared.timer_wake.notified().await,
        }
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
