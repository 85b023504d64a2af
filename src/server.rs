//! RPC server: accept loop, method dispatch, response encoding.
//!
//! Each accepted connection runs on its own task, which owns the socket
//! and frame buffer. Handlers are awaited on that task, so a slow handler
//! blocks only its own connection. A handler failure (an `Err` or a
//! panic) answers the request with an error response; only I/O failures
//! end a connection.

use std::sync::Arc;
use std::time::Instant;

use tokio::net::{TcpListener, TcpStream};

use crate::codec::{JsonCodec, RpcMessage};
use crate::connection::{write_frame, FrameReader};
use crate::error::Result;
use crate::handler::{HandlerResult, MethodRegistry};
use crate::message::{ErrorCode, Request, Response};
use crate::stats::{RpcStats, StatsSnapshot};
use crate::RpcConfig;

/// RPC server dispatching named methods to registered handlers.
///
/// Cheaply cloneable; clones share the registry and counters.
#[derive(Clone)]
pub struct RpcServer {
    config: Arc<RpcConfig>,
    registry: Arc<MethodRegistry>,
    stats: Arc<RpcStats>,
}

impl RpcServer {
    /// Create a server from an explicit configuration value.
    pub fn new(config: RpcConfig) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(MethodRegistry::new()),
            stats: Arc::new(RpcStats::new()),
        }
    }

    /// Register a method handler. Intended as a startup-phase operation.
    pub fn register<F, Fut>(&self, name: &str, handler: F)
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = HandlerResult> + Send + 'static,
    {
        self.registry.register(name, handler);
    }

    /// Remove a method. Returns whether it was present.
    pub fn unregister(&self, name: &str) -> bool {
        self.registry.unregister(name)
    }

    /// The method registry backing this server.
    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    /// Current request counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Bind to the configured port on all interfaces and serve forever.
    pub async fn serve(&self) -> Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.config.port)).await?;
        self.serve_on(listener).await
    }

    /// Serve connections accepted from an existing listener.
    pub async fn serve_on(&self, listener: TcpListener) -> Result<()> {
        tracing::info!(addr = %listener.local_addr()?, "RPC server listening");

        loop {
            let (stream, peer) = listener.accept().await?;
            tracing::debug!(%peer, "accepted RPC connection");

            let registry = self.registry.clone();
            let stats = self.stats.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, registry, stats).await {
                    tracing::warn!(%peer, error = %e, "connection ended with error");
                }
                tracing::debug!(%peer, "connection closed");
            });
        }
    }
}

/// Per-connection loop: read frames, dispatch, write replies.
async fn handle_connection(
    stream: TcpStream,
    registry: Arc<MethodRegistry>,
    stats: Arc<RpcStats>,
) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = FrameReader::new(read_half);

    while let Some(frame) = reader.next_frame().await? {
        if let Some(reply) = process_frame(&frame, &registry, &stats).await {
            write_frame(&mut write_half, &reply).await?;
        }
    }
    Ok(())
}

/// Handle one complete inbound frame; returns the encoded reply, if any.
///
/// Decode failures answer with the error's wire code and message id 0
/// (the true id is unknown) and leave the connection open.
async fn process_frame(
    frame: &[u8],
    registry: &MethodRegistry,
    stats: &RpcStats,
) -> Option<Vec<u8>> {
    let started = Instant::now();

    let message = match JsonCodec::decode(frame) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(error = %e, "failed to decode inbound frame");
            stats.record_error(elapsed_ms(started));
            return encode_reply(&Response::failure(0, e.code(), e.to_string()));
        }
    };

    match message {
        RpcMessage::Heartbeat(message_id) => {
            tracing::trace!(message_id, "echoing heartbeat");
            Some(JsonCodec::encode_heartbeat(message_id))
        }
        RpcMessage::Notification(request) => {
            dispatch_notification(request, registry).await;
            None
        }
        RpcMessage::Request(request) if request.is_notification() => {
            dispatch_notification(request, registry).await;
            None
        }
        RpcMessage::Request(request) => {
            let response = dispatch_request(request, registry).await;
            if response.is_success() {
                stats.record_success(elapsed_ms(started));
            } else {
                stats.record_error(elapsed_ms(started));
            }
            encode_reply(&response)
        }
        RpcMessage::Response(response) => {
            tracing::warn!(
                message_id = response.message_id,
                "dropping unexpected response frame"
            );
            None
        }
    }
}

/// Invoke the handler for a request and build exactly one response.
async fn dispatch_request(request: Request, registry: &MethodRegistry) -> Response {
    let Some(handler) = registry.lookup(&request.method) else {
        return Response::failure(
            request.message_id,
            ErrorCode::MethodNotFound,
            format!("Method '{}' not found", request.method),
        );
    };

    // The handler future runs in its own task so a panic surfaces as a
    // join error instead of unwinding the connection loop.
    match tokio::spawn(handler.call(request.params)).await {
        Ok(Ok(result)) => Response::success(request.message_id, result),
        Ok(Err(failure)) => Response::failure(request.message_id, failure.code, failure.message),
        Err(join_error) => {
            tracing::error!(method = %request.method, error = %join_error, "handler died");
            Response::failure(
                request.message_id,
                ErrorCode::InternalError,
                panic_message(join_error),
            )
        }
    }
}

/// Invoke the handler for a notification; any outcome is discarded.
async fn dispatch_notification(request: Request, registry: &MethodRegistry) {
    let Some(handler) = registry.lookup(&request.method) else {
        tracing::debug!(method = %request.method, "notification for unknown method");
        return;
    };
    if let Ok(Err(failure)) = tokio::spawn(handler.call(request.params)).await {
        tracing::debug!(method = %request.method, error = %failure, "notification handler failed");
    }
}

fn encode_reply(response: &Response) -> Option<Vec<u8>> {
    match JsonCodec::encode_response(response) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode response");
            None
        }
    }
}

fn panic_message(error: tokio::task::JoinError) -> String {
    if error.is_panic() {
        let payload = error.into_panic();
        if let Some(text) = payload.downcast_ref::<String>() {
            return text.clone();
        }
        if let Some(text) = payload.downcast_ref::<&str>() {
            return (*text).to_owned();
        }
        return "handler panicked".to_owned();
    }
    "handler task cancelled".to_owned()
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
