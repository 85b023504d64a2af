//! # wirecall
//!
//! Bidirectional RPC over length-prefixed binary frames with JSON bodies.
//!
//! Every frame on the wire is a fixed 32-byte header followed by a JSON
//! body. The header carries a magic constant, protocol version, message
//! type, correlation id, body length, a rolling checksum of the body, and
//! a send timestamp. Requests and responses are correlated per connection
//! by message id; id 0 is reserved for notifications, which never produce
//! a response.
//!
//! ## Architecture
//!
//! - **Protocol** (`protocol`): header layout, checksum, and the
//!   [`FrameBuffer`](protocol::FrameBuffer) that reassembles frames from
//!   fragmented socket reads.
//! - **Codec** (`codec`): [`JsonCodec`](codec::JsonCodec) builds and
//!   validates complete frames (magic, length, checksum, JSON shape).
//! - **Server** ([`RpcServer`]): accepts connections, looks up methods in
//!   a [`MethodRegistry`](handler::MethodRegistry), traps handler
//!   failures, and answers every request with exactly one response.
//! - **Client** ([`RpcClient`]): issues calls, tracks them in a pending
//!   table, and resolves each outstanding call exactly once with a
//!   response, a timeout, or a disconnect error.
//!
//! ## Example
//!
//! ```ignore
//! use wirecall::{RpcClient, RpcConfig, RpcServer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let server = RpcServer::new(RpcConfig::default());
//!     server.register("echo", |params: String| async move { Ok(params) });
//!     tokio::spawn({
//!         let server = server.clone();
//!         async move { server.serve().await }
//!     });
//!
//!     let client = RpcClient::new("127.0.0.1", 8080);
//!     let response = client.call("echo", r#"{"message":"hi"}"#, 5000).await;
//!     assert!(response.is_success());
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod message;
pub mod protocol;
pub mod stats;

mod client;
mod server;

pub use client::RpcClient;
pub use config::RpcConfig;
pub use error::{Result, RpcError};
pub use handler::{HandlerError, MethodRegistry};
pub use message::{ErrorCode, MessageType, Outcome, Request, Response};
pub use server::RpcServer;
pub use stats::StatsSnapshot;
