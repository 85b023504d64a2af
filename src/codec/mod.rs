//! Codec module: building and validating complete frames.
//!
//! [`JsonCodec`] is the only codec the wire implements; the configuration
//! file can name others (`PROTOBUF`, `MSGPACK`, `CUSTOM`) but they are
//! not provided here.

mod json;

pub use json::{JsonCodec, RpcMessage};
