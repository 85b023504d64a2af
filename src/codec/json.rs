//! JSON codec: JSON-RPC 2.0 shaped bodies behind the binary header.
//!
//! Encoding embeds caller-supplied `params`/`result` text as a JSON value
//! when it parses as JSON, and as a plain JSON string otherwise. Decoding
//! re-serializes the embedded value back to compact JSON text, so
//! canonical-JSON payloads round-trip unchanged.
//!
//! # Example
//!
//! ```
//! use wirecall::codec::{JsonCodec, RpcMessage};
//! use wirecall::message::Request;
//!
//! let mut request = Request::new("add", r#"{"a":1,"b":2}"#);
//! request.message_id = 7;
//! let frame = JsonCodec::encode_request(&request).unwrap();
//!
//! match JsonCodec::decode(&frame).unwrap() {
//!     RpcMessage::Request(decoded) => assert_eq!(decoded.method, "add"),
//!     other => panic!("unexpected message: {:?}", other),
//! }
//! ```

use serde_json::{json, Map, Value};

use crate::error::{Result, RpcError};
use crate::message::{ErrorCode, MessageType, Outcome, Request, Response};
use crate::protocol::{checksum, FrameHeader, HEADER_SIZE, MAGIC};

/// A decoded frame, dispatched by the header's type byte.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcMessage {
    /// Method invocation expecting a response.
    Request(Request),
    /// Fire-and-forget invocation; never answered.
    Notification(Request),
    /// Answer correlated by message id.
    Response(Response),
    /// Liveness probe carrying only a message id.
    Heartbeat(u32),
}

/// Stateless frame codec for JSON bodies.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a request (or notification, when the message id is 0) into
    /// a complete frame.
    pub fn encode_request(request: &Request) -> Result<Vec<u8>> {
        let mut root = Map::new();
        root.insert("jsonrpc".into(), json!("2.0"));
        root.insert("method".into(), json!(request.method));
        root.insert("id".into(), json!(request.message_id));
        if !request.params.is_empty() {
            root.insert("params".into(), embed_json_text(&request.params));
        }

        let msg_type = if request.is_notification() {
            MessageType::Notification
        } else {
            MessageType::Request
        };
        Ok(build_frame(
            msg_type,
            request.message_id,
            &serde_json::to_vec(&Value::Object(root))?,
        ))
    }

    /// Encode a response into a complete frame. Exactly one of `result`
    /// or `error` appears in the body.
    pub fn encode_response(response: &Response) -> Result<Vec<u8>> {
        let mut root = Map::new();
        root.insert("jsonrpc".into(), json!("2.0"));
        root.insert("id".into(), json!(response.message_id));
        match &response.outcome {
            Outcome::Success { result } => {
                root.insert("result".into(), embed_json_text(result));
            }
            Outcome::Failure { code, message } => {
                root.insert(
                    "error".into(),
                    json!({ "code": code.as_i32(), "message": message }),
                );
            }
        }

        Ok(build_frame(
            MessageType::Response,
            response.message_id,
            &serde_json::to_vec(&Value::Object(root))?,
        ))
    }

    /// Encode a heartbeat frame. The body is an empty JSON object so the
    /// decode ladder's JSON step holds for every frame type.
    pub fn encode_heartbeat(message_id: u32) -> Vec<u8> {
        build_frame(MessageType::Heartbeat, message_id, b"{}")
    }

    /// Validate a complete frame buffer: size, magic, declared length,
    /// and body checksum. Returns the parsed header.
    pub fn validate(buf: &[u8]) -> Result<FrameHeader> {
        if buf.len() < HEADER_SIZE {
            return Err(RpcError::Truncated(buf.len()));
        }
        let header = FrameHeader::decode(buf)?;
        if header.magic != MAGIC {
            return Err(RpcError::BadMagic(header.magic));
        }
        let expected = HEADER_SIZE + header.body_length as usize;
        if buf.len() != expected {
            return Err(RpcError::LengthMismatch {
                expected,
                actual: buf.len(),
            });
        }
        let body = &buf[HEADER_SIZE..];
        let actual = checksum(body);
        if header.checksum != actual {
            return Err(RpcError::ChecksumMismatch {
                expected: header.checksum,
                actual,
            });
        }
        Ok(header)
    }

    /// Validate and fully decode a frame buffer.
    pub fn decode(buf: &[u8]) -> Result<RpcMessage> {
        let header = Self::validate(buf)?;
        let root: Value = serde_json::from_slice(&buf[HEADER_SIZE..])?;

        match header.msg_type {
            MessageType::Request => Ok(RpcMessage::Request(decode_request(&header, &root)?)),
            MessageType::Notification => {
                Ok(RpcMessage::Notification(decode_request(&header, &root)?))
            }
            MessageType::Response => Ok(RpcMessage::Response(decode_response(&header, &root)?)),
            MessageType::Heartbeat => Ok(RpcMessage::Heartbeat(header.message_id)),
        }
    }
}

/// Embed caller-supplied JSON text: a parsed value when it is valid JSON,
/// the raw string otherwise.
fn embed_json_text(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_owned()))
}

/// Re-serialize an embedded value back to compact JSON text.
fn value_to_text(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

fn build_frame(msg_type: MessageType, message_id: u32, body: &[u8]) -> Vec<u8> {
    let header = FrameHeader::new(msg_type, message_id, body);
    let mut frame = Vec::with_capacity(HEADER_SIZE + body.len());
    frame.extend_from_slice(&header.encode());
    frame.extend_from_slice(body);
    frame
}

fn decode_request(header: &FrameHeader, root: &Value) -> Result<Request> {
    let method = root
        .get("method")
        .and_then(Value::as_str)
        .ok_or(RpcError::MissingMethod)?;
    let params = root.get("params").map(value_to_text).unwrap_or_default();
    Ok(Request {
        message_id: header.message_id,
        method: method.to_owned(),
        params,
        timeout_ms: crate::message::DEFAULT_TIMEOUT_MS,
    })
}

fn decode_response(header: &FrameHeader, root: &Value) -> Result<Response> {
    if let Some(result) = root.get("result") {
        return Ok(Response::success(header.message_id, value_to_text(result)));
    }
    if let Some(error) = root.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(0) as i32;
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default();
        return Ok(Response::failure(
            header.message_id,
            ErrorCode::from_i32(code),
            message,
        ));
    }
    Err(RpcError::MissingOutcome)
}
