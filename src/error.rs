//! Error types for wirecall.

use thiserror::Error;

use crate::message::ErrorCode;

/// Main error type for all wirecall operations.
#[derive(Debug, Error)]
pub enum RpcError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Buffer shorter than a frame header.
    #[error("frame truncated: {0} bytes")]
    Truncated(usize),

    /// Header magic does not match the protocol constant.
    #[error("bad magic {0:#010x}")]
    BadMagic(u32),

    /// Buffer length disagrees with the header's body length.
    #[error("frame length mismatch: header claims {expected} bytes, buffer has {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// Body checksum does not match the header.
    #[error("checksum mismatch: header {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// Header type byte is not a known message type.
    #[error("unknown message type {0}")]
    UnknownMessageType(u8),

    /// Request body is missing the `method` field.
    #[error("request is missing a method name")]
    MissingMethod,

    /// Response body carries neither `result` nor `error`.
    #[error("response carries neither result nor error")]
    MissingOutcome,

    /// Body length in the header exceeds the configured limit.
    #[error("frame body {0} bytes exceeds limit {1}")]
    BodyTooLarge(u32, u32),

    /// Connection closed by the peer or torn down locally.
    #[error("connection closed")]
    ConnectionClosed,

    /// Malformed configuration file entry.
    #[error("config error: {0}")]
    Config(String),
}

impl RpcError {
    /// Map this error onto the wire-level error code it manifests as.
    pub fn code(&self) -> ErrorCode {
        match self {
            RpcError::Truncated(_) => ErrorCode::DeserializeError,
            RpcError::Json(_)
            | RpcError::BadMagic(_)
            | RpcError::LengthMismatch { .. }
            | RpcError::ChecksumMismatch { .. }
            | RpcError::UnknownMessageType(_)
            | RpcError::MissingOutcome
            | RpcError::BodyTooLarge(..) => ErrorCode::ParseError,
            RpcError::MissingMethod => ErrorCode::InvalidRequest,
            RpcError::Io(_) | RpcError::ConnectionClosed => ErrorCode::NetworkError,
            RpcError::Config(_) => ErrorCode::CustomError,
        }
    }
}

/// Result type alias using RpcError.
pub type Result<T> = std::result::Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_failures_map_to_parse_error() {
        assert_eq!(RpcError::BadMagic(0xdead_beef).code(), ErrorCode::ParseError);
        assert_eq!(
            RpcError::ChecksumMismatch {
                expected: 1,
                actual: 2
            }
            .code(),
            ErrorCode::ParseError
        );
        assert_eq!(RpcError::MissingOutcome.code(), ErrorCode::ParseError);
    }

    #[test]
    fn test_truncated_maps_to_deserialize_error() {
        assert_eq!(RpcError::Truncated(7).code(), ErrorCode::DeserializeError);
    }

    #[test]
    fn test_missing_method_maps_to_invalid_request() {
        assert_eq!(RpcError::MissingMethod.code(), ErrorCode::InvalidRequest);
    }

    #[test]
    fn test_io_maps_to_network_error() {
        assert_eq!(RpcError::ConnectionClosed.code(), ErrorCode::NetworkError);
    }
}
