//! Typed message model: message types, error codes, requests, responses.

/// Default per-call timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u32 = 5000;

/// Discriminant carried in the frame header's type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Method invocation expecting exactly one response.
    Request = 1,
    /// Answer to a request, correlated by message id.
    Response = 2,
    /// Fire-and-forget request; message id is always 0.
    Notification = 3,
    /// Liveness probe; echoed by the server.
    Heartbeat = 4,
}

impl MessageType {
    /// Decode a wire byte into a message type.
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(MessageType::Request),
            2 => Some(MessageType::Response),
            3 => Some(MessageType::Notification),
            4 => Some(MessageType::Heartbeat),
            _ => None,
        }
    }

    /// Wire representation of this type.
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Wire-level error codes.
///
/// Unknown codes received from a peer are preserved verbatim in
/// [`ErrorCode::Other`] rather than being coerced to a known value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Success,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    ParseError,
    TimeoutError,
    NetworkError,
    SerializeError,
    DeserializeError,
    CustomError,
    /// Any code not in the closed enumeration above.
    Other(i32),
}

impl ErrorCode {
    /// Signed 32-bit wire value.
    pub fn as_i32(self) -> i32 {
        match self {
            ErrorCode::Success => 0,
            ErrorCode::InvalidRequest => -1,
            ErrorCode::MethodNotFound => -2,
            ErrorCode::InvalidParams => -3,
            ErrorCode::InternalError => -4,
            ErrorCode::ParseError => -5,
            ErrorCode::TimeoutError => -6,
            ErrorCode::NetworkError => -7,
            ErrorCode::SerializeError => -8,
            ErrorCode::DeserializeError => -9,
            ErrorCode::CustomError => -100,
            ErrorCode::Other(code) => code,
        }
    }

    /// Decode a wire value, preserving unknown codes.
    pub fn from_i32(code: i32) -> Self {
        match code {
            0 => ErrorCode::Success,
            -1 => ErrorCode::InvalidRequest,
            -2 => ErrorCode::MethodNotFound,
            -3 => ErrorCode::InvalidParams,
            -4 => ErrorCode::InternalError,
            -5 => ErrorCode::ParseError,
            -6 => ErrorCode::TimeoutError,
            -7 => ErrorCode::NetworkError,
            -8 => ErrorCode::SerializeError,
            -9 => ErrorCode::DeserializeError,
            -100 => ErrorCode::CustomError,
            other => ErrorCode::Other(other),
        }
    }
}

/// A method invocation.
///
/// `params` is JSON text; the codec embeds it as a JSON value when it
/// parses, as a plain string otherwise. `timeout_ms` travels on the wire
/// but is advisory; only the issuing client enforces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub message_id: u32,
    pub method: String,
    pub params: String,
    pub timeout_ms: u32,
}

impl Request {
    /// Create a request with the default timeout. The message id is
    /// assigned by the client when the call is issued.
    pub fn new(method: impl Into<String>, params: impl Into<String>) -> Self {
        Self {
            message_id: 0,
            method: method.into(),
            params: params.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    /// True when this request is a notification (no response expected).
    #[inline]
    pub fn is_notification(&self) -> bool {
        self.message_id == 0
    }
}

/// Outcome of a call: exactly one of result or error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Handler result as JSON text.
    Success { result: String },
    /// Error code and human-readable message.
    Failure { code: ErrorCode, message: String },
}

/// Answer to a request, correlated by `message_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub message_id: u32,
    pub outcome: Outcome,
}

impl Response {
    /// Build a success response carrying a JSON-text result.
    pub fn success(message_id: u32, result: impl Into<String>) -> Self {
        Self {
            message_id,
            outcome: Outcome::Success {
                result: result.into(),
            },
        }
    }

    /// Build a failure response.
    pub fn failure(message_id: u32, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            message_id,
            outcome: Outcome::Failure {
                code,
                message: message.into(),
            },
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    /// Result text, or `None` for failures.
    pub fn result(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success { result } => Some(result),
            Outcome::Failure { .. } => None,
        }
    }

    /// Error code; `Success` for successful responses.
    pub fn error_code(&self) -> ErrorCode {
        match &self.outcome {
            Outcome::Success { .. } => ErrorCode::Success,
            Outcome::Failure { code, .. } => *code,
        }
    }

    /// Error message, or `None` for successes.
    pub fn error_message(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success { .. } => None,
            Outcome::Failure { message, .. } => Some(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_roundtrip() {
        for t in [
            MessageType::Request,
            MessageType::Response,
            MessageType::Notification,
            MessageType::Heartbeat,
        ] {
            assert_eq!(MessageType::from_u8(t.as_u8()), Some(t));
        }
    }

    #[test]
    fn test_message_type_unknown_byte() {
        assert_eq!(MessageType::from_u8(0), None);
        assert_eq!(MessageType::from_u8(5), None);
        assert_eq!(MessageType::from_u8(255), None);
    }

    #[test]
    fn test_error_code_values() {
        assert_eq!(ErrorCode::Success.as_i32(), 0);
        assert_eq!(ErrorCode::MethodNotFound.as_i32(), -2);
        assert_eq!(ErrorCode::TimeoutError.as_i32(), -6);
        assert_eq!(ErrorCode::CustomError.as_i32(), -100);
    }

    #[test]
    fn test_error_code_preserves_unknown_values() {
        let code = ErrorCode::from_i32(-31337);
        assert_eq!(code, ErrorCode::Other(-31337));
        assert_eq!(code.as_i32(), -31337);
    }

    #[test]
    fn test_error_code_roundtrip_known() {
        for v in [0, -1, -2, -3, -4, -5, -6, -7, -8, -9, -100] {
            assert_eq!(ErrorCode::from_i32(v).as_i32(), v);
        }
    }

    #[test]
    fn test_request_notification() {
        let mut req = Request::new("echo", "{}");
        assert!(req.is_notification());
        req.message_id = 7;
        assert!(!req.is_notification());
    }

    #[test]
    fn test_response_accessors() {
        let ok = Response::success(3, r#"{"x":1}"#);
        assert!(ok.is_success());
        assert_eq!(ok.result(), Some(r#"{"x":1}"#));
        assert_eq!(ok.error_code(), ErrorCode::Success);
        assert_eq!(ok.error_message(), None);

        let err = Response::failure(4, ErrorCode::MethodNotFound, "Method 'x' not found");
        assert!(!err.is_success());
        assert_eq!(err.result(), None);
        assert_eq!(err.error_code(), ErrorCode::MethodNotFound);
        assert_eq!(err.error_message(), Some("Method 'x' not found"));
    }
}
