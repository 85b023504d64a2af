//! Configuration: an explicit, immutable value threaded through
//! constructors.
//!
//! Loaded from a simple `key=value` file with `#` comments. Unknown keys
//! are preserved as opaque custom settings; unrecognized enum values keep
//! the default (with a warning); malformed numbers are a hard error.
//!
//! # Example file
//!
//! ```text
//! # rpc_server.conf
//! protocol_type = JSON
//! transport_type = TCP
//! port = 8080
//! timeout_ms = 5000
//! log_level = INFO
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Result, RpcError};

/// Body encoding named by the configuration. Only JSON is implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolType {
    #[default]
    Json,
    Protobuf,
    MsgPack,
    Custom,
}

impl FromStr for ProtocolType {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        match s {
            "JSON" => Ok(ProtocolType::Json),
            "PROTOBUF" => Ok(ProtocolType::Protobuf),
            "MSGPACK" => Ok(ProtocolType::MsgPack),
            "CUSTOM" => Ok(ProtocolType::Custom),
            _ => Err(()),
        }
    }
}

/// Serialization flavor named by the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SerializeType {
    #[default]
    Json,
    Binary,
    Xml,
    Custom,
}

impl FromStr for SerializeType {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        match s {
            "JSON" => Ok(SerializeType::Json),
            "BINARY" => Ok(SerializeType::Binary),
            "XML" => Ok(SerializeType::Xml),
            "CUSTOM" => Ok(SerializeType::Custom),
            _ => Err(()),
        }
    }
}

/// Transport named by the configuration. Only TCP is implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportType {
    #[default]
    Tcp,
    Udp,
    Http,
    WebSocket,
}

impl FromStr for TransportType {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        match s {
            "TCP" => Ok(TransportType::Tcp),
            "UDP" => Ok(TransportType::Udp),
            "HTTP" => Ok(TransportType::Http),
            "WEBSOCKET" => Ok(TransportType::WebSocket),
            _ => Err(()),
        }
    }
}

/// RPC configuration value.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcConfig {
    pub protocol_type: ProtocolType,
    pub serialize_type: SerializeType,
    pub transport_type: TransportType,
    pub port: u16,
    pub thread_num: u32,
    pub timeout_ms: u32,
    pub max_connections: u32,
    pub log_level: String,
    pub log_path: String,
    /// Keys the core does not recognize, preserved verbatim.
    pub custom: HashMap<String, String>,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            protocol_type: ProtocolType::Json,
            serialize_type: SerializeType::Json,
            transport_type: TransportType::Tcp,
            port: 8080,
            thread_num: 4,
            timeout_ms: 5000,
            max_connections: 1000,
            log_level: "INFO".to_owned(),
            log_path: "./logs/".to_owned(),
            custom: HashMap::new(),
        }
    }
}

impl RpcConfig {
    /// Load a configuration file, starting from the defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RpcError::Config(format!("failed to open {}: {}", path.display(), e))
        })?;
        Self::parse(&contents)
    }

    /// Parse `key=value` text, starting from the defaults.
    pub fn parse(contents: &str) -> Result<Self> {
        let mut config = Self::default();

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();

            match key {
                "protocol_type" => {
                    if let Some(v) = parse_enum(key, value) {
                        config.protocol_type = v;
                    }
                }
                "serialize_type" => {
                    if let Some(v) = parse_enum(key, value) {
                        config.serialize_type = v;
                    }
                }
                "transport_type" => {
                    if let Some(v) = parse_enum(key, value) {
                        config.transport_type = v;
                    }
                }
                "port" => config.port = parse_number(key, value)?,
                "thread_num" => config.thread_num = parse_number(key, value)?,
                "timeout_ms" => config.timeout_ms = parse_number(key, value)?,
                "max_connections" => config.max_connections = parse_number(key, value)?,
                "log_level" => config.log_level = value.to_owned(),
                "log_path" => config.log_path = value.to_owned(),
                _ => {
                    config.custom.insert(key.to_owned(), value.to_owned());
                }
            }
        }

        Ok(config)
    }

    /// Look up a custom (unrecognized) key.
    pub fn custom(&self, key: &str) -> Option<&str> {
        self.custom.get(key).map(String::as_str)
    }
}

fn parse_enum<T: FromStr<Err = ()>>(key: &str, value: &str) -> Option<T> {
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(()) => {
            tracing::warn!(key, value, "unrecognized config value, keeping default");
            None
        }
    }
}

fn parse_number<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .parse()
        .map_err(|e| RpcError::Config(format!("bad value for {}: {}", key, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RpcConfig::default();
        assert_eq!(config.protocol_type, ProtocolType::Json);
        assert_eq!(config.transport_type, TransportType::Tcp);
        assert_eq!(config.port, 8080);
        assert_eq!(config.thread_num, 4);
        assert_eq!(config.timeout_ms, 5000);
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.log_level, "INFO");
    }

    #[test]
    fn test_parse_full_file() {
        let config = RpcConfig::parse(
            "# server config\n\
             protocol_type = JSON\n\
             serialize_type = BINARY\n\
             transport_type = TCP\n\
             port = 9090\n\
             thread_num = 8\n\
             timeout_ms = 2500\n\
             max_connections = 64\n\
             log_level = DEBUG\n\
             log_path = /var/log/rpc/\n",
        )
        .unwrap();

        assert_eq!(config.serialize_type, SerializeType::Binary);
        assert_eq!(config.port, 9090);
        assert_eq!(config.thread_num, 8);
        assert_eq!(config.timeout_ms, 2500);
        assert_eq!(config.max_connections, 64);
        assert_eq!(config.log_level, "DEBUG");
        assert_eq!(config.log_path, "/var/log/rpc/");
    }

    #[test]
    fn test_comments_and_blank_lines_skipped() {
        let config = RpcConfig::parse("# comment\n\n  # indented comment\nport = 7000\n").unwrap();
        assert_eq!(config.port, 7000);
    }

    #[test]
    fn test_whitespace_trimmed() {
        let config = RpcConfig::parse("  port   =   7001  \n").unwrap();
        assert_eq!(config.port, 7001);
    }

    #[test]
    fn test_unknown_keys_preserved_as_custom() {
        let config = RpcConfig::parse("shard_count = 16\nregion = eu-west\n").unwrap();
        assert_eq!(config.custom("shard_count"), Some("16"));
        assert_eq!(config.custom("region"), Some("eu-west"));
        assert_eq!(config.custom("absent"), None);
    }

    #[test]
    fn test_unrecognized_enum_value_keeps_default() {
        let config = RpcConfig::parse("transport_type = CARRIER_PIGEON\n").unwrap();
        assert_eq!(config.transport_type, TransportType::Tcp);
    }

    #[test]
    fn test_malformed_number_is_error() {
        let err = RpcConfig::parse("port = eighty\n").unwrap_err();
        assert!(matches!(err, RpcError::Config(_)));
    }

    #[test]
    fn test_lines_without_equals_skipped() {
        let config = RpcConfig::parse("malformed line\nport = 7002\n").unwrap();
        assert_eq!(config.port, 7002);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = RpcConfig::from_file("/nonexistent/rpc.conf").unwrap_err();
        assert!(matches!(err, RpcError::Config(_)));
    }
}
