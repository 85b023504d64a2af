//! Echo RPC server, the worked example.
//!
//! Registers a small set of demonstration methods (`echo`, `add`,
//! `slow_operation`, `process_data`, `get_server_info`) and serves them
//! over TCP.
//!
//! ```text
//! echo-server [port] [--config <file>]
//! ```
//!
//! The positional port (default 8080) overrides the configured one.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use wirecall::handler::HandlerError;
use wirecall::protocol::checksum;
use wirecall::{RpcConfig, RpcServer};

fn parse_args() -> Result<RpcConfig> {
    let mut port: Option<u16> = None;
    let mut config_path: Option<String> = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                config_path = Some(arg_value(&mut args, "--config")?);
            }
            other => {
                port = Some(other.parse().with_context(|| format!("invalid port: {}", other))?);
            }
        }
    }

    let mut config = match config_path {
        Some(path) => RpcConfig::from_file(&path).with_context(|| format!("loading {}", path))?,
        None => RpcConfig::default(),
    };
    if let Some(port) = port {
        config.port = port;
    }
    Ok(config)
}

fn arg_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    args.next()
        .with_context(|| format!("{} requires a value", flag))
}

fn init_logging(config: &RpcConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.to_lowercase()))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn register_methods(server: &RpcServer) {
    // echo: return the params unchanged.
    server.register("echo", |params: String| async move {
        let value: Value = serde_json::from_str(&params)
            .map_err(|_| HandlerError::invalid_params("Invalid JSON parameters"))?;
        Ok(value.to_string())
    });

    // add: numeric sum of `a` and `b`.
    server.register("add", |params: String| async move {
        let value: Value = serde_json::from_str(&params)
            .map_err(|_| HandlerError::invalid_params("Invalid JSON parameters"))?;
        let (a, b) = match (
            value.get("a").and_then(Value::as_f64),
            value.get("b").and_then(Value::as_f64),
        ) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                return Err(HandlerError::invalid_params(
                    "Parameters 'a' and 'b' must be numbers",
                ))
            }
        };
        let sum = a + b;
        let result = if sum.fract() == 0.0 {
            json!({ "result": sum as i64 })
        } else {
            json!({ "result": sum })
        };
        Ok(result.to_string())
    });

    // slow_operation: sleep `delay` milliseconds, for timeout testing.
    server.register("slow_operation", |params: String| async move {
        let value: Value = serde_json::from_str(&params)
            .map_err(|_| HandlerError::invalid_params("Invalid JSON parameters"))?;
        let delay = value.get("delay").and_then(Value::as_u64).unwrap_or(5000);
        tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        Ok(json!({ "message": "Operation completed", "delay": delay }).to_string())
    });

    // process_data: size and checksum of a `data` string.
    server.register("process_data", |params: String| async move {
        let value: Value = serde_json::from_str(&params)
            .map_err(|_| HandlerError::invalid_params("Invalid JSON parameters"))?;
        let data = value
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| HandlerError::invalid_params("Missing parameter 'data'"))?;
        Ok(json!({
            "processed": true,
            "data_size": data.len(),
            "checksum": checksum(data.as_bytes()),
        })
        .to_string())
    });
}

fn register_server_info(server: &RpcServer) {
    let handle = server.clone();
    server.register("get_server_info", move |_params: String| {
        let stats = handle.stats();
        async move {
            Ok(json!({
                "server_name": "Echo RPC Server",
                "version": env!("CARGO_PKG_VERSION"),
                "statistics": {
                    "total_requests": stats.total,
                    "success_requests": stats.success,
                    "error_requests": stats.error,
                    "avg_response_time": stats.avg_response_ms,
                },
            })
            .to_string())
        }
    });
}

fn main() -> Result<()> {
    let config = parse_args()?;
    init_logging(&config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.thread_num.max(1) as usize)
        .enable_all()
        .build()
        .context("building runtime")?;

    runtime.block_on(async {
        let server = RpcServer::new(config);
        register_methods(&server);
        register_server_info(&server);

        tracing::info!("starting Echo RPC server");
        server.serve().await.context("server failed")
    })
}
