//! End-to-end tests over loopback TCP.
//!
//! A real server with the demonstration methods serves the happy paths;
//! hand-rolled raw servers cover out-of-order responses and abrupt
//! disconnects.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::Instant;

use wirecall::codec::{JsonCodec, RpcMessage};
use wirecall::connection::{write_frame, FrameReader};
use wirecall::handler::HandlerError;
use wirecall::{ErrorCode, Request, Response, RpcClient, RpcConfig, RpcServer};

/// Start a server with the demonstration methods on an ephemeral port.
async fn spawn_echo_server() -> SocketAddr {
    let server = RpcServer::new(RpcConfig::default());

    server.register("echo", |params: String| async move {
        let value: Value = serde_json::from_str(&params)
            .map_err(|_| HandlerError::invalid_params("Invalid JSON parameters"))?;
        Ok(value.to_string())
    });
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
    server.register("slow_operation", |params: String| async move {
        let value: Value = serde_json::from_str(&params).unwrap_or(Value::Null);
        let delay = value.get("delay").and_then(Value::as_u64).unwrap_or(5000);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(json!({ "message": "Operation completed", "delay": delay }).to_string())
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { server.serve_on(listener).await });
    addr
}

#[tokio::test]
async fn test_echo_roundtrip() {
    let addr = spawn_echo_server().await;
    let client = RpcClient::new("127.0.0.1", addr.port());

    let response = client
        .call("echo", r#"{"message":"Hello"}"#, 5000)
        .await;

    assert!(response.is_success(), "echo failed: {:?}", response);
    assert_eq!(response.result(), Some(r#"{"message":"Hello"}"#));
    assert_eq!(client.stats().success, 1);
}

#[tokio::test]
async fn test_add_returns_integral_sum() {
    let addr = spawn_echo_server().await;
    let client = RpcClient::new("127.0.0.1", addr.port());

    let response = client.call("add", r#"{"a":10,"b":20}"#, 5000).await;

    assert!(response.is_success());
    assert_eq!(response.result(), Some(r#"{"result":30}"#));
}

#[tokio::test]
async fn test_unknown_method_reports_method_not_found() {
    let addr = spawn_echo_server().await;
    let client = RpcClient::new("127.0.0.1", addr.port());

    let response = client.call("nonexistent", "{}", 5000).await;

    assert!(!response.is_success());
    assert_eq!(response.error_code(), ErrorCode::MethodNotFound);
    assert!(response.error_message().unwrap().contains("nonexistent"));
}

#[tokio::test]
async fn test_slow_operation_times_out_and_late_response_is_dropped() {
    let addr = spawn_echo_server().await;
    let client = RpcClient::new("127.0.0.1", addr.port());

    let started = Instant::now();
    let response = client
        .call("slow_operation", r#"{"delay":2000}"#, 500)
        .await;
    let elapsed = started.elapsed();

    assert_eq!(response.error_code(), ErrorCode::TimeoutError);
    assert_eq!(response.error_message(), Some("Request timeout"));
    assert!(
        elapsed >= Duration::from_millis(450) && elapsed < Duration::from_millis(1500),
        "timeout resolved after {:?}",
        elapsed
    );
    assert_eq!(client.pending_calls(), 0);
    assert_eq!(client.stats().timeout, 1);

    // The late response arrives once the handler wakes; it matches no
    // pending call and must not disturb later calls on the connection.
    tokio::time::sleep(Duration::from_millis(2000)).await;
    let response = client.call("echo", r#"{"after":"timeout"}"#, 5000).await;
    assert!(response.is_success(), "follow-up call failed: {:?}", response);
    assert_eq!(response.result(), Some(r#"{"after":"timeout"}"#));
}

/// Raw server that answers a batch of requests in a caller-chosen order.
async fn spawn_reordering_server(batch: usize, order: Vec<usize>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = FrameReader::new(read_half);

        let mut requests: Vec<Request> = Vec::new();
        while requests.len() < batch {
            let frame = reader.next_frame().await.unwrap().unwrap();
            match JsonCodec::decode(&frame).unwrap() {
                RpcMessage::Request(request) => requests.push(request),
                other => panic!("unexpected message: {:?}", other),
            }
        }

        for &index in &order {
            let request = &requests[index];
            let response = Response::success(
                request.message_id,
                json!({ "method": request.method, "index": index }).to_string(),
            );
            let bytes = JsonCodec::encode_response(&response).unwrap();
            write_frame(&mut write_half, &bytes).await.unwrap();
        }
    });
    addr
}

#[tokio::test]
async fn test_out_of_order_responses_reach_matching_callbacks() {
    // Requests A, B, C answered in order C, A, B.
    let addr = spawn_reordering_server(3, vec![2, 0, 1]).await;
    let client = RpcClient::new("127.0.0.1", addr.port());

    let (tx, mut rx) = mpsc::unbounded_channel();
    for method in ["a", "b", "c"] {
        let tx = tx.clone();
        client
            .async_call(
                method,
                "{}",
                move |response| {
                    let _ = tx.send((method, response));
                },
                5000,
            )
            .await;
    }

    let mut seen = Vec::new();
    for _ in 0..3 {
        let (method, response) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("callback not invoked")
            .unwrap();
        assert!(response.is_success());
        let body: Value = serde_json::from_str(response.result().unwrap()).unwrap();
        // Each callback received the response for its own request.
        assert_eq!(body["method"], method);
        seen.push(method);
    }

    seen.sort_unstable();
    assert_eq!(seen, ["a", "b", "c"]);
    assert_eq!(client.pending_calls(), 0);
    assert!(rx.try_recv().is_err(), "a callback fired twice");
}

#[tokio::test]
async fn test_peer_close_fails_all_outstanding_calls() {
    // Raw server that reads two requests and slams the connection shut.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, _write_half) = stream.into_split();
        let mut reader = FrameReader::new(read_half);
        for _ in 0..2 {
            reader.next_frame().await.unwrap().unwrap();
        }
        // Dropping both halves closes the socket with calls in flight.
    });

    let client = Arc::new(RpcClient::new("127.0.0.1", addr.port()));

    let first = {
        let client = client.clone();
        tokio::spawn(async move { client.call("one", "{}", 5000).await })
    };
    let second = {
        let client = client.clone();
        tokio::spawn(async move { client.call("two", "{}", 5000).await })
    };

    let first = first.await.unwrap();
    let second = second.await.unwrap();

    for response in [first, second] {
        assert_eq!(response.error_code(), ErrorCode::NetworkError);
        assert_eq!(response.error_message(), Some("Connection closed"));
    }
    assert_eq!(client.pending_calls(), 0);
}

#[tokio::test]
async fn test_handler_failure_keeps_connection_serving() {
    let server = RpcServer::new(RpcConfig::default());
    server.register("fragile", |_: String| async move {
        Err(HandlerError::internal("deliberate failure"))
    });
    server.register("echo", |params: String| async move { Ok(params) });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { server.serve_on(listener).await });

    let client = RpcClient::new("127.0.0.1", addr.port());

    let response = client.call("fragile", "{}", 5000).await;
    assert_eq!(response.error_code(), ErrorCode::InternalError);
    assert_eq!(response.error_message(), Some("deliberate failure"));

    // Same connection still dispatches.
    let response = client.call("echo", r#"{"ok":1}"#, 5000).await;
    assert!(response.is_success());
}

#[tokio::test]
async fn test_notification_is_dispatched_without_response() {
    let server = RpcServer::new(RpcConfig::default());
    let (tx, mut rx) = mpsc::unbounded_channel();
    server.register("event", move |params: String| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(params);
            Ok(String::new())
        }
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { server.serve_on(listener).await });

    let client = RpcClient::new("127.0.0.1", addr.port());
    client.notify("event", r#"{"n":1}"#).await.unwrap();

    let params = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("notification not dispatched")
        .unwrap();
    assert_eq!(params, r#"{"n":1}"#);
    assert_eq!(client.pending_calls(), 0);
}

#[tokio::test]
async fn test_fragmented_request_is_reassembled_by_server() {
    let addr = spawn_echo_server().await;

    // Drive the wire by hand, trickling one frame across many writes.
    let mut request = Request::new("echo", r#"{"fragmented":true}"#);
    request.message_id = 1;
    let frame = JsonCodec::encode_request(&request).unwrap();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    for chunk in frame.chunks(7) {
        stream.write_all(chunk).await.unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let (read_half, _write_half) = stream.into_split();
    let mut reader = FrameReader::new(read_half);
    let reply = tokio::time::timeout(Duration::from_secs(5), reader.next_frame())
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    match JsonCodec::decode(&reply).unwrap() {
        RpcMessage::Response(response) => {
            assert_eq!(response.message_id, 1);
            assert_eq!(response.result(), Some(r#"{"fragmented":true}"#));
        }
        other => panic!("unexpected message: {:?}", other),
    }
}

#[tokio::test]
async fn test_heartbeat_echo_roundtrip() {
    let addr = spawn_echo_server().await;

    let stream = TcpStream::connect(addr).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();

    let probe = JsonCodec::encode_heartbeat(17);
    write_frame(&mut write_half, &probe).await.unwrap();

    let mut reader = FrameReader::new(read_half);
    let reply = tokio::time::timeout(Duration::from_secs(5), reader.next_frame())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(JsonCodec::decode(&reply).unwrap(), RpcMessage::Heartbeat(17));
}

#[tokio::test]
async fn test_concurrent_calls_correlate_by_id() {
    let addr = spawn_echo_server().await;
    let client = Arc::new(RpcClient::new("127.0.0.1", addr.port()));

    let mut calls = Vec::new();
    for i in 0..16u32 {
        let client = client.clone();
        calls.push(tokio::spawn(async move {
            let params = format!(r#"{{"n":{}}}"#, i);
            (i, client.call("echo", &params, 5000).await)
        }));
    }

    for call in calls {
        let (i, response) = call.await.unwrap();
        assert!(response.is_success());
        assert_eq!(response.result(), Some(format!(r#"{{"n":{}}}"#, i).as_str()));
    }

    assert_eq!(client.pending_calls(), 0);
    assert_eq!(client.stats().success, 16);
}
