// Network transport tests - event-stream and streamable HTTP bindings
//
// Both bindings run against the in-process axum stub and must behave like
// the stdio binding from the supervisor's point of view.

#[path = "../common/mod.rs"]
mod common;

use aitest_core::config::TransportKind;
use aitest_core::transport::{self, Transport, TransportError};
use aitest_core::{McpServerProcess, ServerConfig, ServerStartError};
use common::http_stub::{HttpStub, SESSION_ID};
use serde_json::json;
use std::time::Duration;

fn quick(config: ServerConfig) -> ServerConfig {
    config
        .with_startup_timeout(Duration::from_secs(5))
        .with_call_timeout(Duration::from_secs(5))
}

#[tokio::test]
async fn event_stream_server_round_trip() {
    let stub = HttpStub::spawn().await;
    let server = McpServerProcess::new(quick(ServerConfig::sse("events", stub.sse_url())));

    server.start().await.expect("start");
    assert!(server.is_running());
    assert!(server.pid().is_none());
    assert_eq!(server.tools().len(), 1);
    assert_eq!(
        server.instructions().as_deref(),
        Some("Use echo to repeat text.")
    );

    let echoed = server
        .call_tool("echo", json!({ "text": "over sse" }))
        .await
        .expect("echo");
    assert_eq!(echoed, "over sse");

    server.stop().await;
    assert!(!server.is_running());
    server.stop().await;
}

#[tokio::test]
async fn event_stream_reports_rpc_errors() {
    let stub = HttpStub::spawn().await;
    let config = quick(ServerConfig::sse("events", stub.sse_url()));
    let channel = transport::connect(&config).await.expect("connect");
    assert_eq!(channel.kind(), TransportKind::Sse);

    let err = channel
        .request("resources/list", json!({}))
        .await
        .expect_err("unsupported method");
    assert!(matches!(err, TransportError::Rpc { code: -32601, .. }), "got {err}");

    channel.close().await;
    assert!(channel.is_closed());
    let err = channel
        .request("tools/list", json!({}))
        .await
        .expect_err("closed channel");
    assert!(err.is_terminal());
}

#[tokio::test]
async fn streamable_http_round_trip_with_session_and_headers() {
    let stub = HttpStub::spawn().await;
    let config = quick(
        ServerConfig::streamable_http("http", stub.mcp_url())
            .with_header("Authorization", "Bearer test-token"),
    );
    let server = McpServerProcess::new(config);

    server.start().await.expect("start");
    assert_eq!(stub.last_authorization().as_deref(), Some("Bearer test-token"));

    // tools/call replies arrive as an event-stream body with a notification first.
    let echoed = server
        .call_tool("echo", json!({ "text": "over http" }))
        .await
        .expect("echo");
    assert_eq!(echoed, "over http");

    server.stop().await;
    assert!(stub.session_terminated());
}

#[tokio::test]
async fn streamable_http_answers_without_waiting_for_the_stream_to_end() {
    let stub = HttpStub::spawn().await;
    let config = ServerConfig::streamable_http("http", stub.mcp_url())
        .with_call_timeout(Duration::from_secs(30));
    let channel = transport::StreamableHttpTransport::connect(&config).expect("connect");
    channel
        .request("initialize", json!({ "protocolVersion": "2025-06-18" }))
        .await
        .expect("initialize");

    // The tools/call event stream is never closed by the server.
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        channel.request(
            "tools/call",
            json!({ "name": "echo", "arguments": { "text": "streamed" } }),
        ),
    )
    .await
    .expect("response arrives before the stream ends")
    .expect("echo");
    assert_eq!(result["content"][0]["text"], "streamed");
    assert_eq!(result["isError"], false);

    channel.close().await;
}

#[tokio::test]
async fn streamable_http_carries_the_session_id() {
    let stub = HttpStub::spawn().await;
    let config = quick(ServerConfig::streamable_http("http", stub.mcp_url()));
    let channel = transport::StreamableHttpTransport::connect(&config).expect("connect");
    assert!(channel.session_id().is_none());

    channel
        .request("initialize", json!({ "protocolVersion": "2025-06-18" }))
        .await
        .expect("initialize");
    assert_eq!(channel.session_id().as_deref(), Some(SESSION_ID));

    let tools = channel.request("tools/list", json!({})).await.expect("list");
    assert_eq!(tools["tools"][0]["name"], "echo");
    channel.close().await;
    assert!(stub.session_terminated());
}

#[tokio::test]
async fn unreachable_endpoint_fails_to_start() {
    let config = quick(ServerConfig::sse("nowhere", "http://127.0.0.1:9/sse"))
        .with_startup_timeout(Duration::from_secs(2));
    let server = McpServerProcess::new(config);
    let err = server.start().await.expect_err("nothing listens there");
    assert!(
        matches!(
            err,
            ServerStartError::Transport(_) | ServerStartError::ReadinessTimeout { .. }
        ),
        "got {err}"
    );
    assert!(!server.is_running());
}
