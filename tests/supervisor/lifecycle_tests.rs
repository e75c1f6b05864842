// Supervisor lifecycle tests - spawning the stdio stub server
//
// start/stop discipline, tool discovery and tool-call failure modes.

#[path = "../common/mod.rs"]
mod common;

use aitest_core::{McpServerProcess, ServerGroup, ServerStartError, ToolCallError};
use common::{process_alive, stub_server};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test]
async fn start_then_stop_leaves_no_process() {
    let server = McpServerProcess::new(stub_server("stub", &[]));
    server.start().await.expect("start");
    assert!(server.is_running());

    let pid = server.pid().expect("stdio server has a pid");
    assert!(process_alive(pid));

    server.stop().await;
    assert!(!server.is_running());
    assert!(!process_alive(pid), "process {pid} survived stop()");

    // Idempotent.
    server.stop().await;
    assert!(server.pid().is_none());
}

#[tokio::test]
async fn stop_before_start_is_a_no_op() {
    let server = McpServerProcess::new(stub_server("idle", &[]));
    server.stop().await;
    assert!(!server.is_running());
    assert!(server.tools().is_empty());
}

#[tokio::test]
async fn start_twice_keeps_the_same_process() {
    let server = McpServerProcess::new(stub_server("stub", &[]));
    server.start().await.expect("start");
    let pid = server.pid();
    server.start().await.expect("second start is a no-op");
    assert_eq!(server.pid(), pid);
    server.stop().await;
}

#[tokio::test]
async fn discovers_tools_and_instructions() {
    let server = McpServerProcess::new(stub_server(
        "stub",
        &["--instructions", "Prefer echo for greetings."],
    ));
    server.start().await.expect("start");

    let names: Vec<String> = server.tools().into_iter().map(|tool| tool.name).collect();
    assert_eq!(names, ["echo", "add", "slow", "fail", "crash"]);
    assert!(server.tools().iter().all(|tool| tool.server.as_deref() == Some("stub")));
    assert_eq!(
        server.instructions().as_deref(),
        Some("Prefer echo for greetings.")
    );
    server.stop().await;
}

#[tokio::test]
async fn non_utf8_output_lines_are_skipped() {
    let server = McpServerProcess::new(stub_server("latin1", &["--binary-noise"]));
    server.start().await.expect("binary noise does not end the session");
    assert_eq!(server.tools().len(), 5);

    let echoed = server
        .call_tool("echo", json!({ "text": "still here" }))
        .await
        .expect("echo after noise");
    assert_eq!(echoed, "still here");
    assert!(server.is_running());
    server.stop().await;
}

#[tokio::test]
async fn follows_tools_list_pagination() {
    let server = McpServerProcess::new(stub_server("paged", &["--page-size", "2"]));
    server.start().await.expect("start");
    assert_eq!(server.tools().len(), 5);

    let refreshed = server.refresh_tools().await.expect("refresh");
    assert_eq!(refreshed.len(), 5);
    server.stop().await;
}

#[tokio::test]
async fn calls_tools_and_returns_text() {
    let server = McpServerProcess::new(stub_server("stub", &[]));
    server.start().await.expect("start");

    let echoed = server
        .call_tool("echo", json!({ "text": "hello" }))
        .await
        .expect("echo");
    assert_eq!(echoed, "hello");

    let sum = server
        .call_tool("add", json!({ "a": 2, "b": 3 }))
        .await
        .expect("add");
    assert_eq!(sum, "5");
    server.stop().await;
}

#[tokio::test]
async fn unknown_tool_fails_fast_with_available_names() {
    let server = McpServerProcess::new(stub_server("stub", &["--only", "echo,add"]));
    server.start().await.expect("start");

    let err = server
        .call_tool("weather", json!({}))
        .await
        .expect_err("unknown tool");
    match err {
        ToolCallError::UnknownTool { tool, available, .. } => {
            assert_eq!(tool, "weather");
            assert_eq!(available, ["echo", "add"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    server.stop().await;
}

#[tokio::test]
async fn malformed_arguments_are_rejected_before_dispatch() {
    let server = McpServerProcess::new(stub_server("stub", &[]));
    server.start().await.expect("start");

    let err = server
        .call_tool("add", json!({ "a": "two" }))
        .await
        .expect_err("invalid arguments");
    match err {
        ToolCallError::InvalidArguments { tool, reasons } => {
            assert_eq!(tool, "add");
            assert!(!reasons.is_empty());
        }
        other => panic!("expected InvalidArguments, got {other}"),
    }
    server.stop().await;
}

#[tokio::test]
async fn tool_reported_errors_surface_as_tool_call_errors() {
    let server = McpServerProcess::new(stub_server("stub", &[]));
    server.start().await.expect("start");

    let err = server.call_tool("fail", json!({})).await.expect_err("fail");
    assert!(matches!(err, ToolCallError::Reported { ref message, .. } if message == "boom"));
    assert!(server.is_running(), "a reported error must not kill the server");
    server.stop().await;
}

#[tokio::test]
async fn slow_call_times_out_and_server_stays_usable() {
    let config = stub_server("slow", &[]).with_call_timeout(Duration::from_millis(200));
    let server = McpServerProcess::new(config);
    server.start().await.expect("start");

    let started = Instant::now();
    let err = server
        .call_tool("slow", json!({ "ms": 3000 }))
        .await
        .expect_err("timeout");
    assert!(matches!(err, ToolCallError::Timeout { .. }), "got {err}");
    assert!(started.elapsed() < Duration::from_secs(2));

    let echoed = server
        .call_tool("echo", json!({ "text": "still here" }))
        .await
        .expect("server usable after a timed-out call");
    assert_eq!(echoed, "still here");
    server.stop().await;
}

#[tokio::test]
async fn crash_during_call_is_a_tool_call_error() {
    let server = McpServerProcess::new(stub_server("crashy", &[]));
    server.start().await.expect("start");
    let pid = server.pid().expect("pid");

    let err = server.call_tool("crash", json!({})).await.expect_err("crash");
    assert!(
        matches!(err, ToolCallError::ServerExited { .. } | ToolCallError::NotRunning { .. }),
        "got {err}"
    );
    assert!(!server.is_running());

    server.stop().await;
    assert!(!process_alive(pid));
}

#[tokio::test]
async fn stop_while_a_call_is_outstanding() {
    let server = Arc::new(McpServerProcess::new(stub_server("busy", &[])));
    server.start().await.expect("start");
    let pid = server.pid().expect("pid");

    let caller = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.call_tool("slow", json!({ "ms": 10_000 })).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    server.stop().await;
    let outcome = tokio::time::timeout(Duration::from_secs(3), caller)
        .await
        .expect("outstanding call released")
        .expect("join");
    assert!(outcome.is_err());
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(!process_alive(pid));
}

#[tokio::test]
async fn missing_binary_fails_to_start() {
    let config = aitest_core::ServerConfig::stdio("ghost", "/nonexistent/stub-mcp-server");
    let server = McpServerProcess::new(config);
    let err = server.start().await.expect_err("spawn failure");
    assert!(matches!(err, ServerStartError::Transport(_)), "got {err}");
    assert_eq!(err.server(), "ghost");
    assert!(!server.is_running());
}

#[tokio::test]
async fn process_exiting_after_handshake_fails_start() {
    let server = McpServerProcess::new(stub_server("flaky", &["--exit-after-init"]));
    let started = Instant::now();
    let err = server.start().await.expect_err("exit before ready");
    assert!(
        !matches!(err, ServerStartError::ReadinessTimeout { .. }),
        "an exited process must be detected before the deadline, got {err}"
    );
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!server.is_running());
}

#[tokio::test]
async fn unresponsive_server_times_out_at_the_deadline() {
    let config = stub_server("mute", &["--no-respond"])
        .with_startup_timeout(Duration::from_millis(400));
    let server = McpServerProcess::new(config);

    let started = Instant::now();
    let err = server.start().await.expect_err("handshake never answered");
    let elapsed = started.elapsed();
    assert!(matches!(err, ServerStartError::ReadinessTimeout { .. }), "got {err}");
    assert!(elapsed >= Duration::from_millis(400));
    assert!(elapsed < Duration::from_secs(3));
    assert!(!server.is_running());
}

#[tokio::test]
async fn group_starts_concurrently_and_stops_everything() {
    let group = ServerGroup::new([stub_server("one", &[]), stub_server("two", &["--only", "add"])]);
    group.start_all().await.expect("start group");

    let pids: Vec<u32> = group.servers().iter().filter_map(|s| s.pid()).collect();
    assert_eq!(pids.len(), 2);
    assert_eq!(group.tool_sources().len(), 2);
    assert_eq!(group.get("two").map(|s| s.tools().len()), Some(1));

    group.stop_all().await;
    assert!(pids.iter().all(|pid| !process_alive(*pid)));
}

#[tokio::test]
async fn group_start_failure_stops_the_servers_that_did_start() {
    let group = ServerGroup::new([
        stub_server("healthy", &[]),
        aitest_core::ServerConfig::stdio("ghost", "/nonexistent/stub-mcp-server"),
    ]);
    let err = group.start_all().await.expect_err("one server cannot start");
    assert_eq!(err.server(), "ghost");
    assert!(group.servers().iter().all(|server| !server.is_running()));
}

#[tokio::test]
async fn scoped_group_is_stopped_even_when_the_body_panics() {
    let seen_pid = Arc::new(AtomicU32::new(0));
    let task = {
        let seen_pid = Arc::clone(&seen_pid);
        tokio::spawn(async move {
            ServerGroup::new([stub_server("scoped", &[])])
                .run_scoped(|group| async move {
                    let pid = group.get("scoped").and_then(|s| s.pid()).expect("pid");
                    seen_pid.store(pid, Ordering::SeqCst);
                    panic!("assertion failed inside the test body");
                })
                .await
        })
    };

    let joined = task.await;
    assert!(joined.expect_err("body panicked").is_panic());
    let pid = seen_pid.load(Ordering::SeqCst);
    assert_ne!(pid, 0);
    assert!(!process_alive(pid));
}

#[tokio::test]
async fn scoped_group_is_stopped_when_the_run_is_cancelled() {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let run = ServerGroup::new([stub_server("scoped", &[])]).run_scoped(|group| async move {
        let server = Arc::clone(group.get("scoped").expect("server"));
        let _ = tx.send(server);
        std::future::pending::<()>().await;
    });

    let mut run = Box::pin(run);
    let server = tokio::select! {
        _ = &mut run => panic!("body never finishes"),
        server = rx => server.expect("body started"),
    };
    let pid = server.pid().expect("pid");
    drop(run);

    // The handle outlives the cancelled run, so only an explicit stop ends it.
    let deadline = Instant::now() + Duration::from_secs(5);
    while (server.is_running() || process_alive(pid)) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(!server.is_running());
    assert!(!process_alive(pid));
}

#[tokio::test]
async fn scoped_group_returns_the_body_value() {
    let value = ServerGroup::new([stub_server("scoped", &[])])
        .run_scoped(|group| async move {
            let server = group.get("scoped").expect("server");
            server.call_tool("echo", json!({ "text": "ok" })).await
        })
        .await
        .expect("start")
        .expect("echo");
    assert_eq!(value, "ok");
}
