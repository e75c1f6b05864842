// Governor tests - classified retries and the hard deadline
//
// Deadlines are checked in real time against live stub servers so the
// "server stays usable after cancellation" property is exercised for real.

#[path = "../common/mod.rs"]
mod common;

use aitest_core::model::{ModelProvider, ModelResponse};
use aitest_core::{
    AgentConfig, AgentEngine, GovernorError, McpServerProcess, RetryConfig, RunError, RunState,
    ToolCallRequest, execute,
};
use common::{FlakyProvider, HangingProvider, ScriptedProvider, stub_server};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig::default()
        .with_max_attempts(max_attempts)
        .with_base_delay(Duration::from_millis(10))
        .with_jitter(0.0)
}

async fn governed<P>(
    engine: AgentEngine<P>,
    config: AgentConfig,
    retry: &RetryConfig,
    deadline: Duration,
) -> Result<aitest_core::AgentResult, GovernorError>
where
    P: ModelProvider + 'static,
{
    execute(
        || {
            let engine = engine.clone();
            let config = config.clone();
            async move { engine.run("Go", &config, &[]).await }
        },
        retry,
        deadline,
    )
    .await
}

#[tokio::test]
async fn retryable_failures_succeed_within_the_attempt_budget() {
    let provider = Arc::new(FlakyProvider::new(2));
    let engine = AgentEngine::new(Arc::clone(&provider));

    let result = governed(engine, AgentConfig::new("gpt-4o-mini"), &fast_retry(3), Duration::from_secs(5))
        .await
        .expect("third attempt succeeds");

    assert!(result.success());
    assert_eq!(result.final_response(), "succeeded on call 3");
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn exhausted_attempts_carry_the_classified_error() {
    let provider = Arc::new(FlakyProvider::new(2));
    let engine = AgentEngine::new(Arc::clone(&provider));

    let err = governed(engine, AgentConfig::new("gpt-4o-mini"), &fast_retry(2), Duration::from_secs(5))
        .await
        .expect_err("only two attempts allowed");

    assert_eq!(err.attempts(), Some(2));
    match err {
        GovernorError::RetriesExhausted { last_error, .. } => assert!(last_error.is_retryable()),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn turn_limit_is_returned_not_retried() {
    let provider = Arc::new(ScriptedProvider::new(
        (0..5).map(|i| {
            Ok(ModelResponse::tool_calls(vec![ToolCallRequest::new(
                format!("c{i}"),
                "missing",
                json!({}),
            )]))
        }),
    ));
    let engine = AgentEngine::new(Arc::clone(&provider));
    let config = AgentConfig::new("gpt-4o-mini").with_max_turns(2);

    let result = governed(engine, config, &fast_retry(3), Duration::from_secs(5))
        .await
        .expect("non-retryable failures are assertable results");

    assert!(!result.success());
    assert_eq!(result.state(), RunState::TurnLimitExceeded);
    assert_eq!(provider.requests().len(), 2);
}

#[tokio::test]
async fn deadline_cancels_a_hung_provider_and_leaves_the_server_usable() {
    let server = Arc::new(McpServerProcess::new(stub_server("steady", &[])));
    server.start().await.expect("start");

    let engine = AgentEngine::new(Arc::new(HangingProvider));
    let config = AgentConfig::new("gpt-4o-mini").with_server(server.clone());

    let started = Instant::now();
    let err = governed(engine, config, &fast_retry(3), Duration::from_millis(100))
        .await
        .expect_err("provider never answers");
    let elapsed = started.elapsed();

    assert!(err.is_timeout());
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_millis(600), "timed out late: {elapsed:?}");

    let echoed = server
        .call_tool("echo", json!({ "text": "no restart needed" }))
        .await
        .expect("server usable after cancellation");
    assert_eq!(echoed, "no restart needed");
    server.stop().await;
}

#[tokio::test]
async fn deadline_cancels_a_hung_tool_call() {
    let server = Arc::new(McpServerProcess::new(stub_server("steady", &[])));
    server.start().await.expect("start");
    let pid = server.pid();

    let provider = Arc::new(ScriptedProvider::new([Ok(ModelResponse::tool_calls(vec![
        ToolCallRequest::new("c1", "slow", json!({ "ms": 5000 })),
    ]))]));
    let engine = AgentEngine::new(provider);
    let config = AgentConfig::new("gpt-4o-mini").with_server(server.clone());

    let err = governed(engine, config, &RetryConfig::no_retry(), Duration::from_millis(200))
        .await
        .expect_err("tool call outlives the deadline");
    match err {
        GovernorError::Timeout(timeout) => assert_eq!(timeout.deadline, Duration::from_millis(200)),
        other => panic!("unexpected error: {other}"),
    }

    assert!(server.is_running());
    assert_eq!(server.pid(), pid);
    let sum = server
        .call_tool("add", json!({ "a": 1, "b": 1 }))
        .await
        .expect("server usable after cancellation");
    assert_eq!(sum, "2");
    server.stop().await;
}

#[tokio::test]
async fn per_attempt_timeout_is_retried_until_attempts_run_out() {
    let engine = AgentEngine::new(Arc::new(HangingProvider));
    let retry = fast_retry(2).with_attempt_timeout(Duration::from_millis(50));

    let err = governed(engine, AgentConfig::new("gpt-4o-mini"), &retry, Duration::from_secs(5))
        .await
        .expect_err("every attempt hangs");

    match err {
        GovernorError::RetriesExhausted { attempts, last_error } => {
            assert_eq!(attempts, 2);
            assert_eq!(last_error, RunError::AttemptTimeout { after_ms: 50 });
        }
        other => panic!("unexpected error: {other}"),
    }
}
