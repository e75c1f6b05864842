// Session tests - continuing one conversation across independent runs

#[path = "../common/mod.rs"]
mod common;

use aitest_core::model::{ModelError, ModelResponse};
use aitest_core::{AgentConfig, AgentEngine, RetryConfig, ServerGroup, execute};
use aitest_session::{SessionStore, run_in_session};
use common::{ScriptedProvider, stub_server};
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
#[serial]
async fn second_run_sees_context_no_tool_provides() {
    let store = SessionStore::global();
    store.clear();

    let group = ServerGroup::new([stub_server("tools", &["--only", "echo"])]);
    group.start_all().await.expect("start");

    let provider = Arc::new(ScriptedProvider::new([
        Ok(ModelResponse::text("Paris is lovely in spring. Start a travel fund.")),
        Ok(ModelResponse::text("You were saving for your trip.")),
    ]));
    let engine = AgentEngine::new(Arc::clone(&provider));
    let config = AgentConfig::new("gpt-4o-mini")
        .with_system_prompt("You are a budgeting assistant.")
        .with_servers(group.tool_sources());

    let first = run_in_session(store, "savings", |prior| {
        let (engine, config) = (engine.clone(), config.clone());
        async move { engine.run("I'm planning a trip to Paris", &config, &prior).await }
    })
    .await
    .expect("first run");
    assert!(!first.is_session_continuation());

    let second = run_in_session(store, "savings", |prior| {
        let (engine, config) = (engine.clone(), config.clone());
        async move { engine.run("What was I saving for?", &config, &prior).await }
    })
    .await
    .expect("second run");

    assert!(second.is_session_continuation());
    assert_eq!(second.session_context_count(), first.messages().len());

    let seen = provider.requests().pop().expect("second request");
    assert!(seen.messages.iter().any(|m| m.content.contains("Paris")));
    // The system prompt is not repeated when the session already carries it.
    let system_count = seen
        .messages
        .iter()
        .filter(|m| m.role == aitest_core::MessageRole::System)
        .count();
    assert_eq!(system_count, 1);

    assert_eq!(store.len("savings"), first.messages().len() + second.new_messages().len());
    group.stop_all().await;
    store.clear();
}

#[tokio::test]
#[serial]
async fn failed_runs_are_recorded_before_the_caller_sees_them() {
    let store = SessionStore::global();
    store.clear();

    let provider = Arc::new(ScriptedProvider::new([Err(ModelError::invalid_response(
        "openai",
        "no choices",
    ))]));
    let engine = AgentEngine::new(provider);
    let config = AgentConfig::new("gpt-4o-mini");

    let result = run_in_session(store, "broken", |prior| async move {
        engine.run("Remember the code word: tangerine", &config, &prior).await
    })
    .await
    .expect("valid id");

    assert!(!result.success());
    let history = store.get("broken");
    assert_eq!(history.len(), 1);
    assert!(history[0].content.contains("tangerine"));
    store.clear();
}

#[tokio::test]
async fn governed_runs_can_share_a_session() {
    let store = SessionStore::new();
    let provider = Arc::new(ScriptedProvider::new([
        Ok(ModelResponse::text("first")),
        Ok(ModelResponse::text("second")),
    ]));
    let engine = AgentEngine::new(provider);
    let config = AgentConfig::new("gpt-4o-mini");

    for prompt in ["one", "two"] {
        let outcome = run_in_session(&store, "governed", |prior| {
            let (engine, config) = (engine.clone(), config.clone());
            async move {
                execute(
                    || {
                        let (engine, config, prior) = (engine.clone(), config.clone(), prior.clone());
                        async move { engine.run(prompt, &config, &prior).await }
                    },
                    &RetryConfig::no_retry(),
                    Duration::from_secs(5),
                )
                .await
            }
        })
        .await
        .expect("valid id");
        assert!(outcome.is_ok());
    }

    let history = store.get("governed");
    let texts: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(texts, ["one", "first", "two", "second"]);
}

#[tokio::test]
async fn sessions_do_not_leak_into_each_other() {
    let store = SessionStore::new();
    let provider = Arc::new(ScriptedProvider::new([]));
    let engine = AgentEngine::new(Arc::clone(&provider));
    let config = AgentConfig::new("gpt-4o-mini");

    for (session, prompt) in [("alpha", "about alpha"), ("beta", "about beta")] {
        run_in_session(&store, session, |prior| {
            let (engine, config) = (engine.clone(), config.clone());
            async move { engine.run(prompt, &config, &prior).await }
        })
        .await
        .expect("valid id");
    }

    assert!(store.get("alpha").iter().all(|m| !m.content.contains("beta")));
    assert_eq!(store.session_ids(), ["alpha", "beta"]);
}
