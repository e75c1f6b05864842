use aitest_core::{AgentResult, ChatMessage, GovernorError};
use std::future::Future;
use tracing::info;

use crate::error::SessionError;
use crate::store::SessionStore;

/// Output of a run that may carry an [`AgentResult`] to record.
pub trait SessionOutcome {
    fn agent_result(&self) -> Option<&AgentResult>;
}

impl SessionOutcome for AgentResult {
    fn agent_result(&self) -> Option<&AgentResult> {
        Some(self)
    }
}

impl SessionOutcome for Result<AgentResult, GovernorError> {
    fn agent_result(&self) -> Option<&AgentResult> {
        self.as_ref().ok()
    }
}

/// Run `run` with the session's prior messages and record what it added.
///
/// The store is updated before the outcome is handed back, so assertions the
/// caller makes on it can no longer lose the session's context. Failed runs
/// are recorded too; governor errors carry no result and record nothing.
pub async fn run_in_session<F, Fut, O>(
    store: &SessionStore,
    session_id: &str,
    run: F,
) -> Result<O, SessionError>
where
    F: FnOnce(Vec<ChatMessage>) -> Fut,
    Fut: Future<Output = O>,
    O: SessionOutcome,
{
    if session_id.trim().is_empty() {
        return Err(SessionError::EmptyId);
    }
    let prior = store.get(session_id);
    let prior_count = prior.len();
    let outcome = run(prior).await;
    if let Some(result) = outcome.agent_result() {
        let total = store.append(session_id, result.new_messages())?;
        info!(
            session_id,
            prior_messages = prior_count,
            total_messages = total,
            success = result.success(),
            "session run recorded"
        );
    }
    Ok(outcome)
}
