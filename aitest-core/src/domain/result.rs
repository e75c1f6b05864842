//! The trace produced by one engine invocation.

use super::types::{ChatMessage, ConversationTurn, MessageRole, TokenUsage, ToolCallRecord, ToolDescriptor};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Engine state machine. `Done`, `TurnLimitExceeded` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    AwaitingModel,
    DispatchingTools,
    Done,
    TurnLimitExceeded,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::Done | RunState::TurnLimitExceeded | RunState::Failed
        )
    }
}

/// Why a run did not complete. Cloneable so it can live inside [`AgentResult`].
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunError {
    #[error("provider '{provider}' failed: {message}")]
    Provider {
        provider: String,
        message: String,
        retryable: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry_after_ms: Option<u64>,
    },
    #[error("agent exceeded the maximum of {max_turns} model turns")]
    TurnLimitExceeded { max_turns: u32 },
    #[error("attempt timed out after {after_ms}ms")]
    AttemptTimeout { after_ms: u64 },
}

impl RunError {
    /// Default retry classification: rate limits, transient network failures
    /// and per-attempt timeouts.
    pub fn is_retryable(&self) -> bool {
        match self {
            RunError::Provider { retryable, .. } => *retryable,
            RunError::TurnLimitExceeded { .. } => false,
            RunError::AttemptTimeout { .. } => true,
        }
    }

    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            RunError::Provider { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub(crate) model: String,
    pub(crate) turns: Vec<ConversationTurn>,
    pub(crate) success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<RunError>,
    pub(crate) state: RunState,
    pub(crate) duration_ms: u64,
    pub(crate) token_usage: TokenUsage,
    pub(crate) cost_usd: f64,
    pub(crate) session_context_count: usize,
    pub(crate) prior_message_count: usize,
    pub(crate) messages: Vec<ChatMessage>,
    pub(crate) available_tools: Vec<ToolDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) effective_system_prompt: Option<String>,
    pub(crate) clarification_requested: bool,
}

impl AgentResult {
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn error(&self) -> Option<&RunError> {
        self.error.as_ref()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn token_usage(&self) -> TokenUsage {
        self.token_usage
    }

    pub fn total_tokens(&self) -> u64 {
        self.token_usage.total()
    }

    pub fn cost_usd(&self) -> f64 {
        self.cost_usd
    }

    /// Number of turns that were carried in from a prior session.
    pub fn session_context_count(&self) -> usize {
        self.session_context_count
    }

    pub fn is_session_continuation(&self) -> bool {
        self.session_context_count > 0
    }

    /// Every message the provider saw, including prior session messages.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Messages produced by this run only; what a session should append.
    pub fn new_messages(&self) -> &[ChatMessage] {
        let start = self.prior_message_count.min(self.messages.len());
        &self.messages[start..]
    }

    pub fn available_tools(&self) -> &[ToolDescriptor] {
        &self.available_tools
    }

    pub fn effective_system_prompt(&self) -> Option<&str> {
        self.effective_system_prompt.as_deref()
    }

    /// Whether the clarification judge flagged the final answer as a question
    /// back to the user.
    pub fn clarification_requested(&self) -> bool {
        self.clarification_requested
    }

    /// Last non-empty assistant text.
    pub fn final_response(&self) -> &str {
        self.turns
            .iter()
            .rev()
            .find(|turn| turn.role == MessageRole::Assistant && !turn.content.is_empty())
            .map(|turn| turn.content.as_str())
            .unwrap_or_default()
    }

    pub fn all_responses(&self) -> Vec<&str> {
        self.turns
            .iter()
            .filter(|turn| turn.role == MessageRole::Assistant)
            .map(|turn| turn.content.as_str())
            .collect()
    }

    pub fn all_tool_calls(&self) -> impl Iterator<Item = &ToolCallRecord> {
        self.turns.iter().flat_map(|turn| turn.tool_calls.iter())
    }

    pub fn tool_calls_for<'a, 'n>(
        &'a self,
        name: &'n str,
    ) -> impl Iterator<Item = &'a ToolCallRecord> + use<'a, 'n> {
        self.all_tool_calls().filter(move |call| call.name == name)
    }

    pub fn tool_was_called(&self, name: &str) -> bool {
        self.tool_calls_for(name).next().is_some()
    }

    pub fn tool_call_count(&self, name: &str) -> usize {
        self.tool_calls_for(name).count()
    }

    /// Argument `arg` of the first call to `tool`.
    pub fn tool_call_arg(&self, tool: &str, arg: &str) -> Option<&Value> {
        self.all_tool_calls()
            .find(|call| call.name == tool)
            .and_then(|call| call.arguments.get(arg))
    }
}
