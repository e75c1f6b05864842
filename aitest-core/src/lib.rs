//! # aitest-core
//!
//! Execution runtime for exercising LLM agents against MCP tool servers.
//!
//! The crate is layered the same way from the bottom up:
//!
//! - [`infrastructure::transport`] - JSON-RPC over stdio, SSE and streamable HTTP
//! - [`tooling`] - server supervision, readiness policies and tool dispatch
//! - [`agent`] - the bounded multi-turn engine producing an [`AgentResult`]
//! - [`governor`] - wall-clock deadline and classified retries around a run
//!
//! Sessions that stitch several runs together live in the `aitest-session` crate.

pub mod application;
pub mod config;
pub mod constants;
pub mod domain;
pub mod infrastructure;

pub use application::agent::{AgentConfig, AgentEngine};
pub use application::governor::{EngineTimeoutError, GovernorError, execute};
pub use application::tooling::{
    McpServerProcess, ServerGroup, ServerStartError, ToolCallError, ToolServerInterface,
};
pub use application::{agent, governor, tooling};
pub use config::{ConfigError, HarnessConfig, ReadinessPolicy, RetryConfig, ServerConfig};
pub use domain::result::{AgentResult, RunError, RunState};
pub use domain::types::{
    ChatMessage, ConversationTurn, MessageRole, TokenUsage, ToolCallRecord, ToolCallRequest,
    ToolDescriptor, ToolOutcome,
};
pub use domain::{skill, types};
pub use infrastructure::{model, rpc, transport};

use tracing_subscriber::{EnvFilter, fmt};

/// Install the process-wide `fmt` subscriber.
///
/// Honours `RUST_LOG` and falls back to `info`. Safe to call from every test;
/// only the first call has an effect.
pub fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_level(true)
            .try_init();
    });
}

/// Collapse whitespace and cut `text` to a single-line log snippet.
pub fn summarise(text: &str) -> String {
    const SNIPPET_LIMIT: usize = 160;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return "(empty)".to_string();
    }
    let single_line = trimmed.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut result = String::new();
    let mut chars = single_line.chars();
    for _ in 0..SNIPPET_LIMIT {
        if let Some(ch) = chars.next() {
            result.push(ch);
        } else {
            return result;
        }
    }
    if chars.next().is_some() {
        result.push('…');
    }
    result
}
