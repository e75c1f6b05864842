use crate::transport::TransportError;
use std::time::Duration;
use thiserror::Error;

/// Why a server could not be brought up. Fatal to that server.
#[derive(Debug, Error)]
pub enum ServerStartError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("MCP server '{server}' rejected the initialize handshake: {reason}")]
    Handshake { server: String, reason: String },
    #[error("MCP server '{server}' exited before becoming ready")]
    Exited { server: String },
    #[error("MCP server '{server}' failed to list its tools: {reason}")]
    Discovery { server: String, reason: String },
    #[error(
        "MCP server '{server}' was not ready after {waited:?}{}",
        missing_suffix(.missing)
    )]
    ReadinessTimeout {
        server: String,
        waited: Duration,
        missing: Vec<String>,
    },
}

fn missing_suffix(missing: &[String]) -> String {
    if missing.is_empty() {
        String::new()
    } else {
        format!("; missing tools: {}", missing.join(", "))
    }
}

impl ServerStartError {
    pub fn server(&self) -> &str {
        match self {
            ServerStartError::Transport(source) => source.server(),
            ServerStartError::Handshake { server, .. }
            | ServerStartError::Exited { server }
            | ServerStartError::Discovery { server, .. }
            | ServerStartError::ReadinessTimeout { server, .. } => server,
        }
    }

    /// Classify a failure raised while the handshake was in flight.
    pub(crate) fn from_handshake(error: TransportError) -> Self {
        match error {
            TransportError::Terminated { server } | TransportError::Closed { server } => {
                ServerStartError::Exited { server }
            }
            TransportError::Rpc { .. }
            | TransportError::Protocol { .. }
            | TransportError::InvalidJson { .. }
            | TransportError::Timeout { .. } => ServerStartError::Handshake {
                server: error.server().to_string(),
                reason: error.to_string(),
            },
            other => ServerStartError::Transport(other),
        }
    }
}

/// A tool call that did not produce a result. Recoverable: the engine
/// records it and feeds it back to the model.
#[derive(Debug, Error)]
pub enum ToolCallError {
    #[error("MCP server '{server}' is not running")]
    NotRunning { server: String },
    #[error(
        "tool '{tool}' is not exposed by server '{server}' (available: {})",
        .available.join(", ")
    )]
    UnknownTool {
        server: String,
        tool: String,
        available: Vec<String>,
    },
    #[error("tool '{tool}' is not available to this agent")]
    NotInCatalog { tool: String },
    #[error("invalid arguments for tool '{tool}': {}", .reasons.join("; "))]
    InvalidArguments { tool: String, reasons: Vec<String> },
    #[error("tool '{tool}' on server '{server}' timed out after {after:?}")]
    Timeout {
        server: String,
        tool: String,
        after: Duration,
    },
    #[error("MCP server '{server}' exited while running tool '{tool}'")]
    ServerExited { server: String, tool: String },
    #[error("{message}")]
    Reported { tool: String, message: String },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("tool '{tool}' could not be executed: {message}")]
    Execution { tool: String, message: String },
}

impl ToolCallError {
    /// Map a transport failure observed while `tool` was in flight.
    pub(crate) fn in_call(tool: &str, error: TransportError) -> Self {
        match error {
            TransportError::Timeout { server, after, .. } => ToolCallError::Timeout {
                server,
                tool: tool.to_string(),
                after,
            },
            TransportError::Terminated { server } => ToolCallError::ServerExited {
                server,
                tool: tool.to_string(),
            },
            TransportError::Closed { server } => ToolCallError::NotRunning { server },
            other => ToolCallError::Transport(other),
        }
    }
}
