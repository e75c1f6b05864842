use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to spawn MCP server '{server}': {source}")]
    Spawn {
        server: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to connect to MCP server '{server}': {message}")]
    Connect { server: String, message: String },
    #[error("MCP server '{server}' I/O error: {message}")]
    Io { server: String, message: String },
    #[error("MCP server '{server}' HTTP error: {source}")]
    Http {
        server: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("MCP server '{server}' returned invalid JSON: {source}")]
    InvalidJson {
        server: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("MCP server '{server}' returned JSON-RPC error {code}: {message}")]
    Rpc {
        server: String,
        code: i64,
        message: String,
    },
    #[error("MCP server '{server}' terminated unexpectedly")]
    Terminated { server: String },
    #[error("connection to MCP server '{server}' is closed")]
    Closed { server: String },
    #[error("MCP server '{server}' did not answer '{method}' within {after:?}")]
    Timeout {
        server: String,
        method: String,
        after: Duration,
    },
    #[error("MCP server '{server}' protocol violation: {message}")]
    Protocol { server: String, message: String },
}

impl TransportError {
    pub fn server(&self) -> &str {
        match self {
            TransportError::Spawn { server, .. }
            | TransportError::Connect { server, .. }
            | TransportError::Io { server, .. }
            | TransportError::Http { server, .. }
            | TransportError::InvalidJson { server, .. }
            | TransportError::Rpc { server, .. }
            | TransportError::Terminated { server }
            | TransportError::Closed { server }
            | TransportError::Timeout { server, .. }
            | TransportError::Protocol { server, .. } => server,
        }
    }

    /// The peer is gone; further requests cannot succeed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransportError::Terminated { .. } | TransportError::Closed { .. }
        )
    }
}
