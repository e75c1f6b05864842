//! Wire-level bindings of the tool-invocation protocol.
//!
//! Every binding exposes the same [`Transport`] interface so the supervisor
//! never needs to know how bytes reach the server.

mod error;
mod http;
mod pending;
mod sse;
#[cfg(feature = "native-transport")]
mod stdio;

pub use error::TransportError;
pub use http::StreamableHttpTransport;
pub use sse::SseTransport;
#[cfg(feature = "native-transport")]
pub use stdio::StdioTransport;

use crate::config::{ServerConfig, ServerEndpoint, TransportKind};
use crate::rpc::{RpcError, RpcResponse};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::warn;

/// Request/response channel to one MCP server.
#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Send a request and wait for the correlated response's `result`.
    ///
    /// No timeout is applied here; callers bound the wait themselves and may
    /// drop the future at any point without corrupting the channel.
    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError>;

    async fn notify(&self, method: &str, params: Value) -> Result<(), TransportError>;

    /// Release the channel. Idempotent; outstanding requests fail with
    /// [`TransportError::Closed`].
    async fn close(&self);

    fn is_closed(&self) -> bool;

    /// OS process id when the transport owns a child process.
    fn process_id(&self) -> Option<u32> {
        None
    }
}

/// Open the transport described by `config`.
pub async fn connect(config: &ServerConfig) -> Result<Box<dyn Transport>, TransportError> {
    match &config.endpoint {
        #[cfg(feature = "native-transport")]
        ServerEndpoint::Stdio { .. } => Ok(Box::new(StdioTransport::spawn(config).await?)),
        #[cfg(not(feature = "native-transport"))]
        ServerEndpoint::Stdio { .. } => Err(TransportError::Connect {
            server: config.name.clone(),
            message: "stdio servers require the `native-transport` feature".into(),
        }),
        ServerEndpoint::Sse { .. } => Ok(Box::new(SseTransport::connect(config).await?)),
        ServerEndpoint::StreamableHttp { .. } => {
            Ok(Box::new(StreamableHttpTransport::connect(config)?))
        }
    }
}

pub(crate) fn header_map(
    server: &str,
    headers: &HashMap<String, String>,
) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes()).map_err(|err| TransportError::Connect {
            server: server.to_string(),
            message: format!("invalid header name '{key}': {err}"),
        })?;
        let value = HeaderValue::from_str(value).map_err(|err| TransportError::Connect {
            server: server.to_string(),
            message: format!("invalid value for header '{key}': {err}"),
        })?;
        map.insert(name, value);
    }
    Ok(map)
}

pub(crate) fn rpc_result(
    server: &str,
    outcome: Result<Value, RpcError>,
) -> Result<Value, TransportError> {
    outcome.map_err(|error| TransportError::Rpc {
        server: server.to_string(),
        code: error.code,
        message: error.message,
    })
}

/// Answer a request initiated by the server: `ping` is acknowledged,
/// anything else is reported as unsupported.
pub(crate) fn server_request_reply(server: &str, id: Value, method: &str) -> RpcResponse {
    if method == "ping" {
        RpcResponse::success(Some(id), json!({}))
    } else {
        warn!(server, method, "server sent unsupported request");
        RpcResponse::method_not_found(Some(id), method)
    }
}
