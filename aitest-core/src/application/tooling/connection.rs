//! Protocol client on top of a [`Transport`]: handshake, discovery and calls.

use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

use super::error::{ServerStartError, ToolCallError};
use crate::config::{ServerConfig, TransportKind};
use crate::constants::{CLIENT_NAME, PROTOCOL_VERSION};
use crate::domain::types::ToolDescriptor;
use crate::rpc::METHOD_NOT_FOUND;
use crate::transport::{self, Transport, TransportError};

#[derive(Debug, Deserialize)]
struct ToolsPage {
    #[serde(default)]
    tools: Vec<ToolDescriptor>,
    #[serde(rename = "nextCursor", default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CallToolResult {
    #[serde(default)]
    content: Vec<Value>,
    #[serde(rename = "isError", default)]
    is_error: bool,
    #[serde(rename = "structuredContent", default)]
    structured_content: Option<Value>,
}

pub(crate) struct McpConnection {
    server: String,
    transport: Box<dyn Transport>,
    call_timeout: Duration,
    instructions: Option<String>,
}

impl McpConnection {
    /// Connect and complete the `initialize` handshake.
    pub(crate) async fn open(config: &ServerConfig) -> Result<Self, ServerStartError> {
        let transport = transport::connect(config).await?;
        let mut connection = Self {
            server: config.name.clone(),
            transport,
            call_timeout: config.call_timeout,
            instructions: None,
        };
        if let Err(err) = connection.initialize().await {
            connection.close().await;
            return Err(err);
        }
        Ok(connection)
    }

    async fn initialize(&mut self) -> Result<(), ServerStartError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": {
                "name": CLIENT_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": {}
        });
        let result = self
            .send("initialize", params)
            .await
            .map_err(ServerStartError::from_handshake)?;

        let negotiated = result
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or(PROTOCOL_VERSION);
        let server_name = result
            .pointer("/serverInfo/name")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        info!(
            server = %self.server,
            transport = self.transport.kind().as_str(),
            protocol = negotiated,
            server_info = server_name,
            "MCP handshake complete"
        );
        self.instructions = result
            .get("instructions")
            .and_then(Value::as_str)
            .map(str::to_string);

        self.transport
            .notify("notifications/initialized", json!({}))
            .await
            .map_err(ServerStartError::from_handshake)
    }

    pub(crate) fn kind(&self) -> TransportKind {
        self.transport.kind()
    }

    pub(crate) fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }

    pub(crate) fn process_id(&self) -> Option<u32> {
        self.transport.process_id()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.transport.is_closed()
    }

    /// One request bounded by the per-call timeout. Dropping the returned
    /// future abandons the request without disturbing the channel.
    pub(crate) async fn send(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        match timeout(self.call_timeout, self.transport.request(method, params)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                server: self.server.clone(),
                method: method.to_string(),
                after: self.call_timeout,
            }),
        }
    }

    /// Every tool the server exposes, following `nextCursor` pages.
    ///
    /// Servers that do not implement `tools/list` expose no tools.
    pub(crate) async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, TransportError> {
        let mut tools: Vec<ToolDescriptor> = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = match &cursor {
                Some(cursor) => json!({ "cursor": cursor }),
                None => json!({}),
            };
            let page = match self.send("tools/list", params).await {
                Ok(page) => page,
                Err(TransportError::Rpc { code, .. }) if code == METHOD_NOT_FOUND => {
                    debug!(server = %self.server, "server does not implement tools/list");
                    return Ok(Vec::new());
                }
                Err(err) => return Err(err),
            };
            let page: ToolsPage =
                serde_json::from_value(page).map_err(|source| TransportError::InvalidJson {
                    server: self.server.clone(),
                    source,
                })?;

            for tool in page.tools {
                if tools.iter().any(|known| known.name == tool.name) {
                    debug!(server = %self.server, tool = %tool.name, "ignoring duplicate tool");
                    continue;
                }
                tools.push(tool.with_server(self.server.clone()));
            }

            match page.next_cursor {
                Some(next) if !next.is_empty() && cursor.as_deref() != Some(next.as_str()) => {
                    cursor = Some(next)
                }
                _ => break,
            }
        }
        Ok(tools)
    }

    /// Issue `tools/call` and render the result as text.
    pub(crate) async fn call_tool(&self, tool: &str, arguments: Value) -> Result<String, ToolCallError> {
        let params = json!({ "name": tool, "arguments": arguments });
        let result = self
            .send("tools/call", params)
            .await
            .map_err(|err| ToolCallError::in_call(tool, err))?;
        let result: CallToolResult =
            serde_json::from_value(result).map_err(|source| TransportError::InvalidJson {
                server: self.server.clone(),
                source,
            })?;

        let text = render_content(&result);
        if result.is_error {
            return Err(ToolCallError::Reported {
                tool: tool.to_string(),
                message: if text.is_empty() {
                    format!("tool '{tool}' reported an error")
                } else {
                    text
                },
            });
        }
        Ok(text)
    }

    pub(crate) async fn close(&self) {
        self.transport.close().await;
    }
}

/// Text blocks verbatim, anything else as compact JSON, one block per line.
fn render_content(result: &CallToolResult) -> String {
    if result.content.is_empty() {
        return result
            .structured_content
            .as_ref()
            .map(Value::to_string)
            .unwrap_or_default();
    }
    result
        .content
        .iter()
        .map(|block| match block.get("type").and_then(Value::as_str) {
            Some("text") => block
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            _ => block.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
