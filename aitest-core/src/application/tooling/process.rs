use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use super::connection::McpConnection;
use super::error::{ServerStartError, ToolCallError};
use super::interface::ToolServerInterface;
use super::readiness;
use super::schema::{normalise_arguments, validate_arguments};
use crate::config::ServerConfig;
use crate::domain::types::ToolDescriptor;

/// A live, ready server: the handshaken connection and its tool catalog.
struct RunningServer {
    connection: McpConnection,
    tools: RwLock<Vec<ToolDescriptor>>,
}

impl RunningServer {
    fn tools(&self) -> Vec<ToolDescriptor> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn find(&self, tool: &str) -> Option<ToolDescriptor> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|descriptor| descriptor.name == tool)
            .cloned()
    }

    fn replace_tools(&self, tools: Vec<ToolDescriptor>) {
        *self.tools.write().unwrap_or_else(PoisonError::into_inner) = tools;
    }
}

/// Supervisor for one configured MCP server.
///
/// `start()` brings the server up and blocks on its readiness policy,
/// `call_tool()` dispatches through the live connection and `stop()` tears
/// everything down. At most one running instance exists at a time; `stop()`
/// is idempotent and must be called on every exit path.
pub struct McpServerProcess {
    config: ServerConfig,
    lifecycle: AsyncMutex<()>,
    state: RwLock<Option<Arc<RunningServer>>>,
}

impl McpServerProcess {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            lifecycle: AsyncMutex::new(()),
            state: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn running(&self) -> Option<Arc<RunningServer>> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Connect, handshake, discover tools and wait for readiness.
    ///
    /// The whole sequence shares one deadline of `startup_timeout`. Calling
    /// `start()` on a running server is a no-op.
    pub async fn start(&self) -> Result<(), ServerStartError> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.running().is_some() {
            debug!(server = %self.config.name, "MCP server already running");
            return Ok(());
        }

        let server = self.config.name.as_str();
        let started = Instant::now();
        let deadline = started + self.config.startup_timeout;
        info!(
            server,
            transport = self.config.transport().as_str(),
            readiness = ?self.config.readiness,
            "starting MCP server"
        );

        let connection = match timeout_at(deadline, McpConnection::open(&self.config)).await {
            Ok(Ok(connection)) => connection,
            Ok(Err(err)) => {
                warn!(server, error = %err, "MCP server failed to start");
                return Err(err);
            }
            Err(_) => {
                warn!(server, "MCP server did not complete the handshake in time");
                return Err(ServerStartError::ReadinessTimeout {
                    server: server.to_string(),
                    waited: self.config.startup_timeout,
                    missing: self.config.readiness.required_tools().to_vec(),
                });
            }
        };

        let tools =
            match readiness::wait_until_ready(&connection, &self.config, started, deadline).await {
                Ok(tools) => tools,
                Err(err) => {
                    warn!(server, error = %err, "MCP server failed its readiness policy");
                    connection.close().await;
                    return Err(err);
                }
            };

        info!(
            server,
            transport = connection.kind().as_str(),
            tools = tools.len(),
            pid = ?connection.process_id(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "MCP server ready"
        );
        let running = Arc::new(RunningServer {
            connection,
            tools: RwLock::new(tools),
        });
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Some(running);
        Ok(())
    }

    /// Tear the server down. Safe to call repeatedly, before `start()`, after
    /// the process died on its own, or while a call is still outstanding.
    pub async fn stop(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        let running = self
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match running {
            Some(running) => {
                info!(server = %self.config.name, "stopping MCP server");
                running.connection.close().await;
                debug!(server = %self.config.name, "MCP server stopped");
            }
            None => debug!(server = %self.config.name, "stop requested for idle MCP server"),
        }
    }

    /// Running and the underlying channel still open.
    pub fn is_running(&self) -> bool {
        self.running()
            .is_some_and(|running| !running.connection.is_closed())
    }

    pub fn pid(&self) -> Option<u32> {
        self.running()
            .and_then(|running| running.connection.process_id())
    }

    /// Tool catalog discovered at start or by the last refresh.
    pub fn tools(&self) -> Vec<ToolDescriptor> {
        self.running()
            .map(|running| running.tools())
            .unwrap_or_default()
    }

    /// Guidance the server returned during `initialize`.
    pub fn instructions(&self) -> Option<String> {
        self.running()
            .and_then(|running| running.connection.instructions().map(str::to_string))
    }

    /// Re-list the server's tools and replace the cached catalog.
    pub async fn refresh_tools(&self) -> Result<Vec<ToolDescriptor>, ToolCallError> {
        let running = self.running().ok_or_else(|| ToolCallError::NotRunning {
            server: self.config.name.clone(),
        })?;
        let tools = running.connection.list_tools().await?;
        debug!(server = %self.config.name, tools = tools.len(), "refreshed tool catalog");
        running.replace_tools(tools.clone());
        Ok(tools)
    }

    /// Validate and dispatch one tool call, bounded by `call_timeout`.
    pub async fn call_tool(&self, tool: &str, arguments: Value) -> Result<String, ToolCallError> {
        let server = self.config.name.as_str();
        let running = self.running().ok_or_else(|| ToolCallError::NotRunning {
            server: server.to_string(),
        })?;
        let descriptor = running
            .find(tool)
            .ok_or_else(|| ToolCallError::UnknownTool {
                server: server.to_string(),
                tool: tool.to_string(),
                available: running.tools().into_iter().map(|tool| tool.name).collect(),
            })?;

        let arguments = normalise_arguments(arguments);
        validate_arguments(&descriptor, &arguments)?;

        debug!(server, tool, "dispatching tool call");
        let started = Instant::now();
        let outcome = running.connection.call_tool(tool, arguments).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            Ok(text) => debug!(server, tool, elapsed_ms, chars = text.len(), "tool call finished"),
            Err(err) => warn!(server, tool, elapsed_ms, error = %err, "tool call failed"),
        }
        outcome
    }
}

#[async_trait]
impl ToolServerInterface for McpServerProcess {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn tools(&self) -> Vec<ToolDescriptor> {
        McpServerProcess::tools(self)
    }

    async fn instructions(&self) -> Option<String> {
        McpServerProcess::instructions(self)
    }

    async fn call_tool(&self, tool: &str, arguments: Value) -> Result<String, ToolCallError> {
        McpServerProcess::call_tool(self, tool, arguments).await
    }
}
