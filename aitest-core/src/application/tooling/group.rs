use futures::FutureExt;
use futures::future::join_all;
use std::future::Future;
use std::panic::{AssertUnwindSafe, resume_unwind};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{info, warn};

use super::error::ServerStartError;
use super::interface::ToolServerInterface;
use super::process::McpServerProcess;
use crate::config::ServerConfig;

/// The servers one test scope starts together and stops together.
pub struct ServerGroup {
    servers: Vec<Arc<McpServerProcess>>,
}

impl ServerGroup {
    pub fn new<I>(configs: I) -> Self
    where
        I: IntoIterator<Item = ServerConfig>,
    {
        Self {
            servers: configs
                .into_iter()
                .map(|config| Arc::new(McpServerProcess::new(config)))
                .collect(),
        }
    }

    pub fn servers(&self) -> &[Arc<McpServerProcess>] {
        &self.servers
    }

    pub fn get(&self, name: &str) -> Option<&Arc<McpServerProcess>> {
        self.servers
            .iter()
            .find(|server| server.config().name == name)
    }

    /// Handles suitable for an agent's tool sources, in configuration order.
    pub fn tool_sources(&self) -> Vec<Arc<dyn ToolServerInterface>> {
        self.servers
            .iter()
            .map(|server| Arc::clone(server) as Arc<dyn ToolServerInterface>)
            .collect()
    }

    /// Start every server concurrently. If any fails, all are stopped and
    /// the first failure in configuration order is returned.
    pub async fn start_all(&self) -> Result<(), ServerStartError> {
        info!(servers = self.servers.len(), "starting MCP servers");
        let results = join_all(self.servers.iter().map(|server| server.start())).await;
        if let Some(err) = results.into_iter().find_map(Result::err) {
            self.stop_all().await;
            return Err(err);
        }
        Ok(())
    }

    pub async fn stop_all(&self) {
        join_all(self.servers.iter().map(|server| server.stop())).await;
    }

    /// Start the group, run `body`, and stop the group on every exit path,
    /// including a panic inside `body`. If the returned future is dropped
    /// before it completes, the stop is spawned on the current runtime.
    pub async fn run_scoped<F, Fut, T>(self, body: F) -> Result<T, ServerStartError>
    where
        F: FnOnce(Arc<ServerGroup>) -> Fut,
        Fut: Future<Output = T>,
    {
        let group = Arc::new(self);
        let mut guard = StopOnDrop(Some(Arc::clone(&group)));
        if let Err(err) = group.start_all().await {
            guard.disarm();
            return Err(err);
        }
        let outcome = AssertUnwindSafe(body(Arc::clone(&group)))
            .catch_unwind()
            .await;
        group.stop_all().await;
        guard.disarm();
        match outcome {
            Ok(value) => Ok(value),
            Err(panic) => resume_unwind(panic),
        }
    }
}

/// Stops a scoped group whose future was cancelled mid-body.
struct StopOnDrop(Option<Arc<ServerGroup>>);

impl StopOnDrop {
    fn disarm(&mut self) {
        self.0 = None;
    }
}

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        let Some(group) = self.0.take() else {
            return;
        };
        match Handle::try_current() {
            Ok(runtime) => {
                warn!(servers = group.servers.len(), "scoped run cancelled; stopping MCP servers");
                runtime.spawn(async move { group.stop_all().await });
            }
            Err(_) => {
                warn!("scoped run cancelled outside a runtime; servers are killed on drop");
            }
        }
    }
}
