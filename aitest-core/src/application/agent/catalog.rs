use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::types::ToolDescriptor;
use crate::tooling::ToolServerInterface;

/// Flattened tool catalog for one run, each tool bound to its owning server.
pub(crate) struct ToolCatalog {
    entries: Vec<(ToolDescriptor, Arc<dyn ToolServerInterface>)>,
}

impl ToolCatalog {
    /// Collect tools from `servers` in order. The first server exposing a
    /// name owns it; `allowed` restricts the result when present.
    pub(crate) async fn build(
        servers: &[Arc<dyn ToolServerInterface>],
        allowed: Option<&[String]>,
    ) -> Self {
        let mut entries: Vec<(ToolDescriptor, Arc<dyn ToolServerInterface>)> = Vec::new();
        for server in servers {
            for tool in server.tools().await {
                if allowed.is_some_and(|allowed| !allowed.contains(&tool.name)) {
                    continue;
                }
                if let Some((_, owner)) = entries.iter().find(|(known, _)| known.name == tool.name) {
                    warn!(
                        tool = %tool.name,
                        kept = owner.name(),
                        ignored = server.name(),
                        "duplicate tool name across servers; keeping the first"
                    );
                    continue;
                }
                entries.push((tool, Arc::clone(server)));
            }
        }

        if let Some(allowed) = allowed {
            for name in allowed {
                if !entries.iter().any(|(tool, _)| &tool.name == name) {
                    warn!(tool = %name, "allowed tool is not exposed by any server");
                }
            }
        }
        debug!(tools = entries.len(), "tool catalog assembled");
        Self { entries }
    }

    pub(crate) fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.entries.iter().map(|(tool, _)| tool.clone()).collect()
    }

    pub(crate) fn owner(&self, tool: &str) -> Option<&Arc<dyn ToolServerInterface>> {
        self.entries
            .iter()
            .find(|(descriptor, _)| descriptor.name == tool)
            .map(|(_, server)| server)
    }
}
