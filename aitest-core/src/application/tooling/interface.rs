use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::error::ToolCallError;
use crate::domain::types::ToolDescriptor;

/// Anything the engine can pull tools from and dispatch calls to.
#[async_trait]
pub trait ToolServerInterface: Send + Sync {
    fn name(&self) -> &str;

    /// Currently exposed tools. Empty when the server is not running.
    async fn tools(&self) -> Vec<ToolDescriptor>;

    async fn instructions(&self) -> Option<String> {
        None
    }

    async fn call_tool(&self, tool: &str, arguments: Value) -> Result<String, ToolCallError>;
}

#[async_trait]
impl<T> ToolServerInterface for Arc<T>
where
    T: ToolServerInterface + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn tools(&self) -> Vec<ToolDescriptor> {
        (**self).tools().await
    }

    async fn instructions(&self) -> Option<String> {
        (**self).instructions().await
    }

    async fn call_tool(&self, tool: &str, arguments: Value) -> Result<String, ToolCallError> {
        (**self).call_tool(tool, arguments).await
    }
}
