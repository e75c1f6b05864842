//! Model traits

use super::types::{ModelError, ModelRequest, ModelResponse};
use async_trait::async_trait;

/// Language-model seam used by the engine and the clarification judge.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Complete one turn: given the history and tool catalog, return text
    /// and/or tool-call requests.
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, ModelError>;
}

/// Trait for individual backend clients
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Get the client ID
    fn id(&self) -> &str;

    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, ModelError>;
}

#[async_trait]
impl<T: ModelProvider + ?Sized> ModelProvider for std::sync::Arc<T> {
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        (**self).complete(request).await
    }
}
