//! Dynamic model provider that routes on the model identifier

use async_trait::async_trait;
use reqwest::Client;

use super::credentials::{self, CredentialProvider};
use super::factory::ProviderFactory;
use super::traits::ModelProvider;
use super::types::{ModelError, ModelRequest, ModelResponse};
use std::sync::Arc;

/// Resolves `provider/model` ids to HTTP backends on every request.
///
/// Credentials come from the process-wide store unless pinned with
/// [`DynamicModelProvider::with_credentials`].
#[derive(Default)]
pub struct DynamicModelProvider {
    http: Client,
    pinned: Option<Arc<CredentialProvider>>,
}

impl DynamicModelProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(mut self, credentials: CredentialProvider) -> Self {
        self.pinned = Some(Arc::new(credentials));
        self
    }

    fn credentials(&self) -> Result<Arc<CredentialProvider>, ModelError> {
        match &self.pinned {
            Some(pinned) => Ok(Arc::clone(pinned)),
            None => credentials::current(),
        }
    }
}

#[async_trait]
impl ModelProvider for DynamicModelProvider {
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        let credentials = self.credentials()?;
        let client = ProviderFactory::create(&request.model, &credentials, self.http.clone())?;
        client.complete(request).await
    }
}
