//! Provider factory - resolves a model identifier to a backend client

use super::clients::{AuthScheme, HttpClientBase, OpenAiCompatibleClient};
use super::credentials::{
    CredentialProvider, DEFAULT_AZURE_API_VERSION, DEFAULT_OLLAMA_HOST, DEFAULT_OPENAI_BASE_URL,
};
use super::traits::ModelClient;
use super::types::{ModelError, split_model_id};
use reqwest::Client;

/// Factory for creating model clients from a model identifier.
pub struct ProviderFactory;

impl ProviderFactory {
    /// Creates a client for `model_id`.
    ///
    /// Supported prefixes:
    /// - `openai/` (or none) → OpenAI chat completions
    /// - `azure/<deployment>` → Azure OpenAI deployment
    /// - `ollama/` → Ollama's OpenAI-compatible endpoint
    pub fn create(
        model_id: &str,
        credentials: &CredentialProvider,
        http: Client,
    ) -> Result<Box<dyn ModelClient>, ModelError> {
        let (provider, model) = split_model_id(model_id);
        let client = match provider.to_lowercase().as_str() {
            "openai" => {
                let key = credentials
                    .openai_api_key
                    .clone()
                    .ok_or_else(|| ModelError::missing_credential("openai", "OPENAI_API_KEY"))?;
                let endpoint = credentials
                    .openai_base_url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string());
                OpenAiCompatibleClient::new(
                    HttpClientBase::new("openai", endpoint, AuthScheme::Bearer(key), http),
                    "/chat/completions",
                    Some(model.to_string()),
                )
            }
            "azure" => {
                let endpoint = credentials
                    .azure_endpoint
                    .clone()
                    .ok_or_else(|| ModelError::missing_credential("azure", "AZURE_API_BASE"))?;
                let key = credentials
                    .azure_api_key
                    .clone()
                    .ok_or_else(|| ModelError::missing_credential("azure", "AZURE_API_KEY"))?;
                let version = credentials
                    .azure_api_version
                    .as_deref()
                    .unwrap_or(DEFAULT_AZURE_API_VERSION);
                OpenAiCompatibleClient::new(
                    HttpClientBase::new("azure", endpoint, AuthScheme::ApiKeyHeader(key), http),
                    format!("/openai/deployments/{model}/chat/completions?api-version={version}"),
                    None,
                )
            }
            "ollama" => {
                let host = credentials
                    .ollama_host
                    .clone()
                    .unwrap_or_else(|| DEFAULT_OLLAMA_HOST.to_string());
                OpenAiCompatibleClient::new(
                    HttpClientBase::new("ollama", host, AuthScheme::None, http),
                    "/v1/chat/completions",
                    Some(model.to_string()),
                )
            }
            other => return Err(ModelError::provider_not_found(other)),
        };
        Ok(Box::new(client))
    }
}
