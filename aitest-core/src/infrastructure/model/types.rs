//! Model types - Request, Response, and Error types

use crate::domain::result::RunError;
use crate::domain::types::{ChatMessage, TokenUsage, ToolCallRequest, ToolDescriptor};
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_PROVIDER: &str = "openai";

/// Split `provider/model` into its parts. Bare ids belong to OpenAI.
pub fn split_model_id(model_id: &str) -> (&str, &str) {
    match model_id.split_once('/') {
        Some((provider, model)) if !provider.is_empty() && !model.is_empty() => (provider, model),
        _ => (DEFAULT_PROVIDER, model_id),
    }
}

/// Model name without its provider prefix, for display.
pub fn display_model_name(model_id: &str) -> &str {
    split_model_id(model_id).1
}

/// Sampling knobs forwarded to the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ModelSettings {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// One completion request: full message history plus the tool catalog.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    /// Opaque model identifier, e.g. `azure/gpt-4o` or `ollama/llama3`.
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDescriptor>,
    pub settings: ModelSettings,
}

impl ModelRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: Vec::new(),
            settings: ModelSettings::default(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDescriptor>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_settings(mut self, settings: ModelSettings) -> Self {
        self.settings = settings;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCallRequest>,
    pub usage: TokenUsage,
    /// Cost reported by the provider, when it reports one.
    pub cost_usd: Option<f64>,
}

impl ModelResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            text: content.into(),
            ..Self::default()
        }
    }

    pub fn tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::default()
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }

    pub fn wants_tools(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Model errors
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("provider '{provider}' is not supported")]
    ProviderNotFound { provider: String },
    #[error("provider '{provider}' requires {variable} to be set")]
    MissingCredential { provider: String, variable: String },
    #[error("credentials have not been installed; call credentials::install first")]
    CredentialsNotInitialized,
    #[error("provider '{provider}' rate limited the request")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },
    #[error("provider '{provider}' returned HTTP {status}: {body}")]
    Http {
        provider: String,
        status: u16,
        body: String,
    },
    #[error("network error calling provider '{provider}': {source}")]
    Network {
        provider: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("provider '{provider}' returned invalid response: {reason}")]
    InvalidResponse { provider: String, reason: String },
    #[error("provider '{provider}' did not answer within {after:?}")]
    Timeout { provider: String, after: Duration },
}

impl ModelError {
    pub fn provider_not_found(provider: impl Into<String>) -> Self {
        Self::ProviderNotFound {
            provider: provider.into(),
        }
    }

    pub fn missing_credential(provider: impl Into<String>, variable: impl Into<String>) -> Self {
        Self::MissingCredential {
            provider: provider.into(),
            variable: variable.into(),
        }
    }

    pub fn rate_limited(provider: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::RateLimited {
            provider: provider.into(),
            retry_after,
        }
    }

    pub fn http(provider: impl Into<String>, status: StatusCode, body: impl Into<String>) -> Self {
        Self::Http {
            provider: provider.into(),
            status: status.as_u16(),
            body: body.into(),
        }
    }

    pub fn network(provider: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            provider: provider.into(),
            source,
        }
    }

    pub fn invalid_response(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    pub fn provider(&self) -> &str {
        match self {
            ModelError::ProviderNotFound { provider }
            | ModelError::MissingCredential { provider, .. }
            | ModelError::RateLimited { provider, .. }
            | ModelError::Http { provider, .. }
            | ModelError::Network { provider, .. }
            | ModelError::InvalidResponse { provider, .. }
            | ModelError::Timeout { provider, .. } => provider,
            ModelError::CredentialsNotInitialized => "credentials",
        }
    }

    /// Rate limits, server-side failures and transport hiccups are worth
    /// another attempt; configuration and decoding problems are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ModelError::RateLimited { .. } | ModelError::Timeout { .. } => true,
            ModelError::Http { status, .. } => *status == 408 || *status >= 500,
            ModelError::Network { source, .. } => {
                source.is_connect()
                    || source.is_timeout()
                    || source.is_request()
                    || source
                        .status()
                        .is_some_and(|status| status.is_server_error())
            }
            ModelError::ProviderNotFound { .. }
            | ModelError::MissingCredential { .. }
            | ModelError::CredentialsNotInitialized
            | ModelError::InvalidResponse { .. } => false,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ModelError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<&ModelError> for RunError {
    fn from(error: &ModelError) -> Self {
        RunError::Provider {
            provider: error.provider().to_string(),
            message: error.to_string(),
            retryable: error.is_retryable(),
            retry_after_ms: error.retry_after().map(|after| after.as_millis() as u64),
        }
    }
}
