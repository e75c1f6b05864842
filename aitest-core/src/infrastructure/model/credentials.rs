//! Process-wide provider credentials.
//!
//! Nothing is read implicitly: a [`CredentialProvider`] must be installed
//! with [`install`] before HTTP providers resolve endpoints or keys, and
//! [`teardown`] drops it again so tests do not leak credentials into each
//! other.

use super::types::ModelError;
use crate::config::ensure_env_loaded;
use once_cell::sync::Lazy;
use std::env;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::debug;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-10-21";

static CURRENT: Lazy<RwLock<Option<Arc<CredentialProvider>>>> = Lazy::new(|| RwLock::new(None));

#[derive(Clone, Default)]
pub struct CredentialProvider {
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub azure_api_key: Option<String>,
    pub azure_endpoint: Option<String>,
    pub azure_api_version: Option<String>,
    pub ollama_host: Option<String>,
}

impl CredentialProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the environment (after loading `.env`).
    pub fn from_env() -> Self {
        ensure_env_loaded();
        let var = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| env::var(name).ok().filter(|value| !value.trim().is_empty()))
        };
        Self {
            openai_api_key: var(&["OPENAI_API_KEY"]),
            openai_base_url: var(&["OPENAI_BASE_URL", "OPENAI_API_BASE"]),
            azure_api_key: var(&["AZURE_API_KEY", "AZURE_OPENAI_API_KEY"]),
            azure_endpoint: var(&["AZURE_API_BASE", "AZURE_OPENAI_ENDPOINT"]),
            azure_api_version: var(&["AZURE_API_VERSION", "OPENAI_API_VERSION"]),
            ollama_host: var(&["OLLAMA_HOST", "OLLAMA_API_BASE"]),
        }
    }

    pub fn with_openai_key(mut self, key: impl Into<String>) -> Self {
        self.openai_api_key = Some(key.into());
        self
    }

    pub fn with_openai_base_url(mut self, url: impl Into<String>) -> Self {
        self.openai_base_url = Some(url.into());
        self
    }

    pub fn with_azure(mut self, endpoint: impl Into<String>, key: impl Into<String>) -> Self {
        self.azure_endpoint = Some(endpoint.into());
        self.azure_api_key = Some(key.into());
        self
    }

    pub fn with_azure_api_version(mut self, version: impl Into<String>) -> Self {
        self.azure_api_version = Some(version.into());
        self
    }

    pub fn with_ollama_host(mut self, host: impl Into<String>) -> Self {
        self.ollama_host = Some(host.into());
        self
    }
}

impl fmt::Debug for CredentialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |value: &Option<String>| value.as_ref().map(|_| "<redacted>");
        f.debug_struct("CredentialProvider")
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("openai_base_url", &self.openai_base_url)
            .field("azure_api_key", &redact(&self.azure_api_key))
            .field("azure_endpoint", &self.azure_endpoint)
            .field("azure_api_version", &self.azure_api_version)
            .field("ollama_host", &self.ollama_host)
            .finish()
    }
}

/// Install `provider` as the process-wide credential source, replacing any
/// previous one.
pub fn install(provider: CredentialProvider) -> Arc<CredentialProvider> {
    let provider = Arc::new(provider);
    *CURRENT.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Arc::clone(&provider));
    debug!(credentials = ?provider, "Installed provider credentials");
    provider
}

pub fn current() -> Result<Arc<CredentialProvider>, ModelError> {
    CURRENT
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
        .ok_or(ModelError::CredentialsNotInitialized)
}

pub fn is_installed() -> bool {
    current().is_ok()
}

/// Drop the installed credentials. Safe to call when none are installed.
pub fn teardown() {
    CURRENT
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take();
}
