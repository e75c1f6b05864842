//! Model infrastructure module
//!
//! # Structure
//! - `types` - Request, Response, and Error types
//! - `traits` - ModelProvider and ModelClient traits
//! - `adapter` - OpenAI message and tool format adapters
//! - `credentials` - explicitly installed credential store
//! - `factory` - model-id resolution to backend clients
//! - `clients` - HTTP client implementations
//! - `provider` - DynamicModelProvider for routing

pub mod adapter;
#[cfg(feature = "http-providers")]
pub mod clients;
pub mod credentials;
#[cfg(feature = "http-providers")]
pub mod factory;
#[cfg(feature = "http-providers")]
pub mod provider;
pub mod traits;
pub mod types;

pub use credentials::CredentialProvider;
#[cfg(feature = "http-providers")]
pub use provider::DynamicModelProvider;
pub use traits::{ModelClient, ModelProvider};
pub use types::{
    ModelError, ModelRequest, ModelResponse, ModelSettings, display_model_name, split_model_id,
};
