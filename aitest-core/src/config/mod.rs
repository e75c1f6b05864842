//! Harness configuration: servers, agents, retry policy and run settings.

mod agent;
mod error;
mod loader;
mod retry;
mod server;

pub use agent::{AgentProfile, ModelPricing};
pub use error::ConfigError;
pub use loader::{HarnessConfig, RunSettings, ensure_env_loaded};
pub use retry::{RetryConfig, RetryPredicate};
pub use server::{ReadinessPolicy, ServerConfig, ServerEndpoint, TransportKind};
