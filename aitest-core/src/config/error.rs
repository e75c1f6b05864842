use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found at {path:?}")]
    NotFound { path: PathBuf },

    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config from {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("server '{server}' uses the stdio transport but has no 'command'")]
    MissingCommand { server: String },

    #[error("server '{server}' uses a network transport but has no 'url'")]
    MissingUrl { server: String },

    #[error("server name '{server}' is declared more than once")]
    DuplicateServer { server: String },

    #[error("agent '{agent}' references unknown server '{server}'")]
    UnknownServer { agent: String, server: String },

    #[error("agent entry is missing required field 'model'")]
    MissingModel,

    #[error("retry policy requires max_attempts >= 1")]
    InvalidRetryAttempts,

    #[error("invalid skill at {path:?}: {reason}")]
    InvalidSkill { path: PathBuf, reason: String },
}
