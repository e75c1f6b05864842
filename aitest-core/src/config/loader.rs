use super::agent::AgentProfile;
use super::error::ConfigError;
use super::retry::{RawRetry, RetryConfig};
use super::server::{RawServer, ServerConfig};
use crate::constants::{DEFAULT_RUN_DEADLINE, ENV_PATH};
use dotenvy::from_filename;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Once;
use std::time::Duration;
use tracing::debug;

static ENV_LOADER: Once = Once::new();

/// Ensures variables from `.env` are visible before credentials resolve.
pub fn ensure_env_loaded() {
    ENV_LOADER.call_once(|| {
        let _ = from_filename(ENV_PATH);
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSettings {
    /// Hard wall-clock deadline for one governed run.
    pub deadline: Duration,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            deadline: DEFAULT_RUN_DEADLINE,
        }
    }
}

/// Everything the runtime needs from a harness file.
#[derive(Debug, Clone, Default)]
pub struct HarnessConfig {
    pub servers: Vec<ServerConfig>,
    pub agents: Vec<AgentProfile>,
    pub retry: RetryConfig,
    pub run: RunSettings,
}

#[derive(Debug, Deserialize, Default)]
struct RawRun {
    deadline_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    servers: Vec<RawServer>,
    /// Kept untyped so a missing `model` gets a named error.
    #[serde(default)]
    agents: Vec<toml::Table>,
    #[serde(default)]
    retry: RawRetry,
    #[serde(default)]
    run: RawRun,
}

impl HarnessConfig {
    /// Load and validate a harness file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        ensure_env_loaded();
        debug!(path = %path.display(), "Reading harness configuration file");

        let content = fs::read_to_string(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                ConfigError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        Self::parse(&content, path)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Self::parse(content, Path::new("<inline>"))
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let parsed: RawConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        validate_and_build(parsed, path)
    }

    pub fn server(&self, name: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|server| server.name == name)
    }

    pub fn agent(&self, name: &str) -> Option<&AgentProfile> {
        self.agents
            .iter()
            .find(|agent| agent.name.as_deref() == Some(name))
    }
}

fn validate_and_build(parsed: RawConfig, path: &Path) -> Result<HarnessConfig, ConfigError> {
    let mut servers = Vec::with_capacity(parsed.servers.len());
    let mut names = HashSet::new();
    for raw in parsed.servers {
        let server = ServerConfig::try_from(raw)?;
        if !names.insert(server.name.clone()) {
            return Err(ConfigError::DuplicateServer {
                server: server.name,
            });
        }
        servers.push(server);
    }

    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut agents = Vec::with_capacity(parsed.agents.len());
    for raw in parsed.agents {
        if !raw.contains_key("model") {
            return Err(ConfigError::MissingModel);
        }
        let mut agent: AgentProfile = toml::Value::Table(raw)
            .try_into()
            .map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let label = agent.name.clone().unwrap_or_else(|| agent.model.clone());
        for server in &agent.servers {
            if !names.contains(server) {
                return Err(ConfigError::UnknownServer {
                    agent: label,
                    server: server.clone(),
                });
            }
        }
        if let Some(skill) = agent.skill.take() {
            agent.skill = Some(resolve_relative(&base_dir, &skill));
        }
        agents.push(agent);
    }

    let run = RunSettings {
        deadline: parsed
            .run
            .deadline_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_RUN_DEADLINE),
    };

    Ok(HarnessConfig {
        servers,
        agents,
        retry: RetryConfig::try_from(parsed.retry)?,
        run,
    })
}

fn resolve_relative(base: &Path, path: &Path) -> PathBuf {
    let expanded = shellexpand::full(&path.to_string_lossy())
        .map(|cow| PathBuf::from(cow.into_owned()))
        .unwrap_or_else(|_| path.to_path_buf());
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}
