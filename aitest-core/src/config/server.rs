use super::error::ConfigError;
use crate::constants::{
    DEFAULT_CALL_TIMEOUT, DEFAULT_POLL_INTERVAL, DEFAULT_STARTUP_TIMEOUT, DEFAULT_STOP_GRACE,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    #[default]
    Stdio,
    Sse,
    StreamableHttp,
}

impl TransportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::Stdio => "stdio",
            TransportKind::Sse => "sse",
            TransportKind::StreamableHttp => "streamable-http",
        }
    }
}

/// Where a server lives and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEndpoint {
    Stdio {
        command: PathBuf,
        args: Vec<String>,
        env: HashMap<String, String>,
        workdir: Option<PathBuf>,
    },
    Sse {
        url: String,
        headers: HashMap<String, String>,
    },
    StreamableHttp {
        url: String,
        headers: HashMap<String, String>,
    },
}

impl ServerEndpoint {
    pub fn kind(&self) -> TransportKind {
        match self {
            ServerEndpoint::Stdio { .. } => TransportKind::Stdio,
            ServerEndpoint::Sse { .. } => TransportKind::Sse,
            ServerEndpoint::StreamableHttp { .. } => TransportKind::StreamableHttp,
        }
    }
}

/// Rule deciding when a freshly started server is usable.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReadinessPolicy {
    /// Usable as soon as the initialize handshake succeeds.
    #[default]
    Handshake,
    /// Usable once every named tool appears in `tools/list`.
    Tools(Vec<String>),
}

impl ReadinessPolicy {
    pub fn for_tools<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ReadinessPolicy::Tools(names.into_iter().map(Into::into).collect())
    }

    /// Tools that must be listed before the server counts as ready.
    pub fn required_tools(&self) -> &[String] {
        match self {
            ReadinessPolicy::Handshake => &[],
            ReadinessPolicy::Tools(names) => names,
        }
    }
}

/// Immutable description of one tool-provider server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub name: String,
    pub endpoint: ServerEndpoint,
    pub readiness: ReadinessPolicy,
    pub startup_timeout: Duration,
    pub call_timeout: Duration,
    pub poll_interval: Duration,
    pub stop_grace: Duration,
}

impl ServerConfig {
    fn with_endpoint(name: impl Into<String>, endpoint: ServerEndpoint) -> Self {
        Self {
            name: name.into(),
            endpoint,
            readiness: ReadinessPolicy::Handshake,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }

    pub fn stdio(name: impl Into<String>, command: impl Into<PathBuf>) -> Self {
        Self::with_endpoint(
            name,
            ServerEndpoint::Stdio {
                command: command.into(),
                args: Vec::new(),
                env: HashMap::new(),
                workdir: None,
            },
        )
    }

    pub fn sse(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::with_endpoint(
            name,
            ServerEndpoint::Sse {
                url: url.into(),
                headers: HashMap::new(),
            },
        )
    }

    pub fn streamable_http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::with_endpoint(
            name,
            ServerEndpoint::StreamableHttp {
                url: url.into(),
                headers: HashMap::new(),
            },
        )
    }

    pub fn transport(&self) -> TransportKind {
        self.endpoint.kind()
    }

    /// Append launch arguments. Ignored for network endpoints.
    pub fn with_args<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let ServerEndpoint::Stdio { args, .. } = &mut self.endpoint {
            args.extend(extra.into_iter().map(Into::into));
        }
        self
    }

    /// Set an environment variable for the child. Ignored for network endpoints.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let ServerEndpoint::Stdio { env, .. } = &mut self.endpoint {
            env.insert(key.into(), value.into());
        }
        self
    }

    pub fn with_workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        if let ServerEndpoint::Stdio { workdir, .. } = &mut self.endpoint {
            *workdir = Some(dir.into());
        }
        self
    }

    /// Add a header sent with every request. Ignored for stdio.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        match &mut self.endpoint {
            ServerEndpoint::Sse { headers, .. } | ServerEndpoint::StreamableHttp { headers, .. } => {
                headers.insert(key.into(), value.into());
            }
            ServerEndpoint::Stdio { .. } => {}
        }
        self
    }

    pub fn with_readiness(mut self, readiness: ReadinessPolicy) -> Self {
        self.readiness = readiness;
        self
    }

    pub fn wait_for_tools<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_readiness(ReadinessPolicy::for_tools(names))
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub(crate) struct RawWait {
    #[serde(default)]
    tools: Vec<String>,
    timeout_ms: Option<u64>,
    poll_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawServer {
    name: String,
    #[serde(default)]
    transport: TransportKind,
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    workdir: Option<String>,
    url: Option<String>,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    wait: RawWait,
    call_timeout_ms: Option<u64>,
    stop_grace_ms: Option<u64>,
}

fn expand(s: &str) -> String {
    shellexpand::full(s)
        .map(|cow| cow.into_owned())
        .unwrap_or_else(|_| s.to_string())
}

impl TryFrom<RawServer> for ServerConfig {
    type Error = ConfigError;

    fn try_from(raw: RawServer) -> Result<Self, Self::Error> {
        let expand_map = |map: HashMap<String, String>| -> HashMap<String, String> {
            map.into_iter().map(|(k, v)| (k, expand(&v))).collect()
        };

        let endpoint = match raw.transport {
            TransportKind::Stdio => {
                let command = raw.command.ok_or_else(|| ConfigError::MissingCommand {
                    server: raw.name.clone(),
                })?;
                ServerEndpoint::Stdio {
                    command: PathBuf::from(expand(&command)),
                    args: raw.args.iter().map(|arg| expand(arg)).collect(),
                    env: expand_map(raw.env),
                    workdir: raw.workdir.map(|d| PathBuf::from(expand(&d))),
                }
            }
            kind @ (TransportKind::Sse | TransportKind::StreamableHttp) => {
                let url = raw.url.map(|u| expand(&u)).ok_or_else(|| ConfigError::MissingUrl {
                    server: raw.name.clone(),
                })?;
                let headers = expand_map(raw.headers);
                if kind == TransportKind::Sse {
                    ServerEndpoint::Sse { url, headers }
                } else {
                    ServerEndpoint::StreamableHttp { url, headers }
                }
            }
        };

        let mut config = ServerConfig::with_endpoint(raw.name, endpoint);
        if !raw.wait.tools.is_empty() {
            config.readiness = ReadinessPolicy::Tools(raw.wait.tools);
        }
        if let Some(ms) = raw.wait.timeout_ms {
            config.startup_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = raw.wait.poll_interval_ms {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = raw.call_timeout_ms {
            config.call_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = raw.stop_grace_ms {
            config.stop_grace = Duration::from_millis(ms);
        }
        Ok(config)
    }
}
