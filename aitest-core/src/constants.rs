//! Runtime defaults
//!
//! Single source of truth for timeouts, budgets and protocol constants.

use std::time::Duration;

/// MCP protocol revision announced during `initialize`
pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// Client name announced during `initialize`
pub const CLIENT_NAME: &str = "aitest";

/// How long a freshly started server may take to satisfy its readiness policy
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(15);

/// Interval between `tools/list` polls while waiting for named tools
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(300);

/// Per-call timeout for `tools/call` and other protocol requests
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Grace period between SIGTERM and a forced kill when stopping a process
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(2);

/// Default model round-trip budget for one agent run
pub const DEFAULT_MAX_TURNS: u32 = 10;

/// Time box for the secondary clarification judge call
pub const DEFAULT_JUDGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Hard wall-clock deadline applied to one governed run
pub const DEFAULT_RUN_DEADLINE: Duration = Duration::from_secs(300);

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_RETRY_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_RETRY_JITTER: f64 = 0.2;
pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(30);

/// Window used by request/token rate limits
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Default environment file loaded before credentials are resolved
pub const ENV_PATH: &str = ".env";
