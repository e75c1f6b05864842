use tokio::time::{Instant, sleep, sleep_until, timeout_at};
use tracing::debug;

use super::connection::McpConnection;
use super::error::ServerStartError;
use crate::config::{ReadinessPolicy, ServerConfig};
use crate::domain::types::ToolDescriptor;
use crate::transport::TransportError;

/// Names in `required` that `tools` does not expose, in declaration order.
pub(crate) fn missing_tools(required: &[String], tools: &[ToolDescriptor]) -> Vec<String> {
    required
        .iter()
        .filter(|name| !tools.iter().any(|tool| &tool.name == *name))
        .cloned()
        .collect()
}

/// Block until `config.readiness` is satisfied or `deadline` passes.
///
/// Returns the tool set observed when the server became ready. Under
/// [`ReadinessPolicy::Tools`] the catalog is polled every
/// `config.poll_interval`; the failure is reported at the deadline itself.
pub(crate) async fn wait_until_ready(
    connection: &McpConnection,
    config: &ServerConfig,
    started: Instant,
    deadline: Instant,
) -> Result<Vec<ToolDescriptor>, ServerStartError> {
    let server = config.name.as_str();
    let timed_out = |missing: Vec<String>| ServerStartError::ReadinessTimeout {
        server: server.to_string(),
        waited: deadline.saturating_duration_since(started),
        missing,
    };

    let required: &[String] = match &config.readiness {
        ReadinessPolicy::Handshake => {
            return match timeout_at(deadline, connection.list_tools()).await {
                Ok(Ok(tools)) => Ok(tools),
                Ok(Err(err)) => Err(discovery_failure(err)),
                Err(_) => Err(timed_out(Vec::new())),
            };
        }
        ReadinessPolicy::Tools(required) => required,
    };

    let mut missing = required.to_vec();
    let mut polls = 0u32;
    loop {
        polls += 1;
        match timeout_at(deadline, connection.list_tools()).await {
            Ok(Ok(tools)) => {
                missing = missing_tools(required, &tools);
                if missing.is_empty() {
                    debug!(server, polls, "required tools are available");
                    return Ok(tools);
                }
                debug!(server, polls, missing = ?missing, "waiting for tools");
            }
            Ok(Err(err)) if err.is_terminal() => {
                return Err(ServerStartError::Exited {
                    server: server.to_string(),
                });
            }
            Ok(Err(err)) => {
                debug!(server, polls, error = %err, "tools/list failed while waiting for readiness");
            }
            Err(_) => return Err(timed_out(missing)),
        }

        if Instant::now() + config.poll_interval >= deadline {
            sleep_until(deadline).await;
            return Err(timed_out(missing));
        }
        sleep(config.poll_interval).await;
    }
}

fn discovery_failure(error: TransportError) -> ServerStartError {
    if error.is_terminal() {
        ServerStartError::Exited {
            server: error.server().to_string(),
        }
    } else {
        ServerStartError::Discovery {
            server: error.server().to_string(),
            reason: error.to_string(),
        }
    }
}
