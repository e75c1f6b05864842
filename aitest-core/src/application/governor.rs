//! Retry & timeout governor around one engine invocation.
//!
//! The wall-clock deadline covers every attempt and every backoff sleep.
//! When it fires, the in-flight attempt future is dropped, which cancels
//! whatever provider or tool call it was awaiting.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RetryConfig;
use crate::domain::result::{AgentResult, RunError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("agent run exceeded its {deadline:?} deadline after {elapsed:?}")]
pub struct EngineTimeoutError {
    pub deadline: Duration,
    pub elapsed: Duration,
}

#[derive(Debug, Error)]
pub enum GovernorError {
    /// The deadline elapsed. Never retried; any partial result is discarded.
    #[error(transparent)]
    Timeout(#[from] EngineTimeoutError),
    /// Retrying stopped with the run still failing.
    #[error("agent run failed after {attempts} attempt(s): {last_error}")]
    RetriesExhausted { attempts: u32, last_error: RunError },
}

impl GovernorError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, GovernorError::Timeout(_))
    }

    pub fn attempts(&self) -> Option<u32> {
        match self {
            GovernorError::RetriesExhausted { attempts, .. } => Some(*attempts),
            GovernorError::Timeout(_) => None,
        }
    }
}

enum Attempt {
    Finished(AgentResult),
    TimedOut(RunError),
}

/// Run `invoke` under `deadline`, retrying classified failures.
///
/// Every attempt calls `invoke` afresh. Successful runs and runs failing
/// with a non-retryable error (for example an exhausted turn budget) are
/// returned as `Ok` so callers can assert on them.
pub async fn execute<F, Fut>(
    invoke: F,
    retry: &RetryConfig,
    deadline: Duration,
) -> Result<AgentResult, GovernorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AgentResult>,
{
    let started = Instant::now();
    match timeout(deadline, attempt_loop(invoke, retry)).await {
        Ok(outcome) => outcome,
        Err(_) => {
            let elapsed = started.elapsed();
            warn!(
                deadline_ms = deadline.as_millis() as u64,
                elapsed_ms = elapsed.as_millis() as u64,
                "agent run deadline exceeded; cancelling"
            );
            Err(EngineTimeoutError { deadline, elapsed }.into())
        }
    }
}

async fn attempt_loop<F, Fut>(mut invoke: F, retry: &RetryConfig) -> Result<AgentResult, GovernorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AgentResult>,
{
    let max_attempts = retry.max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        debug!(attempt, max_attempts, "starting agent attempt");
        let outcome = match retry.attempt_timeout {
            Some(limit) => match timeout(limit, invoke()).await {
                Ok(result) => Attempt::Finished(result),
                Err(_) => Attempt::TimedOut(RunError::AttemptTimeout {
                    after_ms: limit.as_millis() as u64,
                }),
            },
            None => Attempt::Finished(invoke().await),
        };

        let error = match outcome {
            Attempt::Finished(result) => match result.error().cloned() {
                Some(error) if !result.success() && retry.is_retryable(&error) => error,
                Some(error) if !result.success() => {
                    debug!(attempt, error = %error, "run failed with a non-retryable error");
                    return Ok(result);
                }
                _ => return Ok(result),
            },
            Attempt::TimedOut(error) if retry.is_retryable(&error) => error,
            Attempt::TimedOut(last_error) => {
                return Err(GovernorError::RetriesExhausted {
                    attempts: attempt,
                    last_error,
                });
            }
        };

        if attempt >= max_attempts {
            warn!(attempts = attempt, error = %error, "agent run failed; retries exhausted");
            return Err(GovernorError::RetriesExhausted {
                attempts: attempt,
                last_error: error,
            });
        }

        let retry_after = error.retry_after_ms().map(Duration::from_millis);
        let delay = retry.delay_for(attempt, jitter_sample(), retry_after);
        info!(
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "retrying agent run"
        );
        sleep(delay).await;
    }
}

/// Uniform sample in `[0, 1)` from the 53 high bits of a random uuid.
fn jitter_sample() -> f64 {
    let (high, _) = Uuid::new_v4().as_u64_pair();
    (high >> 11) as f64 / (1u64 << 53) as f64
}
