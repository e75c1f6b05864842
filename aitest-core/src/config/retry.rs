use super::error::ConfigError;
use crate::constants::{
    DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_BASE_DELAY, DEFAULT_RETRY_JITTER,
    DEFAULT_RETRY_MAX_DELAY, DEFAULT_RETRY_MULTIPLIER,
};
use crate::domain::result::RunError;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Classifies a [`RunError`] as worth another attempt.
#[derive(Clone)]
pub struct RetryPredicate(Arc<dyn Fn(&RunError) -> bool + Send + Sync>);

impl RetryPredicate {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&RunError) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(predicate))
    }

    pub fn matches(&self, error: &RunError) -> bool {
        (self.0)(error)
    }
}

impl Default for RetryPredicate {
    fn default() -> Self {
        Self::new(RunError::is_retryable)
    }
}

impl fmt::Debug for RetryPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RetryPredicate(..)")
    }
}

/// Bounded, classified retry policy applied by the governor.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
    /// Fractional spread applied to each delay; `0.2` means ±20 %.
    pub jitter: f64,
    pub max_delay: Duration,
    /// Upper bound for a single attempt. Exceeding it is retryable.
    pub attempt_timeout: Option<Duration>,
    pub predicate: RetryPredicate,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            base_delay: DEFAULT_RETRY_BASE_DELAY,
            backoff_multiplier: DEFAULT_RETRY_MULTIPLIER,
            jitter: DEFAULT_RETRY_JITTER,
            max_delay: DEFAULT_RETRY_MAX_DELAY,
            attempt_timeout: None,
            predicate: RetryPredicate::default(),
        }
    }
}

impl RetryConfig {
    /// A policy that runs exactly once.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&RunError) -> bool + Send + Sync + 'static,
    {
        self.predicate = RetryPredicate::new(predicate);
        self
    }

    pub fn is_retryable(&self, error: &RunError) -> bool {
        self.predicate.matches(error)
    }

    /// Delay to sleep after failed attempt number `attempt` (1-based).
    ///
    /// `sample` is a uniform value in `[0, 1)` used for jitter. A provider
    /// supplied retry-after hint raises the delay but never lowers it.
    pub fn delay_for(&self, attempt: u32, sample: f64, retry_after: Option<Duration>) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let raw = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = raw.min(self.max_delay.as_secs_f64());
        let factor = 1.0 + self.jitter * (2.0 * sample.clamp(0.0, 1.0) - 1.0);
        let jittered = Duration::from_secs_f64((capped * factor).max(0.0));
        match retry_after {
            Some(hint) => jittered.max(hint.min(self.max_delay)),
            None => jittered,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub(crate) struct RawRetry {
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
    backoff_multiplier: Option<f64>,
    jitter: Option<f64>,
    max_delay_ms: Option<u64>,
    attempt_timeout_ms: Option<u64>,
}

impl TryFrom<RawRetry> for RetryConfig {
    type Error = ConfigError;

    fn try_from(raw: RawRetry) -> Result<Self, Self::Error> {
        let mut config = RetryConfig::default();
        if let Some(attempts) = raw.max_attempts {
            if attempts == 0 {
                return Err(ConfigError::InvalidRetryAttempts);
            }
            config.max_attempts = attempts;
        }
        if let Some(ms) = raw.base_delay_ms {
            config.base_delay = Duration::from_millis(ms);
        }
        if let Some(multiplier) = raw.backoff_multiplier {
            config.backoff_multiplier = multiplier;
        }
        if let Some(jitter) = raw.jitter {
            config = config.with_jitter(jitter);
        }
        if let Some(ms) = raw.max_delay_ms {
            config.max_delay = Duration::from_millis(ms);
        }
        config.attempt_timeout = raw.attempt_timeout_ms.map(Duration::from_millis);
        Ok(config)
    }
}
