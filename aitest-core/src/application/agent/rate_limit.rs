use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::constants::RATE_LIMIT_WINDOW;

/// Sliding-window request and token budget shared by every run of one agent.
#[derive(Debug)]
pub(crate) struct RateLimiter {
    rpm: Option<u32>,
    tpm: Option<u64>,
    window: Duration,
    requests: VecDeque<Instant>,
    tokens: VecDeque<(Instant, u64)>,
}

impl RateLimiter {
    pub(crate) fn new(rpm: Option<u32>, tpm: Option<u64>) -> Self {
        Self {
            rpm: rpm.filter(|limit| *limit > 0),
            tpm: tpm.filter(|limit| *limit > 0),
            window: RATE_LIMIT_WINDOW,
            requests: VecDeque::new(),
            tokens: VecDeque::new(),
        }
    }

    /// Wait until one more request fits in the window, then claim it.
    pub(crate) async fn acquire(&mut self) {
        loop {
            let now = Instant::now();
            self.prune(now);
            match self.wait_needed(now) {
                Some(wait) => {
                    debug!(wait_ms = wait.as_millis() as u64, "rate limit reached; waiting");
                    sleep(wait).await;
                }
                None => break,
            }
        }
        if self.rpm.is_some() {
            self.requests.push_back(Instant::now());
        }
    }

    pub(crate) fn record_tokens(&mut self, tokens: u64) {
        if self.tpm.is_some() && tokens > 0 {
            self.tokens.push_back((Instant::now(), tokens));
        }
    }

    fn prune(&mut self, now: Instant) {
        while self
            .requests
            .front()
            .is_some_and(|at| now.duration_since(*at) >= self.window)
        {
            self.requests.pop_front();
        }
        while self
            .tokens
            .front()
            .is_some_and(|(at, _)| now.duration_since(*at) >= self.window)
        {
            self.tokens.pop_front();
        }
    }

    fn wait_needed(&self, now: Instant) -> Option<Duration> {
        let expires = |at: Instant| (at + self.window).saturating_duration_since(now);

        let request_wait = match (self.rpm, self.requests.front()) {
            (Some(rpm), Some(oldest)) if self.requests.len() >= rpm as usize => Some(expires(*oldest)),
            _ => None,
        };
        let used: u64 = self.tokens.iter().map(|(_, tokens)| tokens).sum();
        let token_wait = match (self.tpm, self.tokens.front()) {
            (Some(tpm), Some((oldest, _))) if used >= tpm => Some(expires(*oldest)),
            _ => None,
        };
        request_wait.max(token_wait)
    }
}
