//! Secondary check for final answers that ask the user a question instead
//! of doing the work.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::constants::DEFAULT_JUDGE_TIMEOUT;
use crate::domain::types::ChatMessage;
use crate::model::{ModelError, ModelProvider, ModelRequest, ModelSettings};
use crate::summarise;

const JUDGE_SYSTEM_PROMPT: &str = "\
You decide whether an AI assistant stopped to ask the user for input instead of finishing a task.

Answer YES when the assistant:
- offers to act instead of acting (\"Would you like me to...\", \"Shall I...\")
- asks the user to choose between options or formats
- asks for confirmation before doing something
- asks for information it needs before it can continue

Answer NO when the response:
- reports finished work (\"Done\", \"Created\", \"Transferred\", past tense)
- summarises what was accomplished, even if it ends with \"Let me know if...\"
- directly provides the information that was requested, even partially

Examples:
\"Should I go ahead with the transfer?\" -> YES
\"Which account do you mean?\" -> YES
\"Your savings balance is $2,300.\" -> NO
\"Done! I added milk to your shopping list.\" -> NO

Reply with exactly one word: YES or NO.";

/// Classifies assistant text as a request for clarification.
#[async_trait]
pub trait ClarificationJudge: Send + Sync {
    async fn classify(&self, text: &str) -> Result<bool, ModelError>;
}

/// Judge backed by a language model answering YES or NO.
pub struct LlmClarificationJudge<P: ModelProvider + ?Sized> {
    provider: Arc<P>,
    model: String,
}

impl<P: ModelProvider + ?Sized> LlmClarificationJudge<P> {
    pub fn new(provider: Arc<P>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl<P: ModelProvider + ?Sized> ClarificationJudge for LlmClarificationJudge<P> {
    async fn classify(&self, text: &str) -> Result<bool, ModelError> {
        let request = ModelRequest::new(
            self.model.clone(),
            vec![
                ChatMessage::system(JUDGE_SYSTEM_PROMPT),
                ChatMessage::user(format!("Classify this AI assistant response:\n\n{text}")),
            ],
        )
        .with_settings(ModelSettings {
            temperature: Some(0.0),
            max_tokens: Some(5),
        });
        let response = self.provider.complete(request).await?;
        Ok(response.text.trim().to_uppercase().starts_with("YES"))
    }
}

/// A judge plus the time box it runs under.
#[derive(Clone)]
pub struct ClarificationCheck {
    judge: Arc<dyn ClarificationJudge>,
    timeout: Duration,
}

impl ClarificationCheck {
    pub fn new(judge: Arc<dyn ClarificationJudge>) -> Self {
        Self {
            judge,
            timeout: DEFAULT_JUDGE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn detect(&self, text: &str) -> bool {
        detect_clarification(self.judge.as_ref(), text, self.timeout).await
    }
}

impl fmt::Debug for ClarificationCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClarificationCheck")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Run `judge` on `text` within `limit`. Errors and timeouts count as
/// "not a clarification"; empty text is never one.
pub async fn detect_clarification(
    judge: &dyn ClarificationJudge,
    text: &str,
    limit: Duration,
) -> bool {
    if text.trim().is_empty() {
        return false;
    }
    match timeout(limit, judge.classify(text)).await {
        Ok(Ok(true)) => {
            info!(response = %summarise(text), "clarification request detected");
            true
        }
        Ok(Ok(false)) => false,
        Ok(Err(err)) => {
            debug!(error = %err, "clarification judge failed; skipping detection");
            false
        }
        Err(_) => {
            debug!(after = ?limit, "clarification judge timed out");
            false
        }
    }
}
