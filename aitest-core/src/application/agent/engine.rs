use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::catalog::ToolCatalog;
use super::config::AgentConfig;
use super::messages::{assemble, compose_system_prompt, turns_from_messages};
use crate::domain::result::{AgentResult, RunError, RunState};
use crate::domain::types::{
    ChatMessage, ConversationTurn, MessageRole, TokenUsage, ToolCallRecord, ToolCallRequest,
    ToolOutcome,
};
use crate::model::{ModelProvider, ModelRequest};
use crate::summarise;
use crate::tooling::ToolCallError;

/// Drives the bounded model/tool turn loop for one agent invocation.
pub struct AgentEngine<P: ModelProvider + ?Sized> {
    provider: Arc<P>,
}

impl<P: ModelProvider + ?Sized> Clone for AgentEngine<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
        }
    }
}

impl<P: ModelProvider + ?Sized> AgentEngine<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    /// Run `prompt` to completion.
    ///
    /// Expected failures (provider error, exhausted turn budget) come back
    /// as an unsuccessful [`AgentResult`]; tool failures are fed back to the
    /// model and never end the run. The engine does not retry.
    pub async fn run(&self, prompt: &str, config: &AgentConfig, prior: &[ChatMessage]) -> AgentResult {
        let started = Instant::now();
        let agent = config.name();
        info!(
            agent = %agent,
            model = %config.model,
            prior_messages = prior.len(),
            max_turns = config.max_turns,
            prompt = %summarise(prompt),
            "agent run started"
        );

        let catalog = ToolCatalog::build(&config.servers, config.allowed_tools.as_deref()).await;
        let system_prompt = compose_system_prompt(config.skill.as_ref(), config.system_prompt.as_deref());
        let mut messages = assemble(prior, system_prompt.as_deref(), prompt);
        let mut turns = turns_from_messages(&messages);

        let mut usage = TokenUsage::default();
        let mut reported_cost: Option<f64> = None;
        let mut state = RunState::AwaitingModel;
        let mut error: Option<RunError> = None;
        let mut round_trips = 0u32;

        loop {
            if round_trips >= config.max_turns {
                warn!(agent = %agent, max_turns = config.max_turns, "turn limit exceeded");
                advance(&agent, &mut state, RunState::TurnLimitExceeded);
                error = Some(RunError::TurnLimitExceeded {
                    max_turns: config.max_turns,
                });
                break;
            }
            round_trips += 1;

            if let Some(limiter) = &config.limiter {
                limiter.lock().await.acquire().await;
            }

            let request = ModelRequest::new(config.model.clone(), messages.clone())
                .with_tools(catalog.descriptors())
                .with_settings(config.settings);
            debug!(
                agent = %agent,
                turn = round_trips,
                messages = messages.len(),
                "requesting model completion"
            );
            let response = match self.provider.complete(request).await {
                Ok(response) => response,
                Err(err) => {
                    warn!(agent = %agent, turn = round_trips, error = %err, "model provider failed");
                    advance(&agent, &mut state, RunState::Failed);
                    error = Some(RunError::from(&err));
                    break;
                }
            };

            usage += response.usage;
            if let Some(limiter) = &config.limiter {
                limiter.lock().await.record_tokens(response.usage.total());
            }
            if let Some(cost) = response.cost_usd {
                *reported_cost.get_or_insert(0.0) += cost;
            }

            if !response.wants_tools() {
                messages.push(ChatMessage::assistant(response.text.clone()));
                turns.push(ConversationTurn::assistant(response.text, Vec::new()));
                advance(&agent, &mut state, RunState::Done);
                break;
            }

            advance(&agent, &mut state, RunState::DispatchingTools);
            debug!(
                agent = %agent,
                turn = round_trips,
                calls = response.tool_calls.len(),
                "dispatching tool calls"
            );
            messages.push(ChatMessage::assistant_with_tools(
                response.text.clone(),
                response.tool_calls.clone(),
            ));
            let mut records = Vec::with_capacity(response.tool_calls.len());
            let mut tool_turns = Vec::with_capacity(response.tool_calls.len());
            for call in &response.tool_calls {
                let record = dispatch(&catalog, call).await;
                messages.push(ChatMessage::from_tool_record(&record));
                tool_turns.push(ConversationTurn::new(MessageRole::Tool, record.feedback()));
                records.push(record);
            }
            turns.push(ConversationTurn::assistant(response.text, records));
            turns.extend(tool_turns);
            advance(&agent, &mut state, RunState::AwaitingModel);
        }

        let clarification_requested = match (&config.clarification, state) {
            (Some(check), RunState::Done) => {
                let final_text = messages
                    .last()
                    .map(|message| message.content.as_str())
                    .unwrap_or_default();
                check.detect(final_text).await
            }
            _ => false,
        };

        let cost_usd = reported_cost.unwrap_or_else(|| {
            config
                .pricing
                .map(|pricing| pricing.cost(usage.prompt, usage.completion))
                .unwrap_or_default()
        });
        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            agent = %agent,
            state = ?state,
            turns = round_trips,
            tokens = usage.total(),
            duration_ms,
            "agent run finished"
        );

        AgentResult {
            model: config.model.clone(),
            turns,
            success: state == RunState::Done,
            error,
            state,
            duration_ms,
            token_usage: usage,
            cost_usd,
            session_context_count: prior.len(),
            prior_message_count: prior.len(),
            messages,
            available_tools: catalog.descriptors(),
            effective_system_prompt: system_prompt,
            clarification_requested,
        }
    }
}

fn advance(agent: &str, state: &mut RunState, next: RunState) {
    debug!(agent, from = ?*state, to = ?next, "engine state change");
    *state = next;
}

async fn dispatch(catalog: &ToolCatalog, call: &ToolCallRequest) -> ToolCallRecord {
    let started = Instant::now();
    let outcome = match catalog.owner(&call.name) {
        Some(server) => server.call_tool(&call.name, call.arguments.clone()).await,
        None => Err(ToolCallError::NotInCatalog {
            tool: call.name.clone(),
        }),
    };
    let outcome = match outcome {
        Ok(text) => ToolOutcome::Result(text),
        Err(err) => {
            debug!(tool = %call.name, error = %err, "tool call failed; reporting to model");
            ToolOutcome::Error(err.to_string())
        }
    };
    ToolCallRecord {
        id: call.id.clone(),
        name: call.name.clone(),
        arguments: call.arguments.clone(),
        outcome,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}
