//! # Agent Module
//!
//! The bounded multi-turn engine that drives a language model against the
//! tools of already running servers.
//!
//! ## Key Types
//!
//! - [`AgentEngine`] - runs one prompt and returns an [`AgentResult`](crate::AgentResult)
//! - [`AgentConfig`] - model, instructions, tool sources and budgets
//! - [`ClarificationCheck`] - optional time-boxed judge on the final answer
//!
//! ## Turn Loop
//!
//! 1. Send prior messages, system instructions and the prompt to the model
//! 2. If it requests tools, dispatch them one by one and append the results
//! 3. Repeat until the model answers without tools or the turn budget is spent

mod catalog;
mod clarification;
mod config;
mod engine;
mod messages;
mod rate_limit;

pub use clarification::{
    ClarificationCheck, ClarificationJudge, LlmClarificationJudge, detect_clarification,
};
pub use config::AgentConfig;
pub use engine::AgentEngine;
