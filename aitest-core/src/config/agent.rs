use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Price of one thousand prompt/completion tokens, in USD.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    #[serde(default)]
    pub input_per_1k: f64,
    #[serde(default)]
    pub output_per_1k: f64,
}

impl ModelPricing {
    pub fn new(input_per_1k: f64, output_per_1k: f64) -> Self {
        Self {
            input_per_1k,
            output_per_1k,
        }
    }

    pub fn cost(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        (prompt_tokens as f64 / 1000.0) * self.input_per_1k
            + (completion_tokens as f64 / 1000.0) * self.output_per_1k
    }
}

/// Declarative agent entry from the `[[agents]]` table.
///
/// Turned into a runnable `AgentConfig` once its servers are started.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AgentProfile {
    pub name: Option<String>,
    pub model: String,
    pub system_prompt: Option<String>,
    pub skill: Option<PathBuf>,
    #[serde(default)]
    pub servers: Vec<String>,
    pub allowed_tools: Option<Vec<String>>,
    pub max_turns: Option<u32>,
    pub rpm: Option<u32>,
    pub tpm: Option<u64>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub pricing: Option<ModelPricing>,
}
