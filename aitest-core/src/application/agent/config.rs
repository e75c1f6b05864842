use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

use super::clarification::ClarificationCheck;
use super::rate_limit::RateLimiter;
use crate::config::{AgentProfile, ConfigError, ModelPricing};
use crate::constants::DEFAULT_MAX_TURNS;
use crate::domain::skill::Skill;
use crate::model::{ModelSettings, display_model_name};
use crate::tooling::{ServerGroup, ToolServerInterface};

/// Everything one agent run needs: model, instructions, tool sources and
/// budgets. Cheap to clone; clones share the rate-limit window.
#[derive(Clone)]
pub struct AgentConfig {
    pub(crate) name: Option<String>,
    pub(crate) model: String,
    pub(crate) system_prompt: Option<String>,
    pub(crate) skill: Option<Skill>,
    pub(crate) servers: Vec<Arc<dyn ToolServerInterface>>,
    pub(crate) allowed_tools: Option<Vec<String>>,
    pub(crate) max_turns: u32,
    pub(crate) settings: ModelSettings,
    pub(crate) pricing: Option<ModelPricing>,
    pub(crate) clarification: Option<ClarificationCheck>,
    rpm: Option<u32>,
    tpm: Option<u64>,
    pub(crate) limiter: Option<Arc<AsyncMutex<RateLimiter>>>,
}

impl AgentConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            name: None,
            model: model.into(),
            system_prompt: None,
            skill: None,
            servers: Vec::new(),
            allowed_tools: None,
            max_turns: DEFAULT_MAX_TURNS,
            settings: ModelSettings::default(),
            pricing: None,
            clarification: None,
            rpm: None,
            tpm: None,
            limiter: None,
        }
    }

    /// Build from a declarative profile, binding its server names to the
    /// already started `group`.
    pub fn from_profile(profile: &AgentProfile, group: &ServerGroup) -> Result<Self, ConfigError> {
        let mut config = AgentConfig::new(profile.model.clone());
        config.name = profile.name.clone();
        config.system_prompt = profile.system_prompt.clone();
        if let Some(path) = &profile.skill {
            config.skill = Some(Skill::load(path)?);
        }
        for name in &profile.servers {
            let server = group.get(name).ok_or_else(|| ConfigError::UnknownServer {
                agent: profile.name.clone().unwrap_or_else(|| profile.model.clone()),
                server: name.clone(),
            })?;
            config.servers.push(Arc::clone(server) as Arc<dyn ToolServerInterface>);
        }
        config.allowed_tools = profile.allowed_tools.clone();
        if let Some(max_turns) = profile.max_turns {
            config.max_turns = max_turns;
        }
        config.settings = ModelSettings {
            temperature: profile.temperature,
            max_tokens: profile.max_tokens,
        };
        config.pricing = profile.pricing;
        config.rpm = profile.rpm;
        config.tpm = profile.tpm;
        config.rebuild_limiter();
        Ok(config)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_skill(mut self, skill: Skill) -> Self {
        self.skill = Some(skill);
        self
    }

    pub fn with_server(mut self, server: Arc<dyn ToolServerInterface>) -> Self {
        self.servers.push(server);
        self
    }

    pub fn with_servers<I>(mut self, servers: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn ToolServerInterface>>,
    {
        self.servers.extend(servers);
        self
    }

    pub fn with_allowed_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_tools = Some(tools.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.settings.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.settings.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_pricing(mut self, pricing: ModelPricing) -> Self {
        self.pricing = Some(pricing);
        self
    }

    /// Requests per minute sent to the provider.
    pub fn with_rpm(mut self, rpm: u32) -> Self {
        self.rpm = Some(rpm);
        self.rebuild_limiter();
        self
    }

    /// Tokens per minute consumed across runs.
    pub fn with_tpm(mut self, tpm: u64) -> Self {
        self.tpm = Some(tpm);
        self.rebuild_limiter();
        self
    }

    pub fn with_clarification(mut self, check: ClarificationCheck) -> Self {
        self.clarification = Some(check);
        self
    }

    fn rebuild_limiter(&mut self) {
        self.limiter = if self.rpm.is_some() || self.tpm.is_some() {
            Some(Arc::new(AsyncMutex::new(RateLimiter::new(self.rpm, self.tpm))))
        } else {
            None
        };
    }

    /// Explicit name, or the model without its provider prefix followed by
    /// the skill name.
    pub fn name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        let model = display_model_name(&self.model);
        match &self.skill {
            Some(skill) => format!("{model} + {}", skill.name),
            None => model.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn max_turns(&self) -> u32 {
        self.max_turns
    }

    pub fn skill(&self) -> Option<&Skill> {
        self.skill.as_ref()
    }

    pub fn servers(&self) -> &[Arc<dyn ToolServerInterface>] {
        &self.servers
    }
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let servers: Vec<&str> = self.servers.iter().map(|server| server.name()).collect();
        f.debug_struct("AgentConfig")
            .field("name", &self.name())
            .field("model", &self.model)
            .field("skill", &self.skill.as_ref().map(|skill| skill.name.as_str()))
            .field("servers", &servers)
            .field("allowed_tools", &self.allowed_tools)
            .field("max_turns", &self.max_turns)
            .field("rpm", &self.rpm)
            .field("tpm", &self.tpm)
            .field("clarification", &self.clarification.is_some())
            .finish()
    }
}
