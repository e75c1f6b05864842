//! OpenAI-compatible chat completions client with function calling.
//! Serves OpenAI, Azure OpenAI deployments and Ollama's compatibility API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::base::HttpClientBase;
use crate::domain::types::TokenUsage;
use crate::infrastructure::model::adapter::MessageAdapter;
use crate::infrastructure::model::traits::ModelClient;
use crate::infrastructure::model::types::{ModelError, ModelRequest, ModelResponse};

#[derive(Clone)]
pub struct OpenAiCompatibleClient {
    base: HttpClientBase,
    api_path: String,
    /// Model name sent in the body; Azure addresses the deployment by URL.
    body_model: Option<String>,
}

impl OpenAiCompatibleClient {
    pub fn new(base: HttpClientBase, api_path: impl Into<String>, body_model: Option<String>) -> Self {
        Self {
            base,
            api_path: api_path.into(),
            body_model,
        }
    }
}

#[async_trait]
impl ModelClient for OpenAiCompatibleClient {
    fn id(&self) -> &str {
        &self.base.id
    }

    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        let url = self.base.build_url(&self.api_path);
        let tools = MessageAdapter::tools_to_openai(&request.tools);

        let payload = ChatCompletionRequest {
            model: self.body_model.clone(),
            messages: MessageAdapter::to_openai_format(&request.messages),
            tools: (!tools.is_empty()).then_some(tools),
            temperature: request.settings.temperature,
            max_tokens: request.settings.max_tokens,
            stream: false,
        };

        info!(
            provider = self.base.id.as_str(),
            model = request.model.as_str(),
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending request to OpenAI-compatible provider"
        );

        let response: ChatCompletionResponse = self.base.post_json(&url, &payload).await?;
        debug!("Received response from OpenAI-compatible provider");

        let message = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .ok_or_else(|| ModelError::invalid_response(&self.base.id, "missing choices"))?;

        let usage = response
            .usage
            .map(|usage| TokenUsage::new(usage.prompt_tokens, usage.completion_tokens))
            .unwrap_or_default();

        Ok(ModelResponse {
            text: message.content.unwrap_or_default(),
            tool_calls: MessageAdapter::tool_calls_from_openai(&message.tool_calls),
            usage,
            cost_usd: None,
        })
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<Value>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}
