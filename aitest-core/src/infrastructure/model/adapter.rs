//! Message adapters - convert between runtime types and the OpenAI chat format

use crate::domain::types::{ChatMessage, MessageRole, ToolCallRequest, ToolDescriptor};
use serde_json::{Value, json};

/// Adapter for converting messages to and from the OpenAI wire format
pub struct MessageAdapter;

impl MessageAdapter {
    /// Convert messages to OpenAI-style format, including assistant tool
    /// calls and tool results.
    pub fn to_openai_format(messages: &[ChatMessage]) -> Vec<Value> {
        messages.iter().map(Self::message_to_openai).collect()
    }

    fn message_to_openai(message: &ChatMessage) -> Value {
        match message.role {
            MessageRole::Assistant if !message.tool_calls.is_empty() => {
                let calls: Vec<Value> = message
                    .tool_calls
                    .iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": call.arguments.to_string(),
                            }
                        })
                    })
                    .collect();
                let content = if message.content.is_empty() {
                    Value::Null
                } else {
                    Value::String(message.content.clone())
                };
                json!({ "role": "assistant", "content": content, "tool_calls": calls })
            }
            MessageRole::Tool => json!({
                "role": "tool",
                "tool_call_id": message.tool_call_id.clone().unwrap_or_default(),
                "content": message.content,
            }),
            role => json!({ "role": role.as_str(), "content": message.content }),
        }
    }

    /// Convert the tool catalog to OpenAI function declarations.
    pub fn tools_to_openai(tools: &[ToolDescriptor]) -> Vec<Value> {
        tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description.clone().unwrap_or_default(),
                        "parameters": tool.input_schema,
                    }
                })
            })
            .collect()
    }

    /// Parse the `tool_calls` array of an OpenAI assistant message.
    ///
    /// Arguments arrive as a JSON string; text that is not valid JSON is kept
    /// as a string so schema validation can reject it with context.
    pub fn tool_calls_from_openai(calls: &[Value]) -> Vec<ToolCallRequest> {
        calls
            .iter()
            .enumerate()
            .filter_map(|(index, call)| {
                let function = call.get("function")?;
                let name = function.get("name")?.as_str()?;
                let id = call
                    .get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("call_{index}"));
                let arguments = match function.get("arguments") {
                    Some(Value::String(raw)) if raw.trim().is_empty() => json!({}),
                    Some(Value::String(raw)) => serde_json::from_str(raw)
                        .unwrap_or_else(|_| Value::String(raw.clone())),
                    Some(other) => other.clone(),
                    None => json!({}),
                };
                Some(ToolCallRequest::new(id, name, arguments))
            })
            .collect()
    }
}
