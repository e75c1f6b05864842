use crate::domain::skill::Skill;
use crate::domain::types::{
    ChatMessage, ConversationTurn, MessageRole, ToolCallRecord, ToolOutcome,
};

/// Skill content first, then the explicit system prompt.
pub(crate) fn compose_system_prompt(
    skill: Option<&Skill>,
    system_prompt: Option<&str>,
) -> Option<String> {
    let parts: Vec<&str> = skill
        .map(|skill| skill.content.trim())
        .into_iter()
        .chain(system_prompt.map(str::trim))
        .filter(|part| !part.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

/// Prior messages, then the system instructions, then the new prompt.
///
/// A system message already present in `prior` with identical content is
/// not repeated.
pub(crate) fn assemble(prior: &[ChatMessage], system: Option<&str>, prompt: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(prior.len() + 2);
    messages.extend_from_slice(prior);
    if let Some(system) = system {
        let repeated = prior
            .iter()
            .any(|message| message.role == MessageRole::System && message.content == system);
        if !repeated {
            messages.push(ChatMessage::system(system));
        }
    }
    messages.push(ChatMessage::user(prompt));
    messages
}

/// Rebuild trace turns from stored messages, pairing each requested tool
/// call with the tool message answering it.
pub(crate) fn turns_from_messages(messages: &[ChatMessage]) -> Vec<ConversationTurn> {
    messages
        .iter()
        .enumerate()
        .map(|(index, message)| {
            let tool_calls = message
                .tool_calls
                .iter()
                .map(|call| {
                    let reply = messages[index + 1..].iter().find(|candidate| {
                        candidate.role == MessageRole::Tool
                            && candidate.tool_call_id.as_deref() == Some(call.id.as_str())
                    });
                    let outcome = match reply {
                        Some(reply) if reply.is_error => ToolOutcome::Error(
                            reply
                                .content
                                .strip_prefix("Error: ")
                                .unwrap_or(&reply.content)
                                .to_string(),
                        ),
                        Some(reply) => ToolOutcome::Result(reply.content.clone()),
                        None => ToolOutcome::Error("no result recorded".to_string()),
                    };
                    ToolCallRecord {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                        outcome,
                        duration_ms: 0,
                    }
                })
                .collect();
            ConversationTurn {
                role: message.role,
                content: message.content.clone(),
                tool_calls,
            }
        })
        .collect()
}
