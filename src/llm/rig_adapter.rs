//! Bridge from rig's `CompletionModel` to our `LlmProvider` trait.

use async_trait::async_trait;
use rig::completion::CompletionModel;
use rig::completion::message::{AssistantContent, Message};

use crate::error::LlmError;
use crate::llm::provider::{ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, Role};

/// Anthropic requires an explicit limit on every request.
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Wraps any rig completion model.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let (history, prompt) = split_conversation(&request.messages).ok_or_else(|| {
            LlmError::RequestFailed {
                provider: self.model_name.clone(),
                reason: "request has no user message".to_string(),
            }
        })?;

        let mut builder = self
            .model
            .completion_request(prompt)
            .messages(history)
            .max_tokens(u64::from(request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)));
        if let Some(system) = request.system_prompt() {
            builder = builder.preamble(system);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(f64::from(temperature));
        }

        let response = self
            .model
            .completion(builder.build())
            .await
            .map_err(|e| map_completion_error(&self.model_name, e))?;

        let content = collect_text(response.choice.iter());
        if content.trim().is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: self.model_name.clone(),
                reason: "response contained no text content".to_string(),
            });
        }

        Ok(CompletionResponse {
            content,
            input_tokens: saturate(response.usage.input_tokens),
            output_tokens: saturate(response.usage.output_tokens),
        })
    }
}

/// Split into (history, prompt). System messages go to the preamble instead.
fn split_conversation(messages: &[ChatMessage]) -> Option<(Vec<Message>, Message)> {
    let mut turns: Vec<Message> = messages
        .iter()
        .filter_map(|m| match m.role {
            Role::System => None,
            Role::User => Some(Message::user(m.content.clone())),
            Role::Assistant => Some(Message::assistant(m.content.clone())),
        })
        .collect();
    let last_is_user = messages
        .iter()
        .rev()
        .find(|m| m.role != Role::System)
        .is_some_and(|m| m.role == Role::User);
    if !last_is_user {
        return None;
    }
    let prompt = turns.pop()?;
    Some((turns, prompt))
}

fn collect_text<'a>(parts: impl Iterator<Item = &'a AssistantContent>) -> String {
    parts
        .filter_map(|part| match part {
            AssistantContent::Text(text) => Some(text.text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

fn map_completion_error(provider: &str, e: rig::completion::CompletionError) -> LlmError {
    use rig::completion::CompletionError;

    match e {
        CompletionError::JsonError(e) => LlmError::InvalidResponse {
            provider: provider.to_string(),
            reason: e.to_string(),
        },
        CompletionError::ResponseError(reason) => LlmError::InvalidResponse {
            provider: provider.to_string(),
            reason,
        },
        other => LlmError::RequestFailed {
            provider: provider.to_string(),
            reason: other.to_string(),
        },
    }
}

fn saturate(tokens: u64) -> u32 {
    u32::try_from(tokens).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_messages_stay_out_of_the_conversation() {
        let messages = vec![
            ChatMessage::system("Categorize this email"),
            ChatMessage::user("Earlier question"),
            ChatMessage::assistant("Earlier answer"),
            ChatMessage::user("I'd like to apply"),
        ];
        let (history, _prompt) = split_conversation(&messages).unwrap();
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn conversation_must_end_with_user() {
        assert!(split_conversation(&[ChatMessage::system("only a preamble")]).is_none());
        assert!(
            split_conversation(&[ChatMessage::user("hi"), ChatMessage::assistant("hello")])
                .is_none()
        );
    }

    #[test]
    fn text_parts_are_joined() {
        let parts = [
            AssistantContent::text("new_"),
            AssistantContent::text("application"),
        ];
        assert_eq!(collect_text(parts.iter()), "new_application");
    }

    #[test]
    fn oversized_usage_saturates() {
        assert_eq!(saturate(12), 12);
        assert_eq!(saturate(u64::MAX), u32::MAX);
    }
}
