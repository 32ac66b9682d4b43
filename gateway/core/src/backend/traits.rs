//! Provider Client Trait
//!
//! Trait definition for LLM providers. The relay works against this
//! abstraction; the concrete provider (Together.AI, Ollama, Hugging Face)
//! is selected once at startup from configuration, never branched on at
//! relay time.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::conversation::{Role, Turn};

/// Token stream events from a provider.
#[derive(Clone, Debug)]
pub enum StreamToken {
    /// A token from the response, in generation order.
    Token(String),
    /// Response completed successfully.
    Complete {
        /// The complete message (may differ from concatenated tokens).
        message: String,
    },
    /// Error occurred during streaming.
    Error(String),
}

/// LLM provider client.
///
/// Implement this trait to add support for another provider. `generate`
/// returns a channel receiver delivering tokens as they arrive; dropping
/// the receiver cancels the in-flight stream (the producer task stops on
/// its first failed send).
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Provider name (e.g. "Together.AI", "Ollama").
    fn name(&self) -> &str;

    /// Check whether the provider is reachable.
    async fn health_check(&self) -> bool;

    /// Send the accumulated conversation and stream the response.
    async fn generate(&self, turns: &[Turn]) -> anyhow::Result<mpsc::Receiver<StreamToken>>;
}

/// Build an OpenAI-style `messages` array from a system prompt and the
/// turn sequence. Shared by the chat-completions providers.
#[must_use]
pub fn chat_messages(system_prompt: &str, turns: &[Turn]) -> Vec<serde_json::Value> {
    let mut messages = Vec::with_capacity(turns.len() + 1);
    if !system_prompt.is_empty() {
        messages.push(serde_json::json!({
            "role": "system",
            "content": system_prompt,
        }));
    }
    for turn in turns {
        let role = match turn.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        messages.push(serde_json::json!({
            "role": role,
            "content": turn.content,
        }));
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_messages_shape() {
        let turns = vec![Turn::user("Hello"), Turn::assistant("Hi!"), Turn::user("How?")];
        let messages = chat_messages("Be helpful", &turns);

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "Be helpful");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(messages[3]["content"], "How?");
    }

    #[test]
    fn test_empty_system_prompt_is_omitted() {
        let messages = chat_messages("", &[Turn::user("Hello")]);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
    }
}
