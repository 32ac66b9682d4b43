//! Conversation Memory
//!
//! The per-connection turn sequence the relay feeds to the provider.
//! Memory lives exactly as long as the socket: it is cleared by the
//! `LOGOUT` control frame and discarded on disconnect. Nothing here is
//! persisted.

use serde::{Deserialize, Serialize};

/// Who produced a turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// The connected client.
    User,
    /// The LLM provider.
    Assistant,
}

/// One conversation turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Who produced this turn.
    pub role: Role,
    /// Turn content.
    pub content: String,
}

impl Turn {
    /// Create a user turn.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant turn.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// In-memory turn sequence owned by one relay connection.
///
/// An assistant response under streaming is accumulated separately and
/// only becomes a turn once the provider completes it; a cancelled or
/// failed stream leaves no trace in the sequence.
#[derive(Debug, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
    streaming: Option<String>,
    content_bytes: usize,
    max_turns: usize,
    max_content_bytes: usize,
}

impl Conversation {
    /// Create an unbounded conversation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a conversation with limits (0 = unlimited).
    #[must_use]
    pub fn with_limits(max_turns: usize, max_content_bytes: usize) -> Self {
        Self {
            max_turns,
            max_content_bytes,
            ..Self::default()
        }
    }

    /// Append a user turn.
    pub fn push_user(&mut self, content: impl Into<String>) {
        let turn = Turn::user(content);
        self.content_bytes += turn.content.len();
        self.turns.push(turn);
        self.prune_if_needed();
    }

    /// Begin accumulating a streamed assistant response.
    pub fn begin_assistant(&mut self) {
        self.streaming = Some(String::new());
    }

    /// Append streamed text to the in-flight assistant response.
    pub fn append_streaming(&mut self, text: &str) {
        if let Some(ref mut buf) = self.streaming {
            buf.push_str(text);
        }
    }

    /// Complete the in-flight response and append it as an assistant
    /// turn. `final_content`, when present, replaces the accumulated
    /// text (providers may return a cleaned-up complete message).
    pub fn complete_assistant(&mut self, final_content: Option<String>) {
        let Some(accumulated) = self.streaming.take() else {
            return;
        };
        let content = final_content.unwrap_or(accumulated);
        self.content_bytes += content.len();
        self.turns.push(Turn::assistant(content));
        self.prune_if_needed();
    }

    /// Drop the in-flight response without recording a turn.
    pub fn cancel_assistant(&mut self) {
        self.streaming = None;
    }

    /// Whether a response is currently being streamed.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.streaming.is_some()
    }

    /// The recorded turn sequence.
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Number of recorded turns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the sequence is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Total recorded content bytes.
    #[must_use]
    pub fn content_bytes(&self) -> usize {
        self.content_bytes
    }

    /// Clear all memory. This is the `LOGOUT` semantics: turns and any
    /// in-flight response are gone.
    pub fn clear(&mut self) {
        self.turns.clear();
        self.streaming = None;
        self.content_bytes = 0;
    }

    /// Drop oldest turns until within limits.
    fn prune_if_needed(&mut self) {
        if self.max_turns > 0 {
            while self.turns.len() > self.max_turns {
                let removed = self.turns.remove(0);
                self.content_bytes = self.content_bytes.saturating_sub(removed.content.len());
            }
        }
        if self.max_content_bytes > 0 {
            while self.content_bytes > self.max_content_bytes && !self.turns.is_empty() {
                let removed = self.turns.remove(0);
                self.content_bytes = self.content_bytes.saturating_sub(removed.content.len());
            }
        }
    }
}
