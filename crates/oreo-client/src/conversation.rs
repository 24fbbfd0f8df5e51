//! Conversation state: ordered message history with transactional turns.

use crate::types::{Message, Role};

/// Marks a user turn that has been appended but not yet answered.
///
/// Resolved by exactly one of [`Conversation::commit`] or
/// [`Conversation::rollback`].
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a pending turn must be committed or rolled back"]
pub struct PendingTurn {
    /// History length before the user turn was appended
    checkpoint: usize,
}

/// Ordered message history
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    /// Create a conversation, optionally led by a system turn
    pub fn new(system_prompt: Option<String>) -> Self {
        let messages = system_prompt
            .map(|prompt| vec![Message::system(prompt)])
            .unwrap_or_default();
        Self { messages }
    }

    /// All messages in append order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Leading system prompt, if still present
    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .first()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
    }

    /// Copy of the history, limited to the last `last_n` messages if given.
    /// A limit of zero means no limit.
    pub fn snapshot(&self, last_n: Option<usize>) -> Vec<Message> {
        match last_n {
            Some(n) if n > 0 => {
                let start = self.messages.len().saturating_sub(n);
                self.messages[start..].to_vec()
            }
            _ => self.messages.clone(),
        }
    }

    /// Append a user turn ahead of a request
    pub fn begin(&mut self, prompt: impl Into<String>) -> PendingTurn {
        let checkpoint = self.messages.len();
        self.messages.push(Message::user(prompt));
        PendingTurn { checkpoint }
    }

    /// Record the reply to a pending turn
    pub fn commit(&mut self, turn: PendingTurn, reply: Message) {
        debug_assert_eq!(self.messages.len(), turn.checkpoint + 1);
        self.messages.push(reply);
    }

    /// Resolve a pending turn without a reply, keeping the user turn
    pub fn abandon(&mut self, turn: PendingTurn) {
        debug_assert_eq!(self.messages.len(), turn.checkpoint + 1);
    }

    /// Remove the pending user turn, restoring the history from before `begin`
    pub fn rollback(&mut self, turn: PendingTurn) {
        self.messages.truncate(turn.checkpoint);
    }

    /// Drop every message, the system prompt included
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
