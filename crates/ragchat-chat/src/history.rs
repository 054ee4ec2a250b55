//! Conversation memory the chain reads from and appends to.

use serde::Serialize;

use crate::types::ChatMessage;

/// Messages exchanged with the model, oldest first.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChatHistory {
    messages: Vec<ChatMessage>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one question/answer exchange.
    pub fn add_exchange(&mut self, question: &str, answer: &str) {
        self.messages.push(ChatMessage::user(question));
        self.messages.push(ChatMessage::assistant(answer));
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// The last `n` messages, oldest first.
    pub fn recent(&self, n: usize) -> &[ChatMessage] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    #[test]
    fn test_recent_window() {
        let mut history = ChatHistory::new();
        history.add_exchange("q1", "a1");
        history.add_exchange("q2", "a2");

        assert_eq!(history.len(), 4);
        let recent = history.recent(3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].content, "a1");
        assert_eq!(recent[2].role, Role::Assistant);
        assert_eq!(history.recent(10).len(), 4);
    }
}
