use serde::{Deserialize, Serialize};

/// A single role-tagged turn.
///
/// Serializes as `{"role": "...", "content": "..."}`, the shape chat
/// completion APIs expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "content", rename_all = "lowercase")]
pub enum Message {
    System(String),
    User(String),
    Assistant(String),
}

impl Message {
    pub fn content(&self) -> &str {
        match self {
            Message::System(s) | Message::User(s) | Message::Assistant(s) => s,
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Message::System(_) => "system",
            Message::User(_) => "user",
            Message::Assistant(_) => "assistant",
        }
    }
}

/// Ordered sequence of turns exchanged with a model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation(Vec<Message>);

impl Conversation {
    pub fn new(messages: Vec<Message>) -> Self {
        Self(messages)
    }

    pub fn messages(&self) -> &[Message] {
        &self.0
    }

    pub fn last(&self) -> Option<&Message> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append the model's reply, returning the extended conversation
    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.0.push(Message::Assistant(reply.into()));
        self
    }

    /// Content of the final turn, if that turn came from the model
    pub fn reply(&self) -> Option<&str> {
        match self.last() {
            Some(Message::Assistant(s)) => Some(s),
            _ => None,
        }
    }
}

impl From<Vec<Message>> for Conversation {
    fn from(messages: Vec<Message>) -> Self {
        Self(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_role_and_content() {
        let json = serde_json::to_value(Message::System("be brief".into())).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"role": "system", "content": "be brief"})
        );
    }

    #[test]
    fn reply_requires_assistant_turn() {
        let c = Conversation::new(vec![Message::User("hi".into())]);
        assert_eq!(c.reply(), None);
        let c = c.with_reply("hello");
        assert_eq!(c.reply(), Some("hello"));
        assert_eq!(c.len(), 2);
    }
}
