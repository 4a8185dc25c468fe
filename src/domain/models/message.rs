#[cfg(test)]
#[path = "message_test.rs"]
mod tests;

use serde_derive::Deserialize;
use serde_derive::Serialize;
use uuid::Uuid;

use super::Author;

fn is_false(value: &bool) -> bool {
    return !value;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    #[default]
    Normal,
    Error,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Author,
    pub content: String,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
    #[serde(rename = "isTyping", default, skip_serializing_if = "is_false")]
    pub is_typing: bool,
    #[serde(rename = "isThinking", default, skip_serializing_if = "is_false")]
    pub is_thinking: bool,
    #[serde(skip)]
    mtype: MessageType,
}

impl Message {
    pub fn new(role: Author, content: &str, now_millis: i64) -> Message {
        return Message {
            id: Message::create_id(now_millis),
            role,
            content: content.to_string(),
            created_at: now_millis,
            is_typing: false,
            is_thinking: false,
            mtype: MessageType::Normal,
        };
    }

    pub fn new_with_type(
        role: Author,
        mtype: MessageType,
        content: &str,
        now_millis: i64,
    ) -> Message {
        let mut message = Message::new(role, content, now_millis);
        message.mtype = mtype;
        return message;
    }

    /// Placeholder bubble shown while a companion reply is in flight. Its id
    /// is recorded in the pending request so a later mount can swap the
    /// response in without appending a duplicate.
    pub fn thinking(now_millis: i64) -> Message {
        let mut message = Message::new(Author::Companion, "…", now_millis);
        message.is_thinking = true;
        return message;
    }

    /// Ids sort roughly by creation time so transcripts merge predictably.
    pub fn create_id(now_millis: i64) -> String {
        let uuid = Uuid::new_v4().to_string();
        let frag = uuid.split('-').next().unwrap_or("0").to_string();
        return format!("{now_millis:x}-{frag}");
    }

    pub fn message_type(&self) -> MessageType {
        return self.mtype;
    }

    /// Typing is a live-render flag only and is never written to storage.
    pub fn settle(&mut self) {
        self.is_typing = false;
    }

    pub fn is_persistable(&self) -> bool {
        return !self.content.trim().is_empty();
    }
}
