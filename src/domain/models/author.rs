use serde_derive::Deserialize;
use serde_derive::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    User,
    #[serde(rename = "assistant")]
    Companion,
}

impl Author {
    /// Tag used in the `conversationHistory` array sent to the backend, which
    /// names the two sides differently than the persisted transcript does.
    pub fn history_tag(&self) -> &'static str {
        match self {
            Author::User => return "user",
            Author::Companion => return "ai",
        }
    }
}
