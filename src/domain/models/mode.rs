#[cfg(test)]
#[path = "mode_test.rs"]
mod tests;

use serde_derive::Deserialize;
use serde_derive::Serialize;
use strum::EnumIter;

use super::Message;

/// Per-mode transcripts are trimmed to this many messages before storage.
pub const MODE_MESSAGE_CAP: usize = 200;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, strum::Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Guided,
    Assisted,
    Expert,
}

impl Mode {
    pub fn parse(value: &str) -> Option<Mode> {
        match value.trim() {
            "guided" => return Some(Mode::Guided),
            "assisted" => return Some(Mode::Assisted),
            "expert" => return Some(Mode::Expert),
            _ => return None,
        }
    }

    /// Tie-break order when hydration has to guess the active mode: the more
    /// hand-holding a mode offers, the more likely it was the one in use.
    pub fn tie_break_rank(&self) -> usize {
        match self {
            Mode::Guided => return 0,
            Mode::Assisted => return 1,
            Mode::Expert => return 2,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ModeState {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(rename = "currentStep", default)]
    pub current_step: usize,
    #[serde(rename = "scrollOffset", default)]
    pub scroll_offset: f64,
}

impl ModeState {
    pub fn push_capped(&mut self, message: Message) {
        self.messages.push(message);
        if self.messages.len() > MODE_MESSAGE_CAP {
            let overflow = self.messages.len() - MODE_MESSAGE_CAP;
            self.messages.drain(..overflow);
        }
    }

    /// Drops unpersistable entries and settles typing flags. Applied both to
    /// restored snapshots (storage written by older builds may be dirty) and
    /// to snapshots about to be written.
    pub fn sanitize(&mut self) {
        self.messages.retain(|message| return message.is_persistable());
        for message in self.messages.iter_mut() {
            message.settle();
        }
    }
}
