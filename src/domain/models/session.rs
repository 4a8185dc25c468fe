#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

use std::collections::HashMap;

use anyhow::bail;
use anyhow::Result;
use serde_derive::Deserialize;
use serde_derive::Serialize;
use strum::IntoEnumIterator;

use super::HistoryEntry;
use super::Mode;
use super::ModeState;

/// Host storage key for the whole multi-session state blob.
pub const STATE_KEY: &str = "chat_state_v1";
/// Prefix for the small per-session key that mirrors the selected mode.
pub const MODE_KEY_PREFIX: &str = "chat_mode_v1:";
/// Some hosts reject empty string values, so cleared keys store this instead.
pub const TOMBSTONE: &str = "0";
/// Owner segment used when no identity has been resolved yet.
pub const LEGACY_OWNER: &str = "legacy";

pub const BLOB_VERSION: u32 = 2;
pub const RECORD_VERSION: u32 = 1;
/// Blobs larger than this are treated as corrupt rather than parsed.
pub const MAX_BLOB_BYTES: usize = 1024 * 1024;

/// `<ownerIdentity>:<projectId>` with a `legacy` owner fallback. Owner
/// identities are emails and never contain a colon, so the first colon always
/// splits the two halves.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionKey {
    raw: String,
}

impl SessionKey {
    pub fn new(owner: &str, project: &str) -> SessionKey {
        return SessionKey {
            raw: format!("{owner}:{project}"),
        };
    }

    pub fn as_str(&self) -> &str {
        return &self.raw;
    }

    pub fn owner(&self) -> &str {
        if let Some((owner, _)) = self.raw.split_once(':') {
            return owner;
        }
        return &self.raw;
    }

    pub fn mode_key(&self) -> String {
        return format!("{MODE_KEY_PREFIX}{raw}", raw = self.raw);
    }
}

/// Snapshot of an in-flight backend request, persisted so the next mount can
/// finish the turn instead of losing it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PendingAi {
    #[serde(rename = "messageText")]
    pub message_text: String,
    pub mode: Mode,
    #[serde(rename = "startedAt")]
    pub started_at: i64,
    #[serde(rename = "thinkingId")]
    pub thinking_id: String,
    #[serde(rename = "conversationHistory", default)]
    pub conversation_history: Vec<HistoryEntry>,
    #[serde(rename = "responseText", default, skip_serializing_if = "Option::is_none")]
    pub response_text: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ModeStates {
    #[serde(default)]
    pub guided: ModeState,
    #[serde(default)]
    pub assisted: ModeState,
    #[serde(default)]
    pub expert: ModeState,
}

impl ModeStates {
    pub fn get(&self, mode: Mode) -> &ModeState {
        match mode {
            Mode::Guided => return &self.guided,
            Mode::Assisted => return &self.assisted,
            Mode::Expert => return &self.expert,
        }
    }

    pub fn get_mut(&mut self, mode: Mode) -> &mut ModeState {
        match mode {
            Mode::Guided => return &mut self.guided,
            Mode::Assisted => return &mut self.assisted,
            Mode::Expert => return &mut self.expert,
        }
    }

    pub fn any_messages(&self) -> bool {
        return Mode::iter().any(|mode| return !self.get(mode).messages.is_empty());
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionRecord {
    pub v: u32,
    #[serde(rename = "ownerEmail", default)]
    pub owner_email: String,
    #[serde(rename = "selectedMode", default, skip_serializing_if = "Option::is_none")]
    pub selected_mode: Option<Mode>,
    #[serde(rename = "completedSteps", default)]
    pub completed_steps: usize,
    #[serde(rename = "hasCompletedAnalysis", default)]
    pub has_completed_analysis: bool,
    #[serde(rename = "modeStates", default)]
    pub mode_states: ModeStates,
    #[serde(rename = "pendingAi", default, skip_serializing_if = "Option::is_none")]
    pub pending_ai: Option<PendingAi>,
    #[serde(rename = "savedAt", default)]
    pub saved_at: i64,
}

impl SessionRecord {
    /// Picks the mode to re-activate after hydration. An explicit hint (the
    /// companion mode key) wins, then the recorded selection, then whichever
    /// mode holds the most messages. Ties prefer Guided over Assisted over
    /// Expert.
    pub fn resolve_active_mode(&self, hint: Option<Mode>) -> Mode {
        if let Some(mode) = hint {
            return mode;
        }
        if let Some(mode) = self.selected_mode {
            return mode;
        }

        let mut best = Mode::Guided;
        let mut best_count = 0;
        for mode in Mode::iter() {
            let count = self.mode_states.get(mode).messages.len();
            let wins = count > best_count
                || (count == best_count && mode.tie_break_rank() < best.tie_break_rank());
            if wins {
                best = mode;
                best_count = count;
            }
        }

        return best;
    }
}

/// The single blob stored under [`STATE_KEY`]: every session this install has
/// seen, keyed by session key string.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StateFile {
    pub v: u32,
    #[serde(default)]
    pub sessions: HashMap<String, SessionRecord>,
    #[serde(rename = "savedAt", default)]
    pub saved_at: i64,
}

impl StateFile {
    pub fn empty(now_millis: i64) -> StateFile {
        return StateFile {
            v: BLOB_VERSION,
            sessions: HashMap::new(),
            saved_at: now_millis,
        };
    }

    /// Strict parse used on every read path. Oversized or unreadable blobs
    /// are errors so callers can reset the key instead of crashing hydration.
    pub fn parse(raw: &str) -> Result<StateFile> {
        if raw.len() > MAX_BLOB_BYTES {
            bail!(
                "state blob is {len} bytes, over the {MAX_BLOB_BYTES} byte limit",
                len = raw.len()
            );
        }

        let file: StateFile = serde_json::from_str(raw)?;
        return Ok(file);
    }

    pub fn record(&self, key: &SessionKey) -> Option<&SessionRecord> {
        return self.sessions.get(key.as_str());
    }

    pub fn upsert(&mut self, key: &SessionKey, record: SessionRecord) {
        self.sessions.insert(key.as_str().to_string(), record);
    }
}
