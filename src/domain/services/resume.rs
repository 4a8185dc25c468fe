#[cfg(test)]
#[path = "resume_test.rs"]
mod tests;

use std::collections::HashSet;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::HistoryEntry;
use crate::domain::models::Mode;
use crate::domain::models::PendingAi;
use crate::domain::models::SessionKey;

/// How to finish a turn that was interrupted by a teardown.
#[derive(Clone, Debug)]
pub enum ResumeAction {
    /// The reply arrived before the old mount died but was never rendered.
    /// It replaces the thinking placeholder directly, with no typing
    /// animation: replaying word-by-word pacing for a known response only
    /// wastes time.
    Splice {
        mode: Mode,
        thinking_id: String,
        response_text: String,
    },
    /// The request never completed. Re-issue it from the snapshotted
    /// history.
    Retry {
        mode: Mode,
        thinking_id: String,
        message_text: String,
        history: Vec<HistoryEntry>,
    },
}

/// Decides, once per session per mount, whether a persisted pending request
/// should be finished automatically.
pub struct ResumeController {
    attempted: HashSet<String>,
    mounted_at: i64,
    guard_millis: u64,
}

impl ResumeController {
    pub fn new(mounted_at: i64) -> ResumeController {
        return ResumeController::with_guard(
            mounted_at,
            Config::get_millis(ConfigKey::ResumeGuardWindow),
        );
    }

    pub fn with_guard(mounted_at: i64, guard_millis: u64) -> ResumeController {
        return ResumeController {
            attempted: HashSet::new(),
            mounted_at,
            guard_millis,
        };
    }

    /// Inspects the hydrated pending request. Returns at most one action per
    /// session for the lifetime of this mount, and nothing at all while a
    /// send is in flight here. A request younger than the guard window was
    /// started by this mount and is left to finish on its own.
    pub fn evaluate(
        &mut self,
        key: &SessionKey,
        pending: Option<&PendingAi>,
        request_in_flight: bool,
    ) -> Option<ResumeAction> {
        let pending = pending?;
        if request_in_flight || self.attempted.contains(key.as_str()) {
            return None;
        }

        if let Some(response) = pending.response_text.as_ref() {
            self.attempted.insert(key.as_str().to_string());
            return Some(ResumeAction::Splice {
                mode: pending.mode,
                thinking_id: pending.thinking_id.clone(),
                response_text: response.clone(),
            });
        }

        let age = self.mounted_at - pending.started_at;
        if age > self.guard_millis as i64 {
            self.attempted.insert(key.as_str().to_string());
            return Some(ResumeAction::Retry {
                mode: pending.mode,
                thinking_id: pending.thinking_id.clone(),
                message_text: pending.message_text.clone(),
                history: pending.conversation_history.clone(),
            });
        }

        return None;
    }

    /// The user pressed the resume affordance. Manual requests skip the
    /// once-per-mount bookkeeping.
    pub fn manual(&self, pending: &PendingAi) -> ResumeAction {
        return ResumeAction::Retry {
            mode: pending.mode,
            thinking_id: pending.thinking_id.clone(),
            message_text: pending.message_text.clone(),
            history: pending.conversation_history.clone(),
        };
    }
}
