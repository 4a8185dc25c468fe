#[cfg(test)]
#[path = "scheduler_test.rs"]
mod tests;

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::ModeStore;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::ClockBox;
use crate::domain::models::HostEnv;
use crate::domain::models::Mode;
use crate::domain::models::PendingAi;
use crate::domain::models::SessionKey;
use crate::domain::models::SessionRecord;
use crate::domain::models::StateFile;
use crate::domain::models::BLOB_VERSION;
use crate::domain::models::MAX_BLOB_BYTES;
use crate::domain::models::RECORD_VERSION;
use crate::domain::models::STATE_KEY;
use crate::infrastructure::bridge::KvBridge;

/// Raised by any state mutation, consumed by the autosave timer.
pub type DirtyFlag = Arc<AtomicBool>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum FlushReason {
    Autosave,
    CompanionReply,
    ModeSwitch,
    Resume,
    SessionSwitch,
    Teardown,
    UserMessage,
    VisibilityHidden,
}

/// Session-wide progress persisted alongside the mode transcripts.
#[derive(Clone, Debug, Default)]
pub struct SessionMeta {
    pub owner_email: String,
    pub completed_steps: usize,
    pub has_completed_analysis: bool,
}

/// Serializes chat state into the bridge. Mutations never write directly:
/// they raise the shared dirty flag, and state reaches storage either
/// through a debounced autosave (plain web only) or through the forced
/// flush points listed in [`FlushReason`].
pub struct PersistenceScheduler {
    bridge: KvBridge,
    clock: ClockBox,
    dirty: DirtyFlag,
    debounce_millis: u64,
}

impl PersistenceScheduler {
    pub fn new(bridge: KvBridge, clock: ClockBox) -> PersistenceScheduler {
        return PersistenceScheduler {
            bridge,
            clock,
            dirty: Arc::new(AtomicBool::new(false)),
            debounce_millis: Config::get_millis(ConfigKey::AutosaveDebounce),
        };
    }

    /// The flag handed to every mutating service. One flag per scheduler.
    pub fn dirty_flag(&self) -> DirtyFlag {
        return self.dirty.clone();
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    pub fn take_dirty(&self) -> bool {
        return self.dirty.swap(false, Ordering::SeqCst);
    }

    /// Idle window after a mutation before an autosave fires. None on
    /// embedded hosts: frequent large writes can freeze the hosting WebView,
    /// so there state moves only at forced flush points.
    pub fn debounce_window(&self) -> Option<u64> {
        if self.bridge.env() == HostEnv::Embedded {
            return None;
        }
        return Some(self.debounce_millis);
    }

    /// Serializes the session into the shared blob and hands it to the
    /// bridge. Forced reasons push coalesced writes through to the host
    /// immediately; autosaves leave them to the bridge's safety timer.
    ///
    /// Callers own the pending-request invariant: the flush that records a
    /// completed turn must pass `pending: None` so a response is never
    /// persisted both as a transcript entry and as a replayable request.
    pub fn flush(
        &self,
        key: &SessionKey,
        store: &mut ModeStore,
        meta: &SessionMeta,
        pending: Option<&PendingAi>,
        reason: FlushReason,
    ) {
        let now = self.clock.now_millis();
        let mut file = match self.bridge.read(STATE_KEY) {
            Some(raw) => match StateFile::parse(&raw) {
                Ok(file) if file.v == BLOB_VERSION => file,
                Ok(file) => {
                    tracing::warn!(version = file.v, "unknown state format, starting over");
                    StateFile::empty(now)
                }
                Err(err) => {
                    tracing::warn!(error = ?err, "unreadable state blob, starting over");
                    StateFile::empty(now)
                }
            },
            None => StateFile::empty(now),
        };

        // Records are created on the first message send, not on every
        // session the user merely opens.
        let nothing_durable = !store.any_messages()
            && pending.is_none()
            && meta.completed_steps == 0
            && !meta.has_completed_analysis;
        if nothing_durable && file.record(key).is_none() {
            self.dirty.store(false, Ordering::SeqCst);
            return;
        }

        let record = SessionRecord {
            v: RECORD_VERSION,
            owner_email: meta.owner_email.clone(),
            selected_mode: Some(store.active()),
            completed_steps: meta.completed_steps,
            has_completed_analysis: meta.has_completed_analysis,
            mode_states: store.snapshot(),
            pending_ai: pending.cloned(),
            saved_at: now,
        };
        file.upsert(key, record);
        file.saved_at = now;

        let raw = match serde_json::to_string(&file) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::error!(error = ?err, "failed to serialize state");
                return;
            }
        };
        if raw.len() > MAX_BLOB_BYTES {
            tracing::error!(
                len = raw.len(),
                "state grew past the size limit, keeping the previous blob"
            );
            return;
        }

        self.bridge.write(STATE_KEY, &raw);
        if reason != FlushReason::Autosave {
            self.bridge.flush_pending();
        }

        self.dirty.store(false, Ordering::SeqCst);
        tracing::debug!(session = key.as_str(), reason = %reason, "flushed session state");
    }

    /// Mirrors the selected mode into its own small key so the next mount
    /// can restore it without parsing the blob.
    pub fn write_mode_key(&self, key: &SessionKey, mode: Mode) {
        self.bridge.write(&key.mode_key(), &mode.to_string());
    }

    /// User-invoked local reset. Tombstones the whole state blob, every
    /// session in it, plus the current session's mode key.
    pub fn clear(&self, key: &SessionKey) {
        self.bridge.reset_key(STATE_KEY);
        self.bridge.reset_key(&key.mode_key());
        self.dirty.store(false, Ordering::SeqCst);
    }
}
