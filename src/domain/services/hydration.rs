#[cfg(test)]
#[path = "hydration_test.rs"]
mod tests;

use serde_json::Value;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::SessionKey;
use crate::domain::models::BLOB_VERSION;
use crate::domain::models::RECORD_VERSION;
use crate::domain::models::TOMBSTONE;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateState {
    Unknown,
    Closed,
    Open,
}

/// What a cheap look at the cached state blob could tell us about the
/// current session before running a full hydration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Peek {
    HasMessages,
    Empty,
    Unavailable,
}

/// Withholds the scripted opener until it is known whether persisted
/// messages exist for the session. The host loads storage asynchronously,
/// so without this the opener would flash on screen and then be replaced
/// by restored history.
pub struct HydrationGate {
    state: GateState,
    empty_peek_millis: u64,
    fallback_millis: u64,
}

impl Default for HydrationGate {
    fn default() -> HydrationGate {
        return HydrationGate::new(
            Config::get_millis(ConfigKey::GateEmptyPeekDelay),
            Config::get_millis(ConfigKey::GateFallbackDelay),
        );
    }
}

impl HydrationGate {
    pub fn new(empty_peek_millis: u64, fallback_millis: u64) -> HydrationGate {
        return HydrationGate {
            state: GateState::Unknown,
            empty_peek_millis,
            fallback_millis,
        };
    }

    pub fn state(&self) -> GateState {
        return self.state;
    }

    pub fn is_open(&self) -> bool {
        return self.state == GateState::Open;
    }

    /// Back to undecided, used when the session key changes.
    pub fn reset(&mut self) {
        self.state = GateState::Unknown;
    }

    /// Feeds the result of peeking at the cached blob. Returns how long to
    /// wait before assuming the session is empty, or None when the gate
    /// settled immediately. A peek that finds messages closes the gate
    /// outright: no timer reopens it, only a completed hydration does.
    pub fn on_session_resolved(&mut self, peek: Peek) -> Option<u64> {
        match peek {
            Peek::HasMessages => {
                self.state = GateState::Closed;
                return None;
            }
            Peek::Empty => {
                self.state = GateState::Unknown;
                return Some(self.empty_peek_millis);
            }
            Peek::Unavailable => {
                self.state = GateState::Unknown;
                return Some(self.fallback_millis);
            }
        }
    }

    /// The wait expired without a hydration landing. Opens only from
    /// Unknown; a gate closed by a late peek stays closed.
    pub fn timer_elapsed(&mut self) -> bool {
        if self.state == GateState::Unknown {
            self.state = GateState::Open;
            return true;
        }
        return false;
    }

    /// Hydration finished, with or without messages, so rendering can
    /// proceed. Returns whether this call did the opening.
    pub fn force_open(&mut self) -> bool {
        if self.state == GateState::Open {
            return false;
        }

        self.state = GateState::Open;
        return true;
    }
}

/// Answers "does this session have saved messages" from the raw cached
/// blob without deserializing mode states. Anything unreadable counts as
/// empty; only a missing cache entry counts as unavailable.
pub fn peek_record(raw: Option<&str>, key: &SessionKey) -> Peek {
    let raw = match raw {
        Some(raw) => raw,
        None => return Peek::Unavailable,
    };

    if raw == TOMBSTONE {
        return Peek::Empty;
    }

    let blob = match serde_json::from_str::<Value>(raw) {
        Ok(blob) => blob,
        Err(_) => return Peek::Empty,
    };

    if blob["v"].as_u64() != Some(u64::from(BLOB_VERSION)) {
        return Peek::Empty;
    }

    let record = &blob["sessions"][key.as_str()];
    if record["v"].as_u64() != Some(u64::from(RECORD_VERSION)) {
        return Peek::Empty;
    }

    let states = &record["modeStates"];
    for mode in ["guided", "assisted", "expert"] {
        if let Some(messages) = states[mode]["messages"].as_array() {
            if !messages.is_empty() {
                return Peek::HasMessages;
            }
        }
    }

    return Peek::Empty;
}
