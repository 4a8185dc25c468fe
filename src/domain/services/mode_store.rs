#[cfg(test)]
#[path = "mode_store_test.rs"]
mod tests;

use std::sync::atomic::Ordering;

use strum::IntoEnumIterator;

use super::DirtyFlag;
use crate::domain::models::Message;
use crate::domain::models::Mode;
use crate::domain::models::ModeStates;
use crate::domain::models::SessionRecord;
use crate::domain::models::MODE_MESSAGE_CAP;

/// Holds the three per-mode transcripts plus a live working list for the
/// active mode. The live list is the render source of truth and can run
/// ahead of the stored snapshot mid-turn; it is folded back in whenever a
/// snapshot is taken or the active mode changes.
///
/// Every mutation raises the shared dirty flag for the persistence
/// scheduler. Nothing here writes storage directly.
pub struct ModeStore {
    states: ModeStates,
    active: Mode,
    live: Vec<Message>,
    dirty: DirtyFlag,
}

impl ModeStore {
    pub fn new(dirty: DirtyFlag) -> ModeStore {
        return ModeStore {
            states: ModeStates::default(),
            active: Mode::Guided,
            live: vec![],
            dirty,
        };
    }

    pub fn active(&self) -> Mode {
        return self.active;
    }

    pub fn active_messages(&self) -> &[Message] {
        return &self.live;
    }

    pub fn any_messages(&self) -> bool {
        return !self.live.is_empty() || self.states.any_messages();
    }

    /// Current list for any mode, live for the active one.
    pub fn mode_messages(&self, mode: Mode) -> Vec<Message> {
        if mode == self.active {
            return self.live.clone();
        }
        return self.states.get(mode).messages.clone();
    }

    /// Swaps the active mode, folding the live list into the outgoing mode's
    /// snapshot first so nothing typed mid-turn is lost.
    pub fn set_active(&mut self, mode: Mode) -> bool {
        if mode == self.active {
            return false;
        }

        self.fold_live();
        self.active = mode;
        self.live = self.states.get(mode).messages.clone();
        self.mark_dirty();
        return true;
    }

    pub fn append_live(&mut self, message: Message) {
        self.live.push(message);
        self.cap_live();
        self.mark_dirty();
    }

    /// Appends to any mode. Targeting the active mode goes through the live
    /// list; a background mode (resume finishing an interrupted turn there)
    /// lands straight in its snapshot.
    pub fn append_message(&mut self, mode: Mode, message: Message) {
        if mode == self.active {
            self.append_live(message);
            return;
        }

        self.states.get_mut(mode).push_capped(message);
        self.mark_dirty();
    }

    pub fn remove_message(&mut self, mode: Mode, id: &str) -> bool {
        let removed = {
            if mode == self.active {
                let before = self.live.len();
                self.live.retain(|message| return message.id != id);
                before != self.live.len()
            } else {
                let messages = &mut self.states.get_mut(mode).messages;
                let before = messages.len();
                messages.retain(|message| return message.id != id);
                before != messages.len()
            }
        };

        if removed {
            self.mark_dirty();
        }
        return removed;
    }

    pub fn advance_step(&mut self, max_steps: usize) {
        let state = self.states.get_mut(self.active);
        if state.current_step < max_steps {
            state.current_step += 1;
            self.mark_dirty();
        }
    }

    pub fn current_step(&self, mode: Mode) -> usize {
        return self.states.get(mode).current_step;
    }

    pub fn set_scroll_offset(&mut self, mode: Mode, offset: f64) {
        let state = self.states.get_mut(mode);
        if (state.scroll_offset - offset).abs() > f64::EPSILON {
            state.scroll_offset = offset;
            self.mark_dirty();
        }
    }

    /// Replaces everything with a restored record. Hydration is not a
    /// mutation: the dirty flag is cleared so restoring does not immediately
    /// schedule a write of what was just read.
    pub fn restore(&mut self, record: &SessionRecord, active: Mode) {
        self.states = record.mode_states.clone();
        for mode in Mode::iter() {
            self.states.get_mut(mode).sanitize();
        }

        self.active = active;
        self.live = self.states.get(active).messages.clone();
        self.dirty.store(false, Ordering::SeqCst);
    }

    /// Thinking placeholders only make sense while a pending request exists
    /// to finish them. Called when hydration finds none.
    pub fn drop_thinking_messages(&mut self) {
        self.live.retain(|message| return !message.is_thinking);
        for mode in Mode::iter() {
            self.states
                .get_mut(mode)
                .messages
                .retain(|message| return !message.is_thinking);
        }
    }

    /// Back to blank, used on session switches before the next hydration.
    pub fn reset(&mut self) {
        self.states = ModeStates::default();
        self.active = Mode::Guided;
        self.live = vec![];
        self.dirty.store(false, Ordering::SeqCst);
    }

    /// Folds the live list in and returns sanitized mode states ready to be
    /// written. The live list wins over the active mode's stored snapshot.
    pub fn snapshot(&mut self) -> ModeStates {
        self.fold_live();

        let mut snapshot = self.states.clone();
        for mode in Mode::iter() {
            snapshot.get_mut(mode).sanitize();
        }
        return snapshot;
    }

    fn fold_live(&mut self) {
        self.states.get_mut(self.active).messages = self.live.clone();
    }

    fn cap_live(&mut self) {
        if self.live.len() > MODE_MESSAGE_CAP {
            let overflow = self.live.len() - MODE_MESSAGE_CAP;
            self.live.drain(..overflow);
        }
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }
}
