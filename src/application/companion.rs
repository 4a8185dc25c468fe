#[cfg(test)]
#[path = "companion_test.rs"]
mod tests;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::time;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::Author;
use crate::domain::models::BackendBox;
use crate::domain::models::ChatError;
use crate::domain::models::ChatEvent;
use crate::domain::models::ChatReply;
use crate::domain::models::ClockBox;
use crate::domain::models::HistoryEntry;
use crate::domain::models::HostSignal;
use crate::domain::models::Message;
use crate::domain::models::MessageType;
use crate::domain::models::Mode;
use crate::domain::models::PendingAi;
use crate::domain::models::ScriptBox;
use crate::domain::models::SessionKey;
use crate::domain::models::StateFile;
use crate::domain::models::BLOB_VERSION;
use crate::domain::models::LEGACY_OWNER;
use crate::domain::models::RECORD_VERSION;
use crate::domain::models::STATE_KEY;
use crate::domain::services::peek_record;
use crate::domain::services::FlushReason;
use crate::domain::services::HydrationGate;
use crate::domain::services::ModeStore;
use crate::domain::services::PersistenceScheduler;
use crate::domain::services::ResumeAction;
use crate::domain::services::ResumeController;
use crate::domain::services::SessionMeta;
use crate::domain::services::SessionResolver;
use crate::infrastructure::bridge::KvBridge;

/// Results coming back from spawned backend calls.
enum Background {
    Reply {
        session: Option<SessionKey>,
        mode: Mode,
        thinking_id: String,
        result: Result<ChatReply, ChatError>,
    },
    Health(Result<(), ChatError>),
}

/// The companion's event loop. Everything the UI shows flows out as
/// [`ChatEvent`]s, everything the host and user do flows in as
/// [`HostSignal`]s, and all timers (hydration gate, autosave debounce,
/// offline retry) live on this loop so a single task owns the state.
pub struct Companion {
    autosave_deadline: Option<time::Instant>,
    backend: BackendBox,
    background_tx: mpsc::UnboundedSender<Background>,
    bridge: KvBridge,
    clock: ClockBox,
    gate: HydrationGate,
    gate_deadline: Option<time::Instant>,
    health_deadline: Option<time::Instant>,
    hydrated: bool,
    meta: SessionMeta,
    offline_backoff: u64,
    online: bool,
    owner: Option<String>,
    pending: Option<PendingAi>,
    project: Option<String>,
    request_in_flight: bool,
    resume: ResumeController,
    scheduler: PersistenceScheduler,
    script: ScriptBox,
    session: Option<SessionKey>,
    store: ModeStore,
    tx: mpsc::UnboundedSender<ChatEvent>,
}

impl Companion {
    pub async fn start(
        bridge: KvBridge,
        backend: BackendBox,
        script: ScriptBox,
        clock: ClockBox,
        tx: mpsc::UnboundedSender<ChatEvent>,
        rx: &mut mpsc::UnboundedReceiver<HostSignal>,
    ) -> Result<()> {
        let (background_tx, mut background_rx) = mpsc::unbounded_channel::<Background>();
        let scheduler = PersistenceScheduler::new(bridge.clone(), clock.clone());
        let store = ModeStore::new(scheduler.dirty_flag());
        let resume = ResumeController::new(clock.now_millis());

        let mut companion = Companion {
            autosave_deadline: None,
            backend,
            background_tx,
            bridge,
            clock,
            gate: HydrationGate::default(),
            gate_deadline: None,
            health_deadline: None,
            hydrated: false,
            meta: SessionMeta::default(),
            offline_backoff: Config::get_millis(ConfigKey::OfflineRetryBackoff),
            online: true,
            owner: None,
            pending: None,
            project: None,
            request_in_flight: false,
            resume,
            scheduler,
            script,
            session: None,
            store,
            tx,
        };
        companion.probe_health();

        loop {
            tokio::select! {
                signal = rx.recv() => {
                    let signal = match signal {
                        Some(signal) => signal,
                        None => {
                            companion.teardown();
                            return Ok(());
                        }
                    };
                    if !companion.handle_signal(signal)? {
                        return Ok(());
                    }
                }
                background = background_rx.recv() => {
                    if let Some(background) = background {
                        companion.handle_background(background)?;
                    }
                }
                _ = time::sleep_until(companion.gate_deadline.unwrap_or_else(time::Instant::now)), if companion.gate_deadline.is_some() => {
                    companion.gate_deadline = None;
                    companion.gate_elapsed()?;
                }
                _ = time::sleep_until(companion.autosave_deadline.unwrap_or_else(time::Instant::now)), if companion.autosave_deadline.is_some() => {
                    companion.autosave_deadline = None;
                    companion.autosave_elapsed();
                }
                _ = time::sleep_until(companion.health_deadline.unwrap_or_else(time::Instant::now)), if companion.health_deadline.is_some() => {
                    companion.health_deadline = None;
                    companion.probe_health();
                }
            }
        }
    }

    /// Returns false when the companion should stop.
    fn handle_signal(&mut self, signal: HostSignal) -> Result<bool> {
        match signal {
            HostSignal::AnalysisCompleted() => {
                self.meta.has_completed_analysis = true;
                self.scheduler.mark_dirty();
                self.schedule_autosave();
            }
            HostSignal::BridgeLoaded { key, value } => {
                self.bridge.deliver(&key, value);
                if key == STATE_KEY {
                    if self.bridge.read(STATE_KEY).is_some() {
                        self.try_hydrate()?;
                    } else {
                        self.finish_empty_hydration()?;
                    }
                }
            }
            HostSignal::IdentityChanged(owner) => {
                self.owner = owner;
                self.resolve_session()?;
            }
            HostSignal::Input(text) => {
                self.handle_input(&text)?;
            }
            HostSignal::ModeSelected(mode) => {
                self.select_mode(mode)?;
            }
            HostSignal::ProjectChanged(project) => {
                self.project = project;
                self.resolve_session()?;
            }
            HostSignal::ReconnectRequested() => {
                self.health_deadline = None;
                self.probe_health();
            }
            HostSignal::ResetRequested() => {
                self.reset_session()?;
            }
            HostSignal::ResumeRequested() => {
                self.manual_resume()?;
            }
            HostSignal::ScrollSettled(offset) => {
                let mode = self.store.active();
                self.store.set_scroll_offset(mode, offset);
                self.schedule_autosave();
            }
            HostSignal::StepCompleted() => {
                self.store.advance_step(self.script.step_count());
                if self.meta.completed_steps < self.script.step_count() {
                    self.meta.completed_steps += 1;
                    self.scheduler.mark_dirty();
                }
                self.schedule_autosave();
            }
            HostSignal::Teardown() => {
                self.teardown();
                return Ok(false);
            }
            HostSignal::VisibilityChanged(visible) => {
                if visible {
                    if !self.online {
                        self.probe_health();
                    }
                } else {
                    self.flush(FlushReason::VisibilityHidden);
                }
            }
        }

        return Ok(true);
    }

    fn handle_background(&mut self, background: Background) -> Result<()> {
        match background {
            Background::Reply {
                session,
                mode,
                thinking_id,
                result,
            } => {
                if session != self.session {
                    tracing::debug!("dropping a reply for a session that is no longer current");
                    return Ok(());
                }

                self.request_in_flight = false;
                self.tx.send(ChatEvent::Waiting(false))?;

                match result {
                    Ok(reply) => {
                        self.store.remove_message(mode, &thinking_id);
                        let message =
                            Message::new(Author::Companion, &reply.response, self.clock.now_millis());
                        self.store.append_message(mode, message);
                        self.pending = None;
                        self.flush(FlushReason::CompanionReply);
                        self.tx
                            .send(ChatEvent::TranscriptRestored(mode, self.store.mode_messages(mode)))?;
                        self.set_online()?;
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "chat request failed");
                        self.store.remove_message(mode, &thinking_id);
                        let bubble = Message::new_with_type(
                            Author::Companion,
                            MessageType::Error,
                            err.user_message(),
                            self.clock.now_millis(),
                        );
                        self.store.append_message(mode, bubble);
                        self.tx
                            .send(ChatEvent::TranscriptRestored(mode, self.store.mode_messages(mode)))?;
                        self.tx.send(ChatEvent::ResumeAvailable())?;
                        if err == ChatError::NoInternet || err == ChatError::Timeout {
                            self.go_offline()?;
                        }
                    }
                }
            }
            Background::Health(result) => match result {
                Ok(()) => {
                    self.set_online()?;
                }
                Err(err) => {
                    tracing::debug!(error = %err, "health check failed");
                    if self.online {
                        self.online = false;
                        self.offline_backoff = Config::get_millis(ConfigKey::OfflineRetryBackoff);
                        self.tx.send(ChatEvent::ConnectionChanged(false))?;
                    } else {
                        let cap = Config::get_millis(ConfigKey::OfflineRetryBackoffCap);
                        self.offline_backoff = (self.offline_backoff * 2).min(cap);
                    }
                    self.health_deadline = Some(self.deadline(self.offline_backoff));
                }
            },
        }

        return Ok(());
    }

    /// Re-derives the session key after an identity or project change. A
    /// changed key wipes the in-memory conversation before anything new is
    /// hydrated; an unchanged key is a no-op so repeated host notifications
    /// cannot clobber a conversation in progress.
    fn resolve_session(&mut self) -> Result<()> {
        let next = SessionResolver::resolve(self.owner.as_deref(), self.project.as_deref());
        if next == self.session {
            return Ok(());
        }

        self.flush(FlushReason::SessionSwitch);

        self.session = next;
        self.store.reset();
        self.pending = None;
        self.request_in_flight = false;
        self.hydrated = false;
        self.meta = SessionMeta {
            owner_email: self
                .owner
                .clone()
                .unwrap_or_else(|| return LEGACY_OWNER.to_string()),
            completed_steps: 0,
            has_completed_analysis: false,
        };
        self.gate.reset();
        self.gate_deadline = None;
        self.autosave_deadline = None;
        self.tx.send(ChatEvent::SessionCleared())?;

        let key = match self.session.clone() {
            Some(key) => key,
            None => {
                // No project selected: chat stays usable but nothing persists.
                self.hydrated = true;
                if self.gate.force_open() {
                    self.maybe_opener()?;
                }
                return Ok(());
            }
        };
        tracing::info!(session = key.as_str(), "session resolved");

        let _ = self.bridge.read(&key.mode_key());
        let _ = self.bridge.read(STATE_KEY);
        let peek = peek_record(self.bridge.cached(STATE_KEY).as_deref(), &key);
        if let Some(delay) = self.gate.on_session_resolved(peek) {
            self.gate_deadline = Some(self.deadline(delay));
        }

        // A blob already in cache hydrates right away, whatever the peek said:
        // a session with no messages can still carry workflow progress. The
        // timer only covers a host that has not answered yet.
        self.try_hydrate()?;

        return Ok(());
    }

    /// Rebuilds the whole conversation from the cached blob. Runs at most
    /// once per session, as soon as the blob is available: either directly
    /// on resolution when the cache already holds it, or when the host's
    /// load lands.
    fn try_hydrate(&mut self) -> Result<()> {
        if self.hydrated {
            return Ok(());
        }
        let key = match self.session.clone() {
            Some(key) => key,
            None => return Ok(()),
        };
        let raw = match self.bridge.read(STATE_KEY) {
            Some(raw) => raw,
            None => return Ok(()),
        };

        let file = match StateFile::parse(&raw) {
            Ok(file) => file,
            Err(err) => {
                tracing::warn!(error = ?err, "persisted state is unreadable, resetting it");
                self.bridge.reset_key(STATE_KEY);
                return self.finish_empty_hydration();
            }
        };
        if file.v != BLOB_VERSION {
            tracing::warn!(version = file.v, "ignoring state written in an unknown format");
            return self.finish_empty_hydration();
        }

        let record = match file.record(&key) {
            Some(record) => record.clone(),
            None => return self.finish_empty_hydration(),
        };
        if record.v != RECORD_VERSION {
            tracing::warn!(version = record.v, "ignoring a session record in an unknown format");
            return self.finish_empty_hydration();
        }

        let hint = self
            .bridge
            .read(&key.mode_key())
            .and_then(|raw| return Mode::parse(&raw));
        let active = record.resolve_active_mode(hint);

        self.store.restore(&record, active);
        self.pending = record.pending_ai.clone();
        if self.pending.is_none() {
            self.store.drop_thinking_messages();
        }
        self.meta.completed_steps = record.completed_steps;
        self.meta.has_completed_analysis = record.has_completed_analysis;
        self.hydrated = true;
        self.gate_deadline = None;
        self.gate.force_open();

        self.tx.send(ChatEvent::ModeChanged(active))?;
        self.tx.send(ChatEvent::TranscriptRestored(
            active,
            self.store.active_messages().to_vec(),
        ))?;
        tracing::info!(session = key.as_str(), mode = %active, "restored session");

        if !self.store.any_messages() {
            self.maybe_opener()?;
        }

        let action = self
            .resume
            .evaluate(&key, self.pending.as_ref(), self.request_in_flight);
        if let Some(action) = action {
            self.run_resume(action)?;
        }

        return Ok(());
    }

    /// The host answered with no usable blob, so the session is known to be
    /// fresh and the opener can show without waiting out the gate timer.
    fn finish_empty_hydration(&mut self) -> Result<()> {
        if self.hydrated || self.session.is_none() {
            return Ok(());
        }

        self.hydrated = true;
        self.gate_deadline = None;
        if self.gate.force_open() {
            self.maybe_opener()?;
        }
        return Ok(());
    }

    fn gate_elapsed(&mut self) -> Result<()> {
        if self.gate.timer_elapsed() {
            self.maybe_opener()?;
        }
        return Ok(());
    }

    /// Appends the scripted opener, but only into a conversation that is
    /// confirmed empty and past the hydration gate.
    fn maybe_opener(&mut self) -> Result<()> {
        if !self.gate.is_open() || self.store.any_messages() {
            return Ok(());
        }

        let mode = self.store.active();
        let text = self.script.opening_prompt(mode);
        let message = Message::new(Author::Companion, &text, self.clock.now_millis());
        self.store.append_live(message.clone());
        self.tx.send(ChatEvent::MessageAppended(mode, message))?;
        return Ok(());
    }

    fn handle_input(&mut self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        if self.request_in_flight {
            tracing::debug!("dropping input while a request is in flight");
            return Ok(());
        }

        let now = self.clock.now_millis();
        let mode = self.store.active();
        let history = self.history_snapshot();

        let message = Message::new(Author::User, text, now);
        self.store.append_live(message.clone());
        self.tx.send(ChatEvent::MessageAppended(mode, message))?;

        let thinking = Message::thinking(now);
        let thinking_id = thinking.id.clone();
        self.store.append_live(thinking.clone());
        self.tx.send(ChatEvent::MessageAppended(mode, thinking))?;
        self.tx.send(ChatEvent::Waiting(true))?;

        self.pending = Some(PendingAi {
            message_text: text.to_string(),
            mode,
            started_at: now,
            thinking_id: thinking_id.clone(),
            conversation_history: history.clone(),
            response_text: None,
        });
        self.request_in_flight = true;
        self.flush(FlushReason::UserMessage);
        self.spawn_send(mode, thinking_id, text.to_string(), history);

        return Ok(());
    }

    fn select_mode(&mut self, mode: Mode) -> Result<()> {
        if !self.store.set_active(mode) {
            return Ok(());
        }

        if let Some(key) = self.session.clone() {
            self.scheduler.write_mode_key(&key, mode);
        }
        self.flush(FlushReason::ModeSwitch);
        self.tx.send(ChatEvent::ModeChanged(mode))?;
        self.tx.send(ChatEvent::TranscriptRestored(
            mode,
            self.store.active_messages().to_vec(),
        ))?;
        self.maybe_opener()?;
        return Ok(());
    }

    fn reset_session(&mut self) -> Result<()> {
        if let Some(key) = self.session.clone() {
            self.scheduler.clear(&key);
        }
        self.store.reset();
        self.pending = None;
        self.request_in_flight = false;
        self.meta.completed_steps = 0;
        self.meta.has_completed_analysis = false;
        self.hydrated = true;
        self.gate_deadline = None;
        self.tx.send(ChatEvent::SessionCleared())?;
        self.gate.force_open();
        self.maybe_opener()?;
        return Ok(());
    }

    fn manual_resume(&mut self) -> Result<()> {
        if self.request_in_flight {
            return Ok(());
        }
        let pending = match self.pending.clone() {
            Some(pending) => pending,
            None => return Ok(()),
        };

        let action = self.resume.manual(&pending);
        return self.run_resume(action);
    }

    fn run_resume(&mut self, action: ResumeAction) -> Result<()> {
        match action {
            ResumeAction::Splice {
                mode,
                thinking_id,
                response_text,
            } => {
                self.store.remove_message(mode, &thinking_id);
                let message =
                    Message::new(Author::Companion, &response_text, self.clock.now_millis());
                self.store.append_message(mode, message);
                self.pending = None;
                self.flush(FlushReason::Resume);
                self.tx
                    .send(ChatEvent::TranscriptRestored(mode, self.store.mode_messages(mode)))?;
                tracing::info!("spliced a response that arrived before the last teardown");
            }
            ResumeAction::Retry {
                mode,
                thinking_id,
                message_text,
                history,
            } => {
                self.request_in_flight = true;
                self.tx.send(ChatEvent::ResumeAvailable())?;
                self.tx.send(ChatEvent::Waiting(true))?;
                self.spawn_send(mode, thinking_id, message_text, history);
                tracing::info!("retrying a request interrupted by a teardown");
            }
        }

        return Ok(());
    }

    fn spawn_send(&self, mode: Mode, thinking_id: String, text: String, history: Vec<HistoryEntry>) {
        let backend = self.backend.clone();
        let background = self.background_tx.clone();
        let session = self.session.clone();

        tokio::spawn(async move {
            let result = backend.send_message(&text, &history).await;
            let _ = background.send(Background::Reply {
                session,
                mode,
                thinking_id,
                result,
            });
        });
    }

    fn probe_health(&self) {
        let backend = self.backend.clone();
        let background = self.background_tx.clone();

        tokio::spawn(async move {
            let result = backend.health_check().await;
            let _ = background.send(Background::Health(result));
        });
    }

    /// Prior turns in the shape the backend wants, skipping placeholders and
    /// error bubbles.
    fn history_snapshot(&self) -> Vec<HistoryEntry> {
        return self
            .store
            .active_messages()
            .iter()
            .filter(|message| {
                return message.is_persistable()
                    && !message.is_thinking
                    && message.message_type() == MessageType::Normal;
            })
            .map(|message| return HistoryEntry::new(message.role, &message.content))
            .collect();
    }

    fn flush(&mut self, reason: FlushReason) {
        let key = match self.session.clone() {
            Some(key) => key,
            None => return,
        };

        self.scheduler
            .flush(&key, &mut self.store, &self.meta, self.pending.as_ref(), reason);
    }

    fn schedule_autosave(&mut self) {
        if let Some(window) = self.scheduler.debounce_window() {
            self.autosave_deadline = Some(self.deadline(window));
        }
    }

    fn autosave_elapsed(&mut self) {
        if self.scheduler.take_dirty() {
            self.flush(FlushReason::Autosave);
        }
    }

    fn set_online(&mut self) -> Result<()> {
        self.health_deadline = None;
        self.offline_backoff = Config::get_millis(ConfigKey::OfflineRetryBackoff);
        if !self.online {
            self.online = true;
            self.tx.send(ChatEvent::ConnectionChanged(true))?;
        }
        return Ok(());
    }

    fn go_offline(&mut self) -> Result<()> {
        if self.online {
            self.online = false;
            self.offline_backoff = Config::get_millis(ConfigKey::OfflineRetryBackoff);
            self.tx.send(ChatEvent::ConnectionChanged(false))?;
        }
        if self.health_deadline.is_none() {
            self.health_deadline = Some(self.deadline(self.offline_backoff));
        }
        return Ok(());
    }

    fn teardown(&mut self) {
        self.flush(FlushReason::Teardown);
        self.bridge.shutdown();
        tracing::info!("companion stopped");
    }

    fn deadline(&self, millis: u64) -> time::Instant {
        return time::Instant::now() + time::Duration::from_millis(millis);
    }
}
