use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use async_trait::async_trait;

use crate::domain::models::Backend;
use crate::domain::models::ChatError;
use crate::domain::models::ChatReply;
use crate::domain::models::Clock;
use crate::domain::models::ClockBox;
use crate::domain::models::HistoryEntry;
use crate::domain::models::HostBridge;
use crate::domain::models::Mode;
use crate::domain::models::ProducerScript;
use crate::domain::models::Script;

/// Wall clock pinned by the test.
#[derive(Clone)]
pub struct ManualClock {
    millis: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn at(start_millis: i64) -> ManualClock {
        return ManualClock {
            millis: Arc::new(AtomicI64::new(start_millis)),
        };
    }

    pub fn advance(&self, millis: i64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn as_clock(&self) -> ClockBox {
        return Arc::new(self.clone());
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        return self.millis.load(Ordering::SeqCst);
    }
}

/// Host double that records every save and load request it receives.
#[derive(Clone, Default)]
pub struct RecordingHost {
    saves: Arc<Mutex<Vec<(String, String)>>>,
    loads: Arc<Mutex<Vec<String>>>,
}

impl RecordingHost {
    pub fn new() -> RecordingHost {
        return RecordingHost::default();
    }

    pub fn saves(&self) -> Vec<(String, String)> {
        return self
            .saves
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
    }

    pub fn saves_for(&self, key: &str) -> Vec<String> {
        return self
            .saves()
            .into_iter()
            .filter_map(|(saved_key, value)| {
                if saved_key == key {
                    return Some(value);
                }
                return None;
            })
            .collect();
    }

    pub fn loads(&self) -> Vec<String> {
        return self
            .loads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
    }
}

impl HostBridge for RecordingHost {
    fn save(&self, key: &str, value: &str) {
        self.saves
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((key.to_string(), value.to_string()));
    }

    fn request_load(&self, key: &str) {
        self.loads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(key.to_string());
    }
}

/// Backend double with scripted outcomes, served in order. Unscripted sends
/// fail with `ChatError::Unknown`.
#[derive(Clone)]
pub struct ScriptedBackend {
    delay_millis: Arc<AtomicI64>,
    healthy: Arc<AtomicBool>,
    replies: Arc<Mutex<VecDeque<Result<ChatReply, ChatError>>>>,
    requests: Arc<Mutex<Vec<(String, Vec<HistoryEntry>)>>>,
}

impl ScriptedBackend {
    pub fn new() -> ScriptedBackend {
        return ScriptedBackend {
            delay_millis: Arc::new(AtomicI64::new(0)),
            healthy: Arc::new(AtomicBool::new(true)),
            replies: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(vec![])),
        };
    }

    /// Makes every send take this long, so tests can interleave other
    /// signals while a request is in flight.
    pub fn set_delay(&self, millis: i64) {
        self.delay_millis.store(millis, Ordering::SeqCst);
    }

    pub fn push_reply(&self, text: &str) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Ok(ChatReply {
                response: text.to_string(),
                timestamp: 0,
            }));
    }

    pub fn push_error(&self, err: ChatError) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Err(err));
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<(String, Vec<HistoryEntry>)> {
        return self
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
    }

    pub fn send_count(&self) -> usize {
        return self.requests().len();
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    #[allow(clippy::implicit_return)]
    async fn health_check(&self) -> Result<(), ChatError> {
        if self.healthy.load(Ordering::SeqCst) {
            return Ok(());
        }
        return Err(ChatError::NoInternet);
    }

    #[allow(clippy::implicit_return)]
    async fn send_message(
        &self,
        message: &str,
        history: &[HistoryEntry],
    ) -> Result<ChatReply, ChatError> {
        let delay = self.delay_millis.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(delay as u64)).await;
        }

        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((message.to_string(), history.to_vec()));

        let next = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            Some(result) => return result,
            None => return Err(ChatError::Unknown),
        }
    }
}

/// Script wrapper counting how many times an opener was produced.
#[derive(Clone, Default)]
pub struct CountingScript {
    opens: Arc<AtomicUsize>,
}

impl CountingScript {
    pub fn open_count(&self) -> usize {
        return self.opens.load(Ordering::SeqCst);
    }
}

impl Script for CountingScript {
    fn opening_prompt(&self, mode: Mode) -> String {
        self.opens.fetch_add(1, Ordering::SeqCst);
        return ProducerScript::default().opening_prompt(mode);
    }

    fn step_title(&self, index: usize) -> Option<String> {
        return ProducerScript::default().step_title(index);
    }

    fn step_count(&self) -> usize {
        return ProducerScript::default().step_count();
    }
}
