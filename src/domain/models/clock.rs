use std::sync::Arc;

use chrono::Utc;

/// Wall-clock source. Injected so persistence timestamps and resume age
/// checks can be pinned in tests.
pub trait Clock {
    fn now_millis(&self) -> i64;
}

pub type ClockBox = Arc<dyn Clock + Send + Sync>;

pub struct SystemClock {}

impl SystemClock {
    pub fn arc() -> ClockBox {
        return Arc::new(SystemClock {});
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        return Utc::now().timestamp_millis();
    }
}
