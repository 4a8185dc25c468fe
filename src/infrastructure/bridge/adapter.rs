#[cfg(test)]
#[path = "adapter_test.rs"]
mod tests;

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::time;
use tokio_util::sync::CancellationToken;

use super::compress;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::BridgeEvent;
use crate::domain::models::ClockBox;
use crate::domain::models::HostBox;
use crate::domain::models::HostEnv;
use crate::domain::models::MAX_BLOB_BYTES;
use crate::domain::models::MODE_KEY_PREFIX;
use crate::domain::models::STATE_KEY;
use crate::domain::models::TOMBSTONE;

pub struct BridgeTunables {
    pub env: HostEnv,
    pub load_retry_millis: u64,
    pub safety_flush_millis: u64,
    /// Keys carrying large blobs: writes are coalesced and, on embedded
    /// hosts, compressed.
    pub heavy_keys: Vec<String>,
    /// Keys excluded from subscriber notifications. Entries ending in `:`
    /// match as prefixes.
    pub private_keys: Vec<String>,
}

impl BridgeTunables {
    pub fn from_config(env: HostEnv) -> BridgeTunables {
        return BridgeTunables {
            env,
            load_retry_millis: Config::get_millis(ConfigKey::BridgeLoadRetryTimeout),
            safety_flush_millis: Config::get_millis(ConfigKey::BridgeSafetyFlushDelay),
            heavy_keys: vec![STATE_KEY.to_string()],
            private_keys: vec![STATE_KEY.to_string(), MODE_KEY_PREFIX.to_string()],
        };
    }

    fn is_heavy(&self, key: &str) -> bool {
        return self.heavy_keys.iter().any(|heavy| return heavy == key);
    }

    fn is_private(&self, key: &str) -> bool {
        return self.private_keys.iter().any(|private| {
            if private.ends_with(':') {
                return key.starts_with(private.as_str());
            }
            return private == key;
        });
    }
}

struct BridgeInner {
    host: Option<HostBox>,
    cache: DashMap<String, String>,
    pending_loads: DashMap<String, i64>,
    pending_writes: Mutex<HashMap<String, String>>,
    flush_armed: AtomicBool,
    events: broadcast::Sender<BridgeEvent>,
    clock: ClockBox,
    tunables: BridgeTunables,
    cancel: CancellationToken,
}

/// Makes the host's asynchronous, callback-driven storage look synchronous.
/// Reads are answered from a local cache, misses kick off a host load whose
/// result arrives later as a `HostSignal::BridgeLoaded`. Writes land in the
/// cache immediately and reach the host either directly or, for heavy keys,
/// through a latest-value-wins queue with a safety-net flush timer.
#[derive(Clone)]
pub struct KvBridge {
    inner: Arc<BridgeInner>,
}

impl KvBridge {
    pub fn new(host: Option<HostBox>, clock: ClockBox, tunables: BridgeTunables) -> KvBridge {
        if host.is_none() {
            tracing::warn!("no storage host available, state will not survive teardown");
        }

        let (events, _) = broadcast::channel::<BridgeEvent>(64);

        return KvBridge {
            inner: Arc::new(BridgeInner {
                host,
                cache: DashMap::new(),
                pending_loads: DashMap::new(),
                pending_writes: Mutex::new(HashMap::new()),
                flush_armed: AtomicBool::new(false),
                events,
                clock,
                tunables,
                cancel: CancellationToken::new(),
            }),
        };
    }

    pub fn env(&self) -> HostEnv {
        return self.inner.tunables.env;
    }

    /// Synchronous read. A miss returns `None` and asks the host for the key,
    /// at most once per retry window. Tombstoned keys read as absent.
    pub fn read(&self, key: &str) -> Option<String> {
        if let Some(value) = self.cached(key) {
            if value == TOMBSTONE {
                return None;
            }
            return Some(value);
        }

        self.request_load(key);
        return None;
    }

    /// Cache peek without the load side effect. Unlike [`KvBridge::read`]
    /// this surfaces the raw tombstone, letting callers tell "cleared" apart
    /// from "never loaded".
    pub fn cached(&self, key: &str) -> Option<String> {
        return self
            .inner
            .cache
            .get(key)
            .map(|entry| return entry.value().to_string());
    }

    fn request_load(&self, key: &str) {
        let Some(host) = self.inner.host.as_ref() else {
            return;
        };

        let now = self.inner.clock.now_millis();
        let recently_requested = match self.inner.pending_loads.get(key) {
            Some(entry) => now - *entry.value() < self.inner.tunables.load_retry_millis as i64,
            None => false,
        };
        if recently_requested {
            return;
        }

        self.inner.pending_loads.insert(key.to_string(), now);
        host.request_load(key);
        tracing::debug!(key = key, "requested host load");
    }

    /// Write-through with dedupe: a value identical to the cached one is a
    /// no-op toward the host, which keeps host-originated loads from echoing
    /// back out as saves.
    pub fn write(&self, key: &str, value: &str) -> bool {
        let unchanged = match self.cached(key) {
            Some(current) => current == value,
            None => false,
        };
        if unchanged {
            tracing::debug!(key = key, "skipping write, value unchanged");
            return true;
        }

        self.inner.cache.insert(key.to_string(), value.to_string());
        if value == TOMBSTONE {
            self.publish(key, None);
        } else {
            self.publish(key, Some(value.to_string()));
        }

        if self.inner.tunables.is_heavy(key) {
            self.queue_heavy(key, value);
            return true;
        }

        self.host_save(key, value);
        return true;
    }

    fn queue_heavy(&self, key: &str, value: &str) {
        {
            let mut pending = self
                .inner
                .pending_writes
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            pending.insert(key.to_string(), value.to_string());
        }

        self.arm_safety_timer();
    }

    fn arm_safety_timer(&self) {
        if self.inner.flush_armed.swap(true, Ordering::SeqCst) {
            return;
        }

        let bridge = self.clone();
        tokio::spawn(async move {
            let delay = time::Duration::from_millis(bridge.inner.tunables.safety_flush_millis);
            tokio::select! {
                _ = bridge.inner.cancel.cancelled() => {
                    return;
                }
                _ = time::sleep(delay) => {}
            }

            bridge.inner.flush_armed.store(false, Ordering::SeqCst);
            bridge.flush_pending();
        });
    }

    /// Pushes every coalesced heavy write to the host now. Called by forced
    /// flush points; the safety timer calls it too in case none fired.
    pub fn flush_pending(&self) {
        let drained = {
            let mut pending = self
                .inner
                .pending_writes
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            pending.drain().collect::<Vec<(String, String)>>()
        };

        for (key, value) in drained {
            self.host_save(&key, &value);
        }
    }

    fn host_save(&self, key: &str, value: &str) {
        let Some(host) = self.inner.host.as_ref() else {
            return;
        };

        let packed = self.inner.tunables.env == HostEnv::Embedded
            && self.inner.tunables.is_heavy(key)
            && value != TOMBSTONE;
        if packed {
            host.save(key, &compress::pack(value));
        } else {
            host.save(key, value);
        }

        tracing::debug!(key = key, packed = packed, "saved key to host");
    }

    /// Applies a host load result. An empty answer is cached as the tombstone
    /// so the key reads as known-absent instead of triggering another load.
    /// Corrupt or oversized payloads reset the key to the tombstone instead
    /// of failing hydration. A load that arrives after a local write loses:
    /// the local value is newer.
    pub fn deliver(&self, key: &str, raw: Option<String>) {
        self.inner.pending_loads.remove(key);

        let Some(raw_value) = raw else {
            if self.cached(key).is_none() {
                self.inner.cache.insert(key.to_string(), TOMBSTONE.to_string());
                self.publish(key, None);
            }
            return;
        };

        if raw_value.len() > MAX_BLOB_BYTES {
            tracing::warn!(
                key = key,
                len = raw_value.len(),
                "stored value is oversized, resetting key"
            );
            self.reset_key(key);
            return;
        }

        let value = match compress::unpack(&raw_value) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(key = key, error = ?err, "stored value is corrupt, resetting key");
                self.reset_key(key);
                return;
            }
        };

        if self.cached(key).is_some() {
            tracing::debug!(key = key, "load arrived after a local write, keeping local value");
            return;
        }

        self.inner.cache.insert(key.to_string(), value.clone());
        if value == TOMBSTONE {
            self.publish(key, None);
        } else {
            self.publish(key, Some(value));
        }
    }

    /// Clears a key everywhere. The tombstone stands in for deletion because
    /// some hosts reject empty values.
    pub fn reset_key(&self, key: &str) {
        self.inner.cache.insert(key.to_string(), TOMBSTONE.to_string());
        self.host_save(key, TOMBSTONE);
        self.publish(key, None);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        return self.inner.events.subscribe();
    }

    fn publish(&self, key: &str, value: Option<String>) {
        if self.inner.tunables.is_private(key) {
            return;
        }

        // Send only fails when nobody is subscribed, which is fine.
        let _ = self.inner.events.send(BridgeEvent {
            key: key.to_string(),
            value,
        });
    }

    /// Final flush plus timer teardown. The bridge stays readable afterwards
    /// so late signal handlers do not panic.
    pub fn shutdown(&self) {
        self.flush_pending();
        self.inner.cancel.cancel();
    }
}
