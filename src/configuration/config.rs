#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

use std::path;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use strum::EnumIter;

static CONFIG: Lazy<DashMap<String, String>> = Lazy::new(DashMap::new);

#[derive(Clone, Copy, Eq, PartialEq, EnumIter, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ConfigKey {
    AutosaveDebounce,
    BackendChatTimeout,
    BackendHealthCheckTimeout,
    BackendURL,
    BridgeLoadRetryTimeout,
    BridgeSafetyFlushDelay,
    GateEmptyPeekDelay,
    GateFallbackDelay,
    OfflineRetryBackoff,
    OfflineRetryBackoffCap,
    ResumeGuardWindow,
    StateDir,
}

pub struct Config {}

impl Config {
    pub fn get(key: ConfigKey) -> String {
        if let Some(val) = CONFIG.get(&key.to_string()) {
            return val.to_string();
        }

        return Config::default(key);
    }

    pub fn set(key: ConfigKey, value: &str) {
        CONFIG.insert(key.to_string(), value.to_string());
    }

    pub fn default(key: ConfigKey) -> String {
        let state_dir = dirs::cache_dir()
            .unwrap_or_else(|| return path::PathBuf::from("."))
            .join("encore/state");

        let res = match key {
            ConfigKey::AutosaveDebounce => "900",
            ConfigKey::BackendChatTimeout => "30000",
            ConfigKey::BackendHealthCheckTimeout => "10000",
            ConfigKey::BackendURL => "http://localhost:3001",
            ConfigKey::BridgeLoadRetryTimeout => "5000",
            ConfigKey::BridgeSafetyFlushDelay => "15000",
            ConfigKey::GateEmptyPeekDelay => "150",
            ConfigKey::GateFallbackDelay => "2800",
            ConfigKey::OfflineRetryBackoff => "4000",
            ConfigKey::OfflineRetryBackoffCap => "60000",
            ConfigKey::ResumeGuardWindow => "1000",

            // Special
            ConfigKey::StateDir => {
                return state_dir.to_string_lossy().to_string();
            }
        };

        return res.to_string();
    }

    /// Timing keys are stored as strings like everything else. Falls back to
    /// the built-in default when an override fails to parse.
    pub fn get_millis(key: ConfigKey) -> u64 {
        if let Ok(val) = Config::get(key).parse::<u64>() {
            return val;
        }

        return Config::default(key).parse::<u64>().unwrap_or(0);
    }
}
