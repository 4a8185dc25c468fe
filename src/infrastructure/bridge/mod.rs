mod adapter;
mod compress;

pub use adapter::*;
pub use compress::*;
use tokio::sync::mpsc;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::ClockBox;
use crate::domain::models::HostBox;
use crate::domain::models::HostSignal;
use crate::infrastructure::hosts::FileStore;

/// Builds the bridge over the best storage tier available: the native host
/// when the embedder provides one, otherwise a file-backed store, otherwise
/// memory only (when no state directory is configured).
pub fn connect(
    host: Option<HostBox>,
    signals: &mpsc::UnboundedSender<HostSignal>,
    clock: ClockBox,
    tunables: BridgeTunables,
) -> KvBridge {
    let chosen: Option<HostBox> = match host {
        Some(host) => Some(host),
        None => {
            if Config::get(ConfigKey::StateDir).is_empty() {
                None
            } else {
                Some(Box::new(FileStore::from_config(signals)))
            }
        }
    };

    return KvBridge::new(chosen, clock, tunables);
}
