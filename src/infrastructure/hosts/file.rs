#[cfg(test)]
#[path = "file_test.rs"]
mod tests;

use std::path;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::HostBridge;
use crate::domain::models::HostSignal;

enum StoreCommand {
    Save(String, String),
    Load(String),
}

/// Directory-backed stand-in for the plugin host's key-value store, used when
/// the companion runs in a browser harness with no native bridge. A single
/// worker task applies commands in order, so saves to one key never race.
pub struct FileStore {
    commands: mpsc::UnboundedSender<StoreCommand>,
}

impl FileStore {
    pub fn start(
        state_dir: path::PathBuf,
        signals: mpsc::UnboundedSender<HostSignal>,
    ) -> FileStore {
        let (tx, mut rx) = mpsc::unbounded_channel::<StoreCommand>();

        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    StoreCommand::Save(key, value) => {
                        save_file(&state_dir, &key, &value).await;
                    }
                    StoreCommand::Load(key) => {
                        let value = load_file(&state_dir, &key).await;
                        let sent = signals.send(HostSignal::BridgeLoaded { key, value });
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
        });

        return FileStore { commands: tx };
    }

    pub fn from_config(signals: &mpsc::UnboundedSender<HostSignal>) -> FileStore {
        let state_dir = path::PathBuf::from(Config::get(ConfigKey::StateDir));
        return FileStore::start(state_dir, signals.clone());
    }
}

impl HostBridge for FileStore {
    fn save(&self, key: &str, value: &str) {
        if let Err(err) = self
            .commands
            .send(StoreCommand::Save(key.to_string(), value.to_string()))
        {
            tracing::warn!(error = ?err, "file store worker is gone, dropping save");
        }
    }

    fn request_load(&self, key: &str) {
        if let Err(err) = self.commands.send(StoreCommand::Load(key.to_string())) {
            tracing::warn!(error = ?err, "file store worker is gone, dropping load");
        }
    }
}

/// Keys contain colons and @ signs, file systems disagree about both.
fn file_name(key: &str) -> String {
    let safe = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                return c;
            }
            return '_';
        })
        .collect::<String>();

    return format!("{safe}.json");
}

async fn save_file(state_dir: &path::Path, key: &str, value: &str) {
    if !state_dir.exists() {
        if let Err(err) = fs::create_dir_all(state_dir).await {
            tracing::warn!(error = ?err, "failed to create state directory");
            return;
        }
    }

    let file_path = state_dir.join(file_name(key));
    let res = async {
        let mut file = fs::File::create(&file_path).await?;
        file.write_all(value.as_bytes()).await?;
        return file.flush().await;
    }
    .await;

    if let Err(err) = res {
        tracing::warn!(error = ?err, key = key, "failed to persist key");
    }
}

async fn load_file(state_dir: &path::Path, key: &str) -> Option<String> {
    let file_path = state_dir.join(file_name(key));
    if !file_path.exists() {
        return None;
    }

    match fs::read_to_string(&file_path).await {
        Ok(value) => return Some(value),
        Err(err) => {
            tracing::warn!(error = ?err, key = key, "failed to read persisted key");
            return None;
        }
    }
}
