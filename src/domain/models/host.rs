/// Whether the companion is running inside the plugin's embedded WebView or
/// in a plain browser harness. Decides compression and autosave behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostEnv {
    Embedded,
    Web,
}

/// Fire-and-forget key-value storage offered by the embedding host. Loads
/// are asynchronous: the host answers with a `HostSignal::BridgeLoaded`
/// signal carrying the key and the stored value, if any.
pub trait HostBridge {
    fn save(&self, key: &str, value: &str);
    fn request_load(&self, key: &str);
}

pub type HostBox = Box<dyn HostBridge + Send + Sync>;
