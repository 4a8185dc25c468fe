use super::Message;
use super::Mode;

/// Everything the embedding host can tell the companion, including load
/// results coming back from the storage bridge.
#[derive(Clone, Debug)]
pub enum HostSignal {
    AnalysisCompleted(),
    BridgeLoaded { key: String, value: Option<String> },
    IdentityChanged(Option<String>),
    Input(String),
    ModeSelected(Mode),
    ProjectChanged(Option<String>),
    ReconnectRequested(),
    ResetRequested(),
    ResumeRequested(),
    ScrollSettled(f64),
    StepCompleted(),
    Teardown(),
    VisibilityChanged(bool),
}

/// Everything the renderer needs to draw, in the order it should be drawn.
#[derive(Clone, Debug)]
pub enum ChatEvent {
    ConnectionChanged(bool),
    MessageAppended(Mode, Message),
    ModeChanged(Mode),
    ResumeAvailable(),
    SessionCleared(),
    TranscriptRestored(Mode, Vec<Message>),
    Waiting(bool),
}

/// Broadcast to bridge subscribers whenever a non-private key changes.
#[derive(Clone, Debug)]
pub struct BridgeEvent {
    pub key: String,
    pub value: Option<String>,
}
