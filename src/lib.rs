#![deny(clippy::implicit_return)]
#![allow(clippy::needless_return)]

//! Encore keeps an embedded chat companion alive across WebView teardowns.
//!
//! Plugin hosts are free to destroy and recreate the companion's WebView at
//! any moment, so every piece of conversation state is persisted through a
//! key-value bridge to the host and rebuilt on the next mount. The embedder
//! wires two channels and hands the companion a storage host and an LLM
//! backend:
//!
//! ```ignore
//! let (signal_tx, mut signal_rx) = mpsc::unbounded_channel::<HostSignal>();
//! let (event_tx, event_rx) = mpsc::unbounded_channel::<ChatEvent>();
//!
//! let clock = SystemClock::arc();
//! let bridge = bridge::connect(host, &signal_tx, clock.clone(), BridgeTunables::from_config(HostEnv::Embedded));
//! let backend: BackendBox = Arc::new(ChatApi::default());
//!
//! tokio::spawn(async move {
//!     return Companion::start(bridge, backend, Box::<ProducerScript>::default(), clock, event_tx, &mut signal_rx).await;
//! });
//! ```
//!
//! Host signals (visibility changes, identity and project switches, bridge
//! load results, teardown) flow in through `signal_tx`. Renderable chat
//! events flow back out through `event_rx`.

pub mod application;
pub mod configuration;
pub mod domain;
pub mod infrastructure;

#[cfg(test)]
pub mod test_support;
