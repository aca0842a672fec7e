//! Voice-driven cafe kiosk ordering client.
//!
//! ```text
//! audio    microphone capture → WAV clip
//! session  per-conversation state + persisted session id
//! engine   clarification state machine
//! service  remote order analysis (HTTP)
//! kiosk    command/event loop wiring the above together
//! config   settings.toml + platform paths
//! ```

pub mod audio;
pub mod config;
pub mod engine;
pub mod kiosk;
pub mod service;
pub mod session;
