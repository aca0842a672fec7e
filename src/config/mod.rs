//! Configuration module for the voice ordering kiosk.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for the remote
//! service, audio capture, dialogue rules and status strings, `AppPaths` for
//! cross-platform config directories, and TOML persistence via
//! `AppConfig::load` / `AppConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{AppConfig, AudioConfig, ConversationConfig, ServiceConfig, StatusTexts};
