//! Cross-platform kiosk paths using the `dirs` crate.
//!
//! Config dir (settings + persisted session identifier):
//!   Windows: %APPDATA%\voice-order-kiosk\
//!   macOS:   ~/Library/Application Support/voice-order-kiosk/
//!   Linux:   ~/.config/voice-order-kiosk/

use std::path::PathBuf;

/// Holds all resolved kiosk directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml` and `session.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Full path to `session.toml`, the only client state persisted between
    /// process runs.
    pub session_file: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "voice-order-kiosk";

    /// Resolves all paths, falling back to the current directory when the
    /// platform has no config dir.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        Self {
            settings_file: config_dir.join("settings.toml"),
            session_file: config_dir.join("session.toml"),
            config_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_live_in_config_dir() {
        let paths = AppPaths::new();
        assert!(paths.config_dir.ends_with("voice-order-kiosk"));
        assert!(paths
            .settings_file
            .file_name()
            .is_some_and(|n| n == "settings.toml"));
        assert_eq!(paths.session_file.parent(), Some(paths.config_dir.as_path()));
    }
}
