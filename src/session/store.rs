//! Persistence of the session identifier across process restarts.
//!
//! The identifier is the only client state that outlives the process.  It is
//! written when the server first issues it, removed when the session ends,
//! and read once at startup.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::config::AppPaths;

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedSession {
    session_id: Option<String>,
}

/// `session.toml` in the kiosk config directory.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Store at the platform default location.
    pub fn new() -> Self {
        Self::at(AppPaths::new().session_file)
    }

    /// Store at an explicit path (useful for tests).
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted identifier; `Ok(None)` when nothing is stored.
    pub fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        let persisted: PersistedSession = toml::from_str(&content)?;
        Ok(persisted.session_id.filter(|id| !id.is_empty()))
    }

    pub fn save(&self, session_id: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string(&PersistedSession {
            session_id: Some(session_id.to_string()),
        })?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    /// Forget the identifier.  A missing file is not an error.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_then_load() {
        let dir = tempdir().expect("temp dir");
        let store = SessionStore::at(dir.path().join("nested").join("session.toml"));

        store.save("abc-123").expect("save");
        assert_eq!(store.load().expect("load").as_deref(), Some("abc-123"));
    }

    #[test]
    fn missing_file_loads_none() {
        let dir = tempdir().expect("temp dir");
        let store = SessionStore::at(dir.path().join("session.toml"));
        assert!(store.load().expect("load").is_none());
    }

    #[test]
    fn clear_removes_and_is_idempotent() {
        let dir = tempdir().expect("temp dir");
        let store = SessionStore::at(dir.path().join("session.toml"));

        store.save("abc").unwrap();
        store.clear().expect("clear");
        assert!(store.load().unwrap().is_none());
        store.clear().expect("second clear");
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("session.toml");
        std::fs::write(&path, "session_id = [").unwrap();
        assert!(SessionStore::at(path).load().is_err());
    }
}
