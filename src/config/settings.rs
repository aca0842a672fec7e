//! Kiosk settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and handed to the
//! controller, the HTTP client and the capture layer independently.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// ServiceConfig
// ---------------------------------------------------------------------------

/// Connection settings for the remote order-analysis service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL of the service, without a trailing slash
    /// (e.g. `http://localhost:8000`).
    pub base_url: String,
    /// Path of the initial analysis operation.
    pub analyze_path: String,
    /// Path of the clarification-response operation.
    pub clarify_path: String,
    /// Path of the menu listing.
    pub menu_path: String,
    /// Header carrying the opaque session identifier.
    pub session_header: String,
    /// Maximum seconds to wait for a single remote call.  Expiry is reported
    /// as a transport failure and the user may retry with a new recording.
    pub timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".into(),
            analyze_path: "/analyze-order".into(),
            clarify_path: "/respond-clarification".into(),
            menu_path: "/menu".into(),
            session_header: "session-id".into(),
            timeout_secs: 30,
        }
    }
}

impl ServiceConfig {
    /// Per-call timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Settings for microphone capture and clip packaging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate of the uploaded clip in Hz.
    pub sample_rate: u32,
    /// Ask the platform for acoustic echo cancellation.
    pub echo_cancellation: bool,
    /// Gate samples below `noise_gate` to silence.
    pub noise_suppression: bool,
    /// Normalise the clip's peak amplitude before upload.
    pub auto_gain_control: bool,
    /// Amplitude under which samples are treated as background noise.
    pub noise_gate: f32,
    /// Milliseconds to keep the stream open after a stop request so the
    /// last device buffers land in the clip.
    pub flush_ms: u64,
    /// Maximum recording length in seconds; older audio is dropped beyond it.
    pub max_recording_secs: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            noise_gate: 0.01,
            flush_ms: 100,
            max_recording_secs: 30.0,
        }
    }
}

// ---------------------------------------------------------------------------
// ConversationConfig
// ---------------------------------------------------------------------------

/// Rules for the clarification dialogue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Substrings that mark a clarification item as a soft
    /// "anything else?" prompt rather than a real question.
    pub continue_ordering_patterns: Vec<String>,
    /// Consecutive clarification questions allowed before the engine gives
    /// up and asks the user to restate the order.
    pub max_clarification_turns: u32,
    /// Reuse a session identifier persisted by a previous process run.
    pub resume_persisted_session: bool,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            continue_ordering_patterns: vec!["더 주문".into()],
            max_clarification_turns: 5,
            resume_persisted_session: true,
        }
    }
}

impl ConversationConfig {
    /// Returns `true` when `text` is a soft "continue ordering?" prompt.
    pub fn is_continue_prompt(&self, text: &str) -> bool {
        self.continue_ordering_patterns
            .iter()
            .any(|p| !p.is_empty() && text.contains(p.as_str()))
    }
}

// ---------------------------------------------------------------------------
// StatusTexts
// ---------------------------------------------------------------------------

/// Every user-facing status string the engine can produce.
///
/// Defaults are the Korean strings shown by the kiosk; override them in
/// `settings.toml` to localise.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusTexts {
    pub welcome: String,
    pub listening: String,
    pub listening_clarification: String,
    pub analyzing: String,
    pub processing_clarification: String,
    pub conversing: String,
    pub clarification_instruction: String,
    pub item_added: String,
    pub retry: String,
    pub microphone_denied: String,
    pub microphone_unavailable: String,
    pub no_speech: String,
    pub busy: String,
    pub clarification_limit: String,
    pub order_completed: String,
    pub session_closed: String,
}

impl Default for StatusTexts {
    fn default() -> Self {
        Self {
            welcome: "주문을 시작하려면 마이크 버튼을 누르세요".into(),
            listening: "듣고 있습니다...".into(),
            listening_clarification: "추가 정보를 말씀해주세요...".into(),
            analyzing: "주문 분석 중...".into(),
            processing_clarification: "추가 정보 처리 중...".into(),
            conversing: "대화 중...".into(),
            clarification_instruction: "추가 정보를 마이크 버튼을 눌러 음성으로 알려주세요"
                .into(),
            item_added: "주문이 추가되었습니다. 더 주문하실 것이 있으신가요?".into(),
            retry: "처리에 실패했습니다. 다시 시도해주세요.".into(),
            microphone_denied: "마이크 접근에 실패했습니다. 마이크 권한을 확인해주세요."
                .into(),
            microphone_unavailable: "마이크를 사용할 수 없습니다. 다시 시도해주세요.".into(),
            no_speech: "음성이 감지되지 않았습니다. 다시 시도해주세요.".into(),
            busy: "이전 요청을 처리하고 있습니다. 잠시만 기다려주세요.".into(),
            clarification_limit: "주문을 처음부터 다시 말씀해주세요.".into(),
            order_completed: "주문이 완료되었습니다. 감사합니다!".into(),
            session_closed: "주문 없이 세션이 종료되었습니다.".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level kiosk configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use voice_order_kiosk::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Remote order-analysis service.
    pub service: ServiceConfig,
    /// Microphone capture settings.
    pub audio: AudioConfig,
    /// Clarification dialogue rules.
    pub conversation: ConversationConfig,
    /// User-facing status strings.
    pub texts: StatusTexts,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let original = AppConfig::default();
        original.save_to(&path).expect("save");

        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(original.service.base_url, loaded.service.base_url);
        assert_eq!(original.service.session_header, loaded.service.session_header);
        assert_eq!(original.service.timeout_secs, loaded.service.timeout_secs);
        assert_eq!(original.audio.sample_rate, loaded.audio.sample_rate);
        assert_eq!(original.audio.flush_ms, loaded.audio.flush_ms);
        assert_eq!(
            original.conversation.continue_ordering_patterns,
            loaded.conversation.continue_ordering_patterns
        );
        assert_eq!(original.texts.retry, loaded.texts.retry);
    }

    /// `load_from` on a non-existent path must return `Default` without error.
    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        assert_eq!(config.service.base_url, "http://localhost:8000");
        assert_eq!(config.conversation.max_clarification_turns, 5);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("partial.toml");
        std::fs::write(
            &path,
            "[service]\nbase_url = \"https://kiosk.example\"\ntimeout_secs = 5\n",
        )
        .unwrap();

        let config = AppConfig::load_from(&path).expect("load");
        assert_eq!(config.service.base_url, "https://kiosk.example");
        assert_eq!(config.service.timeout(), Duration::from_secs(5));
        assert_eq!(config.service.analyze_path, "/analyze-order");
        assert!(config.audio.auto_gain_control);
        assert_eq!(config.texts.conversing, "대화 중...");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[service\nbase_url = ").unwrap();
        assert!(AppConfig::load_from(&path).is_err());
    }

    #[test]
    fn continue_prompt_matching() {
        let cfg = ConversationConfig::default();
        assert!(cfg.is_continue_prompt("더 주문하실 것이 있으신가요?"));
        assert!(!cfg.is_continue_prompt("우유 종류를 선택해주세요"));

        let empty = ConversationConfig {
            continue_ordering_patterns: vec![String::new()],
            ..ConversationConfig::default()
        };
        assert!(!empty.is_continue_prompt("아무 말"));
    }

    #[test]
    fn round_trip_modified_values() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("modified.toml");

        let mut cfg = AppConfig::default();
        cfg.service.base_url = "http://10.0.0.2:9000".into();
        cfg.audio.echo_cancellation = false;
        cfg.audio.max_recording_secs = 12.5;
        cfg.conversation.continue_ordering_patterns = vec!["anything else".into()];
        cfg.texts.welcome = "Tap the microphone to order".into();

        cfg.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(loaded.service.base_url, "http://10.0.0.2:9000");
        assert!(!loaded.audio.echo_cancellation);
        assert_eq!(loaded.audio.max_recording_secs, 12.5);
        assert!(loaded.conversation.is_continue_prompt("anything else?"));
        assert_eq!(loaded.texts.welcome, "Tap the microphone to order");
    }
}
