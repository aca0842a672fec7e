//! Finalized audio clips handed from capture to the order service.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::capture::CaptureError;

/// One finalized, non-empty unit of captured audio: a single utterance.
///
/// Clips are immutable; clones share the payload behind an `Arc`.
#[derive(Debug, Clone)]
pub struct AudioClip {
    bytes: Arc<[u8]>,
    content_type: String,
    extension: String,
    duration: Duration,
    recorded_at: SystemTime,
}

impl AudioClip {
    /// Wrap an encoded payload.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::EmptyRecording`] when `bytes` is empty: a clip
    /// always carries a non-zero byte size.
    pub fn new(
        bytes: Vec<u8>,
        content_type: impl Into<String>,
        extension: impl Into<String>,
        duration: Duration,
    ) -> Result<Self, CaptureError> {
        if bytes.is_empty() {
            return Err(CaptureError::EmptyRecording);
        }
        Ok(Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
            extension: extension.into(),
            duration,
            recorded_at: SystemTime::now(),
        })
    }

    /// Wrap a RIFF/WAVE payload.
    pub fn wav(bytes: Vec<u8>, duration: Duration) -> Result<Self, CaptureError> {
        Self::new(bytes, "audio/wav", "wav", duration)
    }

    /// Encoded payload.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Payload size in bytes (always > 0).
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always `false`; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// MIME type sent with the upload.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Length of the recorded speech.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Upload filename hint: `{prefix}_{unix_millis}.{ext}`.
    pub fn file_name(&self, prefix: &str) -> String {
        let millis = self
            .recorded_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        format!("{prefix}_{millis}.{}", self.extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_payload_is_rejected() {
        let err = AudioClip::wav(Vec::new(), Duration::ZERO).unwrap_err();
        assert!(matches!(err, CaptureError::EmptyRecording));
    }

    #[test]
    fn file_name_uses_prefix_and_extension() {
        let clip = AudioClip::wav(vec![1, 2, 3], Duration::from_millis(300)).unwrap();
        let name = clip.file_name("audio_recording");
        assert!(name.starts_with("audio_recording_"), "{name}");
        assert!(name.ends_with(".wav"), "{name}");
        assert_eq!(clip.len(), 3);
        assert_eq!(clip.content_type(), "audio/wav");
    }

    #[test]
    fn clones_share_the_payload() {
        let clip = AudioClip::new(vec![9; 16], "audio/webm", "webm", Duration::ZERO).unwrap();
        let copy = clip.clone();
        assert_eq!(clip.bytes().as_ptr(), copy.bytes().as_ptr());
    }
}
