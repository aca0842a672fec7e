//! Push-to-record microphone capture.
//!
//! [`AudioCapture`] owns one [`InputDevice`] and at most one active
//! recording.  `start` opens the device; `stop` waits a short flush, releases
//! the device and packages everything collected into one [`AudioClip`].
//!
//! ```text
//! start() ──▶ device.open(buffer) ──▶ callback fills CaptureBuffer
//! stop()  ──▶ sleep(flush) ──▶ drop stream (device released)
//!         ──▶ buffer.take() ──▶ package_clip ──▶ AudioClip
//! ```
//!
//! The stream guard lives inside the active recording, so the device is
//! released on every exit path: successful stop, failed packaging, `cancel`,
//! a dropped `stop` future, or dropping the `AudioCapture` itself.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::config::AudioConfig;

use super::clip::AudioClip;
use super::device::{CaptureBuffer, InputDevice, SharedBuffer};
use super::encode::package_clip;

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors raised by the capture layer.
#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    /// The platform refused microphone access.
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    /// No usable input device, or the device failed while opening.
    #[error("microphone unavailable: {0}")]
    DeviceUnavailable(String),

    /// `stop` found no audio data.
    #[error("no audio was recorded")]
    EmptyRecording,

    /// `start` was called while a recording is active.
    #[error("a recording is already active")]
    AlreadyRecording,

    /// `stop` was called with no active recording.
    #[error("no recording is active")]
    NotRecording,

    /// WAV packaging failed.
    #[error("failed to encode recording: {0}")]
    Encode(String),
}

impl CaptureError {
    /// Classify a backend message.  Hosts report a refused permission only
    /// as free text.
    fn from_backend(message: String) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("permission") || lower.contains("denied") || lower.contains("not allowed")
        {
            CaptureError::PermissionDenied(message)
        } else {
            CaptureError::DeviceUnavailable(message)
        }
    }
}

impl From<cpal::DefaultStreamConfigError> for CaptureError {
    fn from(e: cpal::DefaultStreamConfigError) -> Self {
        Self::from_backend(e.to_string())
    }
}

impl From<cpal::BuildStreamError> for CaptureError {
    fn from(e: cpal::BuildStreamError) -> Self {
        Self::from_backend(e.to_string())
    }
}

impl From<cpal::PlayStreamError> for CaptureError {
    fn from(e: cpal::PlayStreamError) -> Self {
        Self::from_backend(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// CaptureOptions
// ---------------------------------------------------------------------------

/// Processing requested for every recording.
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    /// Amplitude below which samples are gated when `noise_suppression` is on.
    pub noise_gate: f32,
    /// Sample rate of the uploaded clip.
    pub target_sample_rate: u32,
    pub max_recording_secs: f32,
    /// How long `stop` keeps the stream open for the final device buffers.
    pub flush: Duration,
}

impl CaptureOptions {
    pub fn from_config(config: &AudioConfig) -> Self {
        Self {
            echo_cancellation: config.echo_cancellation,
            noise_suppression: config.noise_suppression,
            auto_gain_control: config.auto_gain_control,
            noise_gate: config.noise_gate,
            target_sample_rate: config.sample_rate,
            max_recording_secs: config.max_recording_secs,
            flush: Duration::from_millis(config.flush_ms),
        }
    }
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self::from_config(&AudioConfig::default())
    }
}

// ---------------------------------------------------------------------------
// AudioCapture
// ---------------------------------------------------------------------------

struct ActiveRecording<S> {
    /// Dropping this releases the device.
    stream: S,
    buffer: SharedBuffer,
    started_at: Instant,
}

/// Single-recording microphone wrapper.
///
/// # Example
///
/// ```rust,no_run
/// use voice_order_kiosk::audio::{AudioCapture, CaptureOptions, CpalDevice};
///
/// # async fn example() -> Result<(), voice_order_kiosk::audio::CaptureError> {
/// let mut capture = AudioCapture::new(CpalDevice::new(), CaptureOptions::default());
/// capture.start()?;
/// // ... user speaks ...
/// let clip = capture.stop().await?;
/// println!("{} bytes", clip.len());
/// # Ok(())
/// # }
/// ```
pub struct AudioCapture<D: InputDevice> {
    device: D,
    options: CaptureOptions,
    active: Option<ActiveRecording<D::Stream>>,
}

impl<D: InputDevice> AudioCapture<D> {
    pub fn new(device: D, options: CaptureOptions) -> Self {
        Self {
            device,
            options,
            active: None,
        }
    }

    /// Open the microphone and begin collecting samples.
    ///
    /// # Errors
    ///
    /// [`CaptureError::AlreadyRecording`] if a recording is active;
    /// [`CaptureError::PermissionDenied`] or
    /// [`CaptureError::DeviceUnavailable`] if the device cannot be opened.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.active.is_some() {
            return Err(CaptureError::AlreadyRecording);
        }

        let format = self.device.format()?;
        let buffer = Arc::new(Mutex::new(CaptureBuffer::new(
            format,
            self.options.max_recording_secs,
        )));
        let stream = self.device.open(&self.options, Arc::clone(&buffer))?;

        log::debug!(
            "audio: recording started ({} Hz × {} ch)",
            format.sample_rate,
            format.channels
        );
        self.active = Some(ActiveRecording {
            stream,
            buffer,
            started_at: Instant::now(),
        });
        Ok(())
    }

    /// Finish the active recording and return its clip.
    ///
    /// # Errors
    ///
    /// [`CaptureError::NotRecording`] with nothing active;
    /// [`CaptureError::EmptyRecording`] when no samples arrived.
    pub async fn stop(&mut self) -> Result<AudioClip, CaptureError> {
        let active = self.active.take().ok_or(CaptureError::NotRecording)?;

        if !self.options.flush.is_zero() {
            tokio::time::sleep(self.options.flush).await;
        }

        let ActiveRecording {
            stream,
            buffer,
            started_at,
        } = active;
        drop(stream);

        let raw = match buffer.lock() {
            Ok(mut buf) => buf.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        log::debug!(
            "audio: recording stopped after {:.2}s, {} samples",
            started_at.elapsed().as_secs_f32(),
            raw.samples.len()
        );

        package_clip(raw, &self.options)
    }

    /// Abandon the active recording without producing a clip.
    ///
    /// Returns `true` if a recording was active.
    pub fn cancel(&mut self) -> bool {
        let was_active = self.active.take().is_some();
        if was_active {
            log::debug!("audio: recording cancelled");
        }
        was_active
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
