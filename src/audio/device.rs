//! Platform microphone seam.
//!
//! [`InputDevice`] is the one place the capture layer touches hardware.
//! `open` hands the device a [`SharedBuffer`] to fill from its callback and
//! returns an RAII stream guard; dropping the guard releases the microphone.
//!
//! [`CpalDevice`] is the production implementation.  [`MockInputDevice`]
//! (available under `#[cfg(test)]`) feeds canned samples and records every
//! open/release so tests can assert the device is never leaked.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use super::capture::{CaptureError, CaptureOptions};
use super::encode::RawRecording;

// ---------------------------------------------------------------------------
// StreamFormat
// ---------------------------------------------------------------------------

/// Native format of the samples a device delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    /// Sample rate in Hz (commonly 44 100 or 48 000).
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
}

impl Default for StreamFormat {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
        }
    }
}

// ---------------------------------------------------------------------------
// CaptureBuffer
// ---------------------------------------------------------------------------

/// Bounded sample store filled by the device callback.
///
/// Holds at most `max_recording_secs` of audio; once full, the oldest
/// samples are dropped so the tail of a long utterance survives.
#[derive(Debug)]
pub struct CaptureBuffer {
    samples: VecDeque<f32>,
    capacity: usize,
    format: StreamFormat,
}

impl CaptureBuffer {
    pub fn new(format: StreamFormat, max_recording_secs: f32) -> Self {
        let channels = format.channels.max(1) as usize;
        let frames = (max_recording_secs.max(0.0) * format.sample_rate as f32) as usize;
        let capacity = (frames * channels).max(channels);
        Self {
            samples: VecDeque::new(),
            capacity,
            format,
        }
    }

    /// Append interleaved samples, evicting the oldest beyond capacity.
    pub fn push(&mut self, data: &[f32]) {
        if data.len() >= self.capacity {
            self.samples.clear();
            self.samples
                .extend(data[data.len() - self.capacity..].iter().copied());
            return;
        }
        let overflow = (self.samples.len() + data.len()).saturating_sub(self.capacity);
        self.samples.drain(..overflow);
        self.samples.extend(data.iter().copied());
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Maximum number of samples retained.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Move everything collected so far out of the buffer.
    pub fn take(&mut self) -> RawRecording {
        RawRecording {
            samples: self.samples.drain(..).collect(),
            format: self.format,
        }
    }
}

/// Buffer shared between the device callback thread and [`AudioCapture`].
///
/// [`AudioCapture`]: super::AudioCapture
pub type SharedBuffer = Arc<Mutex<CaptureBuffer>>;

// ---------------------------------------------------------------------------
// InputDevice trait
// ---------------------------------------------------------------------------

/// A microphone that can be opened for one recording at a time.
pub trait InputDevice {
    /// RAII guard for an open stream.  Dropping it releases the device.
    type Stream;

    /// Query the format the next stream will deliver.
    fn format(&mut self) -> Result<StreamFormat, CaptureError>;

    /// Start streaming into `buffer`.
    fn open(
        &mut self,
        options: &CaptureOptions,
        buffer: SharedBuffer,
    ) -> Result<Self::Stream, CaptureError>;
}

// ---------------------------------------------------------------------------
// CpalDevice
// ---------------------------------------------------------------------------

/// Default input device of the default cpal host.
///
/// The device is re-resolved on every recording so a microphone plugged in
/// after startup is picked up.
pub struct CpalDevice {
    host: cpal::Host,
    selected: Option<(cpal::Device, cpal::SupportedStreamConfig)>,
}

impl CpalDevice {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
            selected: None,
        }
    }

    fn resolve(&self) -> Result<(cpal::Device, cpal::SupportedStreamConfig), CaptureError> {
        let device = self.host.default_input_device().ok_or_else(|| {
            CaptureError::DeviceUnavailable("no input device found on the default audio host".into())
        })?;
        let supported = device.default_input_config()?;
        if let Ok(name) = device.name() {
            log::debug!(
                "audio: input device '{name}' {} Hz × {} ch ({:?})",
                supported.sample_rate().0,
                supported.channels(),
                supported.sample_format()
            );
        }
        Ok((device, supported))
    }
}

impl Default for CpalDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl InputDevice for CpalDevice {
    type Stream = cpal::Stream;

    fn format(&mut self) -> Result<StreamFormat, CaptureError> {
        let (device, supported) = self.resolve()?;
        let format = StreamFormat {
            sample_rate: supported.sample_rate().0,
            channels: supported.channels(),
        };
        self.selected = Some((device, supported));
        Ok(format)
    }

    fn open(
        &mut self,
        options: &CaptureOptions,
        buffer: SharedBuffer,
    ) -> Result<cpal::Stream, CaptureError> {
        let (device, supported) = match self.selected.take() {
            Some(selected) => selected,
            None => self.resolve()?,
        };

        if options.echo_cancellation {
            // cpal hands out the raw input signal on every host.
            log::debug!("audio: echo cancellation requested but not provided by the audio host");
        }

        let config: cpal::StreamConfig = supported.config();
        let on_error = |err: cpal::StreamError| {
            log::error!("audio: cpal stream error: {err}");
        };

        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.push(data);
                    }
                },
                on_error,
                None,
            )?,
            cpal::SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let converted: Vec<f32> =
                        data.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
                    if let Ok(mut buf) = buffer.lock() {
                        buf.push(&converted);
                    }
                },
                on_error,
                None,
            )?,
            other => {
                return Err(CaptureError::DeviceUnavailable(format!(
                    "unsupported input sample format {other:?}"
                )))
            }
        };

        stream.play()?;
        Ok(stream)
    }
}

// ---------------------------------------------------------------------------
// MockInputDevice
// ---------------------------------------------------------------------------

/// Counters shared between a [`MockInputDevice`] and the test that owns it.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct DeviceProbe {
    pub opened: std::sync::atomic::AtomicUsize,
    pub released: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl DeviceProbe {
    pub fn opened(&self) -> usize {
        self.opened.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(std::sync::atomic::Ordering::SeqCst)
    }
}

/// Stream guard handed out by [`MockInputDevice`].
#[cfg(test)]
pub struct MockStream {
    probe: Arc<DeviceProbe>,
}

#[cfg(test)]
impl Drop for MockStream {
    fn drop(&mut self) {
        self.probe
            .released
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }
}

/// Test device: each `open` delivers the next queued recording in one
/// callback burst.  An empty queue delivers nothing.
#[cfg(test)]
pub struct MockInputDevice {
    pub format: StreamFormat,
    pub recordings: VecDeque<Vec<f32>>,
    pub deny_permission: bool,
    pub probe: Arc<DeviceProbe>,
}

#[cfg(test)]
impl MockInputDevice {
    pub fn new() -> Self {
        Self {
            format: StreamFormat::default(),
            recordings: VecDeque::new(),
            deny_permission: false,
            probe: Arc::new(DeviceProbe::default()),
        }
    }

    /// Queue one recording of `secs` seconds of a constant tone.
    pub fn with_recording(mut self, secs: f32) -> Self {
        let len = (secs * self.format.sample_rate as f32) as usize * self.format.channels as usize;
        self.recordings.push_back(vec![0.3; len]);
        self
    }

    pub fn denied() -> Self {
        Self {
            deny_permission: true,
            ..Self::new()
        }
    }
}

#[cfg(test)]
impl InputDevice for MockInputDevice {
    type Stream = MockStream;

    fn format(&mut self) -> Result<StreamFormat, CaptureError> {
        if self.deny_permission {
            return Err(CaptureError::PermissionDenied(
                "microphone access denied by user".into(),
            ));
        }
        Ok(self.format)
    }

    fn open(
        &mut self,
        _options: &CaptureOptions,
        buffer: SharedBuffer,
    ) -> Result<MockStream, CaptureError> {
        self.probe
            .opened
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if let Some(samples) = self.recordings.pop_front() {
            if let Ok(mut buf) = buffer.lock() {
                buf.push(&samples);
            }
        }
        Ok(MockStream {
            probe: Arc::clone(&self.probe),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
