//! Audio capture: microphone → bounded sample buffer → WAV clip.
//!
//! # Pipeline
//!
//! ```text
//! InputDevice (cpal callback) → CaptureBuffer → AudioCapture::stop
//!   → downmix → resample → noise gate → peak normalise → WAV → AudioClip
//! ```

pub mod capture;
pub mod clip;
pub mod device;
pub mod encode;

pub use capture::{AudioCapture, CaptureError, CaptureOptions};
pub use clip::AudioClip;
pub use device::{CaptureBuffer, CpalDevice, InputDevice, SharedBuffer, StreamFormat};
pub use encode::{encode_wav, package_clip, RawRecording};

#[cfg(test)]
pub use device::{DeviceProbe, MockInputDevice};
