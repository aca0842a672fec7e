//! Turning raw device samples into an uploadable clip.
//!
//! ```text
//! interleaved f32 @ device rate
//!   → downmix_to_mono
//!   → resample_linear (→ AudioConfig::sample_rate)
//!   → apply_noise_gate      (noise suppression)
//!   → normalize_peak        (auto gain control)
//!   → encode_wav            (16-bit PCM, mono)
//! ```

use std::io::Cursor;
use std::time::Duration;

use super::capture::{CaptureError, CaptureOptions};
use super::clip::AudioClip;
use super::device::StreamFormat;

/// Peak amplitude that auto gain control normalises towards.
const TARGET_PEAK: f32 = 0.9;

/// Peaks below this are treated as silence and never amplified.
const MIN_GAIN_PEAK: f32 = 1e-4;

/// Samples collected between `start` and `stop`, as delivered by the device.
#[derive(Debug, Clone, Default)]
pub struct RawRecording {
    /// Interleaved PCM samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    pub format: StreamFormat,
}

// ---------------------------------------------------------------------------
// Channel / rate conversion
// ---------------------------------------------------------------------------

/// Average interleaved channels into one.
///
/// `channels == 0` yields an empty vector; a trailing partial frame is
/// dropped.
pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

/// Linear-interpolation resampler.
///
/// Output length is `ceil(len * target / source)`.  Speech is uploaded for
/// server-side recognition, so interpolation quality is sufficient.
pub fn resample_linear(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate || source_rate == 0 || target_rate == 0 {
        return samples.to_vec();
    }
    if samples.is_empty() {
        return Vec::new();
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let output_len = (samples.len() as f64 * ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let src_pos = i as f64 / ratio;
            let idx = src_pos as usize;
            let frac = (src_pos - idx as f64) as f32;
            match (samples.get(idx), samples.get(idx + 1)) {
                (Some(a), Some(b)) => a * (1.0 - frac) + b * frac,
                (Some(a), None) => *a,
                _ => 0.0,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Processing
// ---------------------------------------------------------------------------

/// Zero every sample whose magnitude is below `gate`.
pub fn apply_noise_gate(samples: &mut [f32], gate: f32) {
    for s in samples.iter_mut() {
        if s.abs() < gate {
            *s = 0.0;
        }
    }
}

/// Scale the clip so its peak sits at `target_peak`.
///
/// Near-silent clips are left alone so background hiss is not amplified
/// into something that sounds like speech.
pub fn normalize_peak(samples: &mut [f32], target_peak: f32) {
    let peak = samples.iter().map(|s| s.abs()).fold(0.0_f32, f32::max);
    if peak < MIN_GAIN_PEAK {
        return;
    }
    let gain = target_peak / peak;
    for s in samples.iter_mut() {
        *s = (*s * gain).clamp(-1.0, 1.0);
    }
}

/// Encode mono `f32` samples as 16-bit PCM WAV.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            let pcm = (sample * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            writer.write_sample(pcm)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Run the full conversion chain and wrap the result in an [`AudioClip`].
///
/// # Errors
///
/// [`CaptureError::EmptyRecording`] when the device delivered no complete
/// frame; [`CaptureError::Encode`] when WAV encoding fails.
pub fn package_clip(raw: RawRecording, options: &CaptureOptions) -> Result<AudioClip, CaptureError> {
    let mono = downmix_to_mono(&raw.samples, raw.format.channels);
    if mono.is_empty() {
        return Err(CaptureError::EmptyRecording);
    }

    let mut samples = resample_linear(&mono, raw.format.sample_rate, options.target_sample_rate);
    if options.noise_suppression {
        apply_noise_gate(&mut samples, options.noise_gate);
    }
    if options.auto_gain_control {
        normalize_peak(&mut samples, TARGET_PEAK);
    }

    let duration =
        Duration::from_secs_f64(samples.len() as f64 / options.target_sample_rate.max(1) as f64);
    let bytes = encode_wav(&samples, options.target_sample_rate)
        .map_err(|e| CaptureError::Encode(e.to_string()))?;

    log::debug!(
        "audio: packaged clip {} bytes, {:.2}s",
        bytes.len(),
        duration.as_secs_f32()
    );
    AudioClip::wav(bytes, duration)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
