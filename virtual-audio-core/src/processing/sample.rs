//! Pure sample math shared by the converter and the tap boundary.

use std::sync::Arc;

/// Converts an f32 sample in `[-1.0, 1.0]` to i16.
///
/// Uses × 32767 for symmetric scaling; out-of-range input is clamped.
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Converts an i16 sample to f32 in `[-1.0, 1.0]`.
#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / 32768.0
}

/// Snaps an f32 sample onto the 16-bit grid while keeping f32 storage.
///
/// Symmetric in both directions (1.0 stays 1.0), so quantizing twice is a
/// no-op.
#[inline]
pub fn quantize_to_i16_precision(sample: f32) -> f32 {
    let scaled = (sample * 32767.0).clamp(-32768.0, 32767.0).round();
    scaled / 32767.0
}

/// Splits an interleaved buffer into planar per-channel buffers.
///
/// `samples.len()` must be a multiple of `channels`; callers validate.
pub fn deinterleave(samples: &[f32], channels: u16) -> Vec<Vec<f32>> {
    if channels == 0 {
        return Vec::new();
    }
    let channels = channels as usize;
    let frames = samples.len() / channels;
    let mut planar = vec![Vec::with_capacity(frames); channels];

    for frame in samples.chunks_exact(channels) {
        for (buffer, &sample) in planar.iter_mut().zip(frame) {
            buffer.push(sample);
        }
    }
    planar
}

/// Interleaves planar channel buffers into `[L0, R0, L1, R1, ...]`.
pub fn interleave(channels: &[Arc<Vec<f32>>]) -> Vec<f32> {
    let frames = channels.first().map_or(0, |c| c.len());
    let mut out = Vec::with_capacity(frames * channels.len());

    for frame in 0..frames {
        for channel in channels {
            out.push(channel[frame]);
        }
    }
    out
}
