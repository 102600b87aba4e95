//! Per-destination format conversion.
//!
//! A [`FormatConverter`] is built once per destination registration for a
//! fixed (source → target) pair and never mutated during a distribution
//! pass. Resampling uses linear interpolation, which is fast and adequate
//! for speech feeds; every conversion call consumes its whole input block
//! with no carry-over between calls.

use std::sync::Arc;

use crate::models::block::AudioBlock;
use crate::models::error::ConvertError;
use crate::models::format::{AudioFormat, SampleFormat};
use crate::processing::sample::quantize_to_i16_precision;

/// How source channels map onto target channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelMap {
    /// Average all source channels when reducing to mono, duplicate when
    /// widening from mono.
    #[default]
    Downmix,

    /// Copy exactly one source channel into a mono target. Used by
    /// channel-split destinations so each language channel stays
    /// independent instead of being averaged away.
    Select(u16),
}

/// Stateless converter for one (source, target) format pair.
#[derive(Debug, Clone)]
pub struct FormatConverter {
    source: AudioFormat,
    target: AudioFormat,
    channel_map: ChannelMap,
}

impl FormatConverter {
    /// Builds a converter with the default [`ChannelMap::Downmix`] policy.
    pub fn new(source: AudioFormat, target: AudioFormat) -> Result<Self, ConvertError> {
        Self::with_channel_map(source, target, ChannelMap::Downmix)
    }

    /// Builds a converter with an explicit channel mapping.
    pub fn with_channel_map(
        source: AudioFormat,
        target: AudioFormat,
        channel_map: ChannelMap,
    ) -> Result<Self, ConvertError> {
        if !source.is_valid() {
            return Err(ConvertError::InvalidSource(source));
        }
        if !target.is_valid() {
            return Err(ConvertError::InvalidTarget(target));
        }
        if let ChannelMap::Select(channel) = channel_map {
            if target.channels != 1 {
                return Err(ConvertError::SelectNeedsMono(target.channels));
            }
            if channel >= source.channels {
                return Err(ConvertError::ChannelOutOfRange {
                    channel,
                    channels: source.channels,
                });
            }
        }

        Ok(Self {
            source,
            target,
            channel_map,
        })
    }

    /// The fixed source format.
    pub fn source(&self) -> AudioFormat {
        self.source
    }

    /// The fixed target format.
    pub fn target(&self) -> AudioFormat {
        self.target
    }

    /// Converts one block, preserving its timestamp.
    ///
    /// Identical formats short-circuit to a zero-copy clone. Otherwise the
    /// pipeline is: channel mapping → per-channel resampling → Int16
    /// quantization where the target asks for it.
    pub fn convert(&self, block: &AudioBlock) -> Result<AudioBlock, ConvertError> {
        if block.format() != self.source {
            return Err(ConvertError::SourceMismatch {
                expected: self.source,
                got: block.format(),
            });
        }

        if self.source == self.target && self.channel_map == ChannelMap::Downmix {
            return Ok(block.clone());
        }

        let mapped = match self.channel_map {
            ChannelMap::Select(channel) => vec![block.channel_shared(channel as usize)],
            ChannelMap::Downmix => map_channels(block, self.target.channels),
        };

        let rates_differ = (self.source.sample_rate - self.target.sample_rate).abs() > f64::EPSILON;
        let quantize = self.target.sample_format == SampleFormat::Int16;

        let channels = mapped
            .into_iter()
            .map(|channel| {
                if !rates_differ && !quantize {
                    return channel;
                }
                let mut samples = if rates_differ {
                    resample_channel(&channel, self.source.sample_rate, self.target.sample_rate)
                } else {
                    channel.as_ref().clone()
                };
                if quantize {
                    for sample in &mut samples {
                        *sample = quantize_to_i16_precision(*sample);
                    }
                }
                Arc::new(samples)
            })
            .collect();

        Ok(AudioBlock::from_shared(channels, self.target, block.timestamp()))
    }
}

/// Maps planar source channels onto `target` channels under the downmix
/// policy. Channels that pass through untouched keep their shared buffers.
fn map_channels(block: &AudioBlock, target: u16) -> Vec<Arc<Vec<f32>>> {
    let source = block.channel_count();
    if source == target {
        return block.channels_shared().to_vec();
    }

    if target == 1 {
        // Average all source channels into one.
        let mut mono = vec![0.0f32; block.frames()];
        for channel in block.channels_shared() {
            for (acc, &sample) in mono.iter_mut().zip(channel.iter()) {
                *acc += sample;
            }
        }
        let scale = 1.0 / f32::from(source);
        for sample in &mut mono {
            *sample *= scale;
        }
        return vec![Arc::new(mono)];
    }

    if source == 1 {
        // Duplicate mono into every target channel.
        let channel = block.channel_shared(0);
        return (0..target).map(|_| Arc::clone(&channel)).collect();
    }

    // Uneven multichannel layouts: keep the first channels when narrowing,
    // repeat the last when widening.
    let mut out = block.channels_shared().to_vec();
    out.truncate(target as usize);
    while out.len() < target as usize {
        let last = Arc::clone(&out[out.len() - 1]);
        out.push(last);
    }
    out
}

/// Linear-interpolation resampling of one planar channel.
///
/// Output length is `round(frames × to_rate / from_rate)` so a 480-frame
/// block at 48 kHz maps to exactly 160 frames at 16 kHz.
fn resample_channel(samples: &[f32], from_rate: f64, to_rate: f64) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }

    let ratio = to_rate / from_rate;
    let out_len = (samples.len() as f64 * ratio).round() as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos as usize;
        let frac = (src_pos - idx as f64) as f32;

        let sample = match (samples.get(idx), samples.get(idx + 1)) {
            (Some(&a), Some(&b)) => a * (1.0 - frac) + b * frac,
            (Some(&a), None) => a,
            (None, _) => samples[samples.len() - 1],
        };
        out.push(sample);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::time::Duration;

    fn stereo_48k(frames: usize) -> AudioBlock {
        let left: Vec<f32> = (0..frames).map(|i| (i as f32 / frames as f32) * 0.5).collect();
        let right: Vec<f32> = left.iter().map(|s| -s).collect();
        AudioBlock::from_planar(
            vec![left, right],
            48_000.0,
            SampleFormat::Float32,
            Duration::ZERO,
        )
        .unwrap()
    }

    #[test]
    fn transcription_conversion_frame_count() {
        // 480 frames (10ms at 48kHz) → 160 frames (10ms at 16kHz)
        let converter =
            FormatConverter::new(stereo_48k(1).format(), AudioFormat::transcription()).unwrap();
        let out = converter.convert(&stereo_48k(480)).unwrap();

        assert_eq!(out.frames(), 160);
        assert_eq!(out.channel_count(), 1);
        assert_eq!(out.format(), AudioFormat::transcription());
        assert_eq!(out.duration(), Duration::from_millis(10));
    }

    #[test]
    fn identical_formats_are_zero_copy() {
        let block = stereo_48k(100);
        let converter = FormatConverter::new(block.format(), block.format()).unwrap();
        let out = converter.convert(&block).unwrap();

        assert!(Arc::ptr_eq(
            &block.channels_shared()[0],
            &out.channels_shared()[0]
        ));
        assert_eq!(out.channel(0).unwrap(), block.channel(0).unwrap());
    }

    #[test]
    fn select_extracts_one_channel_zero_copy() {
        let block = stereo_48k(240);
        let target = AudioFormat::mono(48_000.0);
        let converter =
            FormatConverter::with_channel_map(block.format(), target, ChannelMap::Select(1))
                .unwrap();

        let out = converter.convert(&block).unwrap();
        assert_eq!(out.channel_count(), 1);
        assert_eq!(out.channel(0).unwrap(), block.channel(1).unwrap());
        assert!(Arc::ptr_eq(
            &block.channels_shared()[1],
            &out.channels_shared()[0]
        ));
    }

    #[test]
    fn downmix_averages_channels() {
        let block = AudioBlock::from_planar(
            vec![vec![0.5, 0.5], vec![-0.5, 0.5]],
            48_000.0,
            SampleFormat::Float32,
            Duration::ZERO,
        )
        .unwrap();
        let converter =
            FormatConverter::new(block.format(), AudioFormat::mono(48_000.0)).unwrap();

        let out = converter.convert(&block).unwrap();
        assert_eq!(out.channel(0).unwrap(), &[0.0, 0.5]);
    }

    #[test]
    fn mono_widens_by_duplication() {
        let block = AudioBlock::from_planar(
            vec![vec![0.1, 0.2, 0.3]],
            48_000.0,
            SampleFormat::Float32,
            Duration::ZERO,
        )
        .unwrap();
        let target = AudioFormat::new(48_000.0, 2, SampleFormat::Float32);
        let converter = FormatConverter::new(block.format(), target).unwrap();

        let out = converter.convert(&block).unwrap();
        assert_eq!(out.channel(0).unwrap(), out.channel(1).unwrap());
    }

    #[test]
    fn upsample_interpolates() {
        let block = AudioBlock::from_planar(
            vec![vec![0.0, 1.0]],
            16_000.0,
            SampleFormat::Float32,
            Duration::ZERO,
        )
        .unwrap();
        let target = AudioFormat::mono(32_000.0);
        let converter = FormatConverter::new(block.format(), target).unwrap();

        let out = converter.convert(&block).unwrap();
        assert_eq!(out.frames(), 4);
        let samples = out.channel(0).unwrap();
        assert_eq!(samples[0], 0.0);
        assert!(samples[1] > 0.0 && samples[1] < 1.0);
    }

    #[test]
    fn int16_target_quantizes() {
        let raw = 0.123_456_789_f32;
        let block = AudioBlock::from_planar(
            vec![vec![raw]],
            48_000.0,
            SampleFormat::Float32,
            Duration::ZERO,
        )
        .unwrap();
        let target = AudioFormat::new(48_000.0, 1, SampleFormat::Int16);
        let converter = FormatConverter::new(block.format(), target).unwrap();

        let out = converter.convert(&block).unwrap();
        let quantized = out.channel(0).unwrap()[0];
        assert_ne!(quantized, raw);
        assert_relative_eq!(quantized, raw, epsilon = 1.0 / 32767.0);
        assert_eq!(quantized, quantize_to_i16_precision(quantized));
    }

    #[test]
    fn rejects_invalid_pairs() {
        let good = AudioFormat::default();
        let zero_rate = AudioFormat::new(0.0, 2, SampleFormat::Float32);

        assert!(matches!(
            FormatConverter::new(zero_rate, good),
            Err(ConvertError::InvalidSource(_))
        ));
        assert!(matches!(
            FormatConverter::new(good, zero_rate),
            Err(ConvertError::InvalidTarget(_))
        ));
    }

    #[test]
    fn rejects_select_out_of_range() {
        let err = FormatConverter::with_channel_map(
            AudioFormat::default(),
            AudioFormat::mono(48_000.0),
            ChannelMap::Select(2),
        );
        assert!(matches!(
            err,
            Err(ConvertError::ChannelOutOfRange { channel: 2, channels: 2 })
        ));
    }

    #[test]
    fn rejects_select_into_stereo() {
        let err = FormatConverter::with_channel_map(
            AudioFormat::default(),
            AudioFormat::default(),
            ChannelMap::Select(0),
        );
        assert!(matches!(err, Err(ConvertError::SelectNeedsMono(2))));
    }

    #[test]
    fn rejects_mismatched_block() {
        let converter =
            FormatConverter::new(AudioFormat::default(), AudioFormat::transcription()).unwrap();
        let wrong = AudioBlock::from_planar(
            vec![vec![0.0; 10]],
            44_100.0,
            SampleFormat::Float32,
            Duration::ZERO,
        )
        .unwrap();

        assert!(matches!(
            converter.convert(&wrong),
            Err(ConvertError::SourceMismatch { .. })
        ));
    }

    #[test]
    fn timestamp_preserved_across_conversion() {
        let block = AudioBlock::from_planar(
            vec![vec![0.0; 480], vec![0.0; 480]],
            48_000.0,
            SampleFormat::Float32,
            Duration::from_millis(30),
        )
        .unwrap();
        let converter =
            FormatConverter::new(block.format(), AudioFormat::transcription()).unwrap();

        let out = converter.convert(&block).unwrap();
        assert_eq!(out.timestamp(), Duration::from_millis(30));
    }

    #[test]
    fn empty_block_converts_to_empty() {
        let block = AudioBlock::from_planar(
            vec![vec![], vec![]],
            48_000.0,
            SampleFormat::Float32,
            Duration::ZERO,
        )
        .unwrap();
        let converter =
            FormatConverter::new(block.format(), AudioFormat::transcription()).unwrap();

        let out = converter.convert(&block).unwrap();
        assert!(out.is_empty());
    }
}
