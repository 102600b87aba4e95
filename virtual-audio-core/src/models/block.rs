use std::sync::Arc;
use std::time::Duration;

use super::error::BlockError;
use super::format::{AudioFormat, SampleFormat};

/// A discrete, timestamped chunk of audio passed through the splitter.
///
/// Samples are stored planar (non-interleaved): one buffer per channel,
/// each wrapped in an `Arc` so clones and single-channel extraction are
/// zero-copy. Blocks are created by the external tap, borrowed read-only
/// for the duration of one distribution pass, and never retained past it.
///
/// The timestamp is the tap's session clock and travels with the block, so
/// downstream operations take just the block.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use virtual_audio_core::{AudioBlock, SampleFormat};
///
/// let block = AudioBlock::from_planar(
///     vec![vec![0.0; 480], vec![0.0; 480]],
///     48_000.0,
///     SampleFormat::Float32,
///     Duration::ZERO,
/// )
/// .unwrap();
/// assert_eq!(block.frames(), 480);
/// assert_eq!(block.duration(), Duration::from_millis(10));
/// ```
#[derive(Debug, Clone)]
pub struct AudioBlock {
    format: AudioFormat,
    frames: usize,
    timestamp: Duration,
    channels: Vec<Arc<Vec<f32>>>,
}

impl AudioBlock {
    /// Creates a block from planar channel buffers.
    ///
    /// All channel buffers must have equal length; at least one channel is
    /// required.
    pub fn from_planar(
        channels: Vec<Vec<f32>>,
        sample_rate: f64,
        sample_format: SampleFormat,
        timestamp: Duration,
    ) -> Result<Self, BlockError> {
        if channels.is_empty() {
            return Err(BlockError::NoChannels);
        }
        let frames = channels[0].len();
        if channels.iter().any(|c| c.len() != frames) {
            return Err(BlockError::MismatchedChannels);
        }

        let format = AudioFormat::new(sample_rate, channels.len() as u16, sample_format);
        Ok(Self {
            format,
            frames,
            timestamp,
            channels: channels.into_iter().map(Arc::new).collect(),
        })
    }

    /// Creates a block from an interleaved buffer as delivered by a
    /// hardware tap (`[L0, R0, L1, R1, ...]` for stereo).
    pub fn from_interleaved(
        samples: &[f32],
        channels: u16,
        sample_rate: f64,
        sample_format: SampleFormat,
        timestamp: Duration,
    ) -> Result<Self, BlockError> {
        if channels == 0 {
            return Err(BlockError::NoChannels);
        }
        if samples.len() % channels as usize != 0 {
            return Err(BlockError::RaggedInterleave {
                len: samples.len(),
                channels,
            });
        }

        let planar = crate::processing::sample::deinterleave(samples, channels);
        Self::from_planar(planar, sample_rate, sample_format, timestamp)
    }

    /// Assembles a block from already-shared channel buffers.
    ///
    /// Used by the converter to hand back zero-copy results. Callers must
    /// uphold the planar invariants (equal lengths, `channels.len()` equal
    /// to `format.channels`).
    pub(crate) fn from_shared(
        channels: Vec<Arc<Vec<f32>>>,
        format: AudioFormat,
        timestamp: Duration,
    ) -> Self {
        let frames = channels.first().map_or(0, |c| c.len());
        Self {
            format,
            frames,
            timestamp,
            channels,
        }
    }

    /// The block's format.
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Number of frames (one sample per channel each).
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Session-clock timestamp of the first frame.
    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    /// Wall-clock duration covered by this block.
    pub fn duration(&self) -> Duration {
        if self.format.sample_rate <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames as f64 / self.format.sample_rate)
    }

    /// Number of channels.
    pub fn channel_count(&self) -> u16 {
        self.channels.len() as u16
    }

    /// Samples for one channel, or `None` when out of range.
    pub fn channel(&self, index: u16) -> Option<&[f32]> {
        self.channels.get(index as usize).map(|c| c.as_slice())
    }

    /// Shared handle to one channel buffer (zero-copy extraction).
    pub(crate) fn channel_shared(&self, index: usize) -> Arc<Vec<f32>> {
        Arc::clone(&self.channels[index])
    }

    /// All shared channel buffers.
    pub(crate) fn channels_shared(&self) -> &[Arc<Vec<f32>>] {
        &self.channels
    }

    /// Whether the block carries no frames.
    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    /// Copies the block out as one interleaved buffer, for consumers that
    /// expect `[L0, R0, L1, R1, ...]` layout.
    pub fn interleaved(&self) -> Vec<f32> {
        crate::processing::sample::interleave(&self.channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo_block(frames: usize) -> AudioBlock {
        AudioBlock::from_planar(
            vec![vec![0.25; frames], vec![-0.25; frames]],
            48_000.0,
            SampleFormat::Float32,
            Duration::ZERO,
        )
        .unwrap()
    }

    #[test]
    fn planar_construction() {
        let block = stereo_block(480);
        assert_eq!(block.frames(), 480);
        assert_eq!(block.channel_count(), 2);
        assert_eq!(block.format().sample_rate, 48_000.0);
        assert_eq!(block.duration(), Duration::from_millis(10));
    }

    #[test]
    fn rejects_empty_channel_list() {
        let err = AudioBlock::from_planar(vec![], 48_000.0, SampleFormat::Float32, Duration::ZERO);
        assert_eq!(err.unwrap_err(), BlockError::NoChannels);
    }

    #[test]
    fn rejects_mismatched_channel_lengths() {
        let err = AudioBlock::from_planar(
            vec![vec![0.0; 10], vec![0.0; 11]],
            48_000.0,
            SampleFormat::Float32,
            Duration::ZERO,
        );
        assert_eq!(err.unwrap_err(), BlockError::MismatchedChannels);
    }

    #[test]
    fn interleaved_round_trip() {
        let samples = [0.1f32, -0.1, 0.2, -0.2, 0.3, -0.3];
        let block =
            AudioBlock::from_interleaved(&samples, 2, 48_000.0, SampleFormat::Float32, Duration::ZERO)
                .unwrap();

        assert_eq!(block.frames(), 3);
        assert_eq!(block.channel(0).unwrap(), &[0.1, 0.2, 0.3]);
        assert_eq!(block.channel(1).unwrap(), &[-0.1, -0.2, -0.3]);
        assert_eq!(block.interleaved(), samples);
    }

    #[test]
    fn rejects_ragged_interleave() {
        let err = AudioBlock::from_interleaved(
            &[0.0; 5],
            2,
            48_000.0,
            SampleFormat::Float32,
            Duration::ZERO,
        );
        assert!(matches!(err.unwrap_err(), BlockError::RaggedInterleave { len: 5, channels: 2 }));
    }

    #[test]
    fn clone_shares_channel_buffers() {
        let block = stereo_block(100);
        let copy = block.clone();
        assert!(Arc::ptr_eq(&block.channels[0], &copy.channels[0]));
        assert!(Arc::ptr_eq(&block.channels[1], &copy.channels[1]));
    }

    #[test]
    fn channel_out_of_range() {
        let block = stereo_block(10);
        assert!(block.channel(2).is_none());
    }

    #[test]
    fn timestamp_travels_with_block() {
        let block = AudioBlock::from_planar(
            vec![vec![0.0; 10]],
            16_000.0,
            SampleFormat::Float32,
            Duration::from_millis(250),
        )
        .unwrap();
        assert_eq!(block.timestamp(), Duration::from_millis(250));
    }
}
