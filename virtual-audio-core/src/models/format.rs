use std::fmt;

use serde::{Deserialize, Serialize};

/// Standard sample rate for speech-recognition feeds.
pub const TRANSCRIPTION_SAMPLE_RATE: f64 = 16_000.0;

/// Default native sample rate used when the tap does not specify one.
pub const DEFAULT_SAMPLE_RATE: f64 = 48_000.0;

/// Sample representation a destination expects.
///
/// Blocks always carry `f32` storage; `Int16` marks a destination whose
/// consumer expects 16-bit fixed-point precision, and conversion to such a
/// target quantizes each sample through the i16 scale before delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// 32-bit IEEE float in `[-1.0, 1.0]`.
    #[default]
    Float32,
    /// 16-bit signed fixed point.
    Int16,
}

impl SampleFormat {
    /// Width of one sample in bytes.
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            Self::Float32 => 4,
            Self::Int16 => 2,
        }
    }

    /// Whether this is a floating-point representation.
    pub fn is_float(&self) -> bool {
        matches!(self, Self::Float32)
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float32 => write!(f, "f32"),
            Self::Int16 => write!(f, "i16"),
        }
    }
}

/// A concrete stream format: sample rate, channel count, sample representation.
///
/// Two formats are compatible (no conversion needed) iff all three fields
/// are equal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz. Must be positive.
    pub sample_rate: f64,

    /// Number of channels (1 = mono, 2 = stereo). Must be nonzero.
    pub channels: u16,

    /// Sample representation.
    pub sample_format: SampleFormat,
}

impl AudioFormat {
    /// Creates a new format description.
    pub fn new(sample_rate: f64, channels: u16, sample_format: SampleFormat) -> Self {
        Self {
            sample_rate,
            channels,
            sample_format,
        }
    }

    /// The standard speech-recognition format: 16 kHz mono float.
    pub fn transcription() -> Self {
        Self::new(TRANSCRIPTION_SAMPLE_RATE, 1, SampleFormat::Float32)
    }

    /// A mono float format at the given rate.
    pub fn mono(sample_rate: f64) -> Self {
        Self::new(sample_rate, 1, SampleFormat::Float32)
    }

    /// Whether the format is usable: positive rate, at least one channel.
    pub fn is_valid(&self) -> bool {
        self.sample_rate > 0.0 && self.sample_rate.is_finite() && self.channels > 0
    }

    /// Whether a block in this format can be delivered as-is to `other`.
    pub fn is_compatible(&self, other: &Self) -> bool {
        self == other
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE, 2, SampleFormat::Float32)
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz, {} ch, {}",
            self.sample_rate, self.channels, self.sample_format
        )
    }
}
