use thiserror::Error;

use super::format::AudioFormat;

/// Errors constructing an [`AudioBlock`](super::block::AudioBlock).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BlockError {
    #[error("audio block needs at least one channel")]
    NoChannels,

    #[error("channel buffers have mismatched lengths")]
    MismatchedChannels,

    #[error("interleaved buffer of {len} samples is not a multiple of {channels} channels")]
    RaggedInterleave { len: usize, channels: u16 },
}

/// Errors building or running a format conversion.
///
/// A conversion error is always scoped to one destination; the splitter
/// skips that destination and keeps serving the rest.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConvertError {
    #[error("invalid source format: {0}")]
    InvalidSource(AudioFormat),

    #[error("invalid target format: {0}")]
    InvalidTarget(AudioFormat),

    #[error("channel {channel} out of range for {channels}-channel source")]
    ChannelOutOfRange { channel: u16, channels: u16 },

    #[error("channel selection requires a mono target, got {0} channels")]
    SelectNeedsMono(u16),

    #[error("block format {got} does not match converter source {expected}")]
    SourceMismatch {
        expected: AudioFormat,
        got: AudioFormat,
    },
}

/// Errors from [`AudioSplitter`](crate::splitter::AudioSplitter) operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SplitterError {
    #[error("splitter not initialized")]
    NotInitialized,

    #[error("invalid input format: {0}")]
    InvalidFormat(AudioFormat),

    #[error("already initialized with {existing}, refusing {requested}")]
    FormatMismatch {
        existing: AudioFormat,
        requested: AudioFormat,
    },

    #[error("unknown destination id: {0}")]
    UnknownDestination(u64),

    #[error("failed to build converter for destination '{name}': {source}")]
    ConverterBuild {
        name: String,
        #[source]
        source: ConvertError,
    },
}
