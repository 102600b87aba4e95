//! # virtual-audio-core
//!
//! Platform-agnostic audio splitting core.
//!
//! Takes one stream of audio blocks at native rate/format and fans it out
//! to any number of named destinations, each with its own target format,
//! enable state, and cached converter. The endpoint/driver layer
//! (`virtual-audio-driver`) wires destinations to virtual devices; this
//! crate knows nothing about devices or hosts.
//!
//! ## Architecture
//!
//! ```text
//! virtual-audio-core (this crate)
//! ├── models/       ← AudioFormat, AudioBlock, errors, statistics
//! ├── processing/   ← sample math, FormatConverter
//! └── splitter      ← AudioSplitter (fan-out engine)
//! ```
//!
//! ## Threading
//!
//! `AudioSplitter::process` is called from a single realtime producer
//! thread; every other operation belongs to control threads. The hot path
//! never blocks beyond a bounded mutex over the destination list, and all
//! throughput counters are lock-free atomics.

pub mod models;
pub mod processing;
pub mod splitter;

// Re-export key types at crate root for convenience.
pub use models::block::AudioBlock;
pub use models::error::{BlockError, ConvertError, SplitterError};
pub use models::format::{
    AudioFormat, SampleFormat, DEFAULT_SAMPLE_RATE, TRANSCRIPTION_SAMPLE_RATE,
};
pub use models::stats::SplitterStatistics;
pub use processing::converter::{ChannelMap, FormatConverter};
pub use splitter::{AudioCallback, AudioSplitter, DestinationId};
