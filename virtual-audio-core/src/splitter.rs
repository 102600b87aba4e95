//! Audio fan-out engine.
//!
//! The [`AudioSplitter`] accepts one block at a time from the producer
//! thread and distributes a converted copy to every enabled destination,
//! in registration order, within the same call. Destinations are indexed
//! by their assigned id, so removal and enable-toggling always act on
//! exactly the named destination.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::models::block::AudioBlock;
use crate::models::error::SplitterError;
use crate::models::format::AudioFormat;
use crate::models::stats::SplitterStatistics;
use crate::processing::converter::{ChannelMap, FormatConverter};

/// Callback invoked with a converted block during a distribution pass.
///
/// Called synchronously on the producer thread's stack; consumers that
/// need to do heavy work should redispatch. The splitter makes no
/// dispatching guarantee beyond "called when data is available".
pub type AudioCallback = Arc<dyn Fn(&AudioBlock) + Send + Sync + 'static>;

/// Identifier assigned to a destination on registration.
///
/// Ids are unique per splitter and monotonically increasing, so iteration
/// in id order is registration order.
pub type DestinationId = u64;

/// A registered sink: target format, callback, enable state, and the
/// converter cached for its (input → target) pair.
struct Destination {
    name: String,
    target: AudioFormat,
    callback: AudioCallback,
    enabled: bool,
    /// Set when a conversion failed at process time; the destination is
    /// skipped until re-registered.
    faulted: bool,
    /// `None` means the target equals the input format (pure passthrough).
    converter: Option<FormatConverter>,
}

struct SplitterInner {
    input_format: Option<AudioFormat>,
    destinations: BTreeMap<DestinationId, Destination>,
    next_id: DestinationId,
    /// Ensures the mismatched-input warning fires once per initialization.
    format_warned: bool,
}

/// Fan-out engine: one input stream, many independently configured
/// destinations.
///
/// Mutations come from control threads; `process` runs on the producer
/// thread. The destination list is guarded by a mutex whose critical
/// section is bounded to list iteration plus conversion; throughput
/// counters are lock-free atomics.
///
/// Callbacks run while the destination list is locked, so they must not
/// call back into this splitter's mutation APIs.
pub struct AudioSplitter {
    inner: Mutex<SplitterInner>,
    frames_processed: AtomicU64,
    blocks_processed: AtomicU64,
    process_time_nanos: AtomicU64,
}

impl AudioSplitter {
    /// Creates an uninitialized splitter with no destinations.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SplitterInner {
                input_format: None,
                destinations: BTreeMap::new(),
                next_id: 1,
                format_warned: false,
            }),
            frames_processed: AtomicU64::new(0),
            blocks_processed: AtomicU64::new(0),
            process_time_nanos: AtomicU64::new(0),
        }
    }

    /// One-time initialization with the incoming stream format.
    ///
    /// Idempotent for an equal format; a different format is refused so
    /// cached converters can never disagree with the input.
    pub fn initialize(&self, input: AudioFormat) -> Result<(), SplitterError> {
        if !input.is_valid() {
            return Err(SplitterError::InvalidFormat(input));
        }

        let mut inner = self.inner.lock();
        match inner.input_format {
            Some(existing) if existing == input => Ok(()),
            Some(existing) => Err(SplitterError::FormatMismatch {
                existing,
                requested: input,
            }),
            None => {
                inner.input_format = Some(input);
                inner.format_warned = false;
                log::info!("splitter initialized: {input}");
                Ok(())
            }
        }
    }

    /// Registers a destination with an explicit target format.
    ///
    /// Builds a converter when the target differs from the input format;
    /// a converter that cannot be built leaves nothing registered.
    pub fn add_destination(
        &self,
        name: impl Into<String>,
        target: AudioFormat,
        callback: AudioCallback,
    ) -> Result<DestinationId, SplitterError> {
        self.register(name.into(), target, ChannelMap::Downmix, callback)
    }

    /// Registers a speech-recognition destination (16 kHz mono float).
    pub fn create_transcription_destination(
        &self,
        callback: AudioCallback,
    ) -> Result<DestinationId, SplitterError> {
        self.register(
            "Transcription".into(),
            AudioFormat::transcription(),
            ChannelMap::Downmix,
            callback,
        )
    }

    /// Registers a passthrough destination that receives the input stream
    /// unchanged (zero conversion, zero quality loss).
    pub fn create_passthrough_destination(
        &self,
        callback: AudioCallback,
    ) -> Result<DestinationId, SplitterError> {
        let input = self
            .inner
            .lock()
            .input_format
            .ok_or(SplitterError::NotInitialized)?;
        self.register("Passthrough".into(), input, ChannelMap::Downmix, callback)
    }

    /// Registers a single-channel destination: mono at the input sample
    /// rate, carrying exactly the requested channel.
    pub fn create_channel_destination(
        &self,
        channel: u16,
        callback: AudioCallback,
    ) -> Result<DestinationId, SplitterError> {
        let input = self
            .inner
            .lock()
            .input_format
            .ok_or(SplitterError::NotInitialized)?;

        let name = match channel {
            0 => "Left Channel".to_string(),
            1 => "Right Channel".to_string(),
            other => format!("Channel {other}"),
        };
        let target = AudioFormat::mono(input.sample_rate);
        self.register(name, target, ChannelMap::Select(channel), callback)
    }

    fn register(
        &self,
        name: String,
        target: AudioFormat,
        channel_map: ChannelMap,
        callback: AudioCallback,
    ) -> Result<DestinationId, SplitterError> {
        let mut inner = self.inner.lock();
        let input = inner.input_format.ok_or(SplitterError::NotInitialized)?;

        let needs_converter = target != input || channel_map != ChannelMap::Downmix;
        let converter = if needs_converter {
            let built = FormatConverter::with_channel_map(input, target, channel_map)
                .map_err(|source| SplitterError::ConverterBuild {
                    name: name.clone(),
                    source,
                })?;
            Some(built)
        } else {
            None
        };

        let id = inner.next_id;
        inner.next_id += 1;
        log::debug!("splitter: added destination '{name}' (id {id}, target {target})");

        inner.destinations.insert(
            id,
            Destination {
                name,
                target,
                callback,
                enabled: true,
                faulted: false,
                converter,
            },
        );
        Ok(id)
    }

    /// Unregisters the destination with the given id.
    pub fn remove_destination(&self, id: DestinationId) -> Result<(), SplitterError> {
        let mut inner = self.inner.lock();
        match inner.destinations.remove(&id) {
            Some(dest) => {
                log::debug!("splitter: removed destination '{}' (id {id})", dest.name);
                Ok(())
            }
            None => Err(SplitterError::UnknownDestination(id)),
        }
    }

    /// Enables or disables exactly the destination with the given id.
    ///
    /// A faulted destination stays skipped regardless of its enabled flag
    /// until it is re-registered.
    pub fn set_destination_enabled(
        &self,
        id: DestinationId,
        enabled: bool,
    ) -> Result<(), SplitterError> {
        let mut inner = self.inner.lock();
        match inner.destinations.get_mut(&id) {
            Some(dest) => {
                dest.enabled = enabled;
                Ok(())
            }
            None => Err(SplitterError::UnknownDestination(id)),
        }
    }

    /// Distributes one block to every enabled destination, in registration
    /// order, synchronously.
    ///
    /// No-op before [`initialize`](Self::initialize). A failing conversion
    /// faults only its destination; a panicking callback is caught and
    /// logged so the remaining destinations are still served and nothing
    /// unwinds into the producer thread.
    pub fn process(&self, block: &AudioBlock) {
        let started = Instant::now();

        {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let Some(input) = inner.input_format else {
                return;
            };
            if block.format() != input {
                if !inner.format_warned {
                    inner.format_warned = true;
                    log::warn!(
                        "splitter: dropping block with format {} (expected {input})",
                        block.format()
                    );
                }
                return;
            }

            for (id, dest) in inner.destinations.iter_mut() {
                if !dest.enabled || dest.faulted {
                    continue;
                }
                match &dest.converter {
                    None => deliver(&dest.name, &dest.callback, block),
                    Some(converter) => match converter.convert(block) {
                        Ok(converted) => deliver(&dest.name, &dest.callback, &converted),
                        Err(err) => {
                            dest.faulted = true;
                            log::warn!(
                                "splitter: conversion failed for '{}' (id {id}): {err}; \
                                 skipping until re-registered",
                                dest.name
                            );
                        }
                    },
                }
            }
        }

        self.frames_processed
            .fetch_add(block.frames() as u64, Ordering::SeqCst);
        self.blocks_processed.fetch_add(1, Ordering::SeqCst);
        self.process_time_nanos
            .fetch_add(started.elapsed().as_nanos() as u64, Ordering::SeqCst);
    }

    /// Whether the splitter is initialized and has at least one
    /// destination.
    pub fn is_active(&self) -> bool {
        let inner = self.inner.lock();
        inner.input_format.is_some() && !inner.destinations.is_empty()
    }

    /// The initialized input format, if any.
    pub fn input_format(&self) -> Option<AudioFormat> {
        self.inner.lock().input_format
    }

    /// Number of registered destinations.
    pub fn destination_count(&self) -> usize {
        self.inner.lock().destinations.len()
    }

    /// Snapshot of throughput counters and destination counts.
    pub fn statistics(&self) -> SplitterStatistics {
        let (active, total, input) = {
            let inner = self.inner.lock();
            (
                inner
                    .destinations
                    .values()
                    .filter(|d| d.enabled && !d.faulted)
                    .count(),
                inner.destinations.len(),
                inner.input_format,
            )
        };

        let blocks = self.blocks_processed.load(Ordering::SeqCst);
        let average_process_time_us = if blocks > 0 {
            self.process_time_nanos.load(Ordering::SeqCst) as f64 / blocks as f64 / 1_000.0
        } else {
            0.0
        };

        SplitterStatistics {
            frames_processed: self.frames_processed.load(Ordering::SeqCst),
            blocks_processed: blocks,
            active_destinations: active,
            total_destinations: total,
            average_process_time_us,
            input_sample_rate: input.map_or(0.0, |f| f.sample_rate),
            input_channels: input.map_or(0, |f| f.channels),
        }
    }
}

impl Default for AudioSplitter {
    fn default() -> Self {
        Self::new()
    }
}

/// Invokes one callback with panic isolation.
fn deliver(name: &str, callback: &AudioCallback, block: &AudioBlock) {
    if catch_unwind(AssertUnwindSafe(|| callback(block))).is_err() {
        log::error!("splitter: destination '{name}' callback panicked; continuing");
    }
}
