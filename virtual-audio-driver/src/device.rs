//! Virtual audio endpoint devices.
//!
//! A [`VirtualDevice`] models one OS-visible virtual input endpoint with
//! its own start/stop lifecycle, monotonic frame clock, and consumer
//! callback. The driver feeds it already-converted, target-format blocks;
//! the device only gates delivery on its running state and keeps timing.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use virtual_audio_core::{AudioBlock, AudioCallback, AudioFormat};

/// Role of a virtual device. Closed set, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceType {
    /// Virtual input optimized for speech recognition (16 kHz mono).
    TranscriptionInput,
    /// Mirror device carrying the native-quality stream.
    PassthroughMirror,
    /// Left channel for dual-language processing.
    StereoLeft,
    /// Right channel for dual-language processing.
    StereoRight,
}

impl DeviceType {
    /// Human-readable role name, appended to the configured prefix.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::TranscriptionInput => "Transcription",
            Self::PassthroughMirror => "Passthrough",
            Self::StereoLeft => "Left Channel",
            Self::StereoRight => "Right Channel",
        }
    }

    /// Stable identifier for host-side registration and preferences.
    pub fn uid(&self) -> &'static str {
        match self {
            Self::TranscriptionInput => "virtual-audio.transcription",
            Self::PassthroughMirror => "virtual-audio.passthrough",
            Self::StereoLeft => "virtual-audio.left",
            Self::StereoRight => "virtual-audio.right",
        }
    }

    /// Nominal presentation latency in frames. The transcription input
    /// reports zero so recognition engines see the freshest audio.
    pub fn latency_frames(&self) -> u32 {
        match self {
            Self::TranscriptionInput => 0,
            _ => 32,
        }
    }

    /// Whether devices of this role carry a single channel.
    pub fn is_mono(&self) -> bool {
        !matches!(self, Self::PassthroughMirror)
    }
}

/// Errors from device lifecycle operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("device '{0}' has been destroyed")]
    Destroyed(String),
}

/// Timing state updated by `start` and `feed_audio_data`.
#[derive(Debug, Default)]
struct DeviceClock {
    started_at: Option<Instant>,
    last_timestamp: Option<Duration>,
}

/// One virtual audio endpoint.
///
/// Lifecycle: constructed stopped → `start()` → running → `stop()` →
/// stopped, any number of times, then `destroy()` on teardown. `start`
/// and `stop` come from control threads while `feed_audio_data` runs on
/// the producer thread; the running flag is atomic so the feed path can
/// bail without taking a lock.
pub struct VirtualDevice {
    device_type: DeviceType,
    format: AudioFormat,
    name: String,
    running: AtomicBool,
    destroyed: AtomicBool,
    frames_processed: AtomicU64,
    clock: Mutex<DeviceClock>,
    callback: Mutex<Option<AudioCallback>>,
}

impl VirtualDevice {
    /// Creates a stopped device of the given role and target format.
    pub fn new(device_type: DeviceType, format: AudioFormat, prefix: &str) -> Self {
        let name = format!("{prefix} {}", device_type.display_name());
        log::debug!("virtual device created: {name} ({format})");
        Self {
            device_type,
            format,
            name,
            running: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            frames_processed: AtomicU64::new(0),
            clock: Mutex::new(DeviceClock::default()),
            callback: Mutex::new(None),
        }
    }

    /// Starts the device clock.
    ///
    /// No-op when already running. Resets the frame counter and stamps the
    /// start instant before setting the running flag, so any producer that
    /// observes `running == true` also observes the reset.
    pub fn start(&self) -> Result<(), DeviceError> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(DeviceError::Destroyed(self.name.clone()));
        }
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        {
            let mut clock = self.clock.lock();
            clock.started_at = Some(Instant::now());
            clock.last_timestamp = None;
        }
        self.frames_processed.store(0, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);

        log::info!("virtual device started: {}", self.name);
        Ok(())
    }

    /// Stops the device. No-op when already stopped.
    ///
    /// Blocks fed after this returns are rejected; a callback already in
    /// flight may complete.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        log::info!(
            "virtual device stopped: {} ({} frames processed)",
            self.name,
            self.frames_processed.load(Ordering::SeqCst)
        );
    }

    /// Marks the device destroyed and stops it. Subsequent starts and
    /// feeds are rejected rather than crashing.
    pub fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
        self.stop();
        log::debug!("virtual device destroyed: {}", self.name);
    }

    /// Delivers one already-converted block to the consumer callback.
    ///
    /// No-op while not running. Advances the frame counter, stamps the
    /// last-processed timestamp, and invokes the consumer with panic
    /// isolation so nothing unwinds into the producer call chain.
    pub fn feed_audio_data(&self, block: &AudioBlock) {
        if !self.running.load(Ordering::SeqCst) || self.destroyed.load(Ordering::SeqCst) {
            return;
        }

        self.frames_processed
            .fetch_add(block.frames() as u64, Ordering::SeqCst);
        self.clock.lock().last_timestamp = Some(block.timestamp());

        let callback = self.callback.lock().clone();
        if let Some(callback) = callback {
            if catch_unwind(AssertUnwindSafe(|| callback(block))).is_err() {
                log::error!("consumer callback panicked for device '{}'", self.name);
            }
        }
    }

    /// Registers the consumer callback; takes effect for subsequent feeds.
    pub fn set_audio_callback(&self, callback: AudioCallback) {
        *self.callback.lock() = Some(callback);
    }

    /// The device role.
    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    /// Human-readable device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stable identifier for this device's role.
    pub fn uid(&self) -> &'static str {
        self.device_type.uid()
    }

    /// Target format blocks are delivered in.
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Nominal sample rate in Hz.
    pub fn sample_rate(&self) -> f64 {
        self.format.sample_rate
    }

    /// Channel count.
    pub fn channels(&self) -> u16 {
        self.format.channels
    }

    /// Nominal presentation latency in frames.
    pub fn latency_frames(&self) -> u32 {
        self.device_type.latency_frames()
    }

    /// Whether the device is running. Statistics-grade only; the feed
    /// path's own check is what gates delivery.
    pub fn is_active(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Frames processed since the last start. Monotonically non-decreasing
    /// while running; reset by `start`.
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::SeqCst)
    }

    /// Timestamp of the most recently fed block, if any.
    pub fn last_timestamp(&self) -> Option<Duration> {
        self.clock.lock().last_timestamp
    }

    /// Instant the current run started, while running.
    pub fn running_since(&self) -> Option<Instant> {
        if !self.is_active() {
            return None;
        }
        self.clock.lock().started_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use virtual_audio_core::SampleFormat;

    fn mono_device() -> VirtualDevice {
        VirtualDevice::new(
            DeviceType::TranscriptionInput,
            AudioFormat::transcription(),
            "Test",
        )
    }

    fn block(frames: usize, timestamp_ms: u64) -> AudioBlock {
        AudioBlock::from_planar(
            vec![vec![0.0; frames]],
            16_000.0,
            SampleFormat::Float32,
            Duration::from_millis(timestamp_ms),
        )
        .unwrap()
    }

    fn counting_callback() -> (AudioCallback, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let callback: AudioCallback = Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (callback, count)
    }

    #[test]
    fn device_type_identification() {
        assert_eq!(DeviceType::TranscriptionInput.display_name(), "Transcription");
        assert_eq!(DeviceType::StereoLeft.uid(), "virtual-audio.left");
        assert_eq!(DeviceType::TranscriptionInput.latency_frames(), 0);
        assert_eq!(DeviceType::PassthroughMirror.latency_frames(), 32);
        assert!(DeviceType::StereoRight.is_mono());
        assert!(!DeviceType::PassthroughMirror.is_mono());
    }

    #[test]
    fn name_includes_prefix() {
        let device = mono_device();
        assert_eq!(device.name(), "Test Transcription");
    }

    #[test]
    fn feed_before_start_is_rejected() {
        let device = mono_device();
        let (callback, count) = counting_callback();
        device.set_audio_callback(callback);

        device.feed_audio_data(&block(160, 0));

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(device.frames_processed(), 0);
    }

    #[test]
    fn feed_while_running_counts_frames_and_calls_consumer() {
        let device = mono_device();
        let (callback, count) = counting_callback();
        device.set_audio_callback(callback);
        device.start().unwrap();

        device.feed_audio_data(&block(160, 10));
        device.feed_audio_data(&block(160, 20));

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(device.frames_processed(), 320);
        assert_eq!(device.last_timestamp(), Some(Duration::from_millis(20)));
    }

    #[test]
    fn stop_gates_subsequent_feeds() {
        let device = mono_device();
        let (callback, count) = counting_callback();
        device.set_audio_callback(callback);
        device.start().unwrap();
        device.feed_audio_data(&block(160, 0));

        device.stop();
        device.feed_audio_data(&block(160, 10));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(device.frames_processed(), 160);
    }

    #[test]
    fn start_resets_frame_counter() {
        let device = mono_device();
        device.start().unwrap();
        device.feed_audio_data(&block(160, 0));
        assert_eq!(device.frames_processed(), 160);

        device.stop();
        device.start().unwrap();
        assert_eq!(device.frames_processed(), 0);

        device.feed_audio_data(&block(160, 0));
        assert_eq!(device.frames_processed(), 160);
    }

    #[test]
    fn start_is_idempotent_and_keeps_counter() {
        let device = mono_device();
        device.start().unwrap();
        device.feed_audio_data(&block(160, 0));

        // Second start while running must not reset anything.
        device.start().unwrap();
        assert_eq!(device.frames_processed(), 160);
    }

    #[test]
    fn destroy_rejects_start_and_feed() {
        let device = mono_device();
        let (callback, count) = counting_callback();
        device.set_audio_callback(callback);
        device.start().unwrap();

        device.destroy();
        assert!(!device.is_active());
        assert!(matches!(device.start(), Err(DeviceError::Destroyed(_))));

        device.feed_audio_data(&block(160, 0));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn consumer_panic_is_contained() {
        let device = mono_device();
        device.set_audio_callback(Arc::new(|_| panic!("consumer bug")));
        device.start().unwrap();

        device.feed_audio_data(&block(160, 0));

        // Device keeps running and counting after the panic.
        assert!(device.is_active());
        assert_eq!(device.frames_processed(), 160);
        device.feed_audio_data(&block(160, 10));
        assert_eq!(device.frames_processed(), 320);
    }

    #[test]
    fn callback_swap_takes_effect_immediately() {
        let device = mono_device();
        let (first, first_count) = counting_callback();
        let (second, second_count) = counting_callback();
        device.set_audio_callback(first);
        device.start().unwrap();

        device.feed_audio_data(&block(160, 0));
        device.set_audio_callback(second);
        device.feed_audio_data(&block(160, 10));

        assert_eq!(first_count.load(Ordering::SeqCst), 1);
        assert_eq!(second_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn running_since_only_while_active() {
        let device = mono_device();
        assert!(device.running_since().is_none());

        device.start().unwrap();
        assert!(device.running_since().is_some());

        device.stop();
        assert!(device.running_since().is_none());
    }

    #[test]
    fn concurrent_start_stop_and_feed() {
        let device = Arc::new(mono_device());
        let (callback, _) = counting_callback();
        device.set_audio_callback(callback);

        let producer = {
            let device = Arc::clone(&device);
            std::thread::spawn(move || {
                for i in 0..500 {
                    device.feed_audio_data(&block(160, i));
                }
            })
        };
        let control = {
            let device = Arc::clone(&device);
            std::thread::spawn(move || {
                for i in 0..100 {
                    if i % 2 == 0 {
                        device.start().unwrap();
                    } else {
                        device.stop();
                    }
                }
            })
        };

        producer.join().unwrap();
        control.join().unwrap();

        // Frame counter stays a multiple of the block size: feeds are
        // either counted fully or rejected.
        assert_eq!(device.frames_processed() % 160, 0);
    }
}
