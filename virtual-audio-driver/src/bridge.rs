//! Opt-in integration façade for the host audio engine.
//!
//! The bridge hides driver/splitter/device construction behind two calls:
//! a boolean-returning `initialize` and a boolean-returning
//! `process_audio_block`. `false` from either one is the documented
//! fallback signal — the caller keeps (or returns to) its legacy audio
//! path, and nothing ever panics across this boundary.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;

use virtual_audio_core::{AudioBlock, AudioCallback};

use crate::config::BridgeConfig;
use crate::driver::VirtualAudioDriver;
use crate::host;

/// Lightweight snapshot of bridge throughput.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BridgeStatistics {
    pub virtual_audio_active: bool,
    pub blocks_processed: u64,
    /// Average time spent per processed block, in microseconds. Zero
    /// unless `collect_statistics` is on.
    pub average_latency_us: f64,
    pub has_errors: bool,
}

/// Integration bridge owning one driver instance.
///
/// All consumer callbacks and configuration live per instance, so several
/// bridges (and tests) can run in the same process independently.
pub struct VirtualAudioBridge {
    config: Mutex<BridgeConfig>,
    driver: Mutex<Option<Arc<VirtualAudioDriver>>>,
    initialized: AtomicBool,
    enabled: AtomicBool,
    collect_statistics: AtomicBool,
    blocks_processed: AtomicU64,
    latency_nanos: AtomicU64,
    has_errors: AtomicBool,
    transcription_callback: Mutex<Option<AudioCallback>>,
    passthrough_callback: Mutex<Option<AudioCallback>>,
}

impl VirtualAudioBridge {
    /// Creates an uninitialized bridge.
    pub fn new() -> Self {
        Self {
            config: Mutex::new(BridgeConfig::default()),
            driver: Mutex::new(None),
            initialized: AtomicBool::new(false),
            enabled: AtomicBool::new(false),
            collect_statistics: AtomicBool::new(false),
            blocks_processed: AtomicU64::new(0),
            latency_nanos: AtomicU64::new(0),
            has_errors: AtomicBool::new(false),
            transcription_callback: Mutex::new(None),
            passthrough_callback: Mutex::new(None),
        }
    }

    /// Static capability probe, callable before any instance exists.
    pub fn is_virtual_audio_supported() -> bool {
        host::is_virtual_audio_supported()
    }

    /// Brings up the virtual audio system.
    ///
    /// Returns whether virtual audio is usable. `false` — disabled by
    /// configuration, unsupported host, no routed role, or driver init
    /// failure — means the caller should use its legacy audio path. At
    /// least one of the transcription / passthrough / stereo-separation
    /// roles must be routed for the system to come up.
    pub fn initialize(&self, config: BridgeConfig) -> bool {
        if self.initialized.load(Ordering::SeqCst) {
            return self.enabled.load(Ordering::SeqCst);
        }

        self.collect_statistics
            .store(config.collect_statistics, Ordering::SeqCst);
        *self.config.lock() = config.clone();

        if !config.enabled {
            log::info!("virtual audio disabled via configuration");
            return false;
        }
        if !host::is_virtual_audio_supported() {
            log::warn!("virtual audio not supported on this host");
            return false;
        }

        match self.bring_up(&config) {
            Ok(driver) => {
                *self.driver.lock() = Some(driver);
                self.initialized.store(true, Ordering::SeqCst);
                self.enabled.store(true, Ordering::SeqCst);
                log::info!(
                    "virtual audio bridge initialized (transcription: {}, passthrough: {}, stereo: {})",
                    config.use_for_transcription,
                    config.use_for_passthrough,
                    config.enable_stereo_separation
                );
                true
            }
            Err(reason) => {
                self.has_errors.store(true, Ordering::SeqCst);
                log::warn!("virtual audio initialization failed: {reason}; using legacy audio path");
                false
            }
        }
    }

    fn bring_up(&self, config: &BridgeConfig) -> Result<Arc<VirtualAudioDriver>, String> {
        let driver = Arc::new(VirtualAudioDriver::new(config.driver_config()));
        driver.initialize().map_err(|e| e.to_string())?;

        // Apply any callbacks registered before initialization.
        if let Some(callback) = self.transcription_callback.lock().clone() {
            driver.set_transcription_callback(callback);
        }
        if let Some(callback) = self.passthrough_callback.lock().clone() {
            driver.set_passthrough_callback(callback);
        }

        if !driver.enable_virtual_audio() {
            driver.teardown();
            return Err("no virtual devices to enable".into());
        }
        Ok(driver)
    }

    /// Offers one block to the virtual audio system.
    ///
    /// Returns `true` when virtual audio consumed the block (the caller
    /// should do nothing further) and `false` when the caller must run its
    /// legacy path for this block.
    pub fn process_audio_block(&self, block: &AudioBlock) -> bool {
        if !self.enabled.load(Ordering::SeqCst) {
            return false;
        }
        let driver = self.driver.lock().clone();
        let Some(driver) = driver else {
            return false;
        };

        if self.collect_statistics.load(Ordering::SeqCst) {
            let started = Instant::now();
            driver.feed_audio_from_engine(block);
            self.latency_nanos
                .fetch_add(started.elapsed().as_nanos() as u64, Ordering::SeqCst);
        } else {
            driver.feed_audio_from_engine(block);
        }
        self.blocks_processed.fetch_add(1, Ordering::SeqCst);
        true
    }

    /// Registers the transcription consumer; effective immediately when
    /// the driver exists, otherwise applied at initialization.
    pub fn set_transcription_callback(&self, callback: AudioCallback) {
        *self.transcription_callback.lock() = Some(Arc::clone(&callback));
        if let Some(driver) = self.driver.lock().clone() {
            driver.set_transcription_callback(callback);
        }
    }

    /// Registers the passthrough consumer.
    pub fn set_passthrough_callback(&self, callback: AudioCallback) {
        *self.passthrough_callback.lock() = Some(Arc::clone(&callback));
        if let Some(driver) = self.driver.lock().clone() {
            driver.set_passthrough_callback(callback);
        }
    }

    /// Applies a new configuration at runtime.
    ///
    /// Enable/disable transitions and device sub-flag changes are driven
    /// through the owned driver; a bridge that was never successfully
    /// initialized attempts a fresh initialization when the new
    /// configuration enables virtual audio.
    pub fn update_config(&self, new: BridgeConfig) {
        if !self.initialized.load(Ordering::SeqCst) {
            if new.enabled {
                self.initialize(new);
            } else {
                *self.config.lock() = new;
            }
            return;
        }

        *self.config.lock() = new.clone();
        self.collect_statistics
            .store(new.collect_statistics, Ordering::SeqCst);

        let driver = self.driver.lock().clone();
        if let Some(driver) = driver {
            if let Err(err) = driver.update_configuration(new.driver_config()) {
                self.has_errors.store(true, Ordering::SeqCst);
                log::warn!("virtual audio configuration update failed: {err}");
            }
            self.enabled
                .store(new.enabled && driver.is_virtual_audio_enabled(), Ordering::SeqCst);
        }
    }

    /// The current configuration snapshot.
    pub fn config(&self) -> BridgeConfig {
        self.config.lock().clone()
    }

    /// Whether virtual audio is currently consuming blocks.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Snapshot of bridge throughput counters.
    pub fn statistics(&self) -> BridgeStatistics {
        let blocks = self.blocks_processed.load(Ordering::SeqCst);
        let average_latency_us = if blocks > 0 {
            self.latency_nanos.load(Ordering::SeqCst) as f64 / blocks as f64 / 1_000.0
        } else {
            0.0
        };
        BridgeStatistics {
            virtual_audio_active: self.enabled.load(Ordering::SeqCst),
            blocks_processed: blocks,
            average_latency_us,
            has_errors: self.has_errors.load(Ordering::SeqCst),
        }
    }

    /// Snapshot of the owned driver's statistics, when one exists.
    pub fn driver_statistics(&self) -> Option<crate::driver::DriverStatistics> {
        self.driver.lock().as_ref().map(|d| d.statistics())
    }

    /// Shuts the virtual audio system down. Idempotent; also runs on drop.
    pub fn shutdown(&self) {
        if !self.initialized.swap(false, Ordering::SeqCst) {
            return;
        }
        self.enabled.store(false, Ordering::SeqCst);
        if let Some(driver) = self.driver.lock().take() {
            driver.disable_virtual_audio();
            driver.teardown();
        }
        log::info!("virtual audio bridge shut down");
    }
}

impl Default for VirtualAudioBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for VirtualAudioBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Creates and initializes a bridge in one step.
///
/// Returns `None` when virtual audio is unusable, signalling the caller
/// to continue with its legacy audio path unchanged.
pub fn create_bridge(config: BridgeConfig) -> Option<VirtualAudioBridge> {
    let bridge = VirtualAudioBridge::new();
    if bridge.initialize(config) {
        Some(bridge)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use virtual_audio_core::SampleFormat;

    fn routed_config() -> BridgeConfig {
        BridgeConfig {
            enabled: true,
            use_for_transcription: true,
            use_for_passthrough: true,
            ..BridgeConfig::default()
        }
    }

    fn stereo_block(frames: usize) -> AudioBlock {
        AudioBlock::from_planar(
            vec![vec![0.5; frames], vec![-0.5; frames]],
            48_000.0,
            SampleFormat::Float32,
            Duration::ZERO,
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
    fn disabled_config_falls_back() {
        let bridge = VirtualAudioBridge::new();
        assert!(!bridge.initialize(BridgeConfig::default()));
        assert!(!bridge.is_enabled());
        assert!(!bridge.process_audio_block(&stereo_block(48)));

        let stats = bridge.statistics();
        assert!(!stats.virtual_audio_active);
        assert_eq!(stats.blocks_processed, 0);
    }

    #[test]
    fn no_routed_role_falls_back() {
        let bridge = VirtualAudioBridge::new();
        let config = BridgeConfig {
            enabled: true,
            ..BridgeConfig::default()
        };
        assert!(!bridge.initialize(config));
        assert!(!bridge.process_audio_block(&stereo_block(48)));
    }

    #[test]
    fn driver_init_failure_falls_back_permanently() {
        let bridge = VirtualAudioBridge::new();
        let config = BridgeConfig {
            transcription_sample_rate: 0.0,
            ..routed_config()
        };

        assert!(!bridge.initialize(config));
        for _ in 0..10 {
            assert!(!bridge.process_audio_block(&stereo_block(48)));
        }
        assert!(bridge.statistics().has_errors);
    }

    #[test]
    fn initialized_bridge_consumes_blocks() {
        let bridge = VirtualAudioBridge::new();
        assert!(bridge.initialize(routed_config()));

        let (callback, count) = counting_callback();
        bridge.set_passthrough_callback(callback);

        assert!(bridge.process_audio_block(&stereo_block(480)));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bridge.statistics().blocks_processed, 1);
    }

    #[test]
    fn callbacks_registered_before_initialize_survive() {
        let bridge = VirtualAudioBridge::new();
        let (callback, count) = counting_callback();
        bridge.set_transcription_callback(callback);

        assert!(bridge.initialize(routed_config()));
        bridge.process_audio_block(&stereo_block(480));

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn initialize_is_idempotent() {
        let bridge = VirtualAudioBridge::new();
        assert!(bridge.initialize(routed_config()));
        assert!(bridge.initialize(BridgeConfig::default()));
    }

    #[test]
    fn update_config_disables_and_reenables() {
        let bridge = VirtualAudioBridge::new();
        assert!(bridge.initialize(routed_config()));

        let mut off = routed_config();
        off.enabled = false;
        bridge.update_config(off);
        assert!(!bridge.is_enabled());
        assert!(!bridge.process_audio_block(&stereo_block(48)));

        bridge.update_config(routed_config());
        assert!(bridge.is_enabled());
        assert!(bridge.process_audio_block(&stereo_block(48)));
    }

    #[test]
    fn update_config_initializes_lazily() {
        let bridge = VirtualAudioBridge::new();
        assert!(!bridge.initialize(BridgeConfig::default()));

        bridge.update_config(routed_config());
        assert!(bridge.is_enabled());
        assert!(bridge.process_audio_block(&stereo_block(48)));
    }

    #[test]
    fn latency_statistics_only_when_enabled() {
        let bridge = VirtualAudioBridge::new();
        let config = BridgeConfig {
            collect_statistics: true,
            ..routed_config()
        };
        assert!(bridge.initialize(config));

        bridge.process_audio_block(&stereo_block(480));
        let stats = bridge.statistics();
        assert_eq!(stats.blocks_processed, 1);
        assert!(stats.average_latency_us >= 0.0);
    }

    #[test]
    fn shutdown_is_idempotent_and_final() {
        let bridge = VirtualAudioBridge::new();
        assert!(bridge.initialize(routed_config()));

        bridge.shutdown();
        assert!(!bridge.is_enabled());
        assert!(!bridge.process_audio_block(&stereo_block(48)));
        bridge.shutdown();
    }

    #[test]
    fn factory_returns_none_on_fallback() {
        assert!(create_bridge(BridgeConfig::default()).is_none());
        assert!(create_bridge(routed_config()).is_some());
    }
}
