//! Driver orchestrating the virtual device set and the splitter.
//!
//! The driver owns every [`VirtualDevice`] and the [`AudioSplitter`]
//! (composition, same lifetime). Control threads mutate the device set
//! under one mutex; the ingestion path only touches the enabled flag and
//! the splitter handle, so feeding audio never contends with device
//! start/stop logic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

use virtual_audio_core::{
    AudioBlock, AudioCallback, AudioFormat, AudioSplitter, SampleFormat, SplitterError,
    SplitterStatistics,
};

use crate::config::DriverConfig;
use crate::device::{DeviceError, DeviceType, VirtualDevice};

/// Errors from driver lifecycle operations.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("virtual audio is not supported on this host")]
    Unsupported,

    #[error("invalid driver configuration: {0}")]
    InvalidConfiguration(String),

    #[error("splitter setup failed: {0}")]
    Splitter(#[from] SplitterError),

    #[error("device setup failed: {0}")]
    Device(#[from] DeviceError),
}

/// Running state of one device, for the statistics snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceStatus {
    pub device_type: DeviceType,
    pub running: bool,
    pub frames_processed: u64,
}

/// Combined snapshot of splitter throughput and device state.
#[derive(Debug, Clone, Serialize)]
pub struct DriverStatistics {
    pub virtual_audio_active: bool,
    pub active_devices: usize,
    pub splitter: SplitterStatistics,
    pub devices: Vec<DeviceStatus>,
}

/// Late-bound consumer callback storage, shared with device wrappers.
type CallbackSlot = Arc<Mutex<Option<AudioCallback>>>;

struct DriverInner {
    config: DriverConfig,
    initialized: bool,
    devices: Vec<Arc<VirtualDevice>>,
    transcription: Option<Arc<VirtualDevice>>,
    passthrough: Option<Arc<VirtualDevice>>,
    left: Option<Arc<VirtualDevice>>,
    right: Option<Arc<VirtualDevice>>,
}

impl DriverInner {
    fn clear_devices(&mut self) {
        for device in &self.devices {
            device.destroy();
        }
        self.devices.clear();
        self.transcription = None;
        self.passthrough = None;
        self.left = None;
        self.right = None;
    }
}

/// Top-level orchestrator for the virtual audio system.
pub struct VirtualAudioDriver {
    inner: Mutex<DriverInner>,
    /// Kept outside `inner` so the ingestion path takes only this short
    /// lock, never the device-set lock.
    splitter: Mutex<Option<Arc<AudioSplitter>>>,
    virtual_audio_enabled: AtomicBool,
    transcription_callback: CallbackSlot,
    passthrough_callback: CallbackSlot,
}

impl VirtualAudioDriver {
    /// Creates an uninitialized driver holding the given configuration.
    pub fn new(config: DriverConfig) -> Self {
        Self {
            inner: Mutex::new(DriverInner {
                config,
                initialized: false,
                devices: Vec::new(),
                transcription: None,
                passthrough: None,
                left: None,
                right: None,
            }),
            splitter: Mutex::new(None),
            virtual_audio_enabled: AtomicBool::new(false),
            transcription_callback: Arc::new(Mutex::new(None)),
            passthrough_callback: Arc::new(Mutex::new(None)),
        }
    }

    /// Validates the configuration and, when virtual audio is requested,
    /// creates the enabled devices, initializes the splitter, and wires
    /// each device as a splitter destination.
    ///
    /// Idempotent. On failure nothing stays half-registered: the device
    /// set and splitter are rolled back to empty.
    pub fn initialize(&self) -> Result<(), DriverError> {
        let mut inner = self.inner.lock();
        if inner.initialized {
            return Ok(());
        }

        if !crate::host::is_virtual_audio_supported() {
            return Err(DriverError::Unsupported);
        }
        inner
            .config
            .validate()
            .map_err(DriverError::InvalidConfiguration)?;

        if inner.config.enable_virtual_audio {
            if let Err(err) = self.build_device_set(&mut inner) {
                inner.clear_devices();
                *self.splitter.lock() = None;
                return Err(err);
            }
        }

        inner.initialized = true;
        log::info!(
            "virtual audio driver initialized with {} devices",
            inner.devices.len()
        );
        Ok(())
    }

    /// Starts all owned devices as a batch.
    ///
    /// A device that fails to start is logged and skipped; the remaining
    /// devices still start. Returns false only when there is nothing to
    /// enable (uninitialized driver or empty device set).
    pub fn enable_virtual_audio(&self) -> bool {
        let inner = self.inner.lock();
        if !inner.initialized || inner.devices.is_empty() {
            return false;
        }
        if self.virtual_audio_enabled.load(Ordering::SeqCst) {
            return true;
        }

        Self::start_all(&inner.devices);
        self.virtual_audio_enabled.store(true, Ordering::SeqCst);
        log::info!("virtual audio enabled ({} devices)", inner.devices.len());
        true
    }

    /// Stops all owned devices and disables ingestion.
    pub fn disable_virtual_audio(&self) {
        let inner = self.inner.lock();
        if !self.virtual_audio_enabled.swap(false, Ordering::SeqCst) {
            return;
        }
        Self::stop_all(&inner.devices);
        log::info!("virtual audio disabled");
    }

    /// Whether ingestion is currently enabled.
    pub fn is_virtual_audio_enabled(&self) -> bool {
        self.virtual_audio_enabled.load(Ordering::SeqCst)
    }

    /// Single ingestion point for the external audio tap.
    ///
    /// No-op unless virtual audio is enabled and the splitter is wired.
    /// Called once per hardware period on the producer thread.
    pub fn feed_audio_from_engine(&self, block: &AudioBlock) {
        if !self.virtual_audio_enabled.load(Ordering::SeqCst) {
            return;
        }
        let splitter = self.splitter.lock().clone();
        if let Some(splitter) = splitter {
            splitter.process(block);
        }
    }

    /// Late-binds the transcription consumer callback; effective for the
    /// next fed block, whether or not the device exists yet.
    pub fn set_transcription_callback(&self, callback: AudioCallback) {
        *self.transcription_callback.lock() = Some(callback);
    }

    /// Late-binds the passthrough consumer callback.
    pub fn set_passthrough_callback(&self, callback: AudioCallback) {
        *self.passthrough_callback.lock() = Some(callback);
    }

    /// Replaces the configuration snapshot.
    ///
    /// Toggling the master switch tears down or (re)creates the device
    /// set; changing device sub-flags while the master stays on rebuilds
    /// the set in place without a full driver restart, preserving the
    /// enabled state.
    pub fn update_configuration(&self, new: DriverConfig) -> Result<(), DriverError> {
        new.validate().map_err(DriverError::InvalidConfiguration)?;

        let mut inner = self.inner.lock();
        let old = std::mem::replace(&mut inner.config, new.clone());
        if !inner.initialized {
            return Ok(());
        }

        if old.enable_virtual_audio != new.enable_virtual_audio {
            if new.enable_virtual_audio {
                self.rebuild_locked(&mut inner)?;
                Self::start_all(&inner.devices);
                self.virtual_audio_enabled.store(true, Ordering::SeqCst);
                log::info!("virtual audio enabled via configuration update");
            } else {
                self.virtual_audio_enabled.store(false, Ordering::SeqCst);
                Self::stop_all(&inner.devices);
                inner.clear_devices();
                *self.splitter.lock() = None;
                log::info!("virtual audio disabled via configuration update");
            }
        } else if new.enable_virtual_audio && old.device_set_differs(&new) {
            let was_enabled = self.virtual_audio_enabled.load(Ordering::SeqCst);
            self.virtual_audio_enabled.store(false, Ordering::SeqCst);
            Self::stop_all(&inner.devices);
            self.rebuild_locked(&mut inner)?;
            if was_enabled {
                Self::start_all(&inner.devices);
                self.virtual_audio_enabled.store(true, Ordering::SeqCst);
            }
            log::info!("virtual audio device set rebuilt via configuration update");
        }

        Ok(())
    }

    /// The device currently filling the given role, if any.
    pub fn device_by_type(&self, device_type: DeviceType) -> Option<Arc<VirtualDevice>> {
        let inner = self.inner.lock();
        inner
            .devices
            .iter()
            .find(|d| d.device_type() == device_type)
            .cloned()
    }

    /// All owned devices.
    pub fn devices(&self) -> Vec<Arc<VirtualDevice>> {
        self.inner.lock().devices.clone()
    }

    /// The current configuration snapshot.
    pub fn configuration(&self) -> DriverConfig {
        self.inner.lock().config.clone()
    }

    /// Snapshot combining splitter statistics and per-device state.
    pub fn statistics(&self) -> DriverStatistics {
        let devices: Vec<Arc<VirtualDevice>> = self.inner.lock().devices.clone();
        let splitter = self
            .splitter
            .lock()
            .as_ref()
            .map(|s| s.statistics())
            .unwrap_or_default();

        DriverStatistics {
            virtual_audio_active: self.virtual_audio_enabled.load(Ordering::SeqCst),
            active_devices: devices.iter().filter(|d| d.is_active()).count(),
            splitter,
            devices: devices
                .iter()
                .map(|d| DeviceStatus {
                    device_type: d.device_type(),
                    running: d.is_active(),
                    frames_processed: d.frames_processed(),
                })
                .collect(),
        }
    }

    /// Stops and destroys all devices and releases the splitter.
    /// Idempotent.
    pub fn teardown(&self) {
        let mut inner = self.inner.lock();
        if !inner.initialized {
            return;
        }

        self.virtual_audio_enabled.store(false, Ordering::SeqCst);
        Self::stop_all(&inner.devices);
        inner.clear_devices();
        *self.splitter.lock() = None;
        inner.initialized = false;
        log::info!("virtual audio driver teardown complete");
    }

    // --- Internal helpers ---

    fn start_all(devices: &[Arc<VirtualDevice>]) {
        for device in devices {
            if let Err(err) = device.start() {
                log::warn!("failed to start {}: {err}", device.name());
            }
        }
    }

    fn stop_all(devices: &[Arc<VirtualDevice>]) {
        for device in devices {
            device.stop();
        }
    }

    /// Tears down and rebuilds the device set under the already-held inner
    /// lock, rolling back to empty on failure.
    fn rebuild_locked(&self, inner: &mut DriverInner) -> Result<(), DriverError> {
        inner.clear_devices();
        *self.splitter.lock() = None;
        if let Err(err) = self.build_device_set(inner) {
            inner.clear_devices();
            *self.splitter.lock() = None;
            return Err(err);
        }
        Ok(())
    }

    /// Creates the enabled devices, the splitter, and the wiring between
    /// them. Requires `inner.devices` to be empty.
    fn build_device_set(&self, inner: &mut DriverInner) -> Result<(), DriverError> {
        let config = inner.config.clone();

        if config.enable_transcription_device {
            let format = AudioFormat::new(
                config.transcription_sample_rate,
                1,
                SampleFormat::Float32,
            );
            let device = Arc::new(VirtualDevice::new(
                DeviceType::TranscriptionInput,
                format,
                &config.device_prefix,
            ));
            Self::install_consumer_slot(&device, &self.transcription_callback);
            inner.transcription = Some(Arc::clone(&device));
            inner.devices.push(device);
        }

        if config.enable_passthrough_device {
            let device = Arc::new(VirtualDevice::new(
                DeviceType::PassthroughMirror,
                config.input_format(),
                &config.device_prefix,
            ));
            Self::install_consumer_slot(&device, &self.passthrough_callback);
            inner.passthrough = Some(Arc::clone(&device));
            inner.devices.push(device);
        }

        if config.enable_stereo_separation {
            let format = AudioFormat::mono(config.passthrough_sample_rate);
            let left = Arc::new(VirtualDevice::new(
                DeviceType::StereoLeft,
                format,
                &config.device_prefix,
            ));
            let right = Arc::new(VirtualDevice::new(
                DeviceType::StereoRight,
                format,
                &config.device_prefix,
            ));
            inner.left = Some(Arc::clone(&left));
            inner.right = Some(Arc::clone(&right));
            inner.devices.push(left);
            inner.devices.push(right);
        }

        let splitter = Arc::new(AudioSplitter::new());
        splitter.initialize(config.input_format())?;
        self.connect_device_callbacks(inner, &splitter)?;
        *self.splitter.lock() = Some(splitter);
        Ok(())
    }

    /// Wires each existing device as a splitter destination of the
    /// matching kind. The destination closure only feeds the device; the
    /// external consumer hangs off the device's own callback.
    fn connect_device_callbacks(
        &self,
        inner: &DriverInner,
        splitter: &AudioSplitter,
    ) -> Result<(), DriverError> {
        if let Some(device) = &inner.transcription {
            let device = Arc::clone(device);
            splitter.create_transcription_destination(Arc::new(move |block: &AudioBlock| {
                device.feed_audio_data(block);
            }))?;
        }
        if let Some(device) = &inner.passthrough {
            let device = Arc::clone(device);
            splitter.create_passthrough_destination(Arc::new(move |block: &AudioBlock| {
                device.feed_audio_data(block);
            }))?;
        }
        if let Some(device) = &inner.left {
            let device = Arc::clone(device);
            splitter.create_channel_destination(0, Arc::new(move |block: &AudioBlock| {
                device.feed_audio_data(block);
            }))?;
        }
        if let Some(device) = &inner.right {
            let device = Arc::clone(device);
            splitter.create_channel_destination(1, Arc::new(move |block: &AudioBlock| {
                device.feed_audio_data(block);
            }))?;
        }
        Ok(())
    }

    /// Points a device's consumer callback at a late-bound slot, so
    /// callbacks registered before or after device creation both work.
    fn install_consumer_slot(device: &Arc<VirtualDevice>, slot: &CallbackSlot) {
        let slot = Arc::clone(slot);
        device.set_audio_callback(Arc::new(move |block: &AudioBlock| {
            let callback = slot.lock().clone();
            if let Some(callback) = callback {
                callback(block);
            }
        }));
    }
}
