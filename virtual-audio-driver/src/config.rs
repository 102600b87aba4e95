use serde::{Deserialize, Serialize};

use virtual_audio_core::{AudioFormat, SampleFormat, DEFAULT_SAMPLE_RATE, TRANSCRIPTION_SAMPLE_RATE};

/// Configuration for the virtual audio driver.
///
/// Consumed as an immutable snapshot; updates replace the whole snapshot
/// via [`VirtualAudioDriver::update_configuration`](crate::VirtualAudioDriver::update_configuration).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Master switch for the whole virtual audio system.
    pub enable_virtual_audio: bool,

    /// Create the transcription-optimized input device.
    pub enable_transcription_device: bool,

    /// Create the passthrough mirror device.
    pub enable_passthrough_device: bool,

    /// Create separate left/right channel devices for dual-language capture.
    pub enable_stereo_separation: bool,

    /// Sample rate for the transcription device, in Hz.
    pub transcription_sample_rate: f64,

    /// Sample rate for passthrough and channel devices, in Hz. Also the
    /// splitter's input rate.
    pub passthrough_sample_rate: f64,

    /// Prefix for human-readable device names.
    pub device_prefix: String,

    /// Buffer size hint in frames, trading latency against overhead.
    pub buffer_frame_size: u32,

    /// Collect per-block latency statistics.
    pub collect_statistics: bool,
}

impl DriverConfig {
    /// Validates the snapshot before it is applied.
    pub fn validate(&self) -> Result<(), String> {
        if self.transcription_sample_rate <= 0.0 || !self.transcription_sample_rate.is_finite() {
            return Err(format!(
                "transcription sample rate must be positive, got {}",
                self.transcription_sample_rate
            ));
        }
        if self.passthrough_sample_rate <= 0.0 || !self.passthrough_sample_rate.is_finite() {
            return Err(format!(
                "passthrough sample rate must be positive, got {}",
                self.passthrough_sample_rate
            ));
        }
        if self.buffer_frame_size == 0 {
            return Err("buffer frame size must be nonzero".into());
        }
        Ok(())
    }

    /// The format the splitter is initialized with: native-rate stereo
    /// float, matching what the external tap delivers.
    pub fn input_format(&self) -> AudioFormat {
        AudioFormat::new(self.passthrough_sample_rate, 2, SampleFormat::Float32)
    }

    /// Whether the two snapshots differ in which devices should exist or
    /// how they are formatted (everything except the master switch and
    /// statistics settings).
    pub fn device_set_differs(&self, other: &Self) -> bool {
        self.enable_transcription_device != other.enable_transcription_device
            || self.enable_passthrough_device != other.enable_passthrough_device
            || self.enable_stereo_separation != other.enable_stereo_separation
            || self.transcription_sample_rate != other.transcription_sample_rate
            || self.passthrough_sample_rate != other.passthrough_sample_rate
            || self.device_prefix != other.device_prefix
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            enable_virtual_audio: false,
            enable_transcription_device: true,
            enable_passthrough_device: true,
            enable_stereo_separation: false,
            transcription_sample_rate: TRANSCRIPTION_SAMPLE_RATE,
            passthrough_sample_rate: DEFAULT_SAMPLE_RATE,
            device_prefix: "Virtual Audio".into(),
            buffer_frame_size: 512,
            collect_statistics: true,
        }
    }
}

/// Configuration for the integration bridge, mapped onto a
/// [`DriverConfig`] at initialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Master switch. When false, `initialize` returns false and the
    /// caller keeps its legacy audio path.
    pub enabled: bool,

    /// Route transcription audio through a virtual device.
    pub use_for_transcription: bool,

    /// Route passthrough audio through a virtual device.
    pub use_for_passthrough: bool,

    /// Enable left/right channel separation devices.
    pub enable_stereo_separation: bool,

    /// Sample rate for the transcription feed, in Hz.
    pub transcription_sample_rate: f64,

    /// Native sample rate delivered by the host engine, in Hz.
    pub passthrough_sample_rate: f64,

    /// Use a smaller buffer size hint for lower latency.
    pub low_latency_mode: bool,

    /// Track per-block latency statistics (off by default to keep the hot
    /// path minimal).
    pub collect_statistics: bool,

    /// Report failures as a fallback signal instead of retrying.
    pub fallback_to_legacy: bool,
}

impl BridgeConfig {
    /// Derives the driver configuration for this bridge setup.
    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            enable_virtual_audio: self.enabled,
            enable_transcription_device: self.use_for_transcription,
            enable_passthrough_device: self.use_for_passthrough,
            enable_stereo_separation: self.enable_stereo_separation,
            transcription_sample_rate: self.transcription_sample_rate,
            passthrough_sample_rate: self.passthrough_sample_rate,
            buffer_frame_size: if self.low_latency_mode { 256 } else { 512 },
            collect_statistics: self.collect_statistics,
            ..DriverConfig::default()
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            use_for_transcription: false,
            use_for_passthrough: false,
            enable_stereo_separation: false,
            transcription_sample_rate: TRANSCRIPTION_SAMPLE_RATE,
            passthrough_sample_rate: DEFAULT_SAMPLE_RATE,
            low_latency_mode: true,
            collect_statistics: false,
            fallback_to_legacy: true,
        }
    }
}
