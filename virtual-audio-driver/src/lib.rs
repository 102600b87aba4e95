//! # virtual-audio-driver
//!
//! Virtual audio endpoint layer on top of `virtual-audio-core`.
//!
//! Provides:
//! - `VirtualDevice` — one OS-visible virtual input endpoint with its own
//!   start/stop lifecycle, frame clock, and consumer callback
//! - `VirtualAudioDriver` — orchestrator owning the device set and the
//!   splitter, wiring each device as a splitter destination
//! - `VirtualAudioBridge` — opt-in façade for the host audio engine, with
//!   a boolean fallback contract
//!
//! ## Usage
//! ```
//! use virtual_audio_driver::{BridgeConfig, VirtualAudioBridge};
//!
//! let bridge = VirtualAudioBridge::new();
//! let usable = bridge.initialize(BridgeConfig {
//!     enabled: true,
//!     use_for_transcription: true,
//!     use_for_passthrough: true,
//!     ..BridgeConfig::default()
//! });
//! // When `usable` is false the caller keeps its legacy audio path;
//! // otherwise it hands every captured block to
//! // `bridge.process_audio_block(&block)`.
//! # let _ = usable;
//! ```

pub mod bridge;
pub mod config;
pub mod device;
pub mod driver;
pub mod host;

pub use bridge::{create_bridge, BridgeStatistics, VirtualAudioBridge};
pub use config::{BridgeConfig, DriverConfig};
pub use device::{DeviceError, DeviceType, VirtualDevice};
pub use driver::{DeviceStatus, DriverError, DriverStatistics, VirtualAudioDriver};
