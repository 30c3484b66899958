//! imu-sounds - height sensor driver contract and sound playback helpers
//!
//! Two independent pieces live here:
//! - [`sensor`]: the `ImuSensor` trait and its unimplemented placeholder
//! - [`sounds`]: one-shot effects and a music channel over an [`audio`] engine

pub mod audio;
pub mod sensor;
pub mod settings;
pub mod sounds;

pub use audio::{AudioEngine, AudioError, Channel, CpalEngine, SilentEngine};
pub use sensor::{ImuSensor, SensorError, UnimplementedImu};
pub use settings::{AppSettings, SettingsError};
pub use sounds::Sounds;
