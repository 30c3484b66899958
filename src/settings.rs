use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while saving settings
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to write settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize settings: {0}")]
    Json(#[from] serde_json::Error),
}

/// Returns the path to the settings file: `~/.config/imu-sounds/settings.json`
pub fn settings_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("imu-sounds");
    path.push("settings.json");
    path
}

/// Persisted application settings.
///
/// Serialized as JSON to the platform config directory.
/// Fields use `#[serde(default)]` so that adding new settings
/// won't break existing config files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    // Sound assets
    pub laser_sound_path: PathBuf,

    // Music
    pub loop_music: bool,

    // Audio output, host default when unset
    pub output_device: Option<String>,

    // Sensor link
    pub imu_endpoint: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            laser_sound_path: PathBuf::from("assets/sounds/laser.wav"),

            loop_music: false,

            output_device: None,

            imu_endpoint: "127.0.0.1:14550".to_string(),
        }
    }
}

impl AppSettings {
    /// Load settings from `path`, falling back to defaults on any error.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => {
                    log::info!("Loaded settings from {}", path.display());
                    settings
                }
                Err(e) => {
                    log::warn!("Failed to parse settings ({}), using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                log::info!("No settings file found ({}), using defaults", e);
                Self::default()
            }
        }
    }

    /// Save settings to `path` as pretty JSON, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        log::info!("Saved settings to {}", path.display());
        Ok(())
    }
}
