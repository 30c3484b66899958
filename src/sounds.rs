//! Sound effect and music helpers
//!
//! Thin forwarding layer over an [`AudioEngine`]. Engine errors are
//! returned to the caller unchanged.

use std::path::{Path, PathBuf};

use crate::audio::{AudioEngine, AudioError, Channel};
use crate::settings::AppSettings;

pub struct Sounds<E> {
    engine: E,
    laser_sound_path: PathBuf,
    loop_music: bool,
}

impl<E: AudioEngine> Sounds<E> {
    pub fn new(engine: E, settings: &AppSettings) -> Self {
        Self {
            engine,
            laser_sound_path: settings.laser_sound_path.clone(),
            loop_music: settings.loop_music,
        }
    }

    /// Play a sound file once, without waiting for it to finish
    pub fn play_sound(&mut self, path: impl AsRef<Path>) -> Result<(), AudioError> {
        self.engine.play_effect(path.as_ref())
    }

    pub fn play_laser_sound(&mut self) -> Result<(), AudioError> {
        let path = self.laser_sound_path.clone();
        self.play_sound(path)
    }

    /// Load a track onto the music channel and start it, replacing the current one
    pub fn play_music(&mut self, path: impl AsRef<Path>) -> Result<(), AudioError> {
        self.engine.play_music(path.as_ref(), self.loop_music)
    }

    /// Stop the music channel. Sound effects keep playing.
    pub fn stop_music(&mut self) {
        self.engine.stop(Channel::Music);
    }

    /// Stop every sound effect. Music keeps playing.
    pub fn stop_effects(&mut self) {
        self.engine.stop(Channel::Effects);
    }

    pub fn laser_sound_path(&self) -> &Path {
        &self.laser_sound_path
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }
}
