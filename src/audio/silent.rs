use std::path::{Path, PathBuf};

use super::{AudioEngine, AudioError, Channel};

/// Engine that plays nothing.
///
/// Keeps the music channel's bookkeeping so callers behave the same with
/// or without an output device. Effects finish the moment they start.
#[derive(Debug, Default)]
pub struct SilentEngine {
    music: Option<PathBuf>,
    music_playing: bool,
}

impl SilentEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioEngine for SilentEngine {
    fn play_effect(&mut self, path: &Path) -> Result<(), AudioError> {
        log::debug!("(silent) effect {}", path.display());
        Ok(())
    }

    fn play_music(&mut self, path: &Path, looped: bool) -> Result<(), AudioError> {
        log::debug!("(silent) music {} looped={}", path.display(), looped);
        self.music = Some(path.to_path_buf());
        self.music_playing = true;
        Ok(())
    }

    fn stop(&mut self, channel: Channel) {
        if channel == Channel::Music {
            self.music = None;
            self.music_playing = false;
        }
    }

    fn is_playing(&self, channel: Channel) -> bool {
        match channel {
            Channel::Effects => false,
            Channel::Music => self.music_playing,
        }
    }

    fn current_music(&self) -> Option<&Path> {
        self.music.as_deref()
    }
}
