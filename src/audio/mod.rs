//! Audio module - playback engines behind a common trait
//!
//! This module provides:
//! - The `AudioEngine` seam used by the sound glue
//! - Audio file decoding and resampling
//! - A cpal output engine and a silent engine for headless hosts

mod file;
mod output;
mod silent;

use std::path::Path;

use thiserror::Error;

pub use file::{probe, AudioFileInfo, LinearResampler};
pub use output::{output_devices, CpalEngine};
pub use silent::SilentEngine;

/// Errors that can occur while loading or playing audio
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to open file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to probe audio format: {0}")]
    Probe(String),

    #[error("No audio tracks found")]
    NoTracks,

    #[error("Decoder error: {0}")]
    Decoder(String),

    #[error("No output device available")]
    NoOutputDevice,

    #[error("Output device not found: {0}")]
    DeviceNotFound(String),

    #[error("Output stream error: {0}")]
    Stream(String),
}

/// Playback channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// One-shot sound effects, any number may overlap
    Effects,
    /// A single music track
    Music,
}

/// Something that can turn audio files into sound
pub trait AudioEngine {
    /// Load a file and play it once on the effects channel.
    ///
    /// Returns as soon as playback has started.
    fn play_effect(&mut self, path: &Path) -> Result<(), AudioError>;

    /// Load a file onto the music channel, replacing whatever track is
    /// currently loaded, and start playing it.
    fn play_music(&mut self, path: &Path, looped: bool) -> Result<(), AudioError>;

    /// Stop everything playing on `channel`
    fn stop(&mut self, channel: Channel);

    /// Whether anything is still audible on `channel`
    fn is_playing(&self, channel: Channel) -> bool;

    /// Path of the track loaded on the music channel
    fn current_music(&self) -> Option<&Path>;
}

impl<E: AudioEngine + ?Sized> AudioEngine for Box<E> {
    fn play_effect(&mut self, path: &Path) -> Result<(), AudioError> {
        (**self).play_effect(path)
    }

    fn play_music(&mut self, path: &Path, looped: bool) -> Result<(), AudioError> {
        (**self).play_music(path, looped)
    }

    fn stop(&mut self, channel: Channel) {
        (**self).stop(channel)
    }

    fn is_playing(&self, channel: Channel) -> bool {
        (**self).is_playing(channel)
    }

    fn current_music(&self) -> Option<&Path> {
        (**self).current_music()
    }
}
