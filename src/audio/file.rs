//! Audio file decoding
//!
//! This module handles opening audio files with symphonia and turning
//! decoded packets into interleaved stereo frames at the output rate.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use symphonia::core::audio::SampleBuffer as DecodedSamples;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};

use super::AudioError;

/// Audio file metadata
#[derive(Debug, Clone)]
pub struct AudioFileInfo {
    pub path: PathBuf,
    pub filename: String,
    pub duration: Duration,
    pub sample_rate: u32,
    pub channels: u32,
    pub format: String,
}

/// Read an audio file's metadata without playing it
pub fn probe(path: &Path) -> Result<AudioFileInfo, AudioError> {
    OpenTrack::open(path).map(|track| track.info)
}

/// A probed file with a decoder ready for its first audio track
pub(crate) struct OpenTrack {
    pub info: AudioFileInfo,
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    scratch: Option<DecodedSamples<f32>>,
}

impl OpenTrack {
    /// Open and probe an audio file
    pub fn open(path: &Path) -> Result<Self, AudioError> {
        let file = File::open(path)?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        // Create hint from file extension
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| AudioError::Probe(e.to_string()))?;

        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(AudioError::NoTracks)?;

        let codec_params = &track.codec_params;
        let sample_rate = codec_params.sample_rate.unwrap_or(44100);
        let channels = codec_params.channels.map(|c| c.count() as u32).unwrap_or(2);

        let duration = if let Some(n_frames) = codec_params.n_frames {
            let time_base = codec_params.time_base.unwrap_or(TimeBase::new(1, sample_rate));
            let time = time_base.calc_time(n_frames);
            Duration::from_secs_f64(time.seconds as f64 + time.frac)
        } else {
            Duration::ZERO
        };

        let format_name = symphonia::default::get_codecs()
            .get_codec(codec_params.codec)
            .map(|descriptor| descriptor.short_name)
            .unwrap_or("unknown")
            .to_string();

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("Unknown")
            .to_string();

        let track_id = track.id;
        let decoder = symphonia::default::get_codecs()
            .make(codec_params, &DecoderOptions::default())
            .map_err(|e| AudioError::Decoder(e.to_string()))?;

        log::debug!(
            "Opened {} ({}, {} Hz, {} ch, {:?})",
            filename,
            format_name,
            sample_rate,
            channels,
            duration
        );

        Ok(Self {
            info: AudioFileInfo {
                path: path.to_path_buf(),
                filename,
                duration,
                sample_rate,
                channels,
                format: format_name,
            },
            format,
            decoder,
            track_id,
            scratch: None,
        })
    }

    /// Decode the next packet of this track and append its frames to `out`.
    ///
    /// Returns `Ok(false)` at end of stream.
    pub fn decode_next(&mut self, out: &mut Vec<(f32, f32)>) -> Result<bool, AudioError> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => return Ok(false),
                Err(e) => return Err(AudioError::Decoder(e.to_string())),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                // Corrupt packets are skipped
                Err(SymphoniaError::DecodeError(e)) => {
                    log::debug!("Skipping packet in {}: {}", self.info.filename, e);
                    continue;
                }
                Err(e) => return Err(AudioError::Decoder(e.to_string())),
            };

            let spec = *decoded.spec();
            let channels = spec.channels.count();
            let capacity = decoded.capacity() as u64;

            let too_small = self
                .scratch
                .as_ref()
                .is_some_and(|buf| (buf.capacity() as u64) < capacity * channels as u64);
            if too_small {
                self.scratch = None;
            }
            let scratch = self
                .scratch
                .get_or_insert_with(|| DecodedSamples::new(capacity, spec));
            scratch.copy_interleaved_ref(decoded);
            interleaved_to_stereo(scratch.samples(), channels, out);

            return Ok(true);
        }
    }

    /// Seek back to the first frame
    pub fn rewind(&mut self) -> Result<(), AudioError> {
        self.format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time: Time::from(0.0),
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| AudioError::Decoder(e.to_string()))?;
        self.decoder.reset();
        Ok(())
    }
}

/// Fold interleaved samples with any channel count into (left, right) frames.
///
/// Mono is duplicated to both sides; channels past the second are dropped.
pub(crate) fn interleaved_to_stereo(samples: &[f32], channels: usize, out: &mut Vec<(f32, f32)>) {
    if channels == 0 {
        return;
    }
    out.extend(samples.chunks_exact(channels).map(|frame| {
        let left = frame[0];
        let right = if channels > 1 { frame[1] } else { left };
        (left, right)
    }));
}

/// Streaming linear-interpolation resampler for stereo frames.
///
/// Keeps the last input frame between calls so consecutive packets join
/// without discontinuities.
#[derive(Debug, Clone)]
pub struct LinearResampler {
    /// Input frames advanced per output frame
    step: f64,
    /// Read position relative to `last` (0.0 = `last`)
    pos: f64,
    last: Option<(f32, f32)>,
    frames: Vec<(f32, f32)>,
}

impl LinearResampler {
    pub fn new(source_rate: u32, target_rate: u32) -> Self {
        Self {
            step: source_rate.max(1) as f64 / target_rate.max(1) as f64,
            pos: 0.0,
            last: None,
            frames: Vec::new(),
        }
    }

    /// True when no conversion is needed
    pub fn is_passthrough(&self) -> bool {
        self.step == 1.0
    }

    /// Resample `input`, appending the result to `out`
    pub fn process(&mut self, input: &[(f32, f32)], out: &mut Vec<(f32, f32)>) {
        if self.is_passthrough() {
            out.extend_from_slice(input);
            return;
        }
        if input.is_empty() {
            return;
        }

        self.frames.clear();
        self.frames.extend(self.last);
        self.frames.extend_from_slice(input);

        let frames = &self.frames;
        while self.pos + 1.0 < frames.len() as f64 {
            let index = self.pos as usize;
            let t = (self.pos - index as f64) as f32;
            let (l0, r0) = frames[index];
            let (l1, r1) = frames[index + 1];
            out.push((l0 + (l1 - l0) * t, r0 + (r1 - r0) * t));
            self.pos += self.step;
        }

        self.pos -= (frames.len() - 1) as f64;
        self.last = frames.last().copied();
    }

    /// Forget carried state, e.g. after seeking
    pub fn reset(&mut self) {
        self.pos = 0.0;
        self.last = None;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Write a mono 16-bit WAV holding `frames` frames of a repeating ramp
    pub(crate) fn write_wav(path: &Path, frames: usize, sample_rate: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames {
            writer.write_sample((i % 100) as i16 * 100).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn decode_all(track: &mut OpenTrack) -> Vec<(f32, f32)> {
        let mut out = Vec::new();
        while track.decode_next(&mut out).unwrap() {}
        out
    }

    #[test]
    fn test_mono_duplicated() {
        let mut out = Vec::new();
        interleaved_to_stereo(&[0.1, 0.2, 0.3], 1, &mut out);
        assert_eq!(out, vec![(0.1, 0.1), (0.2, 0.2), (0.3, 0.3)]);
    }

    #[test]
    fn test_extra_channels_dropped() {
        let mut out = Vec::new();
        interleaved_to_stereo(&[1.0, 2.0, 9.0, 3.0, 4.0, 9.0], 3, &mut out);
        assert_eq!(out, vec![(1.0, 2.0), (3.0, 4.0)]);
    }

    #[test]
    fn test_resampler_passthrough() {
        let mut rs = LinearResampler::new(48000, 48000);
        assert!(rs.is_passthrough());
        let mut out = Vec::new();
        rs.process(&[(0.5, -0.5), (0.25, -0.25)], &mut out);
        assert_eq!(out, vec![(0.5, -0.5), (0.25, -0.25)]);
    }

    #[test]
    fn test_resampler_upsample_across_packets() {
        let mut rs = LinearResampler::new(1, 2);
        let mut out = Vec::new();

        rs.process(&[(0.0, 0.0), (1.0, -1.0)], &mut out);
        assert_eq!(out, vec![(0.0, 0.0), (0.5, -0.5)]);

        // The second packet joins onto the last frame of the first one
        rs.process(&[(0.0, 0.0)], &mut out);
        assert_eq!(
            out,
            vec![(0.0, 0.0), (0.5, -0.5), (1.0, -1.0), (0.5, -0.5)]
        );
    }

    #[test]
    fn test_resampler_downsample_length() {
        let mut rs = LinearResampler::new(2, 1);
        let input: Vec<(f32, f32)> = (0..100).map(|i| (i as f32, i as f32)).collect();
        let mut out = Vec::new();
        rs.process(&input, &mut out);
        assert_eq!(out.len(), 50);
        assert_eq!(out[1], (2.0, 2.0));
    }

    #[test]
    fn test_wav_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ramp.wav");
        write_wav(&path, 3000, 8000);

        let info = probe(&path).unwrap();
        assert_eq!(info.filename, "ramp.wav");
        assert_eq!(info.sample_rate, 8000);
        assert_eq!(info.channels, 1);
        assert_eq!(info.duration, Duration::from_millis(375));
        assert_eq!(info.format, "pcm_s16le");
    }

    #[test]
    fn test_decode_rewind_decode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ramp.wav");
        write_wav(&path, 3000, 8000);

        let mut track = OpenTrack::open(&path).unwrap();
        let first = decode_all(&mut track);
        assert_eq!(first.len(), 3000);
        assert_eq!(first[0], (0.0, 0.0));
        assert!(first[1].0 > 0.0);
        assert_eq!(first[1].0, first[1].1);

        track.rewind().unwrap();
        let second = decode_all(&mut track);
        assert_eq!(second.len(), 3000);
        assert_eq!(second[0], (0.0, 0.0));
        assert_eq!(second, first);
    }

    #[test]
    fn test_garbage_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.wav");
        std::fs::write(&path, b"this is not an audio file at all").unwrap();

        assert!(matches!(OpenTrack::open(&path), Err(AudioError::Probe(_))));
        assert!(matches!(probe(&path), Err(AudioError::Probe(_))));
    }

    #[test]
    fn test_open_missing_file() {
        let result = OpenTrack::open(Path::new("definitely/not/here.wav"));
        assert!(matches!(result, Err(AudioError::Io(_))));
    }
}
