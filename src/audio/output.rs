//! cpal output engine
//!
//! One output stream stays open for the lifetime of the engine. Every
//! sound being played is a *voice*: a decoder thread feeding a lock-free
//! SPSC ring of stereo frames, which the output callback drains and mixes.
//!
//! The callback never blocks. It takes the voice list with `try_lock` and
//! outputs silence for the period if the list is being edited.

use std::mem;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapRb,
};

use super::file::{LinearResampler, OpenTrack};
use super::{AudioEngine, AudioError, Channel};

type Frame = (f32, f32);

/// Consumer side of a voice, owned by the output callback
struct Voice {
    channel: Channel,
    consumer: ringbuf::HeapCons<Frame>,
    is_running: Arc<AtomicBool>,
    /// Decoder thread has produced its last frame
    finished: Arc<AtomicBool>,
    /// Voice has been dropped from the mix
    done: Arc<AtomicBool>,
}

/// Engine side of a voice
struct VoiceHandle {
    channel: Channel,
    is_running: Arc<AtomicBool>,
    done: Arc<AtomicBool>,
    thread: thread::JoinHandle<()>,
}

impl VoiceHandle {
    fn join(self) {
        if self.thread.join().is_err() {
            log::warn!("Voice thread panicked");
        }
    }
}

/// Names of the output devices on the default host
pub fn output_devices() -> Vec<String> {
    cpal::default_host()
        .output_devices()
        .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
        .unwrap_or_default()
}

/// Audio engine playing through a cpal output device
pub struct CpalEngine {
    /// Name of the device in use
    pub device_name: String,

    /// Voices and their decoder threads
    bank: VoiceBank,

    /// Kept alive for as long as the engine exists
    _stream: cpal::Stream,
}

impl CpalEngine {
    /// Open the named output device, or the host default when `None`
    pub fn new(device_name: Option<&str>) -> Result<Self, AudioError> {
        let host = cpal::default_host();

        let device = match device_name {
            Some(name) => host
                .output_devices()
                .map_err(|e| AudioError::Stream(e.to_string()))?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| AudioError::DeviceNotFound(name.to_string()))?,
            None => host
                .default_output_device()
                .ok_or(AudioError::NoOutputDevice)?,
        };

        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        log::info!("Using output device: {}", device_name);

        let config = device
            .default_output_config()
            .map_err(|e| AudioError::Stream(e.to_string()))?;

        log::info!("Audio config: {:?}", config);

        let channels = config.channels() as usize;
        let bank = VoiceBank::new(config.sample_rate().0);
        let callback_mixer = Arc::clone(&bank.mixer);

        let stream = device
            .build_output_stream(
                &config.into(),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    data.fill(0.0);
                    let Ok(mut voices) = callback_mixer.try_lock() else {
                        return;
                    };
                    mix_into(data, channels, &mut voices);
                },
                |err| log::error!("Audio output error: {}", err),
                None,
            )
            .map_err(|e| AudioError::Stream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::Stream(e.to_string()))?;

        Ok(Self {
            device_name,
            bank,
            _stream: stream,
        })
    }
}

impl AudioEngine for CpalEngine {
    fn play_effect(&mut self, path: &Path) -> Result<(), AudioError> {
        self.bank.play_effect(path)
    }

    fn play_music(&mut self, path: &Path, looped: bool) -> Result<(), AudioError> {
        self.bank.play_music(path, looped)
    }

    fn stop(&mut self, channel: Channel) {
        self.bank.stop(channel)
    }

    fn is_playing(&self, channel: Channel) -> bool {
        self.bank.is_playing(channel)
    }

    fn current_music(&self) -> Option<&Path> {
        self.bank.current_music()
    }
}

/// Every voice started by an engine, independent of the output device.
///
/// The output callback only sees `mixer`; the bank owns the decoder
/// threads and the music channel bookkeeping.
struct VoiceBank {
    /// Output sample rate; every voice is resampled to it
    sample_rate: u32,

    /// Voices being mixed by the output callback
    mixer: Arc<Mutex<Vec<Voice>>>,

    /// Decoder threads, one per voice
    voices: Vec<VoiceHandle>,

    /// Track loaded on the music channel
    music: Option<PathBuf>,
}

impl VoiceBank {
    fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            mixer: Arc::new(Mutex::new(Vec::new())),
            voices: Vec::new(),
            music: None,
        }
    }

    /// Start a decoder thread for an opened track on `channel`
    fn start_voice(&mut self, track: OpenTrack, channel: Channel, looped: bool) -> Result<(), AudioError> {
        self.reap();

        let name = track.info.filename.clone();

        // ~half a second of stereo frames
        let rb = HeapRb::<Frame>::new((self.sample_rate as usize / 2).max(1024));
        let (producer, consumer) = rb.split();

        let is_running = Arc::new(AtomicBool::new(true));
        let finished = Arc::new(AtomicBool::new(false));
        let done = Arc::new(AtomicBool::new(false));

        let thread = {
            let is_running = Arc::clone(&is_running);
            let finished = Arc::clone(&finished);
            let sample_rate = self.sample_rate;
            let name = name.clone();
            thread::Builder::new()
                .name(format!("voice-{}", name))
                .spawn(move || {
                    if let Err(e) = decode_thread(track, producer, &is_running, looped, sample_rate)
                    {
                        log::error!("Playback error in {}: {}", name, e);
                    }
                    finished.store(true, Ordering::Release);
                })?
        };

        match self.mixer.lock() {
            Ok(mut voices) => voices.push(Voice {
                channel,
                consumer,
                is_running: Arc::clone(&is_running),
                finished,
                done: Arc::clone(&done),
            }),
            Err(_) => {
                is_running.store(false, Ordering::Relaxed);
                let _ = thread.join();
                return Err(AudioError::Stream("mixer lock poisoned".to_string()));
            }
        }

        self.voices.push(VoiceHandle {
            channel,
            is_running,
            done,
            thread,
        });

        log::info!("Playing {} on {:?} channel", name, channel);
        Ok(())
    }

    /// Join decoder threads whose voices have left the mix
    fn reap(&mut self) {
        let (done, live): (Vec<_>, Vec<_>) = mem::take(&mut self.voices)
            .into_iter()
            .partition(|h| h.done.load(Ordering::Acquire));
        self.voices = live;
        for handle in done {
            handle.join();
        }
    }
}

impl AudioEngine for VoiceBank {
    fn play_effect(&mut self, path: &Path) -> Result<(), AudioError> {
        // Probe on the caller's thread so bad files fail here
        let track = OpenTrack::open(path)?;
        self.start_voice(track, Channel::Effects, false)
    }

    fn play_music(&mut self, path: &Path, looped: bool) -> Result<(), AudioError> {
        // A track that fails to open leaves the current one playing
        let track = OpenTrack::open(path)?;
        self.stop(Channel::Music);
        self.start_voice(track, Channel::Music, looped)?;
        self.music = Some(path.to_path_buf());
        Ok(())
    }

    fn stop(&mut self, channel: Channel) {
        for handle in self.voices.iter().filter(|h| h.channel == channel) {
            handle.is_running.store(false, Ordering::Relaxed);
        }

        if let Ok(mut voices) = self.mixer.lock() {
            voices.retain(|v| v.channel != channel);
        }

        let (stopped, kept): (Vec<_>, Vec<_>) = mem::take(&mut self.voices)
            .into_iter()
            .partition(|h| h.channel == channel);
        self.voices = kept;

        let count = stopped.len();
        for handle in stopped {
            handle.join();
        }

        if channel == Channel::Music {
            self.music = None;
        }

        log::debug!("Stopped {} voice(s) on {:?} channel", count, channel);
    }

    fn is_playing(&self, channel: Channel) -> bool {
        self.voices
            .iter()
            .any(|h| h.channel == channel && !h.done.load(Ordering::Acquire))
    }

    fn current_music(&self) -> Option<&Path> {
        self.music.as_deref()
    }
}

impl Drop for VoiceBank {
    fn drop(&mut self) {
        self.stop(Channel::Effects);
        self.stop(Channel::Music);
    }
}

/// Sum one frame from every voice into `data` and drop voices that are over
fn mix_into(data: &mut [f32], channels: usize, voices: &mut Vec<Voice>) {
    if channels == 0 {
        return;
    }

    for frame in data.chunks_mut(channels) {
        let (mut left, mut right) = (0.0_f32, 0.0_f32);
        for voice in voices.iter_mut() {
            if let Some((l, r)) = voice.consumer.try_pop() {
                left += l;
                right += r;
            }
        }
        let left = left.clamp(-1.0, 1.0);
        let right = right.clamp(-1.0, 1.0);

        if channels >= 2 {
            frame[0] = left;
            frame[1] = right;
            for ch in frame.iter_mut().skip(2) {
                *ch = 0.0;
            }
        } else {
            frame[0] = (left + right) / 2.0;
        }
    }

    voices.retain(|voice| {
        let drained = voice.finished.load(Ordering::Acquire) && voice.consumer.is_empty();
        let keep = voice.is_running.load(Ordering::Relaxed) && !drained;
        if !keep {
            voice.done.store(true, Ordering::Release);
        }
        keep
    });
}

/// Decoder thread body: decode, resample and push until done or stopped
fn decode_thread(
    mut track: OpenTrack,
    mut producer: ringbuf::HeapProd<Frame>,
    is_running: &AtomicBool,
    looped: bool,
    output_rate: u32,
) -> Result<(), AudioError> {
    let mut resampler = LinearResampler::new(track.info.sample_rate, output_rate);
    let mut decoded = Vec::new();
    let mut resampled = Vec::new();
    let mut produced_since_rewind = false;

    // The output callback drives timing; back off while the ring is full
    let packet_sleep = Duration::from_millis(5);

    while is_running.load(Ordering::Relaxed) {
        decoded.clear();
        if !track.decode_next(&mut decoded)? {
            if looped && produced_since_rewind {
                track.rewind()?;
                resampler.reset();
                produced_since_rewind = false;
                continue;
            }
            break;
        }
        produced_since_rewind |= !decoded.is_empty();

        resampled.clear();
        resampler.process(&decoded, &mut resampled);

        let mut pending = resampled.as_slice();
        while !pending.is_empty() {
            if !is_running.load(Ordering::Relaxed) {
                return Ok(());
            }
            let pushed = producer.push_slice(pending);
            pending = &pending[pushed..];
            if !pending.is_empty() {
                thread::sleep(packet_sleep);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::audio::file::tests::write_wav;

    fn voice(channel: Channel, frames: &[Frame], finished: bool) -> (Voice, ringbuf::HeapProd<Frame>) {
        let (mut producer, consumer) = HeapRb::<Frame>::new(16).split();
        producer.push_slice(frames);
        (
            Voice {
                channel,
                consumer,
                is_running: Arc::new(AtomicBool::new(true)),
                finished: Arc::new(AtomicBool::new(finished)),
                done: Arc::new(AtomicBool::new(false)),
            },
            producer,
        )
    }

    #[test]
    fn test_mix_sums_and_clamps() {
        let (a, _pa) = voice(Channel::Effects, &[(0.25, 0.75), (0.5, 0.5)], false);
        let (b, _pb) = voice(Channel::Music, &[(0.25, 0.5)], false);
        let mut voices = vec![a, b];

        let mut data = [0.0_f32; 4];
        mix_into(&mut data, 2, &mut voices);

        assert_eq!(data, [0.5, 1.0, 0.5, 0.5]);
        assert_eq!(voices.len(), 2);
    }

    #[test]
    fn test_mix_mono_device() {
        let (a, _pa) = voice(Channel::Effects, &[(0.2, 0.4)], false);
        let mut voices = vec![a];

        let mut data = [0.0_f32; 1];
        mix_into(&mut data, 1, &mut voices);

        assert!((data[0] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_mix_drops_drained_voices() {
        let (a, _pa) = voice(Channel::Effects, &[(0.1, 0.1)], true);
        let done = Arc::clone(&a.done);
        let (b, _pb) = voice(Channel::Music, &[(0.1, 0.1), (0.1, 0.1)], false);
        let mut voices = vec![a, b];

        let mut data = [0.0_f32; 2];
        mix_into(&mut data, 2, &mut voices);

        assert_eq!(voices.len(), 1);
        assert_eq!(voices[0].channel, Channel::Music);
        assert!(done.load(Ordering::Acquire));
    }

    #[test]
    fn test_mix_drops_stopped_voices() {
        let (a, _pa) = voice(Channel::Music, &[(0.1, 0.1); 4], false);
        a.is_running.store(false, Ordering::Relaxed);
        let mut voices = vec![a];

        let mut data = [0.0_f32; 2];
        mix_into(&mut data, 2, &mut voices);

        assert!(voices.is_empty());
    }

    fn drain(consumer: &mut ringbuf::HeapCons<Frame>) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(frame) = consumer.try_pop() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_decode_thread_single_pass() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ramp.wav");
        write_wav(&path, 3000, 8000);

        let (producer, mut consumer) = HeapRb::<Frame>::new(10_000).split();
        let track = OpenTrack::open(&path).unwrap();
        decode_thread(track, producer, &AtomicBool::new(true), false, 8000).unwrap();

        assert_eq!(drain(&mut consumer).len(), 3000);
    }

    #[test]
    fn test_decode_thread_loops_back_to_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ramp.wav");
        write_wav(&path, 3000, 8000);

        let (producer, mut consumer) = HeapRb::<Frame>::new(10_000).split();
        let track = OpenTrack::open(&path).unwrap();
        let is_running = Arc::new(AtomicBool::new(true));

        let worker = {
            let is_running = Arc::clone(&is_running);
            thread::spawn(move || decode_thread(track, producer, &is_running, true, 8000))
        };

        let started = Instant::now();
        while consumer.occupied_len() < 7000 && started.elapsed() < Duration::from_secs(10) {
            thread::sleep(Duration::from_millis(5));
        }
        is_running.store(false, Ordering::Relaxed);
        worker.join().unwrap().unwrap();

        let frames = drain(&mut consumer);
        assert!(frames.len() > 3000);
        assert_eq!(frames[3000], frames[0]);
        assert_eq!(frames[3001], frames[1]);
    }

    #[test]
    fn test_decode_thread_empty_file_does_not_spin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        write_wav(&path, 0, 8000);

        let (producer, consumer) = HeapRb::<Frame>::new(1024).split();
        let track = OpenTrack::open(&path).unwrap();
        decode_thread(track, producer, &AtomicBool::new(true), true, 8000).unwrap();

        assert!(consumer.is_empty());
    }

    #[test]
    fn test_bad_replacement_keeps_current_music() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("theme.wav");
        write_wav(&good, 3000, 8000);

        let mut bank = VoiceBank::new(8000);
        bank.play_music(&good, true).unwrap();
        assert_eq!(bank.current_music(), Some(good.as_path()));

        let err = bank
            .play_music(&dir.path().join("missing.wav"), true)
            .unwrap_err();
        assert!(matches!(err, AudioError::Io(_)));
        assert_eq!(bank.current_music(), Some(good.as_path()));
        assert!(bank.is_playing(Channel::Music));

        bank.stop(Channel::Music);
        assert_eq!(bank.current_music(), None);
        assert!(!bank.is_playing(Channel::Music));
    }

    #[test]
    fn test_bad_effect_fails_on_caller_thread() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.wav");
        std::fs::write(&path, b"not audio").unwrap();

        let mut bank = VoiceBank::new(8000);
        assert!(matches!(bank.play_effect(&path), Err(AudioError::Probe(_))));
        assert!(!bank.is_playing(Channel::Effects));
    }
}
