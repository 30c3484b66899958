//! imu-sounds command line front end
//!
//! Plays sounds through the configured output device and exercises the
//! height sensor driver.

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};

use imu_sounds::audio::{self, AudioEngine, Channel, CpalEngine, SilentEngine};
use imu_sounds::sensor::{ImuSensor, UnimplementedImu};
use imu_sounds::settings::{self, AppSettings};
use imu_sounds::sounds::Sounds;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Parser, Debug)]
#[command(name = "imu-sounds", version, about)]
struct Cli {
    /// Settings file (defaults to the platform config directory)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Do not open an output device
    #[arg(long, global = true)]
    silent: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Play a sound file once
    Play { path: PathBuf },
    /// Play the configured laser sound
    Laser,
    /// Play a music track
    Music {
        path: PathBuf,
        /// Stop after this many seconds instead of waiting for the track to end
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Show an audio file's format
    Info { path: PathBuf },
    /// List output devices
    Devices,
    /// Calibrate the height sensor
    Calibrate,
    /// Read the height sensor
    Height,
    /// Write the current settings to the settings file
    InitSettings,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    log::info!("Starting imu-sounds");

    let cli = Cli::parse();
    let settings_path = cli.settings.clone().unwrap_or_else(settings::settings_path);
    let settings = AppSettings::load_from(&settings_path);

    match cli.command {
        Command::Calibrate => {
            let mut imu = UnimplementedImu::new(settings.imu_endpoint.clone());
            imu.calibrate()?;
            println!("Calibrated");
        }
        Command::Height => {
            let mut imu = UnimplementedImu::new(settings.imu_endpoint.clone());
            println!("{:.3} m", imu.height()?);
        }
        Command::Info { path } => {
            let info = audio::probe(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            println!(
                "{}: {} {} Hz, {} channel(s), {:.2} s",
                info.filename,
                info.format,
                info.sample_rate,
                info.channels,
                info.duration.as_secs_f64()
            );
        }
        Command::Devices => {
            for name in audio::output_devices() {
                println!("{}", name);
            }
        }
        Command::InitSettings => {
            settings
                .save_to(&settings_path)
                .with_context(|| format!("saving {}", settings_path.display()))?;
            println!("Wrote {}", settings_path.display());
        }
        command => {
            if cli.silent {
                // Silent music never ends on its own
                let command = match command {
                    Command::Music { path, seconds } => Command::Music {
                        path,
                        seconds: Some(seconds.unwrap_or(0)),
                    },
                    other => other,
                };
                run_audio(Sounds::new(SilentEngine::new(), &settings), command)?;
            } else {
                let engine = CpalEngine::new(settings.output_device.as_deref())
                    .context("opening audio output")?;
                run_audio(Sounds::new(engine, &settings), command)?;
            }
        }
    }

    Ok(())
}

fn run_audio<E: AudioEngine>(mut sounds: Sounds<E>, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Play { path } => {
            sounds
                .play_sound(&path)
                .with_context(|| format!("playing {}", path.display()))?;
            wait_while_playing(&sounds, Channel::Effects, None);
        }
        Command::Laser => {
            let path = sounds.laser_sound_path().to_path_buf();
            sounds
                .play_laser_sound()
                .with_context(|| format!("playing {}", path.display()))?;
            wait_while_playing(&sounds, Channel::Effects, None);
        }
        Command::Music { path, seconds } => {
            sounds
                .play_music(&path)
                .with_context(|| format!("playing {}", path.display()))?;
            wait_while_playing(&sounds, Channel::Music, seconds.map(Duration::from_secs));
            sounds.stop_music();
        }
        other => log::warn!("{:?} does not use the audio engine", other),
    }
    Ok(())
}

/// Block until `channel` falls silent or `limit` elapses
fn wait_while_playing<E: AudioEngine>(sounds: &Sounds<E>, channel: Channel, limit: Option<Duration>) {
    let started = Instant::now();
    while sounds.engine().is_playing(channel) {
        if limit.is_some_and(|limit| started.elapsed() >= limit) {
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }
}
