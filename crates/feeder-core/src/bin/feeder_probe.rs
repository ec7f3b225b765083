//! feeder-probe - check which output a feeder would use, and hear it
//!
//! ## Command line flags
//!
//! - `--list`: list output devices on every host
//! - `--tone <secs>`: play a 440Hz tone for `secs` seconds
//! - `--config <path>`: options file (default `~/.config/feeder/feeder.yaml`)

use std::f32::consts::TAU;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use crossbeam::channel::{bounded, RecvTimeoutError};

use feeder_core::audio::{get_output_devices, shared_context};
use feeder_core::config::{default_config_path, load_config, DEFAULT_CONFIG_FILE};
use feeder_core::{Feeder, FeederOptions, SampleChunk};

const TONE_RATE: u32 = 44100;
const TONE_CHANNELS: usize = 2;
const TONE_HZ: f32 = 440.0;
const TONE_GAIN: f32 = 0.2;
const CHUNK_SAMPLES: usize = 2048;

/// Seconds of audio to keep queued ahead of the device
const TARGET_BUFFER_SECS: f64 = 0.5;

struct Args {
    list: bool,
    tone_secs: Option<f64>,
    config: Option<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        list: false,
        tone_secs: None,
        config: None,
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--list" => args.list = true,
            "--tone" => {
                let secs = iter.next().context("--tone needs a duration in seconds")?;
                let parsed: f64 = secs.parse().with_context(|| format!("bad duration: {}", secs))?;
                if !parsed.is_finite() || parsed < 0.0 {
                    bail!("bad duration: {}", secs);
                }
                args.tone_secs = Some(parsed);
            }
            "--config" => {
                args.config = Some(iter.next().context("--config needs a path")?.into());
            }
            "--help" | "-h" => {
                println!("usage: feeder-probe [--list] [--tone <secs>] [--config <path>]");
                std::process::exit(0);
            }
            other => bail!("unknown argument: {}", other),
        }
    }
    Ok(args)
}

/// Stereo sine generator producing planar chunks
struct Tone {
    phase: f32,
    step: f32,
}

impl Tone {
    fn new(frequency: f32, rate: u32) -> Self {
        Self {
            phase: 0.0,
            step: TAU * frequency / rate as f32,
        }
    }

    fn next_chunk(&mut self, len: usize) -> SampleChunk {
        let samples: Vec<f32> = (0..len)
            .map(|_| {
                let sample = self.phase.sin() * TONE_GAIN;
                self.phase = (self.phase + self.step) % TAU;
                sample
            })
            .collect();
        SampleChunk::new(vec![samples; TONE_CHANNELS])
    }
}

fn play_tone(options: FeederOptions, secs: f64) -> Result<()> {
    let mut feeder = Feeder::new(options);
    feeder.init(TONE_CHANNELS, TONE_RATE)?;
    println!(
        "Backend: {} ({}Hz, {} channels)",
        feeder.backend_kind().map_or("none".to_string(), |k| k.to_string()),
        feeder.native_rate().unwrap_or(0),
        feeder.native_channels().unwrap_or(0)
    );

    // The hook runs on the watcher thread; wake the producer loop from it
    let (refill_tx, refill_rx) = bounded::<()>(1);
    feeder.set_on_starved(move || {
        let _ = refill_tx.try_send(());
    })?;

    let target = (feeder.native_rate().unwrap_or(TONE_RATE) as f64 * TARGET_BUFFER_SECS) as usize;
    let mut tone = Tone::new(TONE_HZ, TONE_RATE);
    let mut top_up = |feeder: &mut Feeder| -> Result<()> {
        while feeder.playback_state()?.samples_queued < target {
            feeder.buffer_data(tone.next_chunk(CHUNK_SAMPLES))?;
            if feeder.playback_state()?.samples_queued == 0 {
                // Stub backend discards everything; don't spin
                break;
            }
        }
        Ok(())
    };

    top_up(&mut feeder)?;

    let (ready_tx, ready_rx) = bounded::<()>(1);
    feeder.wait_until_ready(move || {
        let _ = ready_tx.send(());
    })?;
    if ready_rx.recv_timeout(Duration::from_secs(5)).is_err() {
        log::warn!("Backend never reported ready, starting anyway");
    }

    feeder.start()?;
    let started = Instant::now();
    let duration = Duration::from_secs_f64(secs);
    while started.elapsed() < duration {
        match refill_rx.recv_timeout(Duration::from_millis(50)) {
            Ok(()) => log::debug!("Refill requested"),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        top_up(&mut feeder)?;
    }
    feeder.stop()?;

    let state = feeder.playback_state()?;
    println!("Final playback state:");
    print!("{}", serde_yaml::to_string(&state)?);

    feeder.close();
    Ok(())
}

fn main() -> Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args()?;
    let config_path = args
        .config
        .unwrap_or_else(|| default_config_path(DEFAULT_CONFIG_FILE));
    let options: FeederOptions = load_config(&config_path);

    println!("Native output supported: {}", Feeder::is_supported());
    match shared_context() {
        Some(context) => println!(
            "Default output: [{:?}] {} ({}Hz, {} channels)",
            context.host_id, context.device_name, context.sample_rate, context.channels
        ),
        None => println!("Default output: none"),
    }
    println!("Backend preference: {:?}", options.backend_order());

    if args.list {
        let devices = get_output_devices();
        if devices.is_empty() {
            println!("No output devices found");
        }
        for device in devices {
            println!("  {}", device);
        }
    }

    if let Some(secs) = args.tone_secs {
        play_tone(options, secs)?;
    }

    Ok(())
}
