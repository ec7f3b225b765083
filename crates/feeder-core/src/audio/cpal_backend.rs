//! Native output through cpal
//!
//! ```text
//! ┌──────────────────┐   append()    ┌─────────────────────┐
//! │  Producer thread │──────────────►│   Chunk handoff     │
//! │  (Feeder owner)  │               └──────────┬──────────┘
//! └────────┬─────────┘                          │ pop()
//!          │ relaxed atomics                    ▼
//!          ▼                         ┌─────────────────────┐
//! ┌──────────────────┐               │  cpal audio thread  │
//! │  PlaybackClock   │◄──────────────│  (owns Renderer)    │
//! └──────────────────┘  tick/frame   └─────────────────────┘
//! ```
//!
//! The stream is built paused and only plays between `start` and `stop`.
//! The host period is whatever the device grants; the renderer slices it
//! into whole frames of the configured size.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig, SupportedBufferSize};

use crate::clock::{PlaybackState, TimeSource};
use crate::types::SampleChunk;

use super::backend::{Backend, BackendCandidate, BackendRequest, ReadyCallback, StreamLink};
use super::config::BackendKind;
use super::context::shared_context;
use super::device::find_device_by_id;
use super::error::{FeederError, FeederResult};

const KIND: BackendKind = BackendKind::Native;

pub fn candidate() -> BackendCandidate {
    BackendCandidate {
        kind: KIND,
        probe: is_available,
        construct,
    }
}

fn is_available() -> bool {
    shared_context().is_some()
}

fn construct(request: BackendRequest) -> FeederResult<Box<dyn Backend>> {
    Ok(Box::new(CpalBackend::open(request)?))
}

/// Output stream on a cpal device
///
/// Dropping the stream stops the device callback.
pub struct CpalBackend {
    stream: Option<Stream>,
    link: StreamLink,
    device_name: String,
    sample_rate: u32,
    channels: usize,
    frame_size: usize,
}

impl CpalBackend {
    /// Open the preferred (or default) device and build a paused stream
    pub fn open(request: BackendRequest) -> FeederResult<Self> {
        let device = resolve_device(&request)?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let default_config = device
            .default_output_config()
            .map_err(|e| FeederError::construction(KIND, e))?;
        let sample_rate = default_config.sample_rate();
        let device_channels = default_config.channels();

        // Look for an f32 layout at the device's default rate and width
        let supported = device
            .supported_output_configs()
            .map_err(|e| FeederError::construction(KIND, e))?
            .find(|c| {
                c.sample_format() == SampleFormat::F32
                    && c.channels() == device_channels
                    && c.min_sample_rate() <= sample_rate
                    && sample_rate <= c.max_sample_rate()
            })
            .ok_or_else(|| {
                FeederError::construction(KIND, "device has no f32 output configuration")
            })?
            .with_sample_rate(sample_rate);

        let frame_size = request.options.frame_size();
        let buffer_size = match supported.buffer_size() {
            SupportedBufferSize::Range { min, max }
                if (*min as usize..=*max as usize).contains(&frame_size) =>
            {
                CpalBufferSize::Fixed(frame_size as u32)
            }
            _ => CpalBufferSize::Default,
        };

        let stream_config = StreamConfig {
            channels: device_channels,
            sample_rate,
            buffer_size,
        };

        // Feed at most as many channels as the device and the options allow
        let channels = (device_channels as usize).min(request.options.channel_limit());
        let (link, mut renderer) = StreamLink::new(channels, sample_rate.0, frame_size, &request)?;

        log::info!(
            "Opening '{}': {} of {} channels, {}Hz, {} frames (~{:.1}ms), host buffer {:?}",
            device_name,
            channels,
            device_channels,
            sample_rate.0,
            frame_size,
            request.options.buffer_size.latency_ms(sample_rate.0),
            stream_config.buffer_size
        );

        let time = link.time();
        let output_channels = device_channels as usize;
        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], info: &cpal::OutputCallbackInfo| {
                    let timestamp = info.timestamp();
                    let latency = timestamp
                        .playback
                        .duration_since(&timestamp.callback)
                        .map_or(0.0, |d| d.as_secs_f64());
                    renderer.render_interleaved(data, output_channels, time.now() + latency);
                },
                |err| log::error!("Output stream error: {}", err),
                None,
            )
            .map_err(|e| FeederError::construction(KIND, e))?;

        // Some hosts start streams on creation
        if let Err(e) = stream.pause() {
            log::debug!("Could not pause new stream: {}", e);
        }

        Ok(Self {
            stream: Some(stream),
            link,
            device_name,
            sample_rate: sample_rate.0,
            channels,
            frame_size,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    fn stream(&self, operation: &'static str) -> FeederResult<&Stream> {
        self.stream.as_ref().ok_or(FeederError::InvalidState {
            operation,
            state: "closed".to_string(),
        })
    }
}

/// Preferred device from the options, else the shared context's default
fn resolve_device(request: &BackendRequest) -> FeederResult<cpal::Device> {
    if let Some(id) = &request.options.device {
        match find_device_by_id(id) {
            Ok(device) => return Ok(device),
            Err(e) => log::warn!("{}, using default output", e),
        }
    }

    let context = shared_context()
        .ok_or_else(|| FeederError::construction(KIND, "no default output device"))?;
    cpal::host_from_id(context.host_id)
        .map_err(|e| FeederError::construction(KIND, e))?
        .default_output_device()
        .ok_or_else(|| FeederError::construction(KIND, "default output device went away"))
}

impl Backend for CpalBackend {
    fn kind(&self) -> BackendKind {
        KIND
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn append(&mut self, chunk: SampleChunk) -> FeederResult<()> {
        self.link.append(chunk)
    }

    fn playback_state(&self) -> PlaybackState {
        self.link.playback_state()
    }

    fn start(&mut self) -> FeederResult<()> {
        self.link.restart_clock();
        self.stream("start")?
            .play()
            .map_err(|e| FeederError::Stream(e.to_string()))?;
        log::debug!("Output stream on '{}' playing", self.device_name);
        Ok(())
    }

    fn stop(&mut self) -> FeederResult<()> {
        self.stream("stop")?
            .pause()
            .map_err(|e| FeederError::Stream(e.to_string()))?;
        log::debug!("Output stream on '{}' paused", self.device_name);
        Ok(())
    }

    fn set_muted(&mut self, muted: bool) {
        self.link.set_muted(muted);
    }

    fn wait_until_ready(&mut self, callback: ReadyCallback) {
        callback();
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            log::info!("Closed output stream on '{}'", self.device_name);
        }
    }
}
