//! JACK server backend for Linux
//!
//! Fallback for systems where the platform API isn't usable directly, or
//! where output should be routed through a running JACK (or PipeWire-JACK)
//! server. Registers one output port per channel and auto-connects them to
//! the physical playback ports on start.
//!
//! Unlike cpal streams a JACK client is activated and deactivated as a
//! whole: `stop` hands the process handler back so a later `start` can
//! resume with the same queue and clock.

use std::mem;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use jack::{AsyncClient, AudioOut, Client, ClientOptions, Control, Port, PortFlags, ProcessScope};

use crate::clock::{MonotonicTime, PlaybackState, TimeSource};
use crate::types::SampleChunk;

use super::backend::{Backend, BackendCandidate, BackendRequest, ReadyCallback, StreamLink};
use super::config::BackendKind;
use super::error::{FeederError, FeederResult};
use super::render::Renderer;

const KIND: BackendKind = BackendKind::Jack;

/// Client name used for support probes
const PROBE_CLIENT_NAME: &str = "feeder_probe";

pub fn candidate() -> BackendCandidate {
    BackendCandidate {
        kind: KIND,
        probe: is_available,
        construct,
    }
}

fn is_available() -> bool {
    match Client::new(PROBE_CLIENT_NAME, ClientOptions::NO_START_SERVER) {
        Ok(_) => true,
        Err(e) => {
            log::debug!("JACK server not reachable: {}", e);
            false
        }
    }
}

fn construct(request: BackendRequest) -> FeederResult<Box<dyn Backend>> {
    Ok(Box::new(JackBackend::open(request)?))
}

/// Process handler, owned by the JACK RT thread while active
struct JackProcessor {
    ports: Vec<Port<AudioOut>>,
    renderer: Renderer,
    time: MonotonicTime,
    rate: f64,
}

impl jack::ProcessHandler for JackProcessor {
    fn process(&mut self, _client: &Client, ps: &ProcessScope) -> Control {
        let n_frames = ps.n_frames() as usize;
        // One period of output latency
        let playback_time = self.time.now() + n_frames as f64 / self.rate;

        let ports = &mut self.ports;
        self.renderer
            .render_with(n_frames, playback_time, |channel, offset, samples| {
                if let Some(port) = ports.get_mut(channel) {
                    port.as_mut_slice(ps)[offset..offset + samples.len()]
                        .copy_from_slice(samples);
                }
            });

        Control::Continue
    }
}

struct JackNotifications;

impl jack::NotificationHandler for JackNotifications {
    fn sample_rate(&mut self, _client: &Client, srate: jack::Frames) -> Control {
        log::info!("JACK sample rate changed to: {}", srate);
        Control::Continue
    }

    fn xrun(&mut self, _client: &Client) -> Control {
        log::warn!("JACK xrun detected");
        Control::Continue
    }
}

enum ClientState {
    Inactive {
        client: Client,
        processor: JackProcessor,
    },
    Active(AsyncClient<JackNotifications, JackProcessor>),
    Closed,
}

/// Output through a JACK client
pub struct JackBackend {
    state: ClientState,
    link: StreamLink,
    client_name: String,
    /// Full names ("client:port") of our output ports
    port_names: Vec<String>,
    sample_rate: u32,
    channels: usize,
    frame_size: usize,
    ready_timeout: Duration,
    ready_poll_interval: Duration,
}

impl JackBackend {
    /// Open a client and register output ports, without activating
    pub fn open(request: BackendRequest) -> FeederResult<Self> {
        let options = &request.options;
        let (client, _status) = Client::new(&options.client_name, ClientOptions::NO_START_SERVER)
            .map_err(|e| FeederError::construction(KIND, e))?;
        // The server may rename us if the name is taken
        let client_name = client.name().to_string();

        let sample_rate = client.sample_rate() as u32;
        let frame_size = client.buffer_size() as usize;
        let channels = request.channels.min(options.channel_limit());

        let mut ports = Vec::with_capacity(channels);
        let mut port_names = Vec::with_capacity(channels);
        for index in 0..channels {
            let short_name = format!("out_{}", index + 1);
            let port = client
                .register_port(&short_name, AudioOut::default())
                .map_err(|e| FeederError::construction(KIND, e))?;
            ports.push(port);
            port_names.push(format!("{}:{}", client_name, short_name));
        }

        let (link, renderer) = StreamLink::new(channels, sample_rate, frame_size, &request)?;

        log::info!(
            "JACK client '{}' created ({} ports, {}Hz, {} frames, {:.1}ms)",
            client_name,
            channels,
            sample_rate,
            frame_size,
            frame_size as f32 / sample_rate as f32 * 1000.0
        );

        let processor = JackProcessor {
            ports,
            renderer,
            time: link.time(),
            rate: sample_rate as f64,
        };

        Ok(Self {
            state: ClientState::Inactive { client, processor },
            link,
            client_name,
            port_names,
            sample_rate,
            channels,
            frame_size,
            ready_timeout: Duration::from_millis(options.ready_timeout_ms),
            ready_poll_interval: Duration::from_millis(options.ready_poll_interval_ms.max(1)),
        })
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    pub fn port_names(&self) -> &[String] {
        &self.port_names
    }
}

/// Connect our ports to the physical playback ports, in order
fn connect_outputs(client: &Client, port_names: &[String]) {
    let playback = client.ports(None, None, PortFlags::IS_INPUT | PortFlags::IS_PHYSICAL);
    if playback.is_empty() {
        log::warn!("No JACK playback ports found; outputs left unconnected");
        return;
    }

    for (ours, theirs) in port_names.iter().zip(&playback) {
        match client.connect_ports_by_name(ours, theirs) {
            Ok(()) => log::info!("Connected {} -> {}", ours, theirs),
            Err(e) => log::warn!("Could not connect {} -> {}: {}", ours, theirs, e),
        }
    }
}

/// Whether `port_name` has at least one connection, seen from `client`
fn is_connected(client: &Client, port_name: &str) -> bool {
    client
        .port_by_name(port_name)
        .and_then(|port| port.connected_count().ok())
        .is_some_and(|count| count > 0)
}

impl Backend for JackBackend {
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
        match mem::replace(&mut self.state, ClientState::Closed) {
            ClientState::Inactive { client, processor } => {
                self.link.restart_clock();
                let active = client
                    .activate_async(JackNotifications, processor)
                    .map_err(|e| FeederError::Stream(format!("JACK activation failed: {}", e)))?;
                connect_outputs(active.as_client(), &self.port_names);
                log::info!("JACK client '{}' activated", self.client_name);
                self.state = ClientState::Active(active);
                Ok(())
            }
            active @ ClientState::Active(_) => {
                self.state = active;
                Ok(())
            }
            ClientState::Closed => Err(FeederError::InvalidState {
                operation: "start",
                state: "closed".to_string(),
            }),
        }
    }

    fn stop(&mut self) -> FeederResult<()> {
        match mem::replace(&mut self.state, ClientState::Closed) {
            ClientState::Active(active) => {
                let (client, _notifications, processor) = active
                    .deactivate()
                    .map_err(|e| FeederError::Stream(format!("JACK deactivation failed: {}", e)))?;
                log::info!("JACK client '{}' deactivated", self.client_name);
                self.state = ClientState::Inactive { client, processor };
                Ok(())
            }
            inactive @ ClientState::Inactive { .. } => {
                self.state = inactive;
                Ok(())
            }
            ClientState::Closed => Err(FeederError::InvalidState {
                operation: "stop",
                state: "closed".to_string(),
            }),
        }
    }

    fn set_muted(&mut self, muted: bool) {
        self.link.set_muted(muted);
    }

    /// Poll on a helper thread until our first port is connected
    ///
    /// The callback runs exactly once: on connection, or after the ready
    /// timeout with a warning.
    fn wait_until_ready(&mut self, callback: ReadyCallback) {
        let Some(first_port) = self.port_names.first().cloned() else {
            callback();
            return;
        };

        let callback = Arc::new(Mutex::new(Some(callback)));
        let fire = {
            let callback = Arc::clone(&callback);
            move || {
                let taken = callback.lock().ok().and_then(|mut slot| slot.take());
                if let Some(callback) = taken {
                    callback();
                }
            }
        };

        let watcher_name = format!("{}_ready", self.client_name);
        let timeout = self.ready_timeout;
        let interval = self.ready_poll_interval;
        let attempts = (timeout.as_millis() / interval.as_millis()).max(1);

        let spawned = thread::Builder::new()
            .name("feeder-jack-ready".to_string())
            .spawn({
                let fire = fire.clone();
                move || {
                    let client = match Client::new(&watcher_name, ClientOptions::NO_START_SERVER) {
                        Ok((client, _)) => client,
                        Err(e) => {
                            log::warn!("JACK ready check unavailable: {}", e);
                            fire();
                            return;
                        }
                    };

                    for _ in 0..attempts {
                        if is_connected(&client, &first_port) {
                            log::debug!("JACK output {} connected", first_port);
                            fire();
                            return;
                        }
                        thread::sleep(interval);
                    }

                    log::warn!(
                        "JACK output {} still unconnected after {:?}, continuing anyway",
                        first_port,
                        timeout
                    );
                    fire();
                }
            });

        if let Err(e) = spawned {
            log::error!("Failed to spawn JACK ready watcher: {}", e);
            fire();
        }
    }

    fn close(&mut self) {
        match mem::replace(&mut self.state, ClientState::Closed) {
            ClientState::Active(active) => {
                if let Err(e) = active.deactivate() {
                    log::warn!("JACK deactivation on close failed: {}", e);
                }
                log::info!("JACK client '{}' closed", self.client_name);
            }
            ClientState::Inactive { .. } => {
                log::info!("JACK client '{}' closed", self.client_name);
            }
            ClientState::Closed => {}
        }
    }
}
