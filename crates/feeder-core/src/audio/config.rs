//! Feeder configuration
//!
//! Defines which output mechanisms may be used, in what order, and how the
//! chosen backend is sized.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::queue::DEFAULT_QUEUE_CAPACITY;
use crate::types::{DEFAULT_FRAME_SIZE, MAX_FRAME_SIZE, MIN_FRAME_SIZE};

/// Default JACK client name
pub const DEFAULT_CLIENT_NAME: &str = "feeder";

/// Default upper bound on output channels negotiated with a backend
pub const DEFAULT_MAX_CHANNELS: usize = 2;

/// Default ready handshake timeout (100 polls of 20ms)
pub const DEFAULT_READY_TIMEOUT_MS: u64 = 2000;

/// Default interval between ready handshake polls
pub const DEFAULT_READY_POLL_INTERVAL_MS: u64 = 20;

/// Output mechanism family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    /// Platform audio through cpal (ALSA, CoreAudio, WASAPI, ...)
    Native,
    /// Audio server fallback (JACK on Linux)
    Jack,
    /// Silent sink, always available
    Stub,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Native => write!(f, "native"),
            BackendKind::Jack => write!(f, "JACK"),
            BackendKind::Stub => write!(f, "stub"),
        }
    }
}

/// Frames rendered per callback period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BufferSize {
    /// [`DEFAULT_FRAME_SIZE`] frames
    #[default]
    Default,
    /// A specific size, clamped to `[MIN_FRAME_SIZE, MAX_FRAME_SIZE]`
    Fixed(usize),
}

impl BufferSize {
    /// Frame count after defaulting and clamping
    pub fn frames(&self) -> usize {
        match self {
            BufferSize::Default => DEFAULT_FRAME_SIZE,
            BufferSize::Fixed(frames) => (*frames).clamp(MIN_FRAME_SIZE, MAX_FRAME_SIZE),
        }
    }

    /// Latency of one period in milliseconds at `sample_rate`
    pub fn latency_ms(&self, sample_rate: u32) -> f32 {
        self.frames() as f32 / sample_rate as f32 * 1000.0
    }
}

/// Output device identifier
///
/// The host names the cpal host (e.g. "Alsa", "CoreAudio"); `None` means the
/// default host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    pub fn with_host(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: Some(host.into()),
        }
    }

    /// Display label including the host when known
    pub fn display_label(&self) -> String {
        match &self.host {
            Some(host) => format!("[{}] {}", host, self.name),
            None => self.name.clone(),
        }
    }
}

/// Options for a [`Feeder`](crate::Feeder)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeederOptions {
    /// Output mechanisms to consider, in priority order
    pub backends: Vec<BackendKind>,

    /// Frames per callback period
    pub buffer_size: BufferSize,

    /// Preferred native output device (None = system default)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceId>,

    /// Client name registered with an audio server
    pub client_name: String,

    /// Upper bound on output channels
    pub max_channels: usize,

    /// How long `wait_until_ready` polls before giving up
    pub ready_timeout_ms: u64,

    pub ready_poll_interval_ms: u64,

    /// Spent chunks the callback can hand back for freeing off the audio
    /// thread; never limits how much audio can be queued
    pub queue_capacity: usize,
}

impl Default for FeederOptions {
    fn default() -> Self {
        Self {
            backends: vec![BackendKind::Native, BackendKind::Jack, BackendKind::Stub],
            buffer_size: BufferSize::Default,
            device: None,
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            max_channels: DEFAULT_MAX_CHANNELS,
            ready_timeout_ms: DEFAULT_READY_TIMEOUT_MS,
            ready_poll_interval_ms: DEFAULT_READY_POLL_INTERVAL_MS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl FeederOptions {
    pub fn with_backends(mut self, backends: impl Into<Vec<BackendKind>>) -> Self {
        self.backends = backends.into();
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: BufferSize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_device(mut self, device: DeviceId) -> Self {
        self.device = Some(device);
        self
    }

    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    pub fn with_max_channels(mut self, max_channels: usize) -> Self {
        self.max_channels = max_channels;
        self
    }

    pub fn with_ready_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.ready_timeout_ms = timeout_ms;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Backend preference with duplicates removed and the stub guaranteed last
    pub fn backend_order(&self) -> Vec<BackendKind> {
        let mut order = Vec::with_capacity(self.backends.len() + 1);
        for kind in &self.backends {
            if *kind != BackendKind::Stub && !order.contains(kind) {
                order.push(*kind);
            }
        }
        order.push(BackendKind::Stub);
        order
    }

    /// Frames per callback after clamping
    #[inline]
    pub fn frame_size(&self) -> usize {
        self.buffer_size.frames()
    }

    /// Channel bound, never below one
    #[inline]
    pub fn channel_limit(&self) -> usize {
        self.max_channels.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_order_appends_stub() {
        let options = FeederOptions::default().with_backends([BackendKind::Jack]);
        assert_eq!(options.backend_order(), vec![BackendKind::Jack, BackendKind::Stub]);

        let options = FeederOptions::default().with_backends([
            BackendKind::Stub,
            BackendKind::Native,
            BackendKind::Native,
        ]);
        assert_eq!(options.backend_order(), vec![BackendKind::Native, BackendKind::Stub]);
    }

    #[test]
    fn test_buffer_size_clamps() {
        assert_eq!(BufferSize::Default.frames(), DEFAULT_FRAME_SIZE);
        assert_eq!(BufferSize::Fixed(1).frames(), MIN_FRAME_SIZE);
        assert_eq!(BufferSize::Fixed(1 << 20).frames(), MAX_FRAME_SIZE);
        assert_eq!(BufferSize::Fixed(1024).frames(), 1024);
        assert!((BufferSize::Fixed(480).latency_ms(48000) - 10.0).abs() < 0.001);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let options: FeederOptions = serde_yaml::from_str("client_name: radio\n").unwrap();
        assert_eq!(options.client_name, "radio");
        assert_eq!(options.max_channels, DEFAULT_MAX_CHANNELS);
        assert_eq!(options.backends.len(), 3);
    }

    #[test]
    fn test_device_label() {
        assert_eq!(DeviceId::new("Speakers").display_label(), "Speakers");
        assert_eq!(
            DeviceId::with_host("hw:0", "Alsa").display_label(),
            "[Alsa] hw:0"
        );
    }
}
