//! Output backends for the feeder
//!
//! Provides one interface over several ways of reaching a speaker:
//! - **Native**: cpal (ALSA, CoreAudio, WASAPI, ...)
//! - **JACK**: server client on Linux (with the `jack-backend` feature)
//! - **Stub**: silent sink so a feeder can always be initialised
//!
//! # Architecture
//!
//! All device backends follow the same lock-free design:
//!
//! - **Producer thread**: appends chunks through a split queue (never blocks)
//! - **Audio thread**: owns the [`Renderer`] exclusively, one frame per period
//! - **Atomics**: playback accounting is read back without locks
//! - **Watcher thread**: turns the render path's starvation signal into a
//!   call to the user's hook
//!
//! # Example Usage
//!
//! ```ignore
//! use feeder_core::audio::{default_candidates, select_backend, BackendRequest, FeederOptions};
//!
//! let request = BackendRequest::new(2, 44100, FeederOptions::default());
//! let mut backend = select_backend(&default_candidates(), &request.options.backend_order(), request.clone())?;
//! backend.start()?;
//! ```

mod backend;
mod config;
mod context;
mod cpal_backend;
mod device;
mod error;
mod render;
mod stub_backend;

#[cfg(all(target_os = "linux", feature = "jack-backend"))]
mod jack_backend;

pub use backend::{
    default_candidates, init_shared_context, is_output_supported, is_output_supported_with,
    select_backend, Backend, BackendCandidate, BackendRequest, ReadyCallback,
};
pub use config::{
    BackendKind, BufferSize, DeviceId, FeederOptions, DEFAULT_CLIENT_NAME, DEFAULT_MAX_CHANNELS,
    DEFAULT_READY_POLL_INTERVAL_MS, DEFAULT_READY_TIMEOUT_MS,
};
pub use context::{shared_context, SharedOutputContext};
pub use cpal_backend::CpalBackend;
pub use device::{find_device_by_id, get_output_devices, OutputDevice};
pub use error::{FeederError, FeederResult};
pub use render::{Renderer, StarvationSignal};
pub use stub_backend::StubBackend;

#[cfg(all(target_os = "linux", feature = "jack-backend"))]
pub use jack_backend::JackBackend;
