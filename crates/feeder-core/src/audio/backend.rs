//! Output backend abstraction and fallback selection
//!
//! A backend is one way of getting samples to a speaker:
//! - **Native**: the platform audio API through cpal
//! - **JACK**: an audio server client (Linux, `jack-backend` feature)
//! - **Stub**: a silent sink that accepts and discards everything
//!
//! Device backends share the same lock-free plumbing ([`StreamLink`]): the
//! producer thread appends into a split queue, the device callback owns a
//! [`Renderer`], and playback accounting is read back through atomics.
//!
//! Selection walks a preference list and takes the first backend whose
//! support probe succeeds. A failed probe just moves on; a backend that
//! probes fine and then fails to construct is a hard error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::clock::{MonotonicTime, PlaybackClock, PlaybackState, TimeSource};
use crate::queue::{queue_channel, QueueProducer};
use crate::types::SampleChunk;

use super::config::{BackendKind, FeederOptions};
use super::error::FeederResult;
use super::render::{Renderer, StarvationSignal};
use super::{context, cpal_backend, stub_backend};

/// Invoked once a backend can accept and play data
pub type ReadyCallback = Box<dyn FnOnce() + Send + 'static>;

/// A constructed output mechanism
///
/// Implementations need not be `Send`: device streams are usually tied to
/// the thread that created them.
pub trait Backend {
    fn kind(&self) -> BackendKind;

    /// Native sample rate; chunks passed to [`Backend::append`] must already
    /// be at this rate
    fn sample_rate(&self) -> u32;

    /// Native channel count
    fn channels(&self) -> usize;

    /// Samples per channel rendered per callback period
    fn frame_size(&self) -> usize;

    /// Queue a chunk already converted to the native format
    fn append(&mut self, chunk: SampleChunk) -> FeederResult<()>;

    fn playback_state(&self) -> PlaybackState;

    fn start(&mut self) -> FeederResult<()>;

    fn stop(&mut self) -> FeederResult<()>;

    fn set_muted(&mut self, muted: bool);

    /// Call `callback` exactly once, when the backend is ready or has given
    /// up waiting
    fn wait_until_ready(&mut self, callback: ReadyCallback);

    /// Release device resources; the backend is unusable afterwards
    fn close(&mut self);
}

/// Everything a backend needs to build itself
#[derive(Debug, Clone)]
pub struct BackendRequest {
    /// Producer channel count
    pub channels: usize,
    /// Producer sample rate
    pub rate: u32,
    pub options: FeederOptions,
    /// Where the render path reports an under-filled queue
    pub starved: StarvationSignal,
}

impl BackendRequest {
    pub fn new(channels: usize, rate: u32, options: FeederOptions) -> Self {
        Self {
            channels,
            rate,
            options,
            starved: StarvationSignal::Ignore,
        }
    }

    pub fn with_starvation(mut self, starved: StarvationSignal) -> Self {
        self.starved = starved;
        self
    }
}

/// One entry in the fallback chain
#[derive(Clone, Copy)]
pub struct BackendCandidate {
    pub kind: BackendKind,
    /// Cheap support check, must not fail loudly
    pub probe: fn() -> bool,
    pub construct: fn(BackendRequest) -> FeederResult<Box<dyn Backend>>,
}

impl std::fmt::Debug for BackendCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendCandidate")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Built-in backends, most capable first
pub fn default_candidates() -> Vec<BackendCandidate> {
    let mut candidates = vec![cpal_backend::candidate()];
    #[cfg(all(target_os = "linux", feature = "jack-backend"))]
    candidates.push(super::jack_backend::candidate());
    candidates.push(stub_backend::candidate());
    candidates
}

/// Construct the first supported backend in `preference` order
///
/// Kinds without a matching candidate are skipped. The stub is always
/// tried last, falling back to the built-in one when `candidates` has none.
pub fn select_backend(
    candidates: &[BackendCandidate],
    preference: &[BackendKind],
    request: BackendRequest,
) -> FeederResult<Box<dyn Backend>> {
    let mut order: Vec<BackendKind> = preference
        .iter()
        .copied()
        .filter(|kind| *kind != BackendKind::Stub)
        .collect();
    order.push(BackendKind::Stub);

    for kind in order {
        let Some(candidate) = candidates.iter().find(|c| c.kind == kind) else {
            log::debug!("No {} backend compiled in, skipping", kind);
            continue;
        };

        if !(candidate.probe)() {
            log::info!("{} backend not supported here, trying next", kind);
            continue;
        }

        return match (candidate.construct)(request.clone()) {
            Ok(backend) => {
                log::info!(
                    "Selected {} backend: {}Hz, {} channels, {} frames per period",
                    kind,
                    backend.sample_rate(),
                    backend.channels(),
                    backend.frame_size()
                );
                Ok(backend)
            }
            Err(e) => {
                log::error!("{}", e);
                Err(e)
            }
        };
    }

    log::info!("Falling back to built-in stub backend");
    stub_backend::construct(request)
}

/// True when a real (non-stub) output mechanism is available
pub fn is_output_supported() -> bool {
    is_output_supported_with(&default_candidates())
}

/// [`is_output_supported`] over a custom candidate list
pub fn is_output_supported_with(candidates: &[BackendCandidate]) -> bool {
    candidates
        .iter()
        .filter(|c| c.kind != BackendKind::Stub)
        .any(|c| (c.probe)())
}

/// Prime the process-wide output context ahead of the first feeder
///
/// Returns whether a native output device was found.
pub fn init_shared_context() -> bool {
    context::init_shared_context()
}

/// Producer-side half of a device stream
///
/// Holds the queue producer, the playback clock and the mute flag shared
/// with the [`Renderer`] running inside the device callback.
pub(crate) struct StreamLink {
    producer: QueueProducer,
    clock: Arc<PlaybackClock>,
    muted: Arc<AtomicBool>,
    time: MonotonicTime,
}

impl StreamLink {
    /// Create the link and the renderer to move into the device callback
    pub(crate) fn new(
        channels: usize,
        rate: u32,
        frame_size: usize,
        request: &BackendRequest,
    ) -> FeederResult<(Self, Renderer)> {
        let (producer, consumer) = queue_channel(channels, request.options.queue_capacity)?;
        let clock = Arc::new(PlaybackClock::new(rate, frame_size));
        let muted = Arc::new(AtomicBool::new(false));
        let renderer = Renderer::new(
            consumer,
            Arc::clone(&clock),
            Arc::clone(&muted),
            request.starved.clone(),
        );

        let link = Self {
            producer,
            clock,
            muted,
            time: MonotonicTime::new(),
        };
        Ok((link, renderer))
    }

    /// Clock shared with the callback, for deadline timestamps
    pub(crate) fn time(&self) -> MonotonicTime {
        self.time
    }

    pub(crate) fn append(&mut self, chunk: SampleChunk) -> FeederResult<()> {
        self.producer.append(chunk)
    }

    pub(crate) fn playback_state(&self) -> PlaybackState {
        self.clock
            .state(self.time.now(), self.producer.sample_count())
    }

    pub(crate) fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    /// Re-anchor the expected callback deadline before output (re)starts
    pub(crate) fn restart_clock(&self) {
        self.clock.reset_tail(self.time.now());
    }
}
