//! The feeder façade
//!
//! Owns the lifecycle of one output stream:
//!
//! ```text
//! Uninitialized ──init──► Initialized ──start──► Running ◄──start/stop──► Stopped
//!        │                     │                    │                        │
//!        └─────────────────────┴──────close─────────┴────────────────────────┴──► Closed
//! ```
//!
//! Producers push planar chunks at their own rate and channel count; the
//! feeder converts them to the backend's native format and queues them for
//! the device callback. When the callback runs short it signals a watcher
//! thread, which calls the `on_starved` hook so the producer can top up.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam::channel::Receiver;

use crate::audio::{
    self, default_candidates, select_backend, Backend, BackendCandidate, BackendKind,
    BackendRequest, FeederError, FeederOptions, FeederResult, StarvationSignal,
};
use crate::clock::PlaybackState;
use crate::resample::resample;
use crate::types::SampleChunk;

/// Lifecycle state of a [`Feeder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeederState {
    Uninitialized,
    Initialized,
    Running,
    Stopped,
    Closed,
}

impl fmt::Display for FeederState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeederState::Uninitialized => "uninitialized",
            FeederState::Initialized => "initialized",
            FeederState::Running => "running",
            FeederState::Stopped => "stopped",
            FeederState::Closed => "closed",
        };
        f.write_str(name)
    }
}

type StarvedHook = Arc<dyn Fn() + Send + Sync + 'static>;

/// Hook slot shared with the watcher thread; replaceable at any time
type HookSlot = Arc<Mutex<Option<StarvedHook>>>;

/// Streams audio chunks to the best available output
///
/// Not `Send`: device streams are bound to the thread that opened them.
/// Move the chunks, not the feeder.
pub struct Feeder {
    options: FeederOptions,
    candidates: Vec<BackendCandidate>,
    state: FeederState,
    /// Producer-side format, zero until init
    channels: usize,
    rate: u32,
    muted: bool,
    backend: Option<Box<dyn Backend>>,
    on_starved: HookSlot,
    watcher: Option<JoinHandle<()>>,
}

impl Feeder {
    pub fn new(options: FeederOptions) -> Self {
        Self::with_candidates(options, default_candidates())
    }

    /// Feeder choosing among custom backends
    ///
    /// The options' backend preference still decides the order.
    pub fn with_candidates(options: FeederOptions, candidates: Vec<BackendCandidate>) -> Self {
        Self {
            options,
            candidates,
            state: FeederState::Uninitialized,
            channels: 0,
            rate: 0,
            muted: false,
            backend: None,
            on_starved: Arc::new(Mutex::new(None)),
            watcher: None,
        }
    }

    /// Whether any real output mechanism is available, without building one
    ///
    /// The stub doesn't count, even though [`Feeder::init`] falls back to it.
    pub fn is_supported() -> bool {
        audio::is_output_supported()
    }

    /// Resolve the process-wide output context ahead of time
    pub fn init_shared_context() -> bool {
        audio::init_shared_context()
    }

    /// Select and construct a backend for `channels` at `rate`
    pub fn init(&mut self, channels: usize, rate: u32) -> FeederResult<()> {
        if self.state != FeederState::Uninitialized {
            return Err(self.invalid_state("init"));
        }
        if channels == 0 {
            return Err(FeederError::InvalidChannelCount(channels));
        }
        if rate == 0 {
            return Err(FeederError::InvalidSampleRate(rate));
        }

        let (signal, starved_rx) = StarvationSignal::channel();
        let request = BackendRequest::new(channels, rate, self.options.clone())
            .with_starvation(signal);
        let mut backend = select_backend(&self.candidates, &self.options.backend_order(), request)?;
        backend.set_muted(self.muted);

        if backend.sample_rate() != rate || backend.channels() != channels {
            log::info!(
                "Converting {}ch @ {}Hz to {}ch @ {}Hz",
                channels,
                rate,
                backend.channels(),
                backend.sample_rate()
            );
        }

        self.watcher = spawn_starvation_watcher(starved_rx, Arc::clone(&self.on_starved));
        self.channels = channels;
        self.rate = rate;
        self.backend = Some(backend);
        self.state = FeederState::Initialized;
        Ok(())
    }

    /// Queue a chunk in the producer's format
    ///
    /// Fails with `InvalidBuffer` if the chunk doesn't have the init channel
    /// count or its channels differ in length.
    pub fn buffer_data(&mut self, chunk: SampleChunk) -> FeederResult<()> {
        let (channels, rate) = (self.channels, self.rate);
        let backend = self.backend_mut("buffer data")?;
        chunk.validate(channels)?;
        let converted = resample(
            chunk,
            rate,
            channels,
            backend.sample_rate(),
            backend.channels(),
        );
        backend.append(converted)
    }

    /// Playback accounting; all zeros before init
    pub fn playback_state(&self) -> FeederResult<PlaybackState> {
        if self.state == FeederState::Closed {
            return Err(self.invalid_state("read playback state"));
        }
        Ok(self
            .backend
            .as_ref()
            .map_or_else(PlaybackState::default, |backend| backend.playback_state()))
    }

    pub fn mute(&mut self) -> FeederResult<()> {
        self.set_muted(true, "mute")
    }

    pub fn unmute(&mut self) -> FeederResult<()> {
        self.set_muted(false, "unmute")
    }

    #[inline]
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Start or resume output; no-op while already running
    pub fn start(&mut self) -> FeederResult<()> {
        let state = self.state;
        let backend = self.backend_mut("start")?;
        if state == FeederState::Running {
            return Ok(());
        }
        backend.start()?;
        self.state = FeederState::Running;
        Ok(())
    }

    /// Pause output, keeping queued audio for a later start
    pub fn stop(&mut self) -> FeederResult<()> {
        let state = self.state;
        let backend = self.backend_mut("stop")?;
        if state != FeederState::Running {
            return Ok(());
        }
        backend.stop()?;
        self.state = FeederState::Stopped;
        Ok(())
    }

    /// Call `callback` once the backend can play
    ///
    /// May run synchronously or later on another thread, depending on the
    /// backend; either way it runs exactly once.
    pub fn wait_until_ready(&mut self, callback: impl FnOnce() + Send + 'static) -> FeederResult<()> {
        let backend = self.backend_mut("wait until ready")?;
        backend.wait_until_ready(Box::new(callback));
        Ok(())
    }

    /// Set the hook run when the output runs short of data
    ///
    /// Runs on a watcher thread, never on the audio thread. Signals that
    /// arrive while the hook is still running are coalesced.
    pub fn set_on_starved(&mut self, hook: impl Fn() + Send + Sync + 'static) -> FeederResult<()> {
        self.replace_hook(Some(Arc::new(hook)), "set on_starved")
    }

    pub fn clear_on_starved(&mut self) -> FeederResult<()> {
        self.replace_hook(None, "clear on_starved")
    }

    /// Stop output and release the backend; a second close is a no-op
    pub fn close(&mut self) {
        if self.state == FeederState::Closed {
            return;
        }

        if let Some(mut backend) = self.backend.take() {
            if self.state == FeederState::Running {
                if let Err(e) = backend.stop() {
                    log::warn!("Failed to stop {} backend on close: {}", backend.kind(), e);
                }
            }
            backend.close();
            log::info!("Feeder closed ({} backend released)", backend.kind());
        }

        // The watcher exits by itself once the backend's signal sender is
        // gone; a hook still running is left to finish detached
        if let Some(watcher) = self.watcher.take() {
            if watcher.is_finished() && watcher.join().is_err() {
                log::warn!("on_starved hook panicked");
            }
        }
        self.state = FeederState::Closed;
    }

    #[inline]
    pub fn state(&self) -> FeederState {
        self.state
    }

    /// Producer channel count given to init (0 before)
    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Producer sample rate given to init (0 before)
    #[inline]
    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn options(&self) -> &FeederOptions {
        &self.options
    }

    pub fn backend_kind(&self) -> Option<BackendKind> {
        self.backend.as_ref().map(|b| b.kind())
    }

    pub fn native_rate(&self) -> Option<u32> {
        self.backend.as_ref().map(|b| b.sample_rate())
    }

    pub fn native_channels(&self) -> Option<usize> {
        self.backend.as_ref().map(|b| b.channels())
    }

    fn backend_mut(&mut self, operation: &'static str) -> FeederResult<&mut Box<dyn Backend>> {
        let state = self.state;
        self.backend.as_mut().ok_or(FeederError::InvalidState {
            operation,
            state: state.to_string(),
        })
    }

    fn invalid_state(&self, operation: &'static str) -> FeederError {
        FeederError::InvalidState {
            operation,
            state: self.state.to_string(),
        }
    }

    fn set_muted(&mut self, muted: bool, operation: &'static str) -> FeederResult<()> {
        if self.state == FeederState::Closed {
            return Err(self.invalid_state(operation));
        }
        self.muted = muted;
        if let Some(backend) = self.backend.as_mut() {
            backend.set_muted(muted);
        }
        Ok(())
    }

    fn replace_hook(&mut self, hook: Option<StarvedHook>, operation: &'static str) -> FeederResult<()> {
        if self.state == FeederState::Closed {
            return Err(self.invalid_state(operation));
        }
        match self.on_starved.lock() {
            Ok(mut slot) => *slot = hook,
            Err(poisoned) => *poisoned.into_inner() = hook,
        }
        Ok(())
    }
}

impl Default for Feeder {
    fn default() -> Self {
        Self::new(FeederOptions::default())
    }
}

impl Drop for Feeder {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Feeder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Feeder")
            .field("state", &self.state)
            .field("channels", &self.channels)
            .field("rate", &self.rate)
            .field("muted", &self.muted)
            .field("backend", &self.backend_kind())
            .finish()
    }
}

/// Run the starvation hook off the audio thread
///
/// Exits when every sender (held by the backend's renderer) is dropped.
fn spawn_starvation_watcher(signals: Receiver<()>, hook: HookSlot) -> Option<JoinHandle<()>> {
    let spawned = thread::Builder::new()
        .name("feeder-starved".to_string())
        .spawn(move || {
            log::debug!("Starvation watcher started");
            while signals.recv().is_ok() {
                // Clone out so the hook runs without holding the lock
                let current = hook.lock().ok().and_then(|slot| slot.clone());
                if let Some(hook) = current {
                    hook();
                }
            }
            log::debug!("Starvation watcher stopped");
        });

    match spawned {
        Ok(handle) => Some(handle),
        Err(e) => {
            log::error!("Failed to spawn starvation watcher, on_starved disabled: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::StubBackend;

    fn stub_only() -> Feeder {
        fn construct(request: BackendRequest) -> FeederResult<Box<dyn Backend>> {
            Ok(Box::new(StubBackend::new(request.channels, request.rate)?))
        }
        Feeder::with_candidates(
            FeederOptions::default(),
            vec![BackendCandidate {
                kind: BackendKind::Stub,
                probe: || true,
                construct,
            }],
        )
    }

    #[test]
    fn test_state_display() {
        assert_eq!(FeederState::Uninitialized.to_string(), "uninitialized");
        assert_eq!(FeederState::Running.to_string(), "running");
    }

    #[test]
    fn test_operations_before_init_fail() {
        let mut feeder = stub_only();
        assert!(matches!(
            feeder.buffer_data(SampleChunk::silence(1, 16)),
            Err(FeederError::InvalidState { operation: "buffer data", .. })
        ));
        assert!(matches!(feeder.start(), Err(FeederError::InvalidState { .. })));
        assert!(matches!(feeder.stop(), Err(FeederError::InvalidState { .. })));
        assert!(matches!(
            feeder.wait_until_ready(|| {}),
            Err(FeederError::InvalidState { .. })
        ));
        assert_eq!(feeder.playback_state(), Ok(PlaybackState::default()));
    }

    #[test]
    fn test_init_arguments_validated() {
        let mut feeder = stub_only();
        assert_eq!(feeder.init(0, 44100), Err(FeederError::InvalidChannelCount(0)));
        assert_eq!(feeder.init(2, 0), Err(FeederError::InvalidSampleRate(0)));
        assert_eq!(feeder.state(), FeederState::Uninitialized);

        feeder.init(2, 44100).unwrap();
        assert!(matches!(feeder.init(2, 44100), Err(FeederError::InvalidState { operation: "init", .. })));
    }

    #[test]
    fn test_start_stop_transitions() {
        let mut feeder = stub_only();
        feeder.init(1, 22050).unwrap();
        assert_eq!(feeder.state(), FeederState::Initialized);

        feeder.stop().unwrap();
        assert_eq!(feeder.state(), FeederState::Initialized);

        feeder.start().unwrap();
        feeder.start().unwrap();
        assert_eq!(feeder.state(), FeederState::Running);

        feeder.stop().unwrap();
        feeder.stop().unwrap();
        assert_eq!(feeder.state(), FeederState::Stopped);

        feeder.start().unwrap();
        assert_eq!(feeder.state(), FeederState::Running);
    }

    #[test]
    fn test_mute_before_init_is_remembered() {
        let mut feeder = stub_only();
        feeder.mute().unwrap();
        feeder.init(1, 8000).unwrap();
        assert!(feeder.is_muted());
        feeder.unmute().unwrap();
        assert!(!feeder.is_muted());
    }

    #[test]
    fn test_close_is_terminal() {
        let mut feeder = stub_only();
        feeder.init(2, 48000).unwrap();
        feeder.start().unwrap();
        feeder.close();
        feeder.close();

        assert_eq!(feeder.state(), FeederState::Closed);
        assert_eq!(feeder.backend_kind(), None);
        assert!(matches!(
            feeder.start(),
            Err(FeederError::InvalidState { ref state, .. }) if state == "closed"
        ));
        assert!(matches!(feeder.mute(), Err(FeederError::InvalidState { .. })));
        assert!(matches!(feeder.init(2, 48000), Err(FeederError::InvalidState { .. })));
        assert!(matches!(
            feeder.playback_state(),
            Err(FeederError::InvalidState { operation: "read playback state", .. })
        ));
        assert!(matches!(
            feeder.set_on_starved(|| {}),
            Err(FeederError::InvalidState { .. })
        ));
        assert!(matches!(feeder.clear_on_starved(), Err(FeederError::InvalidState { .. })));
    }

    #[test]
    fn test_hook_can_be_set_before_init() {
        let mut feeder = stub_only();
        feeder.set_on_starved(|| {}).unwrap();
        feeder.init(1, 8000).unwrap();
        feeder.clear_on_starved().unwrap();
    }
}
