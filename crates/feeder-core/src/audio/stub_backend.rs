//! Silent sink backend
//!
//! Always available. Reports the producer's own format as native so no
//! conversion happens, validates what it is given and throws it away.
//! Playback never advances: the state stays all zeros.

use crate::clock::PlaybackState;
use crate::types::{SampleChunk, DEFAULT_FRAME_SIZE};

use super::backend::{Backend, BackendCandidate, BackendRequest, ReadyCallback};
use super::config::BackendKind;
use super::error::{FeederError, FeederResult};

pub fn candidate() -> BackendCandidate {
    BackendCandidate {
        kind: BackendKind::Stub,
        probe: || true,
        construct,
    }
}

pub(crate) fn construct(request: BackendRequest) -> FeederResult<Box<dyn Backend>> {
    Ok(Box::new(StubBackend::new(request.channels, request.rate)?))
}

#[derive(Debug)]
pub struct StubBackend {
    channels: usize,
    rate: u32,
    muted: bool,
    running: bool,
}

impl StubBackend {
    pub fn new(channels: usize, rate: u32) -> FeederResult<Self> {
        if channels == 0 {
            return Err(FeederError::InvalidChannelCount(channels));
        }
        if rate == 0 {
            return Err(FeederError::InvalidSampleRate(rate));
        }
        log::debug!("Stub backend: discarding {} channels @ {}Hz", channels, rate);
        Ok(Self {
            channels,
            rate,
            muted: false,
            running: false,
        })
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl Backend for StubBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Stub
    }

    fn sample_rate(&self) -> u32 {
        self.rate
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn frame_size(&self) -> usize {
        DEFAULT_FRAME_SIZE
    }

    fn append(&mut self, chunk: SampleChunk) -> FeederResult<()> {
        chunk.validate(self.channels)
    }

    fn playback_state(&self) -> PlaybackState {
        PlaybackState::default()
    }

    fn start(&mut self) -> FeederResult<()> {
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> FeederResult<()> {
        self.running = false;
        Ok(())
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn wait_until_ready(&mut self, callback: ReadyCallback) {
        callback();
    }

    fn close(&mut self) {
        self.running = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_stub_accepts_and_discards() {
        let mut stub = StubBackend::new(2, 22050).unwrap();
        stub.append(SampleChunk::silence(2, 512)).unwrap();
        stub.start().unwrap();
        assert!(stub.is_running());
        assert_eq!(stub.playback_state(), PlaybackState::default());
    }

    #[test]
    fn test_stub_still_validates() {
        let mut stub = StubBackend::new(2, 22050).unwrap();
        assert!(matches!(
            stub.append(SampleChunk::silence(1, 512)),
            Err(FeederError::InvalidBuffer { .. })
        ));
    }

    #[test]
    fn test_stub_ready_is_immediate() {
        let mut stub = StubBackend::new(1, 8000).unwrap();
        let called = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&called);
        stub.wait_until_ready(Box::new(move || flag.store(true, Ordering::SeqCst)));
        assert!(called.load(Ordering::SeqCst));
    }
}
