//! Playback clock for one output stream
//!
//! Tracks how much audio has been handed to the device, how far behind
//! schedule the device's callbacks have run, and how many callback periods
//! had to be served as silence.
//!
//! All state lives in relaxed atomics: the real-time callback is the only
//! writer while the stream runs, and any thread can read a snapshot via
//! [`PlaybackClock::state`] without locking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Snapshot of a stream's playback accounting
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PlaybackState {
    /// Seconds of audio played so far (queued duration minus what is still
    /// waiting for physical output)
    pub playback_position: f64,
    /// Samples per channel buffered but not yet played, at the native rate
    pub samples_queued: usize,
    /// Callback periods served as silence because the queue ran short
    pub dropped: u64,
    /// Cumulative seconds by which callbacks ran later than expected
    pub delayed: f64,
}

/// A monotonic source of seconds shared by the callback and its readers
pub trait TimeSource: Send + Sync {
    fn now(&self) -> f64;
}

/// Seconds elapsed since construction, from [`Instant`]
#[derive(Debug, Clone, Copy)]
pub struct MonotonicTime {
    origin: Instant,
}

impl MonotonicTime {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicTime {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicTime {
    #[inline]
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Manually driven time, for tests and offline rendering
#[derive(Debug, Default)]
pub struct ManualTime {
    seconds: AtomicF64,
}

impl ManualTime {
    pub fn new(start: f64) -> Self {
        Self {
            seconds: AtomicF64::new(start),
        }
    }

    pub fn set(&self, seconds: f64) {
        self.seconds.store(seconds);
    }

    pub fn advance(&self, seconds: f64) {
        self.seconds.store(self.seconds.load() + seconds);
    }
}

impl TimeSource for ManualTime {
    fn now(&self) -> f64 {
        self.seconds.load()
    }
}

/// f64 stored as bits in an [`AtomicU64`]
///
/// Single-writer: load/store only, no read-modify-write.
#[derive(Debug, Default)]
struct AtomicF64(AtomicU64);

impl AtomicF64 {
    fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    #[inline]
    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Playback accounting for one output stream
#[derive(Debug)]
pub struct PlaybackClock {
    rate: u32,
    frame_size: usize,
    /// Seconds of audio ever handed to the device
    queued_time: AtomicF64,
    /// Expected deadline of the next callback: end of the last served frame
    tail: AtomicF64,
    delayed: AtomicF64,
    dropped: AtomicU64,
}

impl PlaybackClock {
    pub fn new(rate: u32, frame_size: usize) -> Self {
        Self {
            rate,
            frame_size,
            queued_time: AtomicF64::new(0.0),
            tail: AtomicF64::new(0.0),
            delayed: AtomicF64::new(0.0),
            dropped: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn rate(&self) -> u32 {
        self.rate
    }

    #[inline]
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Duration of one callback period in seconds
    #[inline]
    pub fn frame_duration(&self) -> f64 {
        self.frame_size as f64 / self.rate as f64
    }

    /// Re-anchor the expected deadline, called when output (re)starts
    pub fn reset_tail(&self, now: f64) {
        self.tail.store(now);
    }

    /// Compare a callback's deadline with the expected one
    ///
    /// Lateness is added to `delayed` and returned; early callbacks add nothing.
    #[inline]
    pub fn observe_deadline(&self, playback_time: f64) -> f64 {
        let expected = self.tail.load();
        if expected < playback_time {
            let late = playback_time - expected;
            self.delayed.store(self.delayed.load() + late);
            late
        } else {
            0.0
        }
    }

    /// Count a callback period served as silence
    ///
    /// The tail is left where it was: the silent frame is not playback.
    #[inline]
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Account for one full frame handed to the device at `playback_time`
    #[inline]
    pub fn advance(&self, playback_time: f64) {
        let duration = self.frame_duration();
        self.queued_time.store(self.queued_time.load() + duration);
        self.tail.store(playback_time + duration);
    }

    /// Seconds of already-served audio still waiting for physical output
    #[inline]
    pub fn time_awaiting_playback(&self, now: f64) -> f64 {
        (self.tail.load() - now).max(0.0)
    }

    /// Snapshot the accounting at time `now`
    ///
    /// `queued_samples` is the count still sitting in the sample queue; the
    /// samples already served but not yet audible are added on top.
    pub fn state(&self, now: f64, queued_samples: usize) -> PlaybackState {
        let awaiting = self.time_awaiting_playback(now);
        PlaybackState {
            playback_position: self.queued_time.load() - awaiting,
            samples_queued: queued_samples + (awaiting * self.rate as f64).floor() as usize,
            dropped: self.dropped(),
            delayed: self.delayed(),
        }
    }

    #[inline]
    pub fn queued_time(&self) -> f64 {
        self.queued_time.load()
    }

    #[inline]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn delayed(&self) -> f64 {
        self.delayed.load()
    }
}
