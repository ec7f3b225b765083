//! Real-time render path shared by all device backends
//!
//! Every callback period the device asks for `frame_size` samples per
//! channel. The [`Renderer`] serves them from the queue consumer:
//!
//! ```text
//! deadline ──► observe lateness ──► enough queued? ──yes──► shift frame
//!                                        │                   apply mute
//!                                        no                  advance clock
//!                                        │
//!                                  notify starvation
//!                                        │
//!                                  enough now? ──yes──► (shift as above)
//!                                        │
//!                                        no ──► silence, count drop
//! ```
//!
//! Nothing in here allocates, locks or blocks. Starvation is signalled with
//! a non-blocking `try_send`; the producer-facing hook runs on a watcher
//! thread owned by the [`Feeder`](crate::Feeder).
//!
//! Hosts whose period differs from `frame_size` (cpal may vary it between
//! callbacks) are served through a carry frame: whole frames are rendered
//! on demand and copied out piecewise, so the clock still ticks per frame.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam::channel::{bounded, Receiver, Sender};

use crate::clock::PlaybackClock;
use crate::queue::QueueConsumer;
use crate::types::Sample;

/// How the render path reports an under-filled queue
#[derive(Clone, Default)]
pub enum StarvationSignal {
    /// Nobody listens
    #[default]
    Ignore,
    /// Wake a watcher thread (bounded(1), coalescing)
    Channel(Sender<()>),
    /// Call a hook inline on the render thread
    ///
    /// Only suitable for offline rendering and tests: the hook runs with
    /// real-time constraints.
    Hook(Arc<dyn Fn() + Send + Sync>),
}

impl StarvationSignal {
    /// Coalescing signal plus the receiving end for a watcher thread
    pub fn channel() -> (Self, Receiver<()>) {
        let (tx, rx) = bounded(1);
        (Self::Channel(tx), rx)
    }

    pub fn hook(hook: impl Fn() + Send + Sync + 'static) -> Self {
        Self::Hook(Arc::new(hook))
    }

    #[inline]
    pub fn notify(&self) {
        match self {
            StarvationSignal::Ignore => {}
            // Full means a wakeup is already pending
            StarvationSignal::Channel(tx) => {
                let _ = tx.try_send(());
            }
            StarvationSignal::Hook(hook) => hook(),
        }
    }
}

impl fmt::Debug for StarvationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StarvationSignal::Ignore => write!(f, "Ignore"),
            StarvationSignal::Channel(_) => write!(f, "Channel"),
            StarvationSignal::Hook(_) => write!(f, "Hook"),
        }
    }
}

/// Callback-side state of one output stream
///
/// Owned exclusively by the device callback once the stream is built.
pub struct Renderer {
    consumer: QueueConsumer,
    clock: Arc<PlaybackClock>,
    muted: Arc<AtomicBool>,
    starved: StarvationSignal,
    /// Last rendered frame, one vector per channel (capacity `frame_size`)
    frame: Vec<Vec<Sample>>,
    /// Samples of `frame` already copied to the host
    cursor: usize,
}

impl Renderer {
    pub fn new(
        consumer: QueueConsumer,
        clock: Arc<PlaybackClock>,
        muted: Arc<AtomicBool>,
        starved: StarvationSignal,
    ) -> Self {
        let frame_size = clock.frame_size();
        let frame = (0..consumer.channels())
            .map(|_| vec![0.0; frame_size])
            .collect();
        Self {
            consumer,
            clock,
            muted,
            starved,
            frame,
            // Nothing carried: the first host request renders a fresh frame
            cursor: frame_size,
        }
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.frame.len()
    }

    #[inline]
    pub fn frame_size(&self) -> usize {
        self.clock.frame_size()
    }

    pub fn clock(&self) -> &Arc<PlaybackClock> {
        &self.clock
    }

    /// The most recently rendered frame
    pub fn frame(&self) -> &[Vec<Sample>] {
        &self.frame
    }

    /// Render one full frame due at `playback_time`
    ///
    /// Returns `true` when queued audio was served, `false` when the frame
    /// is silence because the queue stayed short after the starvation signal.
    pub fn render(&mut self, playback_time: f64) -> bool {
        let frame_size = self.clock.frame_size();
        self.cursor = 0;
        self.clock.observe_deadline(playback_time);

        if self.consumer.fill(frame_size) < frame_size {
            self.starved.notify();
            if self.consumer.fill(frame_size) < frame_size {
                for channel in &mut self.frame {
                    channel.clear();
                    channel.resize(frame_size, 0.0);
                }
                self.clock.record_dropped();
                return false;
            }
        }

        self.consumer.shift_into(&mut self.frame, frame_size);
        if self.muted.load(Ordering::Relaxed) {
            for channel in &mut self.frame {
                channel.fill(0.0);
            }
        }
        self.clock.advance(playback_time);
        true
    }

    /// Fill an interleaved host buffer of `output_channels` channels
    ///
    /// `playback_time` is when the first sample of `output` will be heard.
    /// Output channels beyond the renderer's are written as silence, as are
    /// trailing samples that don't make up a whole host frame.
    pub fn render_interleaved(
        &mut self,
        output: &mut [Sample],
        output_channels: usize,
        playback_time: f64,
    ) {
        if output_channels == 0 {
            return;
        }
        let frames = output.len() / output_channels;
        let frame_size = self.clock.frame_size();
        let rate = self.clock.rate() as f64;

        let mut written = 0;
        while written < frames {
            if self.cursor >= frame_size {
                self.render(playback_time + written as f64 / rate);
            }
            let take = (frame_size - self.cursor).min(frames - written);
            let out = &mut output[written * output_channels..(written + take) * output_channels];
            for (i, host_frame) in out.chunks_exact_mut(output_channels).enumerate() {
                for (c, sample) in host_frame.iter_mut().enumerate() {
                    *sample = match self.frame.get(c) {
                        Some(channel) => channel[self.cursor + i],
                        None => 0.0,
                    };
                }
            }
            self.cursor += take;
            written += take;
        }

        output[frames * output_channels..].fill(0.0);
    }

    /// Fill one host buffer per channel
    ///
    /// All buffers must have the same length. Buffers beyond the renderer's
    /// channel count are written as silence.
    pub fn render_planar(&mut self, outputs: &mut [&mut [Sample]], playback_time: f64) {
        let Some(frames) = outputs.first().map(|buffer| buffer.len()) else {
            return;
        };
        for buffer in outputs.iter_mut().skip(self.channels()) {
            buffer.fill(0.0);
        }
        self.render_with(frames, playback_time, |channel, offset, samples| {
            if let Some(buffer) = outputs.get_mut(channel) {
                buffer[offset..offset + samples.len()].copy_from_slice(samples);
            }
        });
    }

    /// Serve `frames` host samples per channel through `write`
    ///
    /// `write(channel, offset, samples)` receives contiguous runs; for hosts
    /// that hand out one buffer per channel on demand.
    pub fn render_with(
        &mut self,
        frames: usize,
        playback_time: f64,
        mut write: impl FnMut(usize, usize, &[Sample]),
    ) {
        let frame_size = self.clock.frame_size();
        let rate = self.clock.rate() as f64;

        let mut written = 0;
        while written < frames {
            if self.cursor >= frame_size {
                self.render(playback_time + written as f64 / rate);
            }
            let take = (frame_size - self.cursor).min(frames - written);
            for (c, channel) in self.frame.iter().enumerate() {
                write(c, written, &channel[self.cursor..self.cursor + take]);
            }
            self.cursor += take;
            written += take;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{queue_channel, QueueProducer};
    use crate::types::SampleChunk;
    use std::sync::Mutex;

    const EPSILON: f64 = 1e-9;

    fn setup(channels: usize, rate: u32, frame_size: usize) -> (QueueProducer, Renderer, Arc<AtomicBool>) {
        let (producer, consumer) = queue_channel(channels, 16).unwrap();
        let clock = Arc::new(PlaybackClock::new(rate, frame_size));
        let muted = Arc::new(AtomicBool::new(false));
        let renderer = Renderer::new(consumer, clock, Arc::clone(&muted), StarvationSignal::Ignore);
        (producer, renderer, muted)
    }

    fn ramp(len: usize) -> Vec<f32> {
        (1..=len).map(|i| i as f32).collect()
    }

    #[test]
    fn test_full_frame_served() {
        let (mut producer, mut renderer, _) = setup(2, 1000, 4);
        producer
            .append(SampleChunk::new(vec![ramp(6), vec![-1.0; 6]]))
            .unwrap();

        assert!(renderer.render(0.0));
        assert_eq!(renderer.frame()[0], vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(renderer.frame()[1], vec![-1.0; 4]);
        assert_eq!(producer.sample_count(), 2);

        let clock = renderer.clock();
        assert!((clock.queued_time() - 0.004).abs() < EPSILON);
        assert_eq!(clock.dropped(), 0);
    }

    #[test]
    fn test_short_queue_serves_silence_and_keeps_data() {
        let (mut producer, mut renderer, _) = setup(1, 1000, 4);
        producer.append(SampleChunk::new(vec![ramp(3)])).unwrap();

        assert!(!renderer.render(0.0));
        assert_eq!(renderer.frame()[0], vec![0.0; 4]);
        assert_eq!(renderer.clock().dropped(), 1);
        assert_eq!(renderer.clock().queued_time(), 0.0);
        // Partial data is never consumed by a dropped frame
        assert_eq!(producer.sample_count(), 3);
    }

    #[test]
    fn test_starvation_hook_can_refill_in_time() {
        let (producer, consumer) = queue_channel(1, 16).unwrap();
        let producer = Arc::new(Mutex::new(producer));
        let calls = Arc::new(Mutex::new(0usize));

        let hook = {
            let producer = Arc::clone(&producer);
            let calls = Arc::clone(&calls);
            StarvationSignal::hook(move || {
                *calls.lock().unwrap() += 1;
                producer
                    .lock()
                    .unwrap()
                    .append(SampleChunk::new(vec![vec![0.5; 4]]))
                    .unwrap();
            })
        };

        let clock = Arc::new(PlaybackClock::new(1000, 4));
        let mut renderer =
            Renderer::new(consumer, clock, Arc::new(AtomicBool::new(false)), hook);

        assert!(renderer.render(0.0));
        assert_eq!(*calls.lock().unwrap(), 1);
        assert_eq!(renderer.frame()[0], vec![0.5; 4]);
        assert_eq!(renderer.clock().dropped(), 0);
    }

    #[test]
    fn test_muted_frame_still_consumes_and_advances() {
        let (mut producer, mut renderer, muted) = setup(1, 1000, 4);
        producer.append(SampleChunk::new(vec![ramp(8)])).unwrap();
        muted.store(true, Ordering::Relaxed);

        assert!(renderer.render(0.0));
        assert_eq!(renderer.frame()[0], vec![0.0; 4]);
        assert_eq!(producer.sample_count(), 4);
        assert!((renderer.clock().queued_time() - 0.004).abs() < EPSILON);

        muted.store(false, Ordering::Relaxed);
        assert!(renderer.render(0.004));
        assert_eq!(renderer.frame()[0], vec![5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn test_late_callback_counts_delay() {
        let (mut producer, mut renderer, _) = setup(1, 1000, 4);
        producer.append(SampleChunk::new(vec![ramp(8)])).unwrap();
        renderer.clock().reset_tail(0.0);

        renderer.render(0.0);
        // Expected at 0.004, arrives at 0.010
        renderer.render(0.010);
        assert!((renderer.clock().delayed() - 0.006).abs() < EPSILON);
    }

    #[test]
    fn test_interleaved_host_period_smaller_than_frame() {
        let (mut producer, mut renderer, _) = setup(1, 1000, 4);
        producer.append(SampleChunk::new(vec![ramp(8)])).unwrap();

        // Host is stereo and asks for 3 frames at a time
        let mut out = [9.0f32; 6];
        renderer.render_interleaved(&mut out, 2, 0.0);
        assert_eq!(out, [1.0, 0.0, 2.0, 0.0, 3.0, 0.0]);

        renderer.render_interleaved(&mut out, 2, 0.003);
        assert_eq!(out, [4.0, 0.0, 5.0, 0.0, 6.0, 0.0]);

        // Two whole frames rendered so far
        assert!((renderer.clock().queued_time() - 0.008).abs() < EPSILON);
        assert_eq!(renderer.clock().dropped(), 0);
    }

    #[test]
    fn test_planar_host_period_larger_than_frame() {
        let (mut producer, mut renderer, _) = setup(2, 1000, 4);
        producer
            .append(SampleChunk::new(vec![ramp(4), vec![0.25; 4]]))
            .unwrap();

        let mut left = [9.0f32; 8];
        let mut right = [9.0f32; 8];
        {
            let mut outputs: [&mut [f32]; 2] = [&mut left, &mut right];
            renderer.render_planar(&mut outputs, 0.0);
        }
        assert_eq!(left, [1.0, 2.0, 3.0, 4.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(right, [0.25, 0.25, 0.25, 0.25, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(renderer.clock().dropped(), 1);
    }

    #[test]
    fn test_channel_signal_coalesces() {
        let (signal, rx) = StarvationSignal::channel();
        signal.notify();
        signal.notify();
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
