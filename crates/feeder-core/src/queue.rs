//! Sample queue between the producer and the real-time callback
//!
//! [`BufferQueue`] is a FIFO of [`SampleChunk`]s that accepts chunks of any
//! length and serves exact-length slices from the head, splitting a stored
//! chunk when a request ends inside it.
//!
//! [`queue_channel`] splits a queue across the two execution contexts:
//!
//! ```text
//! ┌──────────────────┐  append()   ┌───────────────┐  pop()  ┌────────────────────┐
//! │  QueueProducer   │────────────►│    handoff    │────────►│   QueueConsumer    │
//! │ (producer thread)│             │  (SegQueue)   │         │ (real-time thread) │
//! └──────────────────┘             └───────────────┘         └─────────┬──────────┘
//!          ▲                                                           │
//!          │                  ┌───────────────┐   spent chunks        │
//!          └──────────────────│ retired ring  │◄──────────────────────┘
//!             dropped here    │ (rtrb, SPSC)  │
//!                             └───────────────┘
//! ```
//!
//! The producer only ever touches the tail, the consumer only the head.
//! The handoff is unbounded, so the consumer never waits on the producer
//! to see audio that was already accepted. Chunks the consumer has finished with travel back to the producer so
//! their memory is freed off the real-time thread.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::queue::SegQueue;

use crate::audio::{FeederError, FeederResult};
use crate::types::{Sample, SampleChunk};

/// Default capacity of the retired-chunk ring, in chunks
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Ordered queue of multi-channel sample chunks
#[derive(Debug)]
pub struct BufferQueue {
    channels: usize,
    chunks: VecDeque<SampleChunk>,
    /// Samples of the head chunk already shifted out
    head_offset: usize,
    sample_count: usize,
}

impl BufferQueue {
    /// Create an empty queue for chunks with `channels` channels
    pub fn new(channels: usize) -> FeederResult<Self> {
        Self::with_capacity(channels, 0)
    }

    /// Create an empty queue with room for `chunk_capacity` chunks
    pub fn with_capacity(channels: usize, chunk_capacity: usize) -> FeederResult<Self> {
        if channels == 0 {
            return Err(FeederError::InvalidChannelCount(channels));
        }
        Ok(Self {
            channels,
            chunks: VecDeque::with_capacity(chunk_capacity),
            head_offset: 0,
            sample_count: 0,
        })
    }

    /// Configured channel count
    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Total per-channel samples currently queued
    #[inline]
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Number of stored chunks (a partially consumed head counts as one)
    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }

    /// Append a chunk at the tail
    ///
    /// Fails with [`FeederError::InvalidBuffer`] without touching the queue
    /// if the chunk's channel count differs from the queue's or its channels
    /// have different lengths.
    pub fn append(&mut self, chunk: SampleChunk) -> FeederResult<()> {
        chunk.validate(self.channels)?;
        self.push_validated(chunk);
        Ok(())
    }

    /// Append a chunk that has already been validated against this queue
    fn push_validated(&mut self, chunk: SampleChunk) {
        if chunk.is_empty() {
            return;
        }
        self.sample_count += chunk.len();
        self.chunks.push_back(chunk);
    }

    /// Remove up to `max_samples` per channel from the head
    ///
    /// Returns a new chunk holding `min(sample_count(), max_samples)` samples
    /// per channel. Never pads with silence: callers detect a shortfall by
    /// comparing the returned length against what they asked for.
    pub fn shift(&mut self, max_samples: usize) -> SampleChunk {
        let count = self.sample_count.min(max_samples);
        let mut output: Vec<Vec<Sample>> =
            (0..self.channels).map(|_| Vec::with_capacity(count)).collect();
        self.take_front(
            count,
            |channel, samples| output[channel].extend_from_slice(samples),
            drop,
        );
        SampleChunk::new(output)
    }

    /// Remove up to `max_samples` per channel from the head into `output`
    ///
    /// Each output vector is cleared first; when their capacity covers
    /// `max_samples` this does not allocate. Returns the count written.
    pub fn shift_into(&mut self, output: &mut [Vec<Sample>], max_samples: usize) -> usize {
        self.shift_into_with(output, max_samples, drop)
    }

    fn shift_into_with(
        &mut self,
        output: &mut [Vec<Sample>],
        max_samples: usize,
        retire: impl FnMut(SampleChunk),
    ) -> usize {
        debug_assert_eq!(output.len(), self.channels);
        for channel in output.iter_mut() {
            channel.clear();
        }
        let count = self.sample_count.min(max_samples);
        self.take_front(
            count,
            |channel, samples| output[channel].extend_from_slice(samples),
            retire,
        );
        count
    }

    /// Walk `count` samples off the head, handing each contiguous run to
    /// `sink` and each fully consumed chunk to `retire`
    fn take_front(
        &mut self,
        count: usize,
        mut sink: impl FnMut(usize, &[Sample]),
        mut retire: impl FnMut(SampleChunk),
    ) {
        let mut remaining = count;
        while remaining > 0 {
            let Some(head) = self.chunks.front() else {
                break;
            };

            let available = head.len() - self.head_offset;
            let take = available.min(remaining);
            let range = self.head_offset..self.head_offset + take;
            for (channel, samples) in head.channels().iter().enumerate() {
                sink(channel, &samples[range.clone()]);
            }

            remaining -= take;
            self.sample_count -= take;

            if take == available {
                // Whole head consumed
                self.head_offset = 0;
                if let Some(spent) = self.chunks.pop_front() {
                    retire(spent);
                }
            } else {
                // Request ends inside the head: keep the suffix in place
                self.head_offset += take;
            }
        }
    }

    /// Drop everything queued
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.head_offset = 0;
        self.sample_count = 0;
    }
}

/// Create a producer/consumer pair sharing one logical queue
///
/// Every chunk the producer accepts is immediately reachable by the
/// consumer. `retire_capacity` bounds how many spent chunks can wait for the
/// producer to free them; beyond that the consumer frees them itself.
pub fn queue_channel(
    channels: usize,
    retire_capacity: usize,
) -> FeederResult<(QueueProducer, QueueConsumer)> {
    let retire_capacity = retire_capacity.max(1);
    let local = BufferQueue::with_capacity(channels, retire_capacity)?;
    let handoff = Arc::new(SegQueue::new());
    let (retired_tx, retired_rx) = rtrb::RingBuffer::new(retire_capacity);
    let queued = Arc::new(AtomicUsize::new(0));

    let producer = QueueProducer {
        channels,
        handoff: Arc::clone(&handoff),
        retired: retired_rx,
        queued: Arc::clone(&queued),
    };
    let consumer = QueueConsumer {
        local,
        handoff,
        retired: retired_tx,
        queued,
    };
    Ok((producer, consumer))
}

/// Tail side of a split queue, owned by the producer thread
pub struct QueueProducer {
    channels: usize,
    handoff: Arc<SegQueue<SampleChunk>>,
    retired: rtrb::Consumer<SampleChunk>,
    queued: Arc<AtomicUsize>,
}

impl QueueProducer {
    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Validate and enqueue a chunk (non-blocking)
    pub fn append(&mut self, chunk: SampleChunk) -> FeederResult<()> {
        chunk.validate(self.channels)?;
        self.reclaim();
        if !chunk.is_empty() {
            // Count before publishing so the total never dips below what
            // the consumer can reach
            self.queued.fetch_add(chunk.len(), Ordering::AcqRel);
            self.handoff.push(chunk);
        }
        Ok(())
    }

    /// Free chunks the consumer has finished with
    pub fn reclaim(&mut self) {
        while let Ok(spent) = self.retired.pop() {
            drop(spent);
        }
    }

    /// Total samples queued and not yet consumed, on either side
    #[inline]
    pub fn sample_count(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    /// Spent chunks waiting to be freed here
    #[inline]
    pub fn retired_len(&self) -> usize {
        self.retired.slots()
    }

    /// True once the consumer has been dropped
    pub fn is_abandoned(&self) -> bool {
        self.retired.is_abandoned()
    }
}

/// Head side of a split queue, owned by the real-time callback
pub struct QueueConsumer {
    local: BufferQueue,
    handoff: Arc<SegQueue<SampleChunk>>,
    retired: rtrb::Producer<SampleChunk>,
    queued: Arc<AtomicUsize>,
}

impl QueueConsumer {
    #[inline]
    pub fn channels(&self) -> usize {
        self.local.channels()
    }

    /// Pull handed-off chunks until at least `wanted` samples are local or
    /// nothing is left; returns the local count
    pub fn fill(&mut self, wanted: usize) -> usize {
        while self.local.sample_count() < wanted {
            match self.handoff.pop() {
                Some(chunk) => self.local.push_validated(chunk),
                None => break,
            }
        }
        self.local.sample_count()
    }

    /// Samples reachable without waiting on the producer
    pub fn available(&mut self) -> usize {
        self.fill(usize::MAX)
    }

    /// Shift up to `max_samples` into `output` (see [`BufferQueue::shift_into`])
    pub fn shift_into(&mut self, output: &mut [Vec<Sample>], max_samples: usize) -> usize {
        self.fill(max_samples);
        let retired = &mut self.retired;
        let count = self.local.shift_into_with(output, max_samples, |spent| {
            // Ring full means the producer is idle; freeing here is the fallback
            let _ = retired.push(spent);
        });
        self.queued.fetch_sub(count, Ordering::AcqRel);
        count
    }

    /// Total samples queued on either side (same value the producer sees)
    #[inline]
    pub fn queued_samples(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize, start: f32) -> Vec<f32> {
        (0..len).map(|i| start + i as f32).collect()
    }

    fn mono(samples: Vec<f32>) -> SampleChunk {
        SampleChunk::new(vec![samples])
    }

    #[test]
    fn test_rejects_zero_channels() {
        assert_eq!(
            BufferQueue::new(0).unwrap_err(),
            FeederError::InvalidChannelCount(0)
        );
    }

    #[test]
    fn test_shift_exact_prefix() {
        let mut queue = BufferQueue::new(2).unwrap();
        let left = ramp(64, 0.0);
        let right = ramp(64, 100.0);
        queue
            .append(SampleChunk::new(vec![left.clone(), right.clone()]))
            .unwrap();

        let out = queue.shift(40);
        assert_eq!(out.len(), 40);
        assert_eq!(out.channel(0), &left[..40]);
        assert_eq!(out.channel(1), &right[..40]);
        assert_eq!(queue.sample_count(), 24);

        let rest = queue.shift(24);
        assert_eq!(rest.channel(0), &left[40..]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_shift_split_across_chunks() {
        let mut queue = BufferQueue::new(1).unwrap();
        queue.append(mono(ramp(100, 0.0))).unwrap();
        queue.append(mono(ramp(50, 100.0))).unwrap();
        assert_eq!(queue.sample_count(), 150);

        let out = queue.shift(120);
        assert_eq!(out.len(), 120);
        assert_eq!(out.channel(0), &ramp(120, 0.0)[..]);
        assert_eq!(queue.sample_count(), 30);
        assert_eq!(queue.chunk_count(), 1);

        let tail = queue.shift(30);
        assert_eq!(tail.channel(0), &ramp(30, 120.0)[..]);
    }

    #[test]
    fn test_shift_never_pads() {
        let mut queue = BufferQueue::new(1).unwrap();
        queue.append(mono(ramp(10, 0.0))).unwrap();

        let out = queue.shift(64);
        assert_eq!(out.len(), 10);
        assert_eq!(queue.sample_count(), 0);

        let empty = queue.shift(64);
        assert_eq!(empty.channel_count(), 1);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_append_wrong_channel_count_leaves_queue_untouched() {
        let mut queue = BufferQueue::new(2).unwrap();
        queue.append(SampleChunk::silence(2, 8)).unwrap();

        let err = queue.append(SampleChunk::silence(1, 8)).unwrap_err();
        assert!(matches!(err, FeederError::InvalidBuffer { .. }));
        assert_eq!(queue.sample_count(), 8);
        assert_eq!(queue.chunk_count(), 1);
    }

    #[test]
    fn test_append_ragged_chunk_rejected() {
        let mut queue = BufferQueue::new(2).unwrap();
        let ragged = SampleChunk::new(vec![vec![0.0; 8], vec![0.0; 7]]);
        assert!(queue.append(ragged).is_err());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_shift_into_reuses_buffers() {
        let mut queue = BufferQueue::new(1).unwrap();
        queue.append(mono(ramp(5, 0.0))).unwrap();
        queue.append(mono(ramp(5, 5.0))).unwrap();

        let mut out = vec![Vec::with_capacity(8)];
        assert_eq!(queue.shift_into(&mut out, 8), 8);
        assert_eq!(out[0], ramp(8, 0.0));
        assert_eq!(out[0].capacity(), 8);

        assert_eq!(queue.shift_into(&mut out, 8), 2);
        assert_eq!(out[0], vec![8.0, 9.0]);
    }

    #[test]
    fn test_channel_handoff() {
        let (mut tx, mut rx) = queue_channel(1, 4).unwrap();
        tx.append(mono(ramp(100, 0.0))).unwrap();
        tx.append(mono(ramp(50, 100.0))).unwrap();
        assert_eq!(tx.sample_count(), 150);
        assert_eq!(rx.available(), 150);

        let mut out = vec![Vec::with_capacity(120)];
        assert_eq!(rx.shift_into(&mut out, 120), 120);
        assert_eq!(out[0], ramp(120, 0.0));
        assert_eq!(tx.sample_count(), 30);
        assert_eq!(rx.queued_samples(), 30);
    }

    #[test]
    fn test_channel_reaches_everything_without_producer_help() {
        let (mut tx, mut rx) = queue_channel(1, 2).unwrap();
        for i in 0..5 {
            tx.append(mono(ramp(10, i as f32 * 10.0))).unwrap();
        }
        assert_eq!(tx.sample_count(), 50);

        // No further producer calls from here on
        assert_eq!(rx.available(), 50);
        let mut out = vec![Vec::with_capacity(50)];
        assert_eq!(rx.shift_into(&mut out, 50), 50);
        assert_eq!(out[0], ramp(50, 0.0));
        assert_eq!(rx.queued_samples(), 0);
        assert_eq!(tx.sample_count(), 0);
    }

    #[test]
    fn test_spent_chunks_freed_by_producer() {
        let (mut tx, mut rx) = queue_channel(1, 4).unwrap();
        tx.append(mono(ramp(8, 0.0))).unwrap();
        tx.append(mono(ramp(8, 8.0))).unwrap();

        let mut out = vec![Vec::with_capacity(16)];
        rx.shift_into(&mut out, 12);
        assert_eq!(tx.retired_len(), 1);

        tx.reclaim();
        assert_eq!(tx.retired_len(), 0);
        assert_eq!(tx.sample_count(), 4);
    }

    #[test]
    fn test_channel_validates_on_append() {
        let (mut tx, mut rx) = queue_channel(2, 4).unwrap();
        assert!(tx.append(SampleChunk::silence(1, 16)).is_err());
        assert_eq!(tx.sample_count(), 0);
        assert_eq!(rx.available(), 0);
    }

    #[test]
    fn test_producer_sees_abandoned_consumer() {
        let (tx, rx) = queue_channel(1, 4).unwrap();
        assert!(!tx.is_abandoned());
        drop(rx);
        assert!(tx.is_abandoned());
    }
}
