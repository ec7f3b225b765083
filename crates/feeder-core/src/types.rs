//! Common types for the feeder
//!
//! This module contains the fundamental sample types shared by the queue,
//! the resampler and the output backends.

use crate::audio::{FeederError, FeederResult};

/// Audio sample type (32-bit float, nominally in [-1.0, 1.0])
pub type Sample = f32;

/// Smallest frame size a backend may request (frames per callback)
pub const MIN_FRAME_SIZE: usize = 256;

/// Largest frame size a backend may request (frames per callback)
pub const MAX_FRAME_SIZE: usize = 16384;

/// Frame size used when nothing else is configured
///
/// 4096 frames @ 48kHz = ~85ms per callback, comfortable for producers that
/// decode on a non-real-time thread.
pub const DEFAULT_FRAME_SIZE: usize = 4096;

/// A batch of planar audio: one equal-length sample vector per channel
///
/// Chunks are moved into the queue on append, so the producer can never
/// write into storage the output side is still reading.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SampleChunk {
    channels: Vec<Vec<Sample>>,
}

impl SampleChunk {
    /// Wrap per-channel sample vectors
    ///
    /// No validation happens here; queues validate on append.
    pub fn new(channels: Vec<Vec<Sample>>) -> Self {
        Self { channels }
    }

    /// Create a chunk filled with silence
    pub fn silence(channel_count: usize, len: usize) -> Self {
        Self {
            channels: vec![vec![0.0; len]; channel_count],
        }
    }

    /// Create a chunk from interleaved samples [c0, c1, ..., c0, c1, ...]
    ///
    /// Trailing samples that don't make up a whole frame are ignored.
    pub fn from_interleaved(interleaved: &[Sample], channel_count: usize) -> Self {
        if channel_count == 0 {
            return Self::default();
        }
        let frames = interleaved.len() / channel_count;
        let mut channels: Vec<Vec<Sample>> =
            (0..channel_count).map(|_| Vec::with_capacity(frames)).collect();
        for frame in interleaved.chunks_exact(channel_count) {
            for (channel, &sample) in channels.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }
        Self { channels }
    }

    /// Number of channels in this chunk
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Per-channel sample count (length of the first channel)
    #[inline]
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Samples of a single channel
    #[inline]
    pub fn channel(&self, index: usize) -> &[Sample] {
        &self.channels[index]
    }

    /// All channels
    #[inline]
    pub fn channels(&self) -> &[Vec<Sample>] {
        &self.channels
    }

    /// Consume the chunk, returning the per-channel vectors
    pub fn into_channels(self) -> Vec<Vec<Sample>> {
        self.channels
    }

    /// Check the chunk against an expected channel count
    ///
    /// Fails with [`FeederError::InvalidBuffer`] if the channel count differs
    /// or if any channel's length differs from the first channel's.
    pub fn validate(&self, expected_channels: usize) -> FeederResult<()> {
        if self.channels.len() != expected_channels {
            return Err(FeederError::invalid_buffer(format!(
                "expected {} channels, got {}",
                expected_channels,
                self.channels.len()
            )));
        }

        let len = self.len();
        if let Some((index, channel)) = self
            .channels
            .iter()
            .enumerate()
            .find(|(_, channel)| channel.len() != len)
        {
            return Err(FeederError::invalid_buffer(format!(
                "channel {} has {} samples, channel 0 has {}",
                index,
                channel.len(),
                len
            )));
        }

        Ok(())
    }

    /// Copy samples to an interleaved output buffer
    ///
    /// Writes `min(self.len(), output.len() / channels)` frames.
    pub fn write_interleaved(&self, output: &mut [Sample]) {
        let channel_count = self.channels.len();
        if channel_count == 0 {
            return;
        }
        for (i, frame) in output.chunks_exact_mut(channel_count).enumerate() {
            if i >= self.len() {
                break;
            }
            for (out, channel) in frame.iter_mut().zip(&self.channels) {
                *out = channel[i];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_interleaved() {
        let chunk = SampleChunk::from_interleaved(&[0.1, 0.2, 0.3, 0.4, 0.5], 2);
        assert_eq!(chunk.channel_count(), 2);
        assert_eq!(chunk.len(), 2);
        assert_eq!(chunk.channel(0), &[0.1, 0.3]);
        assert_eq!(chunk.channel(1), &[0.2, 0.4]);
    }

    #[test]
    fn test_write_interleaved() {
        let chunk = SampleChunk::new(vec![vec![1.0, 2.0], vec![-1.0, -2.0]]);
        let mut out = [0.0f32; 6];
        chunk.write_interleaved(&mut out);
        assert_eq!(out, [1.0, -1.0, 2.0, -2.0, 0.0, 0.0]);
    }

    #[test]
    fn test_validate_channel_count() {
        let chunk = SampleChunk::silence(1, 10);
        assert!(chunk.validate(1).is_ok());
        assert!(matches!(
            chunk.validate(2),
            Err(FeederError::InvalidBuffer { .. })
        ));
    }

    #[test]
    fn test_validate_ragged_channels() {
        let chunk = SampleChunk::new(vec![vec![0.0; 10], vec![0.0; 9]]);
        assert!(matches!(
            chunk.validate(2),
            Err(FeederError::InvalidBuffer { .. })
        ));
    }

    #[test]
    fn test_silence() {
        let chunk = SampleChunk::silence(3, 4);
        assert_eq!(chunk.channel_count(), 3);
        assert_eq!(chunk.len(), 4);
        assert!(chunk.channels().iter().flatten().all(|&s| s == 0.0));
    }
}
