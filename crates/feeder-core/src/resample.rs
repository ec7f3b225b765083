//! Sample rate and channel count conversion
//!
//! Converts a producer chunk to the output backend's native format using
//! nearest-lower-neighbour sampling: no interpolation, no band-limiting.
//! Downsampling aliases and upsampling steps audibly. Producers that need
//! better quality should resample upstream (e.g. with rubato) and init the
//! feeder at the device rate, which takes the identity path below.
//!
//! Channel mapping: output channel `c` reads input channel `c` when it
//! exists, otherwise input channel 0. Mono input therefore becomes
//! dual-mono on a stereo device; surplus input channels are dropped.

use crate::types::{Sample, SampleChunk};

/// Convert `chunk` from (`from_rate`, `from_channels`) to (`to_rate`, `to_channels`)
///
/// When rate and channel count already match, the chunk is returned as-is
/// without touching its samples.
pub fn resample(
    chunk: SampleChunk,
    from_rate: u32,
    from_channels: usize,
    to_rate: u32,
    to_channels: usize,
) -> SampleChunk {
    if from_rate == to_rate && from_channels == to_channels {
        return chunk;
    }

    let input_len = chunk.len();
    let output_len = output_length(input_len, from_rate, to_rate);
    let readable_channels = from_channels.min(chunk.channel_count());

    let mut output = Vec::with_capacity(to_channels);
    for channel in 0..to_channels {
        let source_channel = if channel < readable_channels { channel } else { 0 };
        let Some(input) = chunk.channels().get(source_channel) else {
            output.push(vec![0.0; output_len]);
            continue;
        };
        output.push(resample_channel(input, from_rate, to_rate, output_len));
    }

    SampleChunk::new(output)
}

/// Output sample count for `input_len` samples: `round(input_len * to / from)`
#[inline]
pub fn output_length(input_len: usize, from_rate: u32, to_rate: u32) -> usize {
    if from_rate == 0 {
        return 0;
    }
    (input_len as f64 * to_rate as f64 / from_rate as f64).round() as usize
}

fn resample_channel(input: &[Sample], from_rate: u32, to_rate: u32, output_len: usize) -> Vec<Sample> {
    if input.is_empty() {
        return vec![0.0; output_len];
    }
    if from_rate == to_rate {
        return input.to_vec();
    }

    let last = input.len() - 1;
    (0..output_len)
        .map(|i| {
            // floor(i * from / to), exact in integer arithmetic
            let index = (i as u64 * from_rate as u64 / to_rate as u64) as usize;
            input[index.min(last)]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_returns_same_allocation() {
        let chunk = SampleChunk::new(vec![vec![0.25; 128], vec![-0.25; 128]]);
        let ptr = chunk.channel(0).as_ptr();

        let out = resample(chunk, 48000, 2, 48000, 2);
        assert_eq!(out.channel(0).as_ptr(), ptr);
        assert_eq!(out.len(), 128);
    }

    #[test]
    fn test_mono_44k_to_stereo_48k() {
        let input: Vec<f32> = (0..441).map(|i| i as f32 / 441.0).collect();
        let chunk = SampleChunk::new(vec![input.clone()]);

        let out = resample(chunk, 44100, 1, 48000, 2);
        assert_eq!(out.channel_count(), 2);
        assert_eq!(out.len(), 480);
        assert_eq!(out.channel(1).len(), 480);
        assert_eq!(out.channel(0), out.channel(1));

        // Nearest-lower neighbour: out[i] = in[floor(i * 44100 / 48000)]
        assert_eq!(out.channel(0)[0], input[0]);
        assert_eq!(out.channel(0)[100], input[91]);
        assert_eq!(out.channel(0)[479], input[440]);
    }

    #[test]
    fn test_downsample_halves_length() {
        let input: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let out = resample(SampleChunk::new(vec![input]), 96000, 1, 48000, 1);
        assert_eq!(out.len(), 50);
        assert_eq!(out.channel(0)[10], 20.0);
    }

    #[test]
    fn test_channel_only_conversion_keeps_samples() {
        let chunk = SampleChunk::new(vec![vec![0.1, 0.2], vec![0.3, 0.4], vec![0.5, 0.6]]);
        let out = resample(chunk, 48000, 3, 48000, 2);
        assert_eq!(out.channel_count(), 2);
        assert_eq!(out.channel(0), &[0.1, 0.2]);
        assert_eq!(out.channel(1), &[0.3, 0.4]);
    }

    #[test]
    fn test_output_length_rounds() {
        assert_eq!(output_length(441, 44100, 48000), 480);
        assert_eq!(output_length(1, 44100, 48000), 1);
        assert_eq!(output_length(10, 48000, 44100), 9);
        assert_eq!(output_length(0, 44100, 48000), 0);
    }

    #[test]
    fn test_empty_chunk() {
        let out = resample(SampleChunk::new(vec![vec![]]), 22050, 1, 44100, 2);
        assert_eq!(out.channel_count(), 2);
        assert!(out.is_empty());
    }
}
