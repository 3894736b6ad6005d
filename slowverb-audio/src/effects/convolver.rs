//! Partitioned FFT convolution reverb
//!
//! Uniformly partitioned overlap-save: the impulse is cut into blocks of
//! `block_size` frames, each transformed once at construction. Every input
//! block is transformed and multiplied against the whole partition set through
//! a frequency-domain delay line, so cost per block is one forward FFT, one
//! inverse FFT and `partitions` complex multiply-adds regardless of tail length.
//!
//! Latency is one block.

use super::Effect;
use crate::impulse::ImpulseResponse;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Default partition size in frames
pub const DEFAULT_BLOCK_SIZE: usize = 512;

/// Per-channel convolution state
struct ChannelState {
    /// Transformed impulse partitions
    partitions: Vec<Vec<Complex<f32>>>,
    /// Frequency-domain delay line of past input spectra (ring)
    history: Vec<Vec<Complex<f32>>>,
    /// Previous input block (first half of the overlap-save window)
    previous: Vec<f32>,
    /// Input block being filled
    input: Vec<f32>,
    /// Output block being drained
    output: Vec<f32>,
}

/// Stereo convolution reverb
pub struct Convolver {
    block_size: usize,
    fft_size: usize,
    channels: [ChannelState; 2],
    fft_forward: Arc<dyn Fft<f32>>,
    fft_inverse: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex<f32>>,
    spectrum: Vec<Complex<f32>>,
    accumulator: Vec<Complex<f32>>,
    /// Index of the newest spectrum in each history ring
    head: usize,
    /// Position inside the current block
    pos: usize,
    enabled: bool,
}

impl Convolver {
    /// Build a convolver for an impulse with the default block size
    pub fn new(impulse: ImpulseResponse) -> Self {
        Self::with_block_size(impulse, DEFAULT_BLOCK_SIZE)
    }

    /// Build a convolver with a specific partition size
    ///
    /// The impulse is normalized so its mean per-channel energy is 1; a mono
    /// impulse is used for both channels.
    pub fn with_block_size(impulse: ImpulseResponse, block_size: usize) -> Self {
        let block_size = block_size.max(1);
        let fft_size = block_size * 2;

        let mut planner = FftPlanner::<f32>::new();
        let fft_forward = planner.plan_fft_forward(fft_size);
        let fft_inverse = planner.plan_fft_inverse(fft_size);
        let scratch_len = fft_forward
            .get_inplace_scratch_len()
            .max(fft_inverse.get_inplace_scratch_len());
        let mut scratch = vec![Complex::default(); scratch_len];

        let mut irs = impulse.into_channels();
        if irs.len() == 1 {
            let mono = irs[0].clone();
            irs.push(mono);
        }
        irs.truncate(2);
        while irs.len() < 2 {
            irs.push(Vec::new());
        }

        let energy: f32 =
            irs.iter().flatten().map(|s| s * s).sum::<f32>() / irs.len() as f32;
        let scale = if energy > f32::EPSILON {
            1.0 / energy.sqrt()
        } else {
            0.0
        };

        let mut build = |ir: &[f32]| {
            let count = ir.len().div_ceil(block_size).max(1);
            let partitions: Vec<Vec<Complex<f32>>> = (0..count)
                .map(|p| {
                    let mut buf = vec![Complex::default(); fft_size];
                    let start = p * block_size;
                    let end = (start + block_size).min(ir.len());
                    for (slot, &s) in buf.iter_mut().zip(ir.get(start..end).unwrap_or(&[])) {
                        slot.re = s * scale;
                    }
                    fft_forward.process_with_scratch(&mut buf, &mut scratch);
                    buf
                })
                .collect();
            ChannelState {
                history: vec![vec![Complex::default(); fft_size]; count],
                partitions,
                previous: vec![0.0; block_size],
                input: vec![0.0; block_size],
                output: vec![0.0; block_size],
            }
        };

        let left = build(&irs[0]);
        let right = build(&irs[1]);

        Self {
            block_size,
            fft_size,
            channels: [left, right],
            fft_forward,
            fft_inverse,
            scratch,
            spectrum: vec![Complex::default(); fft_size],
            accumulator: vec![Complex::default(); fft_size],
            head: 0,
            pos: 0,
            enabled: true,
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Processing delay in frames
    pub fn latency_frames(&self) -> usize {
        self.block_size
    }

    /// Convolve one full block for every channel
    fn process_block(&mut self) {
        let partition_count = self.channels[0].partitions.len();
        self.head = (self.head + 1) % partition_count;
        let norm = 1.0 / self.fft_size as f32;

        for ch in self.channels.iter_mut() {
            // Overlap-save window: previous block followed by the current one
            for (i, slot) in self.spectrum.iter_mut().enumerate() {
                let sample = if i < self.block_size {
                    ch.previous[i]
                } else {
                    ch.input[i - self.block_size]
                };
                *slot = Complex::new(sample, 0.0);
            }
            self.fft_forward
                .process_with_scratch(&mut self.spectrum, &mut self.scratch);
            ch.history[self.head].copy_from_slice(&self.spectrum);

            self.accumulator.fill(Complex::default());
            for (p, partition) in ch.partitions.iter().enumerate() {
                let slot = (self.head + partition_count - p) % partition_count;
                for ((acc, x), h) in self
                    .accumulator
                    .iter_mut()
                    .zip(ch.history[slot].iter())
                    .zip(partition.iter())
                {
                    *acc += x * h;
                }
            }

            self.fft_inverse
                .process_with_scratch(&mut self.accumulator, &mut self.scratch);

            // Second half holds the valid (non-aliased) samples
            for (out, y) in ch
                .output
                .iter_mut()
                .zip(self.accumulator[self.block_size..].iter())
            {
                *out = y.re * norm;
            }

            std::mem::swap(&mut ch.previous, &mut ch.input);
        }
    }
}

impl Effect for Convolver {
    fn process(&mut self, samples: &mut [f32]) {
        if !self.enabled {
            return;
        }

        for frame in samples.chunks_exact_mut(2) {
            for (sample, ch) in frame.iter_mut().zip(self.channels.iter_mut()) {
                ch.input[self.pos] = *sample;
                *sample = ch.output[self.pos];
            }

            self.pos += 1;
            if self.pos == self.block_size {
                self.pos = 0;
                self.process_block();
            }
        }
    }

    fn reset(&mut self) {
        for ch in self.channels.iter_mut() {
            for spectrum in ch.history.iter_mut() {
                spectrum.fill(Complex::default());
            }
            ch.previous.fill(0.0);
            ch.input.fill(0.0);
            ch.output.fill(0.0);
        }
        self.head = 0;
        self.pos = 0;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        if enabled && !self.enabled {
            self.reset();
        }
        self.enabled = enabled;
    }

    fn name(&self) -> &'static str {
        "Convolver"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn impulse_from(left: Vec<f32>, right: Vec<f32>) -> ImpulseResponse {
        ImpulseResponse::from_channels(vec![left, right], 48000)
    }

    /// Reference time-domain convolution of one channel
    fn direct(input: &[f32], ir: &[f32]) -> Vec<f32> {
        (0..input.len())
            .map(|n| {
                ir.iter()
                    .enumerate()
                    .filter(|(k, _)| *k <= n)
                    .map(|(k, h)| h * input[n - k])
                    .sum()
            })
            .collect()
    }

    #[test]
    fn test_unit_impulse_delays_by_one_block() {
        let mut conv = Convolver::with_block_size(impulse_from(vec![1.0], vec![1.0]), 64);
        let mut buffer: Vec<f32> = (0..512).map(|i| (i as f32 * 0.01).sin()).collect();
        let original = buffer.clone();

        conv.process(&mut buffer);

        let latency = conv.latency_frames() * 2;
        for i in 0..latency {
            assert_eq!(buffer[i], 0.0);
        }
        for i in latency..buffer.len() {
            assert!((buffer[i] - original[i - latency]).abs() < 1e-4, "sample {}", i);
        }
    }

    #[test]
    fn test_matches_direct_convolution_across_partitions() {
        let mut rng = StdRng::seed_from_u64(11);
        let ir = ImpulseResponse::generate_with_rng(&mut rng, 1000, 0.2, false);
        let block = 32;
        let frames = 600;

        // Same scale the convolver applies
        let energy: f32 = ir.channels().iter().flatten().map(|s| s * s).sum::<f32>() / 2.0;
        let scale = 1.0 / energy.sqrt();
        let expected_left = direct(
            &(0..frames).map(|i| ((i * 7) % 13) as f32 / 13.0 - 0.5).collect::<Vec<_>>(),
            &ir.channel(0).unwrap().iter().map(|s| s * scale).collect::<Vec<_>>(),
        );

        let mut buffer = Vec::with_capacity(frames * 2);
        for i in 0..frames {
            let s = ((i * 7) % 13) as f32 / 13.0 - 0.5;
            buffer.push(s);
            buffer.push(0.0);
        }

        let mut conv = Convolver::with_block_size(ir, block);
        // Odd chunking exercises the block boundary bookkeeping
        for chunk in buffer.chunks_mut(2 * 21) {
            conv.process(chunk);
        }

        for n in block..frames {
            let got = buffer[n * 2];
            let want = expected_left[n - block];
            assert!((got - want).abs() < 1e-3, "frame {}: {} vs {}", n, got, want);
            assert!(buffer[n * 2 + 1].abs() < 1e-4);
        }
    }

    #[test]
    fn test_reset_clears_tail() {
        let ir = ImpulseResponse::generate(8000, 0.5, false);
        let mut conv = Convolver::with_block_size(ir, 128);
        let mut noise: Vec<f32> = (0..2048).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
        conv.process(&mut noise);

        conv.reset();
        let mut silence = vec![0.0; 2048];
        conv.process(&mut silence);
        assert!(silence.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_disabled_is_passthrough() {
        let mut conv = Convolver::new(ImpulseResponse::generate(8000, 0.1, false));
        conv.set_enabled(false);
        let mut buffer = vec![0.25; 64];
        conv.process(&mut buffer);
        assert!(buffer.iter().all(|s| *s == 0.25));
    }
}
