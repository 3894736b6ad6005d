//! Synthetic reverb impulse responses
//!
//! Decaying white noise: each sample is uniform noise scaled by a quadratic
//! envelope `(1 - n/N)^2`. The reverse kernel swells instead of decaying.

use rand::Rng;

/// Number of channels in a generated impulse
pub const IMPULSE_CHANNELS: usize = 2;

/// Default impulse length in seconds
pub const DEFAULT_IMPULSE_SECS: f32 = 2.0;

/// A stereo impulse response, one buffer per channel
#[derive(Debug, Clone)]
pub struct ImpulseResponse {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl ImpulseResponse {
    /// Generate an impulse with the thread-local RNG
    pub fn generate(sample_rate: u32, length_secs: f32, reverse: bool) -> Self {
        Self::generate_with_rng(&mut rand::thread_rng(), sample_rate, length_secs, reverse)
    }

    /// Generate an impulse from a caller-supplied RNG (seed it for reproducible output)
    pub fn generate_with_rng<R: Rng>(
        rng: &mut R,
        sample_rate: u32,
        length_secs: f32,
        reverse: bool,
    ) -> Self {
        let len = if length_secs.is_finite() && length_secs > 0.0 {
            (sample_rate as f32 * length_secs) as usize
        } else {
            0
        };
        let n_total = len as f32;

        let channels = (0..IMPULSE_CHANNELS)
            .map(|_| {
                (0..len)
                    .map(|i| {
                        let n = if reverse { len - i } else { i } as f32;
                        let envelope = (1.0 - n / n_total).powi(2);
                        rng.gen_range(-1.0f32..1.0) * envelope
                    })
                    .collect()
            })
            .collect();

        Self {
            channels,
            sample_rate,
        }
    }

    /// Wrap existing per-channel buffers
    pub fn from_channels(channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
        }
    }

    /// Samples of one channel, or `None` past the last channel
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.channels
    }

    /// Length in frames
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn decile_energy(samples: &[f32], decile: usize) -> f32 {
        let size = samples.len() / 10;
        samples[decile * size..(decile + 1) * size]
            .iter()
            .map(|s| s * s)
            .sum()
    }

    #[test]
    fn test_shape_and_length() {
        let ir = ImpulseResponse::generate(48000, 2.0, false);
        assert_eq!(ir.channels().len(), 2);
        assert_eq!(ir.len(), 96000);
        assert!(ir.channels().iter().flatten().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn test_forward_kernel_decays() {
        let ir = ImpulseResponse::generate(44100, 1.0, false);
        for ch in ir.channels() {
            assert!(decile_energy(ch, 0) > decile_energy(ch, 9) * 10.0);
        }
    }

    #[test]
    fn test_reverse_kernel_swells() {
        let ir = ImpulseResponse::generate(44100, 1.0, true);
        for ch in ir.channels() {
            assert!(decile_energy(ch, 9) > decile_energy(ch, 0) * 10.0);
        }
    }

    #[test]
    fn test_channels_are_decorrelated() {
        let ir = ImpulseResponse::generate(22050, 0.5, false);
        assert_ne!(ir.channel(0), ir.channel(1));
        assert!(ir.channel(IMPULSE_CHANNELS).is_none());
    }

    #[test]
    fn test_seeded_generation_is_reproducible() {
        let a = ImpulseResponse::generate_with_rng(&mut StdRng::seed_from_u64(7), 8000, 0.25, false);
        let b = ImpulseResponse::generate_with_rng(&mut StdRng::seed_from_u64(7), 8000, 0.25, false);
        assert_eq!(a.channels(), b.channels());
    }

    #[test]
    fn test_zero_length() {
        assert!(ImpulseResponse::generate(48000, 0.0, false).is_empty());
        assert!(ImpulseResponse::generate(48000, f32::NAN, true).is_empty());
    }
}
