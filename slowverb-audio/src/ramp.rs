//! Linear gain ramps for click-free parameter changes

/// Length of every dry/wet gain ramp in seconds
pub const GAIN_RAMP_SECS: f32 = 0.005;

/// A gain that moves linearly to its target over a fixed number of frames
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainRamp {
    current: f32,
    target: f32,
    step: f32,
    remaining: u32,
    ramp_frames: u32,
}

impl GainRamp {
    /// Create a ramp resting at `value` with the standard ramp length
    pub fn new(value: f32, sample_rate: u32) -> Self {
        let ramp_frames = ((sample_rate as f32 * GAIN_RAMP_SECS).round() as u32).max(1);
        Self {
            current: value,
            target: value,
            step: 0.0,
            remaining: 0,
            ramp_frames,
        }
    }

    /// Start moving toward `target`; the ramp always takes the full length
    pub fn set_target(&mut self, target: f32) {
        self.target = target;
        self.remaining = self.ramp_frames;
        self.step = (target - self.current) / self.ramp_frames as f32;
    }

    /// Jump straight to a value
    pub fn set_immediate(&mut self, value: f32) {
        self.current = value;
        self.target = value;
        self.step = 0.0;
        self.remaining = 0;
    }

    /// Advance one frame and return the gain for it
    #[inline]
    pub fn next_gain(&mut self) -> f32 {
        if self.remaining > 0 {
            self.remaining -= 1;
            self.current = if self.remaining == 0 {
                self.target
            } else {
                self.current + self.step
            };
        }
        self.current
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn is_ramping(&self) -> bool {
        self.remaining > 0
    }

    pub fn ramp_frames(&self) -> u32 {
        self.ramp_frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ramp_length_matches_constant() {
        let ramp = GainRamp::new(1.0, 48000);
        assert_eq!(ramp.ramp_frames(), 240);
    }

    #[test]
    fn test_reaches_target_exactly() {
        let mut ramp = GainRamp::new(1.0, 48000);
        ramp.set_target(0.6);

        let mut last = 1.0;
        for _ in 0..240 {
            let g = ramp.next_gain();
            assert!(g <= last);
            last = g;
        }
        assert_eq!(ramp.current(), 0.6);
        assert!(!ramp.is_ramping());
        assert_eq!(ramp.next_gain(), 0.6);
    }

    #[test]
    fn test_complementary_ramps_sum_to_one() {
        let mut dry = GainRamp::new(1.0, 44100);
        let mut wet = GainRamp::new(0.0, 44100);
        dry.set_target(0.3);
        wet.set_target(0.7);

        for _ in 0..500 {
            let sum = dry.next_gain() + wet.next_gain();
            assert!((sum - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_retarget_mid_ramp() {
        let mut ramp = GainRamp::new(0.0, 48000);
        ramp.set_target(1.0);
        for _ in 0..120 {
            ramp.next_gain();
        }
        ramp.set_target(0.0);
        assert!(ramp.is_ramping());
        for _ in 0..240 {
            ramp.next_gain();
        }
        assert_eq!(ramp.current(), 0.0);
    }
}
