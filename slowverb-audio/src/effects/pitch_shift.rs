//! Delay-line pitch shifter
//!
//! Two read taps sweep through a short delay line at a rate set by the pitch
//! ratio, half a window apart. Each tap fades in and out with a sine window so
//! the jump when a tap wraps is inaudible; the pair sums to constant power.

use super::Effect;
use std::f32::consts::PI;

/// Sweep window length in seconds
pub const PITCH_WINDOW_SECS: f32 = 0.1;

/// Shifts below this many cents are treated as no shift
const BYPASS_CENTS: f32 = 0.01;

/// Stereo pitch shifter
pub struct PitchShifter {
    /// Delay buffer (stereo interleaved: L,R,L,R,...)
    buffer: Vec<f32>,
    /// Buffer length in stereo frames
    buffer_frames: usize,
    /// Write position (in frames)
    write_pos: usize,
    /// Sweep window in frames
    window: f32,
    /// Tap phase in [0, 1)
    phase: f32,
    /// Phase advance per frame
    phase_inc: f32,
    cents: f32,
    enabled: bool,
}

impl PitchShifter {
    pub fn new(sample_rate: u32) -> Self {
        let window = (sample_rate as f32 * PITCH_WINDOW_SECS).max(4.0);
        let buffer_frames = window as usize + 4;

        Self {
            buffer: vec![0.0; buffer_frames * 2],
            buffer_frames,
            write_pos: 0,
            window,
            phase: 0.0,
            phase_inc: 0.0,
            cents: 0.0,
            enabled: false,
        }
    }

    /// Set the shift in cents; zero bypasses the effect
    pub fn set_cents(&mut self, cents: f32) {
        let cents = if cents.is_finite() { cents } else { 0.0 };
        self.cents = cents;

        let ratio = 2.0f32.powf(cents / 1200.0);
        // Delay shrinks by (ratio - 1) frames per frame when shifting up
        self.phase_inc = (1.0 - ratio) / self.window;
        self.set_enabled(cents.abs() >= BYPASS_CENTS);
    }

    pub fn cents(&self) -> f32 {
        self.cents
    }

    /// Linear-interpolated read `delay` frames behind the write head
    #[inline]
    fn read(&self, delay: f32, channel: usize) -> f32 {
        let int_delay = delay as usize;
        let frac = delay - int_delay as f32;

        let idx_a = (self.write_pos + self.buffer_frames - int_delay) % self.buffer_frames;
        let idx_b = (idx_a + self.buffer_frames - 1) % self.buffer_frames;

        let a = self.buffer[idx_a * 2 + channel];
        let b = self.buffer[idx_b * 2 + channel];
        a + (b - a) * frac
    }
}

impl Effect for PitchShifter {
    fn process(&mut self, samples: &mut [f32]) {
        if !self.enabled {
            return;
        }

        for frame in samples.chunks_exact_mut(2) {
            self.buffer[self.write_pos * 2] = frame[0];
            self.buffer[self.write_pos * 2 + 1] = frame[1];

            let phase_a = self.phase;
            let phase_b = (self.phase + 0.5).fract();
            let gain_a = (PI * phase_a).sin();
            let gain_b = (PI * phase_b).sin();
            let delay_a = phase_a * self.window;
            let delay_b = phase_b * self.window;

            for (ch, sample) in frame.iter_mut().enumerate() {
                *sample = self.read(delay_a, ch) * gain_a + self.read(delay_b, ch) * gain_b;
            }

            self.phase = (self.phase + self.phase_inc).rem_euclid(1.0);
            self.write_pos = (self.write_pos + 1) % self.buffer_frames;
        }
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
        self.phase = 0.0;
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
        "PitchShifter"
    }
}
