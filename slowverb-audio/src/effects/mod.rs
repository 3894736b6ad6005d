//! Audio effects for the realtime chain

mod convolver;
mod pitch_shift;

pub use convolver::{Convolver, DEFAULT_BLOCK_SIZE};
pub use pitch_shift::{PitchShifter, PITCH_WINDOW_SECS};

/// Trait for audio effects
pub trait Effect: Send {
    /// Process audio samples in place (stereo interleaved)
    fn process(&mut self, samples: &mut [f32]);

    /// Reset effect state
    fn reset(&mut self);

    /// Check if effect is enabled
    fn is_enabled(&self) -> bool;

    /// Enable/disable the effect
    fn set_enabled(&mut self, enabled: bool);

    /// Get effect name
    fn name(&self) -> &'static str;
}
