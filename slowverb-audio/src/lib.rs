//! Realtime audio engine for slowverb
//!
//! This crate provides the interactive playback path:
//! - Params: effect parameters, presets and the controls that edit them
//! - Impulse: synthetic reverb impulse responses
//! - Graph: decoded source plus pitch / reverb / gain chain
//! - Transport: pure play/pause/seek state machine
//! - Player: drives transport and graph together

mod clock;
mod effects;
mod graph;
mod impulse;
mod params;
mod player;
mod ramp;
mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use effects::{Convolver, Effect, PitchShifter, DEFAULT_BLOCK_SIZE, PITCH_WINDOW_SECS};
pub use graph::{GraphError, GraphRenderer, LoadOutcome, SignalGraph, SourceDecoder};
pub use impulse::{ImpulseResponse, DEFAULT_IMPULSE_SECS, IMPULSE_CHANNELS};
pub use params::{
    find_preset, EffectControls, EffectParameters, EffectPreset, PlaybackSettings, PresetError,
    PresetSelection, DEFAULT_PRESET, PRESETS,
};
pub use player::{Player, PlayerError, SAMPLE_INTERVAL};
pub use ramp::{GainRamp, GAIN_RAMP_SECS};
pub use transport::{
    format_time, progress_percent, GraphCommand, Phase, Transition, TransportError,
    TransportEvent, TransportSnapshot, TransportState,
};
