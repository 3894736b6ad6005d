//! Effect parameters, realtime presets, and the control surface that edits them

use thiserror::Error;

/// Id of the preset selected at startup and after a reset
pub const DEFAULT_PRESET: &str = "default";

/// Parameters for the realtime effect chain
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectParameters {
    /// Tempo multiplier (1.0 = original)
    pub speed: f32,
    /// Pitch multiplier, ignored while `keep_pitch` is set
    pub pitch_ratio: f32,
    /// Reverb wet amount (0.0 = dry, 1.0 = fully wet)
    pub reverb_mix: f32,
    /// Change tempo without changing perceived pitch
    pub keep_pitch: bool,
}

impl Default for EffectParameters {
    fn default() -> Self {
        Self {
            speed: 1.0,
            pitch_ratio: 1.0,
            reverb_mix: 0.0,
            keep_pitch: false,
        }
    }
}

/// What the source player and pitch shifter should do for a parameter set
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackSettings {
    /// Source playback rate (1.0 = original)
    pub playback_rate: f32,
    /// Pitch shift applied after the source, in cents
    pub pitch_cents: f32,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            playback_rate: 1.0,
            pitch_cents: 0.0,
        }
    }
}

impl EffectParameters {
    /// Build a parameter set
    ///
    /// Speed and pitch ratio must be positive and finite; anything else falls
    /// back to 1.0. `reverb_mix` is clamped to [0, 1].
    pub fn new(speed: f32, pitch_ratio: f32, reverb_mix: f32, keep_pitch: bool) -> Self {
        Self {
            speed: positive_ratio(speed),
            pitch_ratio: positive_ratio(pitch_ratio),
            reverb_mix: if reverb_mix.is_finite() {
                reverb_mix.clamp(0.0, 1.0)
            } else {
                0.0
            },
            keep_pitch,
        }
    }

    /// Re-apply the range rules to a value built field by field
    pub fn sanitized(self) -> Self {
        Self::new(self.speed, self.pitch_ratio, self.reverb_mix, self.keep_pitch)
    }

    /// Rate and pitch compensation for these parameters
    ///
    /// With `keep_pitch` the rate change is cancelled by a pitch shift of
    /// `-1200 * log2(speed)` cents; otherwise pitch rides on the rate.
    pub fn playback_settings(&self) -> PlaybackSettings {
        if self.keep_pitch {
            PlaybackSettings {
                playback_rate: self.speed,
                pitch_cents: -1200.0 * self.speed.log2(),
            }
        } else {
            PlaybackSettings {
                playback_rate: self.speed * self.pitch_ratio,
                pitch_cents: 0.0,
            }
        }
    }

    /// (dry, wet) gains; they always sum to 1
    pub fn mix_gains(&self) -> (f32, f32) {
        (1.0 - self.reverb_mix, self.reverb_mix)
    }
}

fn positive_ratio(value: f32) -> f32 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        1.0
    }
}

/// A named, fixed parameter bundle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectPreset {
    pub id: &'static str,
    pub name: &'static str,
    pub params: EffectParameters,
}

const fn preset(
    id: &'static str,
    name: &'static str,
    speed: f32,
    reverb_mix: f32,
    pitch_ratio: f32,
    keep_pitch: bool,
) -> EffectPreset {
    EffectPreset {
        id,
        name,
        params: EffectParameters {
            speed,
            pitch_ratio,
            reverb_mix,
            keep_pitch,
        },
    }
}

/// Realtime presets
pub const PRESETS: &[EffectPreset] = &[
    preset(DEFAULT_PRESET, "Default", 1.0, 0.0, 1.0, false),
    preset("slowed", "Slowed + Reverb", 0.8, 0.4, 0.9, false),
    preset("speed-up", "Speed Up", 1.3, 0.0, 1.0, true),
    preset("nightcore", "Nightcore", 1.25, 0.1, 1.2, false),
    preset("deep-slowed", "Deep Slowed", 0.7, 0.6, 0.8, false),
];

/// Look up a realtime preset by id
pub fn find_preset(id: &str) -> Option<&'static EffectPreset> {
    PRESETS.iter().find(|p| p.id == id)
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PresetError {
    #[error("Unknown preset: {0}")]
    Unknown(String),
}

/// Which preset the current parameters came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresetSelection {
    Preset(&'static str),
    /// A control was moved after the last preset was applied
    Custom,
}

/// Current effect parameters plus the preset they came from
#[derive(Debug, Clone, PartialEq)]
pub struct EffectControls {
    params: EffectParameters,
    selection: PresetSelection,
}

impl Default for EffectControls {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectControls {
    pub fn new() -> Self {
        Self {
            params: EffectParameters::default(),
            selection: PresetSelection::Preset(DEFAULT_PRESET),
        }
    }

    pub fn params(&self) -> EffectParameters {
        self.params
    }

    pub fn selection(&self) -> &PresetSelection {
        &self.selection
    }

    /// Replace the whole parameter set with a preset
    pub fn apply_preset(&mut self, id: &str) -> Result<EffectParameters, PresetError> {
        let preset = find_preset(id).ok_or_else(|| PresetError::Unknown(id.to_string()))?;
        self.params = preset.params;
        self.selection = PresetSelection::Preset(preset.id);
        Ok(self.params)
    }

    pub fn set_speed(&mut self, speed: f32) -> EffectParameters {
        self.params.speed = positive_ratio(speed);
        self.mark_custom()
    }

    pub fn set_pitch_ratio(&mut self, pitch_ratio: f32) -> EffectParameters {
        self.params.pitch_ratio = positive_ratio(pitch_ratio);
        self.mark_custom()
    }

    pub fn set_reverb_mix(&mut self, reverb_mix: f32) -> EffectParameters {
        self.params = EffectParameters {
            reverb_mix,
            ..self.params
        }
        .sanitized();
        self.mark_custom()
    }

    /// Flip keep-pitch; engaging it resets the pitch ratio to 1.0
    pub fn toggle_keep_pitch(&mut self) -> EffectParameters {
        self.params.keep_pitch = !self.params.keep_pitch;
        if self.params.keep_pitch {
            self.params.pitch_ratio = 1.0;
        }
        self.mark_custom()
    }

    /// Back to defaults with the default preset selected
    pub fn reset(&mut self) -> EffectParameters {
        *self = Self::new();
        self.params
    }

    fn mark_custom(&mut self) -> EffectParameters {
        self.selection = PresetSelection::Custom;
        self.params
    }
}
