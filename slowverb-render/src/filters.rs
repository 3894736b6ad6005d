//! Filter operations for offline renders and the batch preset table
//!
//! Each operation carries one ffmpeg audio filter expression. When a chain is
//! assembled, tempo-class operations always come first; every other class
//! follows, and each class keeps the order the caller gave.

use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Lowest/highest factor a single `atempo` stage accepts
const ATEMPO_MIN: f32 = 0.5;
const ATEMPO_MAX: f32 = 2.0;

/// Category of a filter operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    Tempo,
    Pitch,
    Reverb,
    Bass,
    Volume,
    Normalize,
}

impl FilterKind {
    /// Tempo-class operations are placed ahead of everything else
    pub fn is_tempo_class(self) -> bool {
        matches!(self, FilterKind::Tempo)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FilterKind::Tempo => "tempo",
            FilterKind::Pitch => "pitch",
            FilterKind::Reverb => "reverb",
            FilterKind::Bass => "bass",
            FilterKind::Volume => "volume",
            FilterKind::Normalize => "normalize",
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Invalid {kind} value: {value}")]
    InvalidValue { kind: FilterKind, value: f32 },
}

/// One filter in a render chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOp {
    pub kind: FilterKind,
    /// ffmpeg filter expression, e.g. `atempo=0.8`
    pub expression: String,
}

impl FilterOp {
    pub fn new(kind: FilterKind, expression: impl Into<String>) -> Self {
        Self {
            kind,
            expression: expression.into(),
        }
    }

    /// Tempo change without pitch change
    ///
    /// Factors outside a single `atempo` stage's range are split into a chain
    /// of stages whose product is `factor`.
    pub fn tempo(factor: f32) -> Result<Self, FilterError> {
        let factor = positive(FilterKind::Tempo, factor)?;

        let mut stages = Vec::new();
        let mut rest = factor;
        while rest < ATEMPO_MIN {
            stages.push(format!("atempo={}", ATEMPO_MIN));
            rest /= ATEMPO_MIN;
        }
        while rest > ATEMPO_MAX {
            stages.push(format!("atempo={}", ATEMPO_MAX));
            rest /= ATEMPO_MAX;
        }
        stages.push(format!("atempo={}", rest));

        Ok(Self::new(FilterKind::Tempo, stages.join(",")))
    }

    /// Pitch (and tempo) change by resampling, for input at `sample_rate`
    pub fn pitch_ratio(sample_rate: u32, ratio: f32) -> Result<Self, FilterError> {
        let ratio = positive(FilterKind::Pitch, ratio)?;
        Ok(Self::new(
            FilterKind::Pitch,
            format!("asetrate={}*{},aresample={}", sample_rate, ratio, sample_rate),
        ))
    }

    /// Pitch change in semitones
    pub fn pitch_semitones(sample_rate: u32, semitones: f32) -> Result<Self, FilterError> {
        if !semitones.is_finite() {
            return Err(FilterError::InvalidValue {
                kind: FilterKind::Pitch,
                value: semitones,
            });
        }
        Self::pitch_ratio(sample_rate, 2.0f32.powf(semitones / 12.0))
    }

    /// Room reverb from a multi-tap echo; `room_size` and `damping` in [0, 1]
    pub fn reverb(room_size: f32, damping: f32) -> Result<Self, FilterError> {
        let room = unit(FilterKind::Reverb, room_size)?;
        let damping = unit(FilterKind::Reverb, damping)?;

        let base_ms = 40.0 + 200.0 * room;
        let delays = [base_ms, base_ms * 1.7, base_ms * 2.6]
            .map(|d| format!("{}", d.round() as u32))
            .join("|");
        let decay = 0.2 + 0.5 * (1.0 - damping);
        let decays = [decay, decay * 0.6, decay * 0.4]
            .map(|d| format!("{:.2}", d))
            .join("|");

        Ok(Self::new(
            FilterKind::Reverb,
            format!("aecho=0.8:0.88:{}:{}", delays, decays),
        ))
    }

    /// Low-shelf boost/cut in dB
    pub fn bass(gain_db: f32) -> Result<Self, FilterError> {
        let gain = finite(FilterKind::Bass, gain_db)?;
        Ok(Self::new(FilterKind::Bass, format!("bass=g={}", gain)))
    }

    /// Linear gain
    pub fn volume(gain: f32) -> Result<Self, FilterError> {
        let gain = finite(FilterKind::Volume, gain)?;
        if gain < 0.0 {
            return Err(FilterError::InvalidValue {
                kind: FilterKind::Volume,
                value: gain,
            });
        }
        Ok(Self::new(FilterKind::Volume, format!("volume={}", gain)))
    }

    /// EBU R128 loudness normalization
    pub fn normalize() -> Self {
        Self::new(FilterKind::Normalize, "loudnorm")
    }
}

fn finite(kind: FilterKind, value: f32) -> Result<f32, FilterError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(FilterError::InvalidValue { kind, value })
    }
}

fn positive(kind: FilterKind, value: f32) -> Result<f32, FilterError> {
    match finite(kind, value)? {
        v if v > 0.0 => Ok(v),
        v => Err(FilterError::InvalidValue { kind, value: v }),
    }
}

fn unit(kind: FilterKind, value: f32) -> Result<f32, FilterError> {
    match finite(kind, value)? {
        v if (0.0..=1.0).contains(&v) => Ok(v),
        v => Err(FilterError::InvalidValue { kind, value: v }),
    }
}

/// Operations in execution order: tempo class first, input order within each class
pub fn order_filters(ops: &[FilterOp]) -> Vec<&FilterOp> {
    let (mut ordered, others): (Vec<&FilterOp>, Vec<&FilterOp>) =
        ops.iter().partition(|op| op.kind.is_tempo_class());
    ordered.extend(others);
    ordered
}

/// Comma-joined filter expression for `-af`
pub fn build_filter_graph(ops: &[FilterOp]) -> String {
    order_filters(ops)
        .iter()
        .map(|op| op.expression.as_str())
        .filter(|expr| !expr.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

/// A named, fixed filter chain
#[derive(Debug, Clone, PartialEq)]
pub struct BatchPreset {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub ops: Vec<FilterOp>,
}

/// Batch presets, built once
pub fn batch_presets() -> &'static [BatchPreset] {
    static PRESETS: OnceLock<Vec<BatchPreset>> = OnceLock::new();
    PRESETS.get_or_init(|| {
        vec![
            BatchPreset {
                id: "slowed-reverb",
                name: "Slowed + Reverb",
                description: "Slowed down with a room reverb",
                ops: vec![
                    FilterOp::new(FilterKind::Tempo, "atempo=0.8"),
                    FilterOp::new(FilterKind::Reverb, "aecho=0.8:0.88:180|306|468:0.55|0.33|0.22"),
                ],
            },
            BatchPreset {
                id: "nightcore",
                name: "Nightcore",
                description: "Sped up with raised pitch",
                ops: vec![
                    FilterOp::new(FilterKind::Tempo, "atempo=1.25"),
                    FilterOp::new(FilterKind::Pitch, "asetrate=44100*1.25,aresample=44100"),
                ],
            },
            BatchPreset {
                id: "deep-slowed",
                name: "Deep Slowed",
                description: "Heavily slowed with a bass boost",
                ops: vec![
                    FilterOp::new(FilterKind::Tempo, "atempo=0.6"),
                    FilterOp::new(FilterKind::Bass, "bass=g=5"),
                ],
            },
        ]
    })
}

pub fn find_batch_preset(id: &str) -> Option<&'static BatchPreset> {
    batch_presets().iter().find(|p| p.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(kind: FilterKind, expr: &str) -> FilterOp {
        FilterOp::new(kind, expr)
    }

    #[test]
    fn test_tempo_moves_to_front() {
        let ops = [
            op(FilterKind::Bass, "bass=g=5"),
            op(FilterKind::Tempo, "atempo=0.8"),
            op(FilterKind::Reverb, "aecho=0.8:0.9:100:0.3"),
        ];
        assert_eq!(
            build_filter_graph(&ops),
            "atempo=0.8,bass=g=5,aecho=0.8:0.9:100:0.3"
        );
    }

    #[test]
    fn test_order_independent_of_input_position() {
        let tempo = op(FilterKind::Tempo, "atempo=1.1");
        let bass = op(FilterKind::Bass, "bass=g=3");
        let a = build_filter_graph(&[tempo.clone(), bass.clone()]);
        let b = build_filter_graph(&[bass, tempo]);
        assert_eq!(a, b);
        assert_eq!(a, "atempo=1.1,bass=g=3");
    }

    #[test]
    fn test_classes_keep_relative_order() {
        let ops = [
            op(FilterKind::Volume, "volume=0.5"),
            op(FilterKind::Tempo, "atempo=0.9"),
            op(FilterKind::Bass, "bass=g=2"),
            op(FilterKind::Tempo, "atempo=0.8"),
            op(FilterKind::Normalize, "loudnorm"),
        ];
        let kinds: Vec<_> = order_filters(&ops).iter().map(|o| o.expression.as_str()).collect();
        assert_eq!(
            kinds,
            ["atempo=0.9", "atempo=0.8", "volume=0.5", "bass=g=2", "loudnorm"]
        );
    }

    #[test]
    fn test_empty_chain() {
        assert_eq!(build_filter_graph(&[]), "");
    }

    #[test]
    fn test_tempo_builder() {
        assert_eq!(FilterOp::tempo(0.8).unwrap().expression, "atempo=0.8");
        assert_eq!(FilterOp::tempo(0.25).unwrap().expression, "atempo=0.5,atempo=0.5");
        assert_eq!(FilterOp::tempo(3.0).unwrap().expression, "atempo=2,atempo=1.5");
        assert!(FilterOp::tempo(0.0).is_err());
        assert!(FilterOp::tempo(f32::NAN).is_err());
    }

    #[test]
    fn test_pitch_builders() {
        assert_eq!(
            FilterOp::pitch_ratio(44100, 1.25).unwrap().expression,
            "asetrate=44100*1.25,aresample=44100"
        );
        let up = FilterOp::pitch_semitones(48000, 12.0).unwrap();
        assert_eq!(up.kind, FilterKind::Pitch);
        assert_eq!(up.expression, "asetrate=48000*2,aresample=48000");
        assert!(FilterOp::pitch_ratio(44100, -1.0).is_err());
    }

    #[test]
    fn test_reverb_builder() {
        let reverb = FilterOp::reverb(0.7, 0.3).unwrap();
        assert_eq!(reverb.expression, "aecho=0.8:0.88:180|306|468:0.55|0.33|0.22");
        assert!(FilterOp::reverb(1.5, 0.3).is_err());
    }

    #[test]
    fn test_gain_builders() {
        assert_eq!(FilterOp::bass(5.0).unwrap().expression, "bass=g=5");
        assert_eq!(FilterOp::bass(-2.5).unwrap().expression, "bass=g=-2.5");
        assert_eq!(FilterOp::volume(1.5).unwrap().expression, "volume=1.5");
        assert!(FilterOp::volume(-1.0).is_err());
        assert_eq!(FilterOp::normalize().expression, "loudnorm");
    }

    #[test]
    fn test_batch_presets() {
        let ids: Vec<_> = batch_presets().iter().map(|p| p.id).collect();
        assert_eq!(ids, ["slowed-reverb", "nightcore", "deep-slowed"]);

        let slowed = find_batch_preset("slowed-reverb").unwrap();
        assert_eq!(slowed.ops[1], FilterOp::reverb(0.7, 0.3).unwrap());
        assert_eq!(
            build_filter_graph(&find_batch_preset("nightcore").unwrap().ops),
            "atempo=1.25,asetrate=44100*1.25,aresample=44100"
        );
        assert!(find_batch_preset("vaporwave").is_none());
    }
}
