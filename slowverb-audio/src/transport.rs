//! Transport clock state machine
//!
//! Pure: [`TransportState::apply`] takes an event and the current time and
//! returns the next state plus the graph commands that make the audio follow.
//! Position while playing is anchored to the clock, never to tick counts:
//! `position = offset + (now - anchor) * rate`.

use slowverb_library::{Track, DEFAULT_VOLUME};
use std::fmt;
use std::time::Instant;
use thiserror::Error;

/// Playback phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Ended,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Loading => "loading",
            Phase::Playing => "playing",
            Phase::Paused => "paused",
            Phase::Ended => "ended",
        };
        f.pad(name)
    }
}

/// Inputs to the transport
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Play(Track),
    LoadCompleted { request: u64, duration: f64 },
    LoadFailed { request: u64 },
    Pause,
    Resume,
    Seek(f64),
    Stop,
    SetVolume(f32),
    SetRate(f32),
    /// Position sampling step
    Tick,
}

/// Work for the signal graph
#[derive(Debug, Clone)]
pub enum GraphCommand {
    /// Decode and wire `track`; completion comes back as `LoadCompleted`
    Load { request: u64, track: Track },
    Start { offset: f64 },
    Stop,
    Release,
    SetVolume(f32),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("No track is active")]
    NoActiveTrack,
    #[error("Cannot {action} while {phase}")]
    InvalidPhase { action: &'static str, phase: Phase },
    #[error("Invalid seek target: {0}")]
    InvalidSeek(f64),
}

/// Result of applying an event
#[derive(Debug, Clone)]
pub struct Transition {
    pub state: TransportState,
    pub commands: Vec<GraphCommand>,
}

/// Transport state
#[derive(Debug, Clone)]
pub struct TransportState {
    active_track: Option<Track>,
    phase: Phase,
    position_secs: f64,
    duration_secs: f64,
    volume: f32,
    rate: f64,
    /// Clock reading when playback last (re)started
    anchor: Option<Instant>,
    /// Position at `anchor`
    offset_secs: f64,
    last_request: u64,
    pending_request: Option<u64>,
}

impl Default for TransportState {
    fn default() -> Self {
        Self::new(DEFAULT_VOLUME)
    }
}

impl TransportState {
    pub fn new(volume: f32) -> Self {
        Self {
            active_track: None,
            phase: Phase::Idle,
            position_secs: 0.0,
            duration_secs: 0.0,
            volume: sanitize_volume(volume).unwrap_or(DEFAULT_VOLUME),
            rate: 1.0,
            anchor: None,
            offset_secs: 0.0,
            last_request: 0,
            pending_request: None,
        }
    }

    /// Compute the state after `event` at time `now`
    pub fn apply(&self, event: TransportEvent, now: Instant) -> Result<Transition, TransportError> {
        let mut next = self.clone();
        let commands = next.reduce(event, now)?;
        Ok(Transition {
            state: next,
            commands,
        })
    }

    fn reduce(&mut self, event: TransportEvent, now: Instant) -> Result<Vec<GraphCommand>, TransportError> {
        match event {
            TransportEvent::Play(track) => Ok(self.play(track, now)),
            TransportEvent::LoadCompleted { request, duration } => {
                if self.phase != Phase::Loading || self.pending_request != Some(request) {
                    tracing::debug!(request, "ignoring stale load completion");
                    return Ok(Vec::new());
                }
                let duration = if duration.is_finite() { duration.max(0.0) } else { 0.0 };
                self.duration_secs = duration;
                if let Some(track) = self.active_track.as_mut() {
                    track.duration_secs = Some(duration);
                }
                self.pending_request = None;
                self.start_at(0.0, now);
                Ok(vec![GraphCommand::Start { offset: 0.0 }])
            }
            TransportEvent::LoadFailed { request } => {
                if self.phase == Phase::Loading && self.pending_request == Some(request) {
                    self.clear();
                }
                Ok(Vec::new())
            }
            TransportEvent::Pause => match self.phase {
                Phase::Playing => {
                    let elapsed = self.elapsed(now);
                    self.offset_secs = elapsed;
                    self.position_secs = elapsed;
                    self.anchor = None;
                    self.phase = Phase::Paused;
                    Ok(vec![GraphCommand::Stop])
                }
                phase => Err(self.phase_error("pause", phase)),
            },
            TransportEvent::Resume => match self.phase {
                Phase::Paused => {
                    let offset = self.offset_secs;
                    self.start_at(offset, now);
                    Ok(vec![GraphCommand::Start { offset }])
                }
                phase => Err(self.phase_error("resume", phase)),
            },
            TransportEvent::Seek(target) => self.seek(target, now),
            TransportEvent::Stop => {
                self.clear();
                Ok(vec![GraphCommand::Release])
            }
            TransportEvent::SetVolume(volume) => match sanitize_volume(volume) {
                Some(volume) => {
                    self.volume = volume;
                    Ok(vec![GraphCommand::SetVolume(volume)])
                }
                None => Ok(Vec::new()),
            },
            TransportEvent::SetRate(rate) => {
                let rate = rate as f64;
                if !(rate.is_finite() && rate > 0.0) {
                    return Ok(Vec::new());
                }
                if self.phase == Phase::Playing {
                    // Fold time played at the old rate into the offset
                    self.offset_secs = self.elapsed(now);
                    self.position_secs = self.offset_secs;
                    self.anchor = Some(now);
                }
                self.rate = rate;
                Ok(Vec::new())
            }
            TransportEvent::Tick => {
                if self.phase != Phase::Playing {
                    return Ok(Vec::new());
                }
                let elapsed = self.elapsed(now);
                self.position_secs = elapsed;
                if elapsed >= self.duration_secs {
                    self.offset_secs = self.duration_secs;
                    self.anchor = None;
                    self.phase = Phase::Ended;
                    return Ok(vec![GraphCommand::Stop]);
                }
                Ok(Vec::new())
            }
        }
    }

    fn play(&mut self, track: Track, now: Instant) -> Vec<GraphCommand> {
        if self.is_active(&track.id) {
            return match self.phase {
                Phase::Paused => {
                    let offset = self.offset_secs;
                    self.start_at(offset, now);
                    vec![GraphCommand::Start { offset }]
                }
                Phase::Ended => {
                    self.start_at(0.0, now);
                    vec![GraphCommand::Start { offset: 0.0 }]
                }
                Phase::Playing | Phase::Loading | Phase::Idle => Vec::new(),
            };
        }

        self.last_request += 1;
        let request = self.last_request;
        self.pending_request = Some(request);
        self.duration_secs = track
            .duration_secs
            .filter(|d| d.is_finite() && *d > 0.0)
            .unwrap_or(0.0);
        self.position_secs = 0.0;
        self.offset_secs = 0.0;
        self.anchor = None;
        self.phase = Phase::Loading;
        self.active_track = Some(track.clone());

        vec![GraphCommand::Load { request, track }]
    }

    fn seek(&mut self, target: f64, now: Instant) -> Result<Vec<GraphCommand>, TransportError> {
        if !target.is_finite() {
            return Err(TransportError::InvalidSeek(target));
        }

        // Idle has a zero duration, so the position stays at 0
        let target = target.clamp(0.0, self.duration_secs);
        self.position_secs = target;
        self.offset_secs = target;

        match self.phase {
            Phase::Playing => {
                self.anchor = Some(now);
                Ok(vec![GraphCommand::Stop, GraphCommand::Start { offset: target }])
            }
            Phase::Ended => {
                self.phase = Phase::Paused;
                Ok(Vec::new())
            }
            _ => Ok(Vec::new()),
        }
    }

    fn start_at(&mut self, offset: f64, now: Instant) {
        self.offset_secs = offset;
        self.position_secs = offset;
        self.anchor = Some(now);
        self.phase = Phase::Playing;
    }

    fn clear(&mut self) {
        self.active_track = None;
        self.phase = Phase::Idle;
        self.position_secs = 0.0;
        self.duration_secs = 0.0;
        self.offset_secs = 0.0;
        self.anchor = None;
        self.pending_request = None;
    }

    fn phase_error(&self, action: &'static str, phase: Phase) -> TransportError {
        if self.active_track.is_none() {
            TransportError::NoActiveTrack
        } else {
            TransportError::InvalidPhase { action, phase }
        }
    }

    /// Clock-anchored position, clamped to the duration
    fn elapsed(&self, now: Instant) -> f64 {
        let running = self
            .anchor
            .map(|anchor| now.saturating_duration_since(anchor).as_secs_f64() * self.rate)
            .unwrap_or(0.0);
        (self.offset_secs + running).clamp(0.0, self.duration_secs)
    }

    pub fn active_track(&self) -> Option<&Track> {
        self.active_track.as_ref()
    }

    /// True if `id` is the active track
    pub fn is_active(&self, id: &str) -> bool {
        self.active_track.as_ref().is_some_and(|t| t.id == id)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_playing(&self) -> bool {
        self.phase == Phase::Playing && self.active_track.is_some()
    }

    pub fn position_secs(&self) -> f64 {
        self.position_secs
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Request id of the load in flight, if any
    pub fn pending_request(&self) -> Option<u64> {
        self.pending_request
    }

    pub fn progress_percent(&self) -> f64 {
        progress_percent(self.position_secs, self.duration_secs)
    }

    pub fn time_remaining(&self) -> f64 {
        (self.duration_secs - self.position_secs).max(0.0)
    }

    pub fn snapshot(&self) -> TransportSnapshot {
        TransportSnapshot::from(self)
    }
}

fn sanitize_volume(volume: f32) -> Option<f32> {
    volume.is_finite().then(|| volume.clamp(0.0, 1.0))
}

/// `100 * position / duration`, or 0 without a duration
pub fn progress_percent(position: f64, duration: f64) -> f64 {
    if duration > 0.0 && duration.is_finite() {
        (100.0 * position / duration).clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Format seconds as `M:SS`; non-finite or negative input gives `0:00`
pub fn format_time(secs: f64) -> String {
    if !secs.is_finite() || secs < 0.0 {
        return "0:00".to_string();
    }
    let total = secs.floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

/// What a display needs to show the transport
#[derive(Debug, Clone, PartialEq)]
pub struct TransportSnapshot {
    pub track_id: Option<String>,
    pub title: Option<String>,
    pub phase: Phase,
    pub is_playing: bool,
    pub position_secs: f64,
    pub duration_secs: f64,
    pub volume: f32,
    pub progress_percent: f64,
    pub time_remaining_secs: f64,
    pub formatted_position: String,
    pub formatted_duration: String,
    pub formatted_remaining: String,
}

impl From<&TransportState> for TransportSnapshot {
    fn from(state: &TransportState) -> Self {
        let remaining = state.time_remaining();
        Self {
            track_id: state.active_track.as_ref().map(|t| t.id.clone()),
            title: state.active_track.as_ref().map(|t| t.title.clone()),
            phase: state.phase,
            is_playing: state.is_playing(),
            position_secs: state.position_secs,
            duration_secs: state.duration_secs,
            volume: state.volume,
            progress_percent: state.progress_percent(),
            time_remaining_secs: remaining,
            formatted_position: format_time(state.position_secs),
            formatted_duration: format_time(state.duration_secs),
            formatted_remaining: format_time(remaining),
        }
    }
}

impl Default for TransportSnapshot {
    fn default() -> Self {
        TransportState::default().snapshot()
    }
}
