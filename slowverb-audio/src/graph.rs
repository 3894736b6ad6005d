//! Realtime signal graph
//!
//! Holds at most one decoded source and its effect chain:
//!
//! ```text
//! source -> pitch shift -> dry gain ----------------> mix -> output gain
//!                       \-> convolver -> wet gain --/
//! ```
//!
//! All graph state sits behind one mutex. Control calls lock it briefly; the
//! audio callback only tries the lock and writes silence when it is busy.

use crate::effects::{Convolver, Effect, PitchShifter};
use crate::impulse::{ImpulseResponse, DEFAULT_IMPULSE_SECS};
use crate::params::{EffectParameters, PlaybackSettings};
use crate::ramp::GainRamp;
use crate::transport::GraphCommand;
use parking_lot::Mutex;
use slowverb_library::{DecodedAudio, LoadError, Track, TrackLoader, TrackSource, DEFAULT_VOLUME};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Errors from building a chain
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Failed to decode track: {0}")]
    Decode(#[from] LoadError),
    #[error("Decode worker failed: {0}")]
    Worker(String),
}

/// Turns an encoded source into stereo samples
pub trait SourceDecoder: Send + Sync {
    fn decode(&self, source: &TrackSource) -> Result<DecodedAudio, LoadError>;
}

impl SourceDecoder for TrackLoader {
    fn decode(&self, source: &TrackSource) -> Result<DecodedAudio, LoadError> {
        self.load(source)
    }
}

/// Result of [`SignalGraph::load`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadOutcome {
    /// A new chain was built and wired
    Loaded { duration: f64 },
    /// The track already owns the active chain; nothing was rebuilt
    AlreadyActive { duration: f64 },
    /// A newer load or a release happened while decoding; nothing changed
    Superseded,
}

/// One decoded source with its effect chain
struct Chain {
    track_id: String,
    /// Interleaved stereo
    samples: Vec<f32>,
    frames: usize,
    source_rate: u32,
    duration_secs: f64,
    /// Read head in source frames
    position: f64,
    playing: bool,
    pitch: PitchShifter,
    convolver: Convolver,
    dry: GainRamp,
    wet: GainRamp,
    wet_buffer: Vec<f32>,
}

impl Chain {
    fn build(
        track_id: String,
        decoded: DecodedAudio,
        output_rate: u32,
        reverb_secs: f32,
    ) -> Result<Self, LoadError> {
        let frames = decoded.samples.len() / 2;
        if frames == 0 || !decoded.duration_secs.is_finite() || decoded.duration_secs <= 0.0 {
            return Err(LoadError::InvalidDuration);
        }

        let impulse = ImpulseResponse::generate(output_rate, reverb_secs, false);

        Ok(Self {
            track_id,
            samples: decoded.samples,
            frames,
            source_rate: decoded.sample_rate,
            duration_secs: decoded.duration_secs,
            position: 0.0,
            playing: false,
            pitch: PitchShifter::new(output_rate),
            convolver: Convolver::new(impulse),
            dry: GainRamp::new(1.0, output_rate),
            wet: GainRamp::new(0.0, output_rate),
            wet_buffer: Vec::new(),
        })
    }

    /// Take parameters without ramping (fresh chain)
    fn configure(&mut self, params: &EffectParameters) {
        let (dry, wet) = params.mix_gains();
        self.dry.set_immediate(dry);
        self.wet.set_immediate(wet);
        self.pitch.set_cents(params.playback_settings().pitch_cents);
    }

    fn retune(&mut self, params: &EffectParameters) {
        let (dry, wet) = params.mix_gains();
        self.dry.set_target(dry);
        self.wet.set_target(wet);
        self.pitch.set_cents(params.playback_settings().pitch_cents);
    }

    fn playhead_secs(&self) -> f64 {
        (self.position / self.source_rate as f64).min(self.duration_secs)
    }

    fn seek(&mut self, offset_secs: f64) {
        let frame = (offset_secs.max(0.0) * self.source_rate as f64).min(self.frames as f64);
        self.position = frame;
    }

    /// Read the source at the current head into `output` (stereo interleaved)
    fn read_source(&mut self, output: &mut [f32], step: f64) {
        for frame in output.chunks_exact_mut(2) {
            let pos = self.position as usize;
            if !self.playing || pos + 1 >= self.frames {
                if self.playing {
                    tracing::debug!(track = %self.track_id, "source reached end");
                }
                self.playing = false;
                frame[0] = 0.0;
                frame[1] = 0.0;
                continue;
            }

            // Linear interpolation between adjacent frames
            let frac = self.position.fract() as f32;
            let i = pos * 2;
            let (l0, r0, l1, r1) = (
                self.samples[i],
                self.samples[i + 1],
                self.samples[i + 2],
                self.samples[i + 3],
            );
            frame[0] = l0 + frac * (l1 - l0);
            frame[1] = r0 + frac * (r1 - r0);

            self.position += step;
        }
    }
}

/// State shared between control calls and the audio callback
struct GraphShared {
    chain: Option<Chain>,
    params: EffectParameters,
    volume: f32,
    output_rate: u32,
}

impl GraphShared {
    fn render(&mut self, output: &mut [f32]) {
        let volume = self.volume;
        let rate = self.params.playback_settings().playback_rate as f64;
        let output_rate = self.output_rate;

        let Some(chain) = self.chain.as_mut() else {
            output.fill(0.0);
            return;
        };
        if !chain.playing {
            output.fill(0.0);
            return;
        }

        let step = rate * chain.source_rate as f64 / output_rate as f64;
        chain.read_source(output, step);
        chain.pitch.process(output);

        if chain.wet_buffer.len() < output.len() {
            chain.wet_buffer.resize(output.len(), 0.0);
        }
        let wet_buffer = &mut chain.wet_buffer[..output.len()];
        wet_buffer.copy_from_slice(output);
        chain.convolver.process(wet_buffer);

        for (frame, wet) in output.chunks_exact_mut(2).zip(wet_buffer.chunks_exact(2)) {
            let dry_gain = chain.dry.next_gain();
            let wet_gain = chain.wet.next_gain();
            frame[0] = (frame[0] * dry_gain + wet[0] * wet_gain) * volume;
            frame[1] = (frame[1] * dry_gain + wet[1] * wet_gain) * volume;
        }
    }
}

/// Cloneable handle used by the audio output callback
#[derive(Clone)]
pub struct GraphRenderer {
    shared: Arc<Mutex<GraphShared>>,
}

impl GraphRenderer {
    /// Fill an interleaved stereo buffer; writes silence if the graph is busy
    pub fn process(&self, output: &mut [f32]) {
        match self.shared.try_lock() {
            Some(mut shared) => shared.render(output),
            None => output.fill(0.0),
        }
    }
}

/// The realtime effect graph
pub struct SignalGraph {
    shared: Arc<Mutex<GraphShared>>,
    decoder: Arc<dyn SourceDecoder>,
    sample_rate: u32,
    reverb_secs: f32,
    generation: AtomicU64,
    rebuilds: AtomicU64,
}

impl SignalGraph {
    /// Create a graph rendering at `sample_rate`
    pub fn new(decoder: Arc<dyn SourceDecoder>, sample_rate: u32) -> Self {
        Self {
            shared: Arc::new(Mutex::new(GraphShared {
                chain: None,
                params: EffectParameters::default(),
                volume: DEFAULT_VOLUME,
                output_rate: sample_rate,
            })),
            decoder,
            sample_rate,
            reverb_secs: DEFAULT_IMPULSE_SECS,
            generation: AtomicU64::new(0),
            rebuilds: AtomicU64::new(0),
        }
    }

    /// Graph decoding with symphonia at the output rate
    pub fn with_loader(sample_rate: u32) -> Self {
        Self::new(Arc::new(TrackLoader::with_sample_rate(sample_rate)), sample_rate)
    }

    /// Length of the reverb impulse for chains built from now on
    pub fn with_reverb_seconds(mut self, secs: f32) -> Self {
        if secs.is_finite() && secs > 0.0 {
            self.reverb_secs = secs;
        }
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Decode `track` and wire a new chain for it
    ///
    /// The previous chain is released before decoding starts.
    pub async fn load(&self, track: &Track) -> Result<LoadOutcome, GraphError> {
        let generation = {
            let mut shared = self.shared.lock();
            if let Some(chain) = shared.chain.as_ref().filter(|c| c.track_id == track.id) {
                return Ok(LoadOutcome::AlreadyActive {
                    duration: chain.duration_secs,
                });
            }
            if shared.chain.take().is_some() {
                tracing::debug!("released previous chain");
            }
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };

        tracing::info!(track = %track.title, "loading track");

        let decoder = Arc::clone(&self.decoder);
        let source = track.source.clone();
        let track_id = track.id.clone();
        let output_rate = self.sample_rate;
        let reverb_secs = self.reverb_secs;

        let built = tokio::task::spawn_blocking(move || {
            let decoded = decoder.decode(&source)?;
            Chain::build(track_id, decoded, output_rate, reverb_secs)
        })
        .await
        .map_err(|e| GraphError::Worker(e.to_string()))?;

        let mut chain = match built {
            Ok(chain) => chain,
            Err(e) => {
                if self.generation.load(Ordering::SeqCst) != generation {
                    return Ok(LoadOutcome::Superseded);
                }
                tracing::warn!(track = %track.title, "decode failed: {}", e);
                return Err(GraphError::Decode(e));
            }
        };

        let mut shared = self.shared.lock();
        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(track = %track.title, "discarding superseded decode");
            return Ok(LoadOutcome::Superseded);
        }

        chain.configure(&shared.params);
        let duration = chain.duration_secs;
        shared.chain = Some(chain);
        let rebuilds = self.rebuilds.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(track = %track.title, duration, rebuilds, "chain wired");

        Ok(LoadOutcome::Loaded { duration })
    }

    /// Start (or restart) the source at `offset` seconds
    pub fn start(&self, offset: f64) {
        let mut shared = self.shared.lock();
        if let Some(chain) = shared.chain.as_mut() {
            chain.seek(offset);
            chain.playing = true;
        }
    }

    /// Stop the source, keeping the chain
    pub fn stop(&self) {
        let mut shared = self.shared.lock();
        if let Some(chain) = shared.chain.as_mut() {
            chain.playing = false;
        }
    }

    /// Drop the chain and cancel any decode in flight
    pub fn release(&self) {
        let mut shared = self.shared.lock();
        self.generation.fetch_add(1, Ordering::SeqCst);
        if shared.chain.take().is_some() {
            tracing::debug!("chain released");
        }
    }

    /// Output gain, clamped to [0, 1]
    pub fn set_volume(&self, volume: f32) {
        if volume.is_finite() {
            self.shared.lock().volume = volume.clamp(0.0, 1.0);
        }
    }

    pub fn volume(&self) -> f32 {
        self.shared.lock().volume
    }

    /// Retune rate, pitch and wet/dry mix; kept for chains built later
    pub fn apply_effects(&self, params: EffectParameters) {
        let params = params.sanitized();
        let mut shared = self.shared.lock();
        shared.params = params;
        if let Some(chain) = shared.chain.as_mut() {
            chain.retune(&params);
        }
        tracing::debug!(?params, "effects applied");
    }

    /// Run a synchronous transport command
    pub fn execute(&self, command: &GraphCommand) {
        match command {
            GraphCommand::Start { offset } => self.start(*offset),
            GraphCommand::Stop => self.stop(),
            GraphCommand::Release => self.release(),
            GraphCommand::SetVolume(volume) => self.set_volume(*volume),
            // Loads are async and driven by the caller through `load`
            GraphCommand::Load { .. } => {}
        }
    }

    pub fn renderer(&self) -> GraphRenderer {
        GraphRenderer {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Number of chains built so far
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds.load(Ordering::SeqCst)
    }

    pub fn active_track_id(&self) -> Option<String> {
        self.shared.lock().chain.as_ref().map(|c| c.track_id.clone())
    }

    pub fn duration(&self) -> Option<f64> {
        self.shared.lock().chain.as_ref().map(|c| c.duration_secs)
    }

    /// Source read head in seconds
    pub fn playhead(&self) -> Option<f64> {
        self.shared.lock().chain.as_ref().map(Chain::playhead_secs)
    }

    pub fn is_running(&self) -> bool {
        self.shared
            .lock()
            .chain
            .as_ref()
            .is_some_and(|c| c.playing)
    }

    /// Current (dry, wet) gains; the targets when no chain exists
    pub fn gains(&self) -> (f32, f32) {
        let shared = self.shared.lock();
        match shared.chain.as_ref() {
            Some(chain) => (chain.dry.current(), chain.wet.current()),
            None => shared.params.mix_gains(),
        }
    }

    pub fn params(&self) -> EffectParameters {
        self.shared.lock().params
    }

    pub fn playback_settings(&self) -> PlaybackSettings {
        self.shared.lock().params.playback_settings()
    }

    /// Current pitch compensation of the active chain, in cents
    pub fn pitch_cents(&self) -> Option<f32> {
        self.shared.lock().chain.as_ref().map(|c| c.pitch.cents())
    }
}
