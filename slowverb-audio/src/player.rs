//! Player - drives the transport machine and the signal graph together
//!
//! Every control call applies one transport event under the state lock and
//! runs the resulting synchronous graph commands before releasing it. Loads
//! are awaited with no lock held; their completion comes back as another
//! event carrying the request id, so a stale load can never start playback.

use crate::clock::{Clock, SystemClock};
use crate::graph::{GraphError, LoadOutcome, SignalGraph};
use crate::params::EffectParameters;
use crate::transport::{
    GraphCommand, Phase, TransportError, TransportEvent, TransportSnapshot, TransportState,
};
use parking_lot::Mutex;
use slowverb_library::{Track, TrackList};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Default sampling period for [`Player::run_sampler`] (~60 Hz)
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Realtime player
pub struct Player {
    graph: SignalGraph,
    clock: Arc<dyn Clock>,
    state: Mutex<TransportState>,
    snapshot_tx: watch::Sender<TransportSnapshot>,
}

impl Player {
    pub fn new(graph: SignalGraph, clock: Arc<dyn Clock>) -> Self {
        Self::with_volume(graph, clock, slowverb_library::DEFAULT_VOLUME)
    }

    /// Player on the wall clock
    pub fn with_system_clock(graph: SignalGraph) -> Self {
        Self::new(graph, Arc::new(SystemClock))
    }

    pub fn with_volume(graph: SignalGraph, clock: Arc<dyn Clock>, volume: f32) -> Self {
        let state = TransportState::new(volume);
        graph.set_volume(state.volume());
        let (snapshot_tx, _) = watch::channel(state.snapshot());

        Self {
            graph,
            clock,
            state: Mutex::new(state),
            snapshot_tx,
        }
    }

    pub fn graph(&self) -> &SignalGraph {
        &self.graph
    }

    /// Play `track`; returns once it is loaded and started (or the load lost to a newer one)
    pub async fn play(&self, track: Track) -> Result<(), PlayerError> {
        let Some((request, track)) = self.dispatch(TransportEvent::Play(track))? else {
            return Ok(());
        };

        match self.graph.load(&track).await {
            Ok(LoadOutcome::Loaded { duration }) | Ok(LoadOutcome::AlreadyActive { duration }) => {
                self.complete_load(request, &track, duration)
            }
            Ok(LoadOutcome::Superseded) => {
                tracing::debug!(track = %track.title, "load superseded");
                Ok(())
            }
            Err(e) => {
                self.dispatch(TransportEvent::LoadFailed { request })?;
                Err(e.into())
            }
        }
    }

    fn complete_load(&self, request: u64, track: &Track, duration: f64) -> Result<(), PlayerError> {
        let mut state = self.state.lock();
        self.apply_locked(&mut state, TransportEvent::LoadCompleted { request, duration })?;

        // Stopped while the chain was being wired
        if !state.is_active(&track.id)
            && self.graph.active_track_id().as_deref() == Some(track.id.as_str())
        {
            self.graph.release();
        }
        tracing::info!(track = %track.title, duration, "playing");
        Ok(())
    }

    pub fn pause(&self) -> Result<(), PlayerError> {
        self.dispatch(TransportEvent::Pause)?;
        Ok(())
    }

    pub fn resume(&self) -> Result<(), PlayerError> {
        self.dispatch(TransportEvent::Resume)?;
        Ok(())
    }

    /// Pause when playing; resume when paused; restart when ended
    pub fn toggle(&self) -> Result<(), PlayerError> {
        let (phase, track) = {
            let state = self.state.lock();
            (state.phase(), state.active_track().cloned())
        };
        let event = match (phase, track) {
            (Phase::Playing, _) => TransportEvent::Pause,
            (Phase::Paused, _) => TransportEvent::Resume,
            // Same-track play restarts from 0 without reloading
            (Phase::Ended, Some(track)) => TransportEvent::Play(track),
            (_, None) => return Err(TransportError::NoActiveTrack.into()),
            (phase, Some(_)) => {
                return Err(TransportError::InvalidPhase {
                    action: "toggle",
                    phase,
                }
                .into())
            }
        };
        self.dispatch(event)?;
        Ok(())
    }

    pub fn seek(&self, secs: f64) -> Result<(), PlayerError> {
        self.dispatch(TransportEvent::Seek(secs))?;
        Ok(())
    }

    pub fn stop(&self) {
        // Stop is valid in every phase
        let _ = self.dispatch(TransportEvent::Stop);
    }

    pub fn set_volume(&self, volume: f32) {
        let _ = self.dispatch(TransportEvent::SetVolume(volume));
    }

    /// Retune the graph and keep the transport clock in step with the new rate
    pub fn apply_effects(&self, params: EffectParameters) {
        let params = params.sanitized();
        let rate = params.playback_settings().playback_rate;
        let mut state = self.state.lock();
        self.graph.apply_effects(params);
        let _ = self.apply_locked(&mut state, TransportEvent::SetRate(rate));
    }

    /// One position sampling step
    pub fn tick(&self) -> TransportSnapshot {
        let mut state = self.state.lock();
        let _ = self.apply_locked(&mut state, TransportEvent::Tick);
        state.snapshot()
    }

    pub fn snapshot(&self) -> TransportSnapshot {
        self.state.lock().snapshot()
    }

    /// Receive a snapshot after every transport change
    pub fn subscribe(&self) -> watch::Receiver<TransportSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.state.lock().is_active(id)
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().is_playing()
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().phase()
    }

    pub fn active_track(&self) -> Option<Track> {
        self.state.lock().active_track().cloned()
    }

    /// Play the track after the active one (or the first track when idle)
    pub async fn play_next(&self, tracks: &TrackList) -> Result<bool, PlayerError> {
        let next = match self.active_track() {
            Some(active) => tracks.next_after(&active.id),
            None => tracks.first(),
        };
        match next.cloned() {
            Some(track) => self.play(track).await.map(|_| true),
            None => Ok(false),
        }
    }

    /// Play the track before the active one
    pub async fn play_previous(&self, tracks: &TrackList) -> Result<bool, PlayerError> {
        let previous = self
            .active_track()
            .and_then(|active| tracks.previous_before(&active.id).cloned());
        match previous {
            Some(track) => self.play(track).await.map(|_| true),
            None => Ok(false),
        }
    }

    /// Remove a track from the list, stopping playback if it is the active one
    pub fn remove_track(&self, tracks: &mut TrackList, id: &str) -> Option<Track> {
        if self.is_active(id) {
            self.stop();
        }
        tracks.remove(id)
    }

    /// Sample the position every `period` until playback leaves `Playing`
    pub async fn run_sampler(&self, period: Duration) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            if !self.tick().is_playing {
                break;
            }
        }
        tracing::debug!("sampler stopped");
    }

    /// Apply one event and run its synchronous commands; returns a load to start
    fn dispatch(&self, event: TransportEvent) -> Result<Option<(u64, Track)>, TransportError> {
        let mut state = self.state.lock();
        self.apply_locked(&mut state, event)
    }

    fn apply_locked(
        &self,
        state: &mut TransportState,
        event: TransportEvent,
    ) -> Result<Option<(u64, Track)>, TransportError> {
        let transition = state.apply(event, self.clock.now())?;
        *state = transition.state;

        let mut load = None;
        for command in transition.commands {
            match command {
                GraphCommand::Load { request, track } => load = Some((request, track)),
                other => self.graph.execute(&other),
            }
        }

        self.snapshot_tx.send_replace(state.snapshot());
        Ok(load)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::graph::test_support::{graph, track, MockDecoder};

    fn player(decoder: MockDecoder) -> (Player, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let player = Player::new(graph(decoder), clock.clone());
        (player, clock)
    }

    #[tokio::test]
    async fn test_play_starts_graph() {
        let (player, _) = player(MockDecoder::new(8000).track("a.wav", 10.0));
        player.play(track("a.wav")).await.unwrap();

        assert!(player.is_playing());
        assert!(player.is_active("a.wav"));
        assert!(player.graph().is_running());
        assert_eq!(player.snapshot().duration_secs, 10.0);
    }

    #[tokio::test]
    async fn test_failed_load_leaves_idle() {
        let (player, _) = player(MockDecoder::new(8000).track("bad.wav", 0.0));
        let result = player.play(track("bad.wav")).await;

        assert!(matches!(result, Err(PlayerError::Graph(GraphError::Decode(_)))));
        assert_eq!(player.phase(), Phase::Idle);
        assert!(player.active_track().is_none());
        assert!(!player.is_playing());
    }

    #[tokio::test]
    async fn test_scenario_c_seek_past_end_then_sample() {
        let (player, clock) = player(MockDecoder::new(8000).track("a.wav", 10.0));
        player.play(track("a.wav")).await.unwrap();
        clock.advance_secs(3.0);
        player.tick();

        player.seek(15.0).unwrap();
        assert_eq!(player.snapshot().position_secs, 10.0);

        clock.advance_secs(0.016);
        let snapshot = player.tick();
        assert_eq!(snapshot.phase, Phase::Ended);
        assert!(!snapshot.is_playing);
        assert!(!player.graph().is_running());
    }

    #[tokio::test]
    async fn test_pause_resume_keeps_position() {
        let (player, clock) = player(MockDecoder::new(8000).track("a.wav", 10.0));
        player.play(track("a.wav")).await.unwrap();

        clock.advance_secs(4.0);
        player.pause().unwrap();
        assert!(!player.graph().is_running());
        assert_eq!(player.graph().playhead(), Some(0.0));

        clock.advance_secs(30.0);
        player.resume().unwrap();
        assert!(player.graph().is_running());
        assert!((player.graph().playhead().unwrap() - 4.0).abs() < 1e-9);

        clock.advance_secs(1.0);
        assert!((player.tick().position_secs - 5.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_toggle_cycles() {
        let (player, clock) = player(MockDecoder::new(8000).track("a.wav", 2.0));
        assert!(player.toggle().is_err());

        player.play(track("a.wav")).await.unwrap();
        player.toggle().unwrap();
        assert_eq!(player.phase(), Phase::Paused);
        player.toggle().unwrap();
        assert_eq!(player.phase(), Phase::Playing);

        clock.advance_secs(5.0);
        player.tick();
        assert_eq!(player.phase(), Phase::Ended);
        player.toggle().unwrap();
        assert_eq!(player.phase(), Phase::Playing);
        assert_eq!(player.snapshot().position_secs, 0.0);
    }

    #[tokio::test]
    async fn test_stop_releases_graph() {
        let (player, _) = player(MockDecoder::new(8000).track("a.wav", 2.0));
        player.play(track("a.wav")).await.unwrap();
        player.stop();

        assert_eq!(player.phase(), Phase::Idle);
        assert!(player.graph().active_track_id().is_none());
    }

    #[tokio::test]
    async fn test_volume_reaches_graph() {
        let (player, _) = player(MockDecoder::new(8000));
        assert_eq!(player.graph().volume(), slowverb_library::DEFAULT_VOLUME);
        player.set_volume(0.25);
        assert_eq!(player.graph().volume(), 0.25);
        assert_eq!(player.snapshot().volume, 0.25);
    }

    #[tokio::test]
    async fn test_rate_change_scales_clock() {
        let (player, clock) = player(MockDecoder::new(8000).track("a.wav", 60.0));
        player.play(track("a.wav")).await.unwrap();

        player.apply_effects(EffectParameters::new(0.5, 1.0, 0.0, false));
        clock.advance_secs(4.0);
        assert!((player.tick().position_secs - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let (player, _) = player(MockDecoder::new(8000).track("a.wav", 3.0));
        let mut rx = player.subscribe();

        player.play(track("a.wav")).await.unwrap();
        assert!(rx.has_changed().unwrap());
        let snapshot = rx.borrow_and_update().clone();
        assert!(snapshot.is_playing);
        assert_eq!(snapshot.title.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_newer_play_wins() {
        let (player, _) = player(
            MockDecoder::new(8000)
                .track("slow.wav", 5.0)
                .track("fast.wav", 2.0)
                .slow("slow.wav", Duration::from_millis(150)),
        );

        let (first, second) = tokio::join!(player.play(track("slow.wav")), player.play(track("fast.wav")));
        first.unwrap();
        second.unwrap();

        assert!(player.is_active("fast.wav"));
        assert!(player.is_playing());
        assert_eq!(player.graph().active_track_id().as_deref(), Some("fast.wav"));
        assert_eq!(player.snapshot().duration_secs, 2.0);
    }

    #[tokio::test]
    async fn test_track_list_navigation() {
        let (player, _) = player(
            MockDecoder::new(8000)
                .track("a.wav", 1.0)
                .track("b.wav", 1.0)
                .track("c.wav", 1.0),
        );
        let mut tracks = TrackList::new();
        for name in ["a.wav", "b.wav", "c.wav"] {
            tracks.add(track(name));
        }

        assert!(player.play_next(&tracks).await.unwrap());
        assert!(player.is_active("a.wav"));
        assert!(player.play_next(&tracks).await.unwrap());
        assert!(player.is_active("b.wav"));
        assert!(player.play_previous(&tracks).await.unwrap());
        assert!(player.is_active("a.wav"));
        assert!(!player.play_previous(&tracks).await.unwrap());

        let removed = player.remove_track(&mut tracks, "a.wav").unwrap();
        assert_eq!(removed.id, "a.wav");
        assert_eq!(player.phase(), Phase::Idle);
        assert_eq!(tracks.len(), 2);
    }

    #[tokio::test]
    async fn test_sampler_runs_until_end() {
        let graph = graph(MockDecoder::new(8000).track("short.wav", 0.2));
        let player = Player::with_system_clock(graph);
        player.play(track("short.wav")).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), player.run_sampler(Duration::from_millis(10)))
            .await
            .expect("sampler should stop at the end of the track");

        let snapshot = player.snapshot();
        assert_eq!(snapshot.phase, Phase::Ended);
        assert_eq!(snapshot.position_secs, 0.2);
        assert_eq!(snapshot.progress_percent, 100.0);
    }
}
