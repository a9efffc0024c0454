/// StationController — owns the station / queue / now-playing state and runs
/// the play loop.
///
/// ```text
///   switch_station ─┐                         ┌─► now-playing stream
///   provide_feedback├─► Mutex<State> ◄── play loop ──► AudioPlayer::update_stream
///   skip ───────────┘        ▲                ▲
///                            │                └── select { skip | done | cancel }
///                     CatalogClient (refill runs under the lock)
/// ```
///
/// One `tokio::sync::Mutex` guards every piece of mutable state.  The play
/// loop holds it from the refill check through `update_stream` so a station
/// switch can never interleave with a half-started track; a slow refill
/// therefore also delays `switch_station`, feedback and the accessors.  The
/// loop never holds it while waiting for the track to end.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use stationbar_proto::{Narrative, Rating, Station, Track};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Span};

use crate::catalog::CatalogClient;
use crate::error::ControllerError;
use crate::narrative::NarrativeCache;
use crate::player::{AudioPlayer, DoneSignal};
use crate::queue::TrackQueue;


/// Listener feedback on the now-playing track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feedback {
    Like,
    Ban,
    Tired,
}

impl Feedback {
    /// Local rating once the service accepted the feedback.  Tired tracks
    /// have no rating of their own and show as banned.
    pub fn rating(self) -> Rating {
        match self {
            Feedback::Like => Rating::Liked,
            Feedback::Ban | Feedback::Tired => Rating::Banned,
        }
    }

    fn skips(self) -> bool {
        !matches!(self, Feedback::Like)
    }

    fn op(self) -> &'static str {
        match self {
            Feedback::Like => "like track",
            Feedback::Ban => "ban track",
            Feedback::Tired => "mark track tired",
        }
    }
}

struct State {
    station: Station,
    queue: TrackQueue,
    /// Owned copy of the popped track, independent of the queue.
    playing: Option<Track>,
    narrative: NarrativeCache,
    /// Log context, rebuilt on every station switch.
    span: Span,
}

/// Receivers only the running play loop reads.
struct LoopChannels {
    skip_rx: mpsc::Receiver<()>,
    done_rx: mpsc::Receiver<DoneSignal>,
}

pub struct StationController<C, P> {
    catalog: C,
    player: Arc<P>,
    state: Mutex<State>,
    loop_channels: Mutex<LoopChannels>,
    running: AtomicBool,
    skip_tx: mpsc::Sender<()>,
    now_playing_tx: Mutex<Option<mpsc::Sender<Track>>>,
    station_changed_tx: Mutex<Option<mpsc::Sender<Station>>>,
}

fn station_span(station: &Station) -> Span {
    info_span!("station_controller", station = %station.name)
}

/// Clears the running flag however the play loop exits.
struct RunningFlag<'a>(&'a AtomicBool);

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<C, P> StationController<C, P>
where
    C: CatalogClient,
    P: AudioPlayer,
{
    /// Takes the player's done stream; fails if someone already took it.
    pub fn new(catalog: C, player: Arc<P>) -> Result<Self, ControllerError> {
        let done_rx = player
            .take_done_stream()
            .ok_or(ControllerError::DoneStreamUnavailable)?;
        let (skip_tx, skip_rx) = mpsc::channel(1);
        let station = Station::none();

        Ok(Self {
            catalog,
            player,
            state: Mutex::new(State {
                span: station_span(&station),
                station,
                queue: TrackQueue::new(),
                playing: None,
                narrative: NarrativeCache::default(),
            }),
            loop_channels: Mutex::new(LoopChannels { skip_rx, done_rx }),
            running: AtomicBool::new(false),
            skip_tx,
            now_playing_tx: Mutex::new(None),
            station_changed_tx: Mutex::new(None),
        })
    }

    pub fn player(&self) -> &Arc<P> {
        &self.player
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // ── notification streams ─────────────────────────────────────────────────

    /// Receiver for tracks as they start.  Capacity 1: the play loop waits
    /// for the slot to free up, so the receiver must be drained promptly.
    /// Calling this again replaces the previous receiver.
    pub async fn now_playing_stream(&self) -> mpsc::Receiver<Track> {
        let (tx, rx) = mpsc::channel(1);
        *self.now_playing_tx.lock().await = Some(tx);
        rx
    }

    /// Receiver for station switches, same delivery rules as
    /// [`now_playing_stream`](Self::now_playing_stream).
    pub async fn station_changed_stream(&self) -> mpsc::Receiver<Station> {
        let (tx, rx) = mpsc::channel(1);
        *self.station_changed_tx.lock().await = Some(tx);
        rx
    }

    // ── accessors ────────────────────────────────────────────────────────────

    pub async fn now_playing(&self) -> Option<Track> {
        self.state.lock().await.playing.clone()
    }

    pub async fn up_next(&self) -> Vec<Track> {
        self.state.lock().await.queue.snapshot()
    }

    pub async fn current_station(&self) -> Station {
        self.state.lock().await.station.clone()
    }

    pub async fn list_stations(&self) -> Result<Vec<Station>, ControllerError> {
        self.catalog
            .list_stations()
            .await
            .map_err(|e| ControllerError::catalog("list stations", e))
    }

    // ── commands ─────────────────────────────────────────────────────────────

    pub async fn switch_station(&self, station: Station) {
        let mut state = self.state.lock().await;
        if state.station == station {
            info!(parent: &state.span, "Already tuned to {}, nothing to switch", station.name);
            return;
        }

        info!(parent: &state.span, new_station = %station.name, "Switching stations");

        // Clearing the queue makes the next loop iteration refill from the
        // new station.
        state.station = station.clone();
        state.queue.clear();
        self.skip();
        state.span = station_span(&station);

        publish(&self.station_changed_tx, station).await;
    }

    /// Abandon the current track.  Does nothing unless the play loop runs.
    pub fn skip(&self) {
        if !self.is_running() {
            return;
        }
        self.player.pause();
        if self.skip_tx.try_send(()).is_err() {
            debug!("skip already pending, dropping request");
        }
    }

    pub async fn provide_feedback(&self, feedback: Feedback) -> Result<(), ControllerError> {
        let (track, span) = {
            let state = self.state.lock().await;
            let track = state
                .playing
                .clone()
                .ok_or(ControllerError::NoTrackPlaying)?;
            (track, state.span.clone())
        };

        let rating = feedback.rating();
        if track.rating == rating {
            warn!(parent: &span, track = %track, ?feedback, "Track already rated, ignoring");
            return Ok(());
        }

        info!(parent: &span, track = %track, ?feedback, "Sending feedback");
        let sent = match feedback {
            Feedback::Tired => self.catalog.add_tired(&track.track_token).await,
            Feedback::Like => self.catalog.add_feedback(&track.track_token, true).await,
            Feedback::Ban => self.catalog.add_feedback(&track.track_token, false).await,
        };
        sent.map_err(|e| ControllerError::catalog(feedback.op(), e))?;

        // Skip while still holding the lock: the skip must hit the rated track.
        let mut state = self.state.lock().await;
        match state.playing.as_mut() {
            Some(playing) if playing.track_token == track.track_token => {
                playing.rating = rating;
                if feedback.skips() {
                    self.skip();
                }
            }
            _ => debug!(parent: &span, track = %track, "Track changed while feedback was in flight"),
        }
        Ok(())
    }

    pub async fn explain_current_track(&self) -> Result<Narrative, ControllerError> {
        let (station_id, music_id, span) = {
            let state = self.state.lock().await;
            let track = state.playing.as_ref().ok_or(ControllerError::NoTrackPlaying)?;
            if let Some(narrative) = state.narrative.get(&track.station_id, &track.music_id) {
                debug!(parent: &state.span, music_id = %track.music_id, "Narrative cache hit");
                return Ok(narrative.clone());
            }
            (
                track.station_id.clone(),
                track.music_id.clone(),
                state.span.clone(),
            )
        };

        info!(parent: &span, music_id = %music_id, "Fetching track narrative");
        let narrative = self
            .catalog
            .get_narrative(&station_id, &music_id)
            .await
            .map_err(|e| ControllerError::catalog("fetch narrative", e))?;

        self.state
            .lock()
            .await
            .narrative
            .store(station_id, music_id, narrative.clone());
        Ok(narrative)
    }

    // ── play loop ────────────────────────────────────────────────────────────

    /// Play the current station until `cancel` fires.
    ///
    /// Returns `Ok(())` on cancellation, or straight away when no station is
    /// selected.  Errors returned from here are fatal to the loop
    /// ([`ControllerError::is_fatal`]); the caller decides whether to exit,
    /// retry or ask the listener.
    pub async fn play(&self, cancel: CancellationToken) -> Result<(), ControllerError> {
        let mut guard = self
            .loop_channels
            .try_lock()
            .map_err(|_| ControllerError::AlreadyRunning)?;
        let LoopChannels { skip_rx, done_rx } = &mut *guard;

        {
            let state = self.state.lock().await;
            if !state.station.is_selected() {
                error!(parent: &state.span, "No station selected, nothing to play");
                return Ok(());
            }
        }

        // Leftovers from a previous run must not skip the first track.
        while skip_rx.try_recv().is_ok() {}
        while done_rx.try_recv().is_ok() {}

        self.running.store(true, Ordering::SeqCst);
        let _running = RunningFlag(&self.running);

        loop {
            let span = {
                let mut state = self.state.lock().await;
                self.start_next_track(&mut state).await?;
                state.span.clone()
            };

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!(parent: &span, "Play loop cancelled");
                    return Ok(());
                }
                _ = skip_rx.recv() => {
                    info!(parent: &span, "Skipping to next track");
                }
                done = done_rx.recv() => match done {
                    Some(Ok(())) => debug!(parent: &span, "Track finished"),
                    Some(Err(e)) => error!(parent: &span, error = %e, "Error during playback"),
                    None => {
                        error!(parent: &span, "Audio player went away");
                        return Err(ControllerError::PlayerClosed);
                    }
                },
            }
        }
    }

    /// Refill if needed, pop the next track, announce it and hand it to the
    /// player.  Runs with the state lock held.
    async fn start_next_track(&self, state: &mut State) -> Result<(), ControllerError> {
        if state.queue.needs_refill() {
            info!(parent: &state.span, remaining = state.queue.len(), "Fetching more tracks");
            let batch = self
                .catalog
                .get_more_tracks(&state.station.id)
                .await
                .map_err(|error| ControllerError::Refill {
                    station: state.station.name.clone(),
                    error,
                })?;
            debug!(parent: &state.span, count = batch.len(), "Fetched tracks");
            state.queue.extend(batch);
        }

        let track = state
            .queue
            .pop()
            .ok_or_else(|| ControllerError::StationExhausted {
                station: state.station.name.clone(),
            })?;

        info!(parent: &state.span, track = %track, "Playing new track");
        state.playing = Some(track.clone());

        // Observers hear about the track before the player starts it.
        let (url, gain) = (track.audio_url.clone(), track.gain_db);
        publish(&self.now_playing_tx, track).await;
        self.player.update_stream(&url, gain);
        Ok(())
    }
}

/// Send to the current subscriber, if any, waiting for the single slot.
async fn publish<T>(slot: &Mutex<Option<mpsc::Sender<T>>>, value: T) {
    let tx = slot.lock().await.clone();
    if let Some(tx) = tx {
        if tx.send(value).await.is_err() {
            debug!("notification receiver dropped");
        }
    }
}
