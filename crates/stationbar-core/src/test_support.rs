//! In-memory catalog and player doubles for controller tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use stationbar_proto::{Narrative, PlaybackProgress, Rating, Station, Track};
use tokio::sync::{mpsc, oneshot};

use crate::catalog::CatalogClient;
use crate::player::{AudioPlayer, DoneSignal};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id(prefix: &str) -> String {
    format!("{}-{}", prefix, NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

pub fn make_station(name: &str) -> Station {
    Station::new(next_id("station"), name)
}

/// A track with unique ids, playing from `url`.
pub fn make_track(url: &str) -> Track {
    Track {
        music_id: next_id("music"),
        pandora_id: next_id("pandora"),
        station_id: next_id("station"),
        track_token: next_id("token"),
        audio_url: url.to_string(),
        gain_db: 1.23,
        length_secs: 123,
        title: "Testing".to_string(),
        artist: "Stationbar".to_string(),
        album: "A New Era".to_string(),
        rating: Rating::Neutral,
        ..Track::default()
    }
}

// ── catalog ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum CatalogCall {
    Login(String),
    ListStations,
    GetMoreTracks(String),
    AddFeedback(String, bool),
    AddTired(String),
    GetNarrative(String, String),
}

/// Scripted catalog.  Batches are handed out in order; once they run out
/// every fetch returns an empty batch.
#[derive(Default)]
pub struct MockCatalog {
    calls: Mutex<Vec<CatalogCall>>,
    batches: Mutex<VecDeque<anyhow::Result<Vec<Track>>>>,
    stations: Mutex<Vec<Station>>,
    narrative: Mutex<Option<Narrative>>,
    fail_feedback: AtomicBool,
    feedback_gate: Mutex<Option<FeedbackGate>>,
}

/// Parks the next feedback call until the test releases it.
struct FeedbackGate {
    entered: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
}

impl MockCatalog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_batches(batches: Vec<Vec<Track>>) -> Arc<Self> {
        let catalog = Self::default();
        catalog
            .batches
            .lock()
            .unwrap()
            .extend(batches.into_iter().map(Ok));
        Arc::new(catalog)
    }

    pub fn push_batch(&self, batch: anyhow::Result<Vec<Track>>) {
        self.batches.lock().unwrap().push_back(batch);
    }

    pub fn set_stations(&self, stations: Vec<Station>) {
        *self.stations.lock().unwrap() = stations;
    }

    /// `None` makes narrative fetches fail with "dummy".
    pub fn set_narrative(&self, narrative: Option<Narrative>) {
        *self.narrative.lock().unwrap() = narrative;
    }

    pub fn fail_feedback(&self, fail: bool) {
        self.fail_feedback.store(fail, Ordering::SeqCst);
    }

    /// Hold the next `add_feedback` / `add_tired` call.  The first receiver
    /// fires once the call is in flight; sending on the returned sender lets
    /// it finish.
    pub fn hold_feedback(&self) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        *self.feedback_gate.lock().unwrap() = Some(FeedbackGate {
            entered: entered_tx,
            release: release_rx,
        });
        (entered_rx, release_tx)
    }

    async fn pass_feedback_gate(&self) -> anyhow::Result<()> {
        let gate = self.feedback_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.entered.send(());
            let _ = gate.release.await;
        }
        if self.fail_feedback.load(Ordering::SeqCst) {
            anyhow::bail!("dummy");
        }
        Ok(())
    }

    pub fn calls(&self) -> Vec<CatalogCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&CatalogCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(*c)).count()
    }

    fn record(&self, call: CatalogCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl CatalogClient for Arc<MockCatalog> {
    async fn login(&self, username: &str, _password: &str) -> anyhow::Result<()> {
        self.record(CatalogCall::Login(username.to_string()));
        Ok(())
    }

    async fn list_stations(&self) -> anyhow::Result<Vec<Station>> {
        self.record(CatalogCall::ListStations);
        Ok(self.stations.lock().unwrap().clone())
    }

    async fn get_more_tracks(&self, station_id: &str) -> anyhow::Result<Vec<Track>> {
        self.record(CatalogCall::GetMoreTracks(station_id.to_string()));
        self.batches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn add_feedback(&self, track_token: &str, is_positive: bool) -> anyhow::Result<()> {
        self.record(CatalogCall::AddFeedback(track_token.to_string(), is_positive));
        self.pass_feedback_gate().await
    }

    async fn add_tired(&self, track_token: &str) -> anyhow::Result<()> {
        self.record(CatalogCall::AddTired(track_token.to_string()));
        self.pass_feedback_gate().await
    }

    async fn get_narrative(&self, station_id: &str, music_id: &str) -> anyhow::Result<Narrative> {
        self.record(CatalogCall::GetNarrative(
            station_id.to_string(),
            music_id.to_string(),
        ));
        self.narrative
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("dummy"))
    }
}

// ── player ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCall {
    UpdateStream(String),
    Play,
    Pause,
}

type UpdateHook = Box<dyn FnMut(&str) + Send>;

pub struct MockPlayer {
    calls: Mutex<Vec<PlayerCall>>,
    playing: AtomicBool,
    done_tx: Mutex<Option<mpsc::Sender<DoneSignal>>>,
    done_rx: Mutex<Option<mpsc::Receiver<DoneSignal>>>,
    progress_rx: Mutex<Option<mpsc::Receiver<PlaybackProgress>>>,
    on_update: Mutex<Option<UpdateHook>>,
}

impl MockPlayer {
    pub fn new() -> Arc<Self> {
        let (done_tx, done_rx) = mpsc::channel(4);
        let (_progress_tx, progress_rx) = mpsc::channel(1);
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            playing: AtomicBool::new(false),
            done_tx: Mutex::new(Some(done_tx)),
            done_rx: Mutex::new(Some(done_rx)),
            progress_rx: Mutex::new(Some(progress_rx)),
            on_update: Mutex::new(None),
        })
    }

    /// Run `hook` with the URL every time `update_stream` is called.
    pub fn on_update(&self, hook: impl FnMut(&str) + Send + 'static) {
        *self.on_update.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn done_sender(&self) -> mpsc::Sender<DoneSignal> {
        self.done_tx
            .lock()
            .unwrap()
            .clone()
            .expect("done stream already closed")
    }

    /// Drop the player's end of the done stream.
    pub fn close_done(&self) {
        self.done_tx.lock().unwrap().take();
    }

    pub fn calls(&self) -> Vec<PlayerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn played(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                PlayerCall::UpdateStream(url) => Some(url),
                _ => None,
            })
            .collect()
    }
}

impl AudioPlayer for MockPlayer {
    fn update_stream(&self, url: &str, _gain_db: f64) {
        self.calls
            .lock()
            .unwrap()
            .push(PlayerCall::UpdateStream(url.to_string()));
        self.playing.store(true, Ordering::SeqCst);
        if let Some(hook) = self.on_update.lock().unwrap().as_mut() {
            hook(url);
        }
    }

    fn play(&self) {
        self.calls.lock().unwrap().push(PlayerCall::Play);
        self.playing.store(true, Ordering::SeqCst);
    }

    fn pause(&self) {
        self.calls.lock().unwrap().push(PlayerCall::Pause);
        self.playing.store(false, Ordering::SeqCst);
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn take_progress_stream(&self) -> Option<mpsc::Receiver<PlaybackProgress>> {
        self.progress_rx.lock().unwrap().take()
    }

    fn take_done_stream(&self) -> Option<mpsc::Receiver<DoneSignal>> {
        self.done_rx.lock().unwrap().take()
    }
}
