//! App — terminal event loop.
//!
//! Architecture:
//! - A `tokio::mpsc` channel carries `AppMessage` events in from background
//!   tasks: the keyboard reader, stream forwarders and finished commands.
//! - The loop draws a frame, then awaits the next message.
//! - [`UiState`] turns keys into [`Action`]s; the App carries each one out
//!   in a spawned task so the loop never waits on the controller.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use ratatui::crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use stationbar_core::{AudioPlayer, CatalogClient, StationController};
use stationbar_proto::{Narrative, PlaybackProgress, Station, Track};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::action::Action;
use crate::app_state::UiState;
use crate::mpv::MpvPlayer;
use crate::pandora::PandoraClient;
use crate::ui;

pub type Controller = StationController<PandoraClient, MpvPlayer>;

const INPUT_POLL: Duration = Duration::from_millis(250);

// ── Internal event bus ────────────────────────────────────────────────────────

enum AppMessage {
    Event(Event),
    NowPlaying(Track),
    UpNext(Vec<Track>),
    TrackUpdated(Track),
    StationChanged(Station),
    Progress(PlaybackProgress),
    Stations(Result<Vec<Station>, String>),
    Narrative(Result<Narrative, String>),
    Log(String),
    PlayLoopExited(Result<(), String>),
}

pub struct App {
    controller: Arc<Controller>,
    state: UiState,
    cancel: CancellationToken,
    /// Feeds the station switcher; spawned on the first pick.
    switch_tx: Option<mpsc::UnboundedSender<Station>>,
}

impl App {
    pub fn new(controller: Arc<Controller>, state: UiState, cancel: CancellationToken) -> Self {
        Self {
            controller,
            state,
            cancel,
            switch_tx: None,
        }
    }

    // ── Main run loop ─────────────────────────────────────────────────────────

    /// Run until the listener quits or the play loop dies.  Returns the fatal
    /// play loop error, if that is why it stopped.
    pub async fn run(mut self, log_rx: broadcast::Receiver<String>) -> anyhow::Result<Option<String>> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let (tx, mut rx) = mpsc::channel::<AppMessage>(1024);
        self.spawn_forwarders(&tx, log_rx).await;

        // ── Background task: keyboard events ──────────────────────────────────
        let event_tx = tx.clone();
        // Polls so it notices the App has gone and lets the runtime shut down.
        tokio::task::spawn_blocking(move || {
            while !event_tx.is_closed() {
                match event::poll(INPUT_POLL) {
                    Ok(false) => continue,
                    Ok(true) => {}
                    Err(_) => break,
                }
                match event::read() {
                    Ok(ev) => {
                        if event_tx.blocking_send(AppMessage::Event(ev)).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        let load = self.state.open_picker();
        self.dispatch(load, &tx);

        let result = self.event_loop(&mut terminal, &mut rx, &tx).await;

        // ── Teardown ──────────────────────────────────────────────────────────
        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result?;
        Ok(self.state.fatal.take())
    }

    async fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
        rx: &mut mpsc::Receiver<AppMessage>,
        tx: &mpsc::Sender<AppMessage>,
    ) -> anyhow::Result<()> {
        loop {
            terminal.draw(|f| ui::draw(f, &mut self.state))?;

            let Some(msg) = rx.recv().await else { break };
            self.handle_message(msg, tx);
            // Apply whatever else queued up before drawing again.
            while let Ok(msg) = rx.try_recv() {
                self.handle_message(msg, tx);
            }

            if self.state.should_quit {
                break;
            }
        }
        Ok(())
    }

    /// Drain the controller and player streams into the message channel.
    async fn spawn_forwarders(&self, tx: &mpsc::Sender<AppMessage>, mut log_rx: broadcast::Receiver<String>) {
        let mut now_playing = self.controller.now_playing_stream().await;
        let np_tx = tx.clone();
        let controller = self.controller.clone();
        tokio::spawn(async move {
            while let Some(track) = now_playing.recv().await {
                if np_tx.send(AppMessage::NowPlaying(track)).await.is_err() {
                    break;
                }
                // Off this task: the play loop may still hold the state lock
                // while it waits for this receiver.
                let controller = controller.clone();
                let tx = np_tx.clone();
                tokio::spawn(async move {
                    let up_next = controller.up_next().await;
                    let _ = tx.send(AppMessage::UpNext(up_next)).await;
                });
            }
        });

        let mut station_changed = self.controller.station_changed_stream().await;
        let sc_tx = tx.clone();
        tokio::spawn(async move {
            while let Some(station) = station_changed.recv().await {
                if sc_tx.send(AppMessage::StationChanged(station)).await.is_err() {
                    break;
                }
            }
        });

        match self.controller.player().take_progress_stream() {
            Some(mut progress) => {
                let pr_tx = tx.clone();
                tokio::spawn(async move {
                    while let Some(p) = progress.recv().await {
                        if pr_tx.send(AppMessage::Progress(p)).await.is_err() {
                            break;
                        }
                    }
                });
            }
            None => warn!("progress stream already taken, progress bar disabled"),
        }

        let log_tx = tx.clone();
        tokio::spawn(async move {
            loop {
                match log_rx.recv().await {
                    Ok(line) => {
                        if log_tx.send(AppMessage::Log(line)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!("log receiver lagged by {} messages", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    // ── Message handler ───────────────────────────────────────────────────────

    fn handle_message(&mut self, msg: AppMessage, tx: &mpsc::Sender<AppMessage>) {
        let action = match msg {
            AppMessage::Event(Event::Key(key)) => self.state.handle_key(key),
            AppMessage::Event(_) => None,
            AppMessage::NowPlaying(track) => {
                self.state.on_now_playing(track);
                None
            }
            AppMessage::UpNext(up_next) => {
                self.state.on_up_next(up_next);
                None
            }
            AppMessage::TrackUpdated(track) => {
                self.state.on_track_updated(track);
                None
            }
            AppMessage::StationChanged(station) => {
                self.state.on_station_changed(station);
                None
            }
            AppMessage::Progress(p) => {
                self.state.on_progress(p);
                None
            }
            AppMessage::Stations(result) => self.state.on_stations(result),
            AppMessage::Narrative(result) => {
                self.state.on_narrative(result);
                None
            }
            AppMessage::Log(line) => {
                self.state.push_log(line);
                None
            }
            AppMessage::PlayLoopExited(result) => {
                self.state.on_loop_exited(result);
                None
            }
        };
        if let Some(action) = action {
            self.dispatch(action, tx);
        }
    }

    // ── Action dispatch ───────────────────────────────────────────────────────

    fn dispatch(&mut self, action: Action, tx: &mpsc::Sender<AppMessage>) {
        debug!("dispatch {:?}", action);
        let controller = self.controller.clone();
        let tx = tx.clone();

        match action {
            Action::Quit => {
                self.cancel.cancel();
                self.state.should_quit = true;
            }
            Action::Skip => controller.skip(),
            Action::SetPaused(true) => controller.player().pause(),
            Action::SetPaused(false) => controller.player().play(),
            Action::Feedback(feedback) => {
                tokio::spawn(async move {
                    match controller.provide_feedback(feedback).await {
                        Ok(()) => {
                            if let Some(track) = controller.now_playing().await {
                                let _ = tx.send(AppMessage::TrackUpdated(track)).await;
                            }
                        }
                        Err(e) => warn!("Feedback failed: {}", e),
                    }
                });
            }
            Action::Explain => {
                tokio::spawn(async move {
                    let result = controller.explain_current_track().await.map_err(|e| e.to_string());
                    let _ = tx.send(AppMessage::Narrative(result)).await;
                });
            }
            Action::LoadStations => {
                tokio::spawn(async move {
                    let result = controller.list_stations().await.map_err(|e| e.to_string());
                    let _ = tx.send(AppMessage::Stations(result)).await;
                });
            }
            Action::SwitchStation(station) => {
                let cancel = self.cancel.clone();
                let switch_tx = self
                    .switch_tx
                    .get_or_insert_with(|| spawn_station_switcher(controller, cancel, tx));
                if switch_tx.send(station).is_err() {
                    warn!("Station switcher is gone, ignoring pick");
                }
            }
        }
    }
}

/// Applies station picks one at a time, in the order they were made, and
/// starts the play loop after the first one.
fn spawn_station_switcher<C, P>(
    controller: Arc<StationController<C, P>>,
    cancel: CancellationToken,
    tx: mpsc::Sender<AppMessage>,
) -> mpsc::UnboundedSender<Station>
where
    C: CatalogClient,
    P: AudioPlayer,
{
    let (switch_tx, mut switch_rx) = mpsc::unbounded_channel::<Station>();
    tokio::spawn(async move {
        let mut loop_started = false;
        while let Some(station) = switch_rx.recv().await {
            controller.switch_station(station).await;
            if loop_started {
                continue;
            }
            loop_started = true;

            let controller = controller.clone();
            let cancel = cancel.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                info!("Starting play loop");
                let result = controller.play(cancel).await.map_err(|e| e.to_string());
                let _ = tx.send(AppMessage::PlayLoopExited(result)).await;
            });
        }
    });
    switch_tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use stationbar_core::DoneSignal;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    struct FakeCatalog;

    impl CatalogClient for FakeCatalog {
        async fn login(&self, _username: &str, _password: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn list_stations(&self) -> anyhow::Result<Vec<Station>> {
            Ok(Vec::new())
        }

        async fn get_more_tracks(&self, station_id: &str) -> anyhow::Result<Vec<Track>> {
            Ok((0..3)
                .map(|i| Track {
                    station_id: station_id.to_string(),
                    track_token: format!("{}-{}", station_id, i),
                    audio_url: format!("https://audio/{}/{}", station_id, i),
                    ..Track::default()
                })
                .collect())
        }

        async fn add_feedback(&self, _track_token: &str, _is_positive: bool) -> anyhow::Result<()> {
            Ok(())
        }

        async fn add_tired(&self, _track_token: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn get_narrative(&self, _station_id: &str, _music_id: &str) -> anyhow::Result<Narrative> {
            Ok(Narrative::default())
        }
    }

    struct QuietPlayer {
        _done_tx: mpsc::Sender<DoneSignal>,
        done_rx: StdMutex<Option<mpsc::Receiver<DoneSignal>>>,
    }

    impl QuietPlayer {
        fn new() -> Arc<Self> {
            let (done_tx, done_rx) = mpsc::channel(1);
            Arc::new(Self {
                _done_tx: done_tx,
                done_rx: StdMutex::new(Some(done_rx)),
            })
        }
    }

    impl AudioPlayer for QuietPlayer {
        fn update_stream(&self, _url: &str, _gain_db: f64) {}
        fn play(&self) {}
        fn pause(&self) {}
        fn is_playing(&self) -> bool {
            true
        }
        fn take_progress_stream(&self) -> Option<mpsc::Receiver<PlaybackProgress>> {
            None
        }
        fn take_done_stream(&self) -> Option<mpsc::Receiver<DoneSignal>> {
            self.done_rx.lock().unwrap().take()
        }
    }

    #[tokio::test]
    async fn test_station_picks_apply_in_order() {
        let controller =
            Arc::new(StationController::new(FakeCatalog, QuietPlayer::new()).unwrap());
        let mut changed = controller.station_changed_stream().await;
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(16);

        let switch_tx = spawn_station_switcher(controller.clone(), cancel.clone(), tx);
        for (id, name) in [("a", "Alpha"), ("b", "Beta"), ("c", "Gamma")] {
            switch_tx.send(Station::new(id, name)).unwrap();
        }

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(timeout(WAIT, changed.recv()).await.unwrap().unwrap().name);
        }
        assert_eq!(seen, vec!["Alpha", "Beta", "Gamma"]);
        assert_eq!(controller.current_station().await.id, "c");

        cancel.cancel();
        match timeout(WAIT, rx.recv()).await.unwrap() {
            Some(AppMessage::PlayLoopExited(result)) => assert_eq!(result, Ok(())),
            _ => panic!("expected the play loop to exit"),
        }
        assert!(!controller.is_running());
    }
}
