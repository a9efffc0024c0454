//! UiState — everything the screen shows, plus key handling.
//!
//! The App event loop is the only writer.  Key handling here is pure: it
//! updates what the screen shows and returns the [`Action`] the App should
//! carry out against the controller.

use std::collections::VecDeque;

use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::widgets::ListState;
use stationbar_core::Feedback;
use stationbar_proto::{Narrative, PlaybackProgress, Station, Track};

use crate::action::Action;

const LOG_LINES: usize = 200;

pub struct StationPicker {
    pub stations: Vec<Station>,
    pub list: ListState,
    pub loading: bool,
    pub error: Option<String>,
}

impl StationPicker {
    fn loading() -> Self {
        Self {
            stations: Vec::new(),
            list: ListState::default(),
            loading: true,
            error: None,
        }
    }

    fn selected(&self) -> Option<&Station> {
        self.list.selected().and_then(|i| self.stations.get(i))
    }

    fn move_selection(&mut self, down: bool) {
        if self.stations.is_empty() {
            return;
        }
        let last = self.stations.len() - 1;
        let next = match (self.list.selected(), down) {
            (None, _) => 0,
            (Some(i), true) => (i + 1).min(last),
            (Some(i), false) => i.saturating_sub(1),
        };
        self.list.select(Some(next));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NarrativeView {
    Loading,
    Ready(Narrative),
    Failed(String),
}

pub struct UiState {
    pub station: Station,
    pub now_playing: Option<Track>,
    /// Previously played tracks, oldest first.
    pub history: VecDeque<Track>,
    history_len: usize,
    pub up_next: Vec<Track>,
    pub progress: PlaybackProgress,
    pub paused: bool,
    pub log: VecDeque<String>,
    pub picker: Option<StationPicker>,
    pub narrative: Option<NarrativeView>,
    /// Station name to tune to once the list arrives.
    pending_station: Option<String>,
    pub should_quit: bool,
    /// Set when the play loop died; shown after the terminal is restored.
    pub fatal: Option<String>,
}

impl UiState {
    pub fn new(history_len: usize, start_station: Option<String>) -> Self {
        Self {
            station: Station::none(),
            now_playing: None,
            history: VecDeque::new(),
            history_len,
            up_next: Vec::new(),
            progress: PlaybackProgress::default(),
            paused: false,
            log: VecDeque::new(),
            picker: None,
            narrative: None,
            pending_station: start_station,
            should_quit: false,
            fatal: None,
        }
    }

    pub fn push_log(&mut self, line: String) {
        if self.log.len() >= LOG_LINES {
            self.log.pop_front();
        }
        self.log.push_back(line);
    }

    /// Open the picker in its loading state.  Returns the action that
    /// fetches the list.
    pub fn open_picker(&mut self) -> Action {
        self.picker = Some(StationPicker::loading());
        Action::LoadStations
    }

    // ── controller / player updates ──────────────────────────────────────────

    pub fn on_now_playing(&mut self, track: Track) {
        // Until the fresh queue arrives, drop the track that just started.
        if self.up_next.first().map(|t| &t.track_token) == Some(&track.track_token) {
            self.up_next.remove(0);
        }
        if let Some(prev) = self.now_playing.replace(track) {
            if self.history_len > 0 {
                if self.history.len() >= self.history_len {
                    self.history.pop_front();
                }
                self.history.push_back(prev);
            }
        }
        self.progress = PlaybackProgress::default();
        self.paused = false;
        self.narrative = None;
    }

    pub fn on_up_next(&mut self, up_next: Vec<Track>) {
        self.up_next = up_next;
    }

    pub fn on_station_changed(&mut self, station: Station) {
        self.push_log(format!("Tuned to {}", station.name));
        self.station = station;
    }

    /// A fresher copy of a track we already show (after feedback).
    pub fn on_track_updated(&mut self, track: Track) {
        if let Some(current) = self.now_playing.as_mut() {
            if current.track_token == track.track_token {
                *current = track;
            }
        }
    }

    pub fn on_progress(&mut self, progress: PlaybackProgress) {
        self.progress = progress;
    }

    pub fn on_stations(&mut self, result: Result<Vec<Station>, String>) -> Option<Action> {
        let stations = match result {
            Ok(stations) => stations,
            Err(e) => {
                self.push_log(format!("Could not load stations: {}", e));
                if let Some(picker) = self.picker.as_mut() {
                    picker.loading = false;
                    picker.error = Some(e);
                }
                return None;
            }
        };

        if let Some(wanted) = self.pending_station.take() {
            if let Some(station) = stations
                .iter()
                .find(|s| s.name.eq_ignore_ascii_case(&wanted))
            {
                self.picker = None;
                return Some(Action::SwitchStation(station.clone()));
            }
            self.push_log(format!("No station named '{}'", wanted));
        }

        let picker = self.picker.get_or_insert_with(StationPicker::loading);
        let current = stations.iter().position(|s| *s == self.station);
        picker.loading = false;
        picker.error = None;
        picker.stations = stations;
        picker
            .list
            .select(current.or(if picker.stations.is_empty() { None } else { Some(0) }));
        None
    }

    pub fn on_narrative(&mut self, result: Result<Narrative, String>) {
        // Closed while loading, or the track moved on.
        if self.narrative != Some(NarrativeView::Loading) {
            return;
        }
        self.narrative = Some(match result {
            Ok(n) => NarrativeView::Ready(n),
            Err(e) => NarrativeView::Failed(e),
        });
    }

    pub fn on_loop_exited(&mut self, result: Result<(), String>) {
        if let Err(e) = result {
            self.push_log(format!("Playback stopped: {}", e));
            self.fatal = Some(e);
            self.should_quit = true;
        }
    }

    // ── keys ─────────────────────────────────────────────────────────────────

    pub fn handle_key(&mut self, key: KeyEvent) -> Option<Action> {
        if key.kind == KeyEventKind::Release {
            return None;
        }
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return Some(Action::Quit);
        }

        if self.narrative.is_some() {
            // Any key dismisses the popup.
            self.narrative = None;
            return None;
        }

        if self.picker.is_some() {
            return self.handle_picker_key(key);
        }

        match key.code {
            KeyCode::Char('q') => Some(Action::Quit),
            KeyCode::Char('n') => Some(Action::Skip),
            KeyCode::Char(' ') => {
                self.paused = !self.paused;
                Some(Action::SetPaused(self.paused))
            }
            KeyCode::Char('+') => Some(Action::Feedback(Feedback::Like)),
            KeyCode::Char('-') => Some(Action::Feedback(Feedback::Ban)),
            KeyCode::Char('t') => Some(Action::Feedback(Feedback::Tired)),
            KeyCode::Char('e') => {
                if self.now_playing.is_none() {
                    self.push_log("Nothing is playing".to_string());
                    return None;
                }
                self.narrative = Some(NarrativeView::Loading);
                Some(Action::Explain)
            }
            KeyCode::Char('s') | KeyCode::Esc => Some(self.open_picker()),
            _ => None,
        }
    }

    fn handle_picker_key(&mut self, key: KeyEvent) -> Option<Action> {
        let picker = self.picker.as_mut()?;
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => picker.move_selection(false),
            KeyCode::Down | KeyCode::Char('j') => picker.move_selection(true),
            KeyCode::Enter => {
                let station = picker.selected()?.clone();
                self.picker = None;
                return Some(Action::SwitchStation(station));
            }
            KeyCode::Char('r') if !picker.loading => return Some(self.open_picker()),
            // Nothing to go back to before the first station is picked.
            KeyCode::Esc | KeyCode::Char('s') if self.station.is_selected() => {
                self.picker = None;
            }
            KeyCode::Char('q') => return Some(Action::Quit),
            _ => {}
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn track(token: &str) -> Track {
        Track {
            track_token: token.to_string(),
            title: format!("Song {}", token),
            ..Track::default()
        }
    }

    fn stations() -> Vec<Station> {
        vec![Station::new("1", "Jazz Radio"), Station::new("2", "Ambient Radio")]
    }

    #[test]
    fn test_playback_keys() {
        let mut ui = UiState::new(10, None);
        assert_eq!(ui.handle_key(key(KeyCode::Char('n'))), Some(Action::Skip));
        assert_eq!(
            ui.handle_key(key(KeyCode::Char('+'))),
            Some(Action::Feedback(Feedback::Like))
        );
        assert_eq!(
            ui.handle_key(key(KeyCode::Char('-'))),
            Some(Action::Feedback(Feedback::Ban))
        );
        assert_eq!(
            ui.handle_key(key(KeyCode::Char('t'))),
            Some(Action::Feedback(Feedback::Tired))
        );
        assert_eq!(ui.handle_key(key(KeyCode::Char(' '))), Some(Action::SetPaused(true)));
        assert_eq!(ui.handle_key(key(KeyCode::Char(' '))), Some(Action::SetPaused(false)));
        assert_eq!(ui.handle_key(key(KeyCode::Char('q'))), Some(Action::Quit));
        assert_eq!(
            ui.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(Action::Quit)
        );
    }

    #[test]
    fn test_history_keeps_last_tracks() {
        let mut ui = UiState::new(2, None);
        for token in ["a", "b", "c", "d"] {
            ui.on_now_playing(track(token));
        }
        let history: Vec<_> = ui.history.iter().map(|t| t.track_token.as_str()).collect();
        assert_eq!(history, vec!["b", "c"]);
        assert_eq!(ui.now_playing.as_ref().unwrap().track_token, "d");
    }

    #[test]
    fn test_new_track_resets_pause_and_popup() {
        let mut ui = UiState::new(10, None);
        ui.on_now_playing(track("a"));
        ui.handle_key(key(KeyCode::Char(' ')));
        ui.handle_key(key(KeyCode::Char('e')));
        assert!(ui.paused);

        ui.on_up_next(vec![track("b"), track("c")]);
        ui.on_now_playing(track("b"));
        assert!(!ui.paused);
        assert!(ui.narrative.is_none());
        let up_next: Vec<_> = ui.up_next.iter().map(|t| t.track_token.as_str()).collect();
        assert_eq!(up_next, vec!["c"]);
    }

    #[test]
    fn test_track_update_only_touches_matching_track() {
        let mut ui = UiState::new(10, None);
        ui.on_now_playing(track("a"));

        let mut other = track("b");
        other.rating = stationbar_proto::Rating::Liked;
        ui.on_track_updated(other);
        assert_eq!(ui.now_playing.as_ref().unwrap().rating, stationbar_proto::Rating::Neutral);

        let mut same = track("a");
        same.rating = stationbar_proto::Rating::Banned;
        ui.on_track_updated(same);
        assert_eq!(ui.now_playing.as_ref().unwrap().rating, stationbar_proto::Rating::Banned);
    }

    #[test]
    fn test_explain_needs_a_track() {
        let mut ui = UiState::new(10, None);
        assert_eq!(ui.handle_key(key(KeyCode::Char('e'))), None);
        assert!(ui.narrative.is_none());

        ui.on_now_playing(track("a"));
        assert_eq!(ui.handle_key(key(KeyCode::Char('e'))), Some(Action::Explain));
        assert_eq!(ui.narrative, Some(NarrativeView::Loading));

        ui.on_narrative(Err("dummy".into()));
        assert_eq!(ui.narrative, Some(NarrativeView::Failed("dummy".into())));

        // Any key closes the popup and does nothing else.
        assert_eq!(ui.handle_key(key(KeyCode::Char('n'))), None);
        assert!(ui.narrative.is_none());

        // A late result for a closed popup is dropped.
        ui.on_narrative(Ok(Narrative::default()));
        assert!(ui.narrative.is_none());
    }

    #[test]
    fn test_picker_selects_station() {
        let mut ui = UiState::new(10, None);
        assert_eq!(ui.open_picker(), Action::LoadStations);
        assert_eq!(ui.on_stations(Ok(stations())), None);
        assert_eq!(ui.picker.as_ref().unwrap().list.selected(), Some(0));

        // Cannot leave before a station is chosen.
        ui.handle_key(key(KeyCode::Esc));
        assert!(ui.picker.is_some());

        ui.handle_key(key(KeyCode::Down));
        ui.handle_key(key(KeyCode::Down));
        let action = ui.handle_key(key(KeyCode::Enter));
        assert_eq!(action, Some(Action::SwitchStation(Station::new("2", "Ambient Radio"))));
        assert!(ui.picker.is_none());
    }

    #[test]
    fn test_picker_closes_once_tuned() {
        let mut ui = UiState::new(10, None);
        ui.on_station_changed(Station::new("2", "Ambient Radio"));
        assert_eq!(ui.handle_key(key(KeyCode::Char('s'))), Some(Action::LoadStations));
        ui.on_stations(Ok(stations()));
        // Current station is preselected.
        assert_eq!(ui.picker.as_ref().unwrap().list.selected(), Some(1));

        ui.handle_key(key(KeyCode::Esc));
        assert!(ui.picker.is_none());
    }

    #[test]
    fn test_start_station_by_name() {
        let mut ui = UiState::new(10, Some("jazz radio".into()));
        ui.open_picker();
        let action = ui.on_stations(Ok(stations()));
        assert_eq!(action, Some(Action::SwitchStation(Station::new("1", "Jazz Radio"))));
        assert!(ui.picker.is_none());
    }

    #[test]
    fn test_unknown_start_station_falls_back_to_picker() {
        let mut ui = UiState::new(10, Some("Polka".into()));
        ui.open_picker();
        assert_eq!(ui.on_stations(Ok(stations())), None);
        assert!(ui.picker.is_some());
        assert!(ui.log.back().unwrap().contains("Polka"));
    }

    #[test]
    fn test_station_load_error_allows_retry() {
        let mut ui = UiState::new(10, None);
        ui.open_picker();
        ui.on_stations(Err("dummy".into()));
        let picker = ui.picker.as_ref().unwrap();
        assert!(!picker.loading);
        assert_eq!(picker.error.as_deref(), Some("dummy"));
        assert_eq!(ui.handle_key(key(KeyCode::Enter)), None);
        assert_eq!(ui.handle_key(key(KeyCode::Char('r'))), Some(Action::LoadStations));
    }

    #[test]
    fn test_fatal_loop_exit_quits() {
        let mut ui = UiState::new(10, None);
        ui.on_loop_exited(Ok(()));
        assert!(!ui.should_quit);

        ui.on_loop_exited(Err("station 'x' has no more tracks".into()));
        assert!(ui.should_quit);
        assert_eq!(ui.fatal.as_deref(), Some("station 'x' has no more tracks"));
    }
}
