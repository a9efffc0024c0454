//! Action enum — listener intents produced by key handling, dispatched by the App.

use stationbar_core::Feedback;
use stationbar_proto::Station;

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    // ── Playback ─────────────────────────────────────────────────────────────
    Skip,
    /// `true` pauses, `false` resumes.
    SetPaused(bool),
    Feedback(Feedback),
    Explain,

    // ── Stations ─────────────────────────────────────────────────────────────
    /// Fetch the station list for the picker.
    LoadStations,
    SwitchStation(Station),

    // ── System ───────────────────────────────────────────────────────────────
    Quit,
}
