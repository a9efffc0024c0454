use stationbar_proto::PlaybackProgress;
use thiserror::Error;
use tokio::sync::mpsc;

/// A recoverable failure reported on the done stream.  The player keeps
/// running and accepts the next `update_stream`.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("playback failed: {0}")]
pub struct PlaybackError(pub String);

/// `Ok(())` when the current stream played to the end.
pub type DoneSignal = Result<(), PlaybackError>;

/// Single-stream audio engine driven by the controller.
///
/// All control methods are fire-and-forget.  Each stream receiver can be
/// taken exactly once; a closed done stream means the player is gone for good.
pub trait AudioPlayer: Send + Sync + 'static {
    /// Replace the playback target and start playing it, restarting playback
    /// if something else was loaded.
    fn update_stream(&self, url: &str, gain_db: f64);

    fn play(&self);

    fn pause(&self);

    fn is_playing(&self) -> bool;

    /// Progress of the loaded stream, at least once per second while playing.
    fn take_progress_stream(&self) -> Option<mpsc::Receiver<PlaybackProgress>>;

    fn take_done_stream(&self) -> Option<mpsc::Receiver<DoneSignal>>;
}
