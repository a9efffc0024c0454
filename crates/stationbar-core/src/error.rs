use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("no track is playing")]
    NoTrackPlaying,
    #[error("play loop is already running")]
    AlreadyRunning,
    #[error("audio player has no done stream to hand out")]
    DoneStreamUnavailable,
    /// A catalog call made on behalf of a caller failed.  `op` names the call.
    #[error("{op}: {error:#}")]
    Catalog {
        op: &'static str,
        error: anyhow::Error,
    },
    /// The play loop could not refill its queue and cannot continue.
    #[error("fetch more tracks for '{station}': {error:#}")]
    Refill {
        station: String,
        error: anyhow::Error,
    },
    /// The catalog returned an empty batch while nothing was left to play.
    #[error("station '{station}' has no more tracks")]
    StationExhausted { station: String },
    #[error("audio player closed its done stream")]
    PlayerClosed,
}

impl ControllerError {
    pub(crate) fn catalog(op: &'static str, error: anyhow::Error) -> Self {
        ControllerError::Catalog { op, error }
    }

    /// True for errors that end the play loop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ControllerError::Refill { .. }
                | ControllerError::StationExhausted { .. }
                | ControllerError::PlayerClosed
        )
    }
}
