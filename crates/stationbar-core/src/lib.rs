//! Station playback core.
//!
//! [`StationController`] owns the current station, the upcoming-track queue
//! and the now-playing slot, drives the play loop against an
//! [`AudioPlayer`], and refills the queue from a [`CatalogClient`].
//! Observers read now-playing / station-changed notifications from the
//! controller and progress straight from the player.

pub mod catalog;
pub mod controller;
pub mod error;
pub mod narrative;
pub mod player;
pub mod queue;

#[cfg(test)]
mod test_support;

pub use catalog::CatalogClient;
pub use controller::{Feedback, StationController};
pub use error::ControllerError;
pub use player::{AudioPlayer, DoneSignal, PlaybackError};
