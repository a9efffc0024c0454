//! Types shared between the playback core and the terminal client: the
//! service data model, on-disk configuration and platform paths.

pub mod config;
pub mod model;
pub mod platform;

pub use model::{AudioFormat, Narrative, PlaybackProgress, Rating, Station, Track};
