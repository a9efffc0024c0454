use std::future::Future;

use stationbar_proto::{Narrative, Station, Track};

/// Remote music catalog the controller pulls stations and tracks from and
/// pushes listener feedback to.
///
/// Implementations wrap their own transport errors; the controller adds the
/// name of the operation that failed.
pub trait CatalogClient: Send + Sync + 'static {
    fn login(&self, username: &str, password: &str)
        -> impl Future<Output = anyhow::Result<()>> + Send;

    fn list_stations(&self) -> impl Future<Output = anyhow::Result<Vec<Station>>> + Send;

    /// Next batch of tracks for `station_id`.  An empty batch is valid.
    fn get_more_tracks(
        &self,
        station_id: &str,
    ) -> impl Future<Output = anyhow::Result<Vec<Track>>> + Send;

    fn add_feedback(
        &self,
        track_token: &str,
        is_positive: bool,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Shelve a track for a while ("tired of this song").
    fn add_tired(&self, track_token: &str) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn get_narrative(
        &self,
        station_id: &str,
        music_id: &str,
    ) -> impl Future<Output = anyhow::Result<Narrative>> + Send;
}
