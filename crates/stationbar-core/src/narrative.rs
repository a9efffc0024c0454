use stationbar_proto::Narrative;

/// Holds the narrative for exactly one (station, track) pair.
#[derive(Debug, Default)]
pub struct NarrativeCache {
    entry: Option<Entry>,
}

#[derive(Debug)]
struct Entry {
    station_id: String,
    music_id: String,
    narrative: Narrative,
}

impl NarrativeCache {
    pub fn get(&self, station_id: &str, music_id: &str) -> Option<&Narrative> {
        self.entry
            .as_ref()
            .filter(|e| e.station_id == station_id && e.music_id == music_id)
            .map(|e| &e.narrative)
    }

    /// Replace whatever was cached.
    pub fn store(&mut self, station_id: String, music_id: String, narrative: Narrative) {
        self.entry = Some(Entry {
            station_id,
            music_id,
            narrative,
        });
    }
}
