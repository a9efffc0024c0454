use std::collections::VecDeque;

use stationbar_proto::Track;

/// Refill once this many tracks or fewer are left.
pub const REFILL_THRESHOLD: usize = 1;

/// FIFO of upcoming tracks for the current station.
#[derive(Debug, Default, Clone)]
pub struct TrackQueue {
    tracks: VecDeque<Track>,
}

impl TrackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn needs_refill(&self) -> bool {
        self.tracks.len() <= REFILL_THRESHOLD
    }

    /// Append a fetched batch, keeping its order.
    pub fn extend(&mut self, batch: impl IntoIterator<Item = Track>) {
        self.tracks.extend(batch);
    }

    pub fn pop(&mut self) -> Option<Track> {
        self.tracks.pop_front()
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }

    /// Owned copy of the upcoming tracks, next first.
    pub fn snapshot(&self) -> Vec<Track> {
        self.tracks.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(url: &str) -> Track {
        Track {
            music_id: format!("m-{}", url),
            audio_url: url.to_string(),
            ..Track::default()
        }
    }

    #[test]
    fn test_fifo_across_batches() {
        let mut q = TrackQueue::new();
        q.extend(vec![track("1"), track("2")]);
        assert_eq!(q.pop().unwrap().audio_url, "1");
        q.extend(vec![track("3"), track("4")]);

        let order: Vec<String> = std::iter::from_fn(|| q.pop()).map(|t| t.audio_url).collect();
        assert_eq!(order, vec!["2", "3", "4"]);
        assert!(q.is_empty());
    }

    #[test]
    fn test_refill_threshold() {
        let mut q = TrackQueue::new();
        assert!(q.needs_refill());
        q.extend(vec![track("1")]);
        assert!(q.needs_refill());
        q.extend(vec![track("2")]);
        assert!(!q.needs_refill());
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut q = TrackQueue::new();
        q.extend(vec![track("1"), track("2")]);
        let snap = q.snapshot();
        q.clear();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].audio_url, "1");
        assert_eq!(q.len(), 0);
    }
}
