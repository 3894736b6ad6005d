//! Ordered list of loaded tracks

use crate::track::Track;

/// Tracks the user has added, in insertion order
#[derive(Debug, Default, Clone)]
pub struct TrackList {
    tracks: Vec<Track>,
}

impl TrackList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a track. Returns false if a track with the same id is already listed.
    pub fn add(&mut self, track: Track) -> bool {
        if self.contains(&track.id) {
            return false;
        }
        self.tracks.push(track);
        true
    }

    /// Remove a track by id, returning it
    pub fn remove(&mut self, id: &str) -> Option<Track> {
        let index = self.position(id)?;
        Some(self.tracks.remove(index))
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.tracks.iter().position(|t| t.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    /// Track following `id`, or None at the end of the list
    pub fn next_after(&self, id: &str) -> Option<&Track> {
        let index = self.position(id)?;
        self.tracks.get(index + 1)
    }

    /// Track preceding `id`, or None at the start of the list
    pub fn previous_before(&self, id: &str) -> Option<&Track> {
        let index = self.position(id)?;
        index.checked_sub(1).and_then(|i| self.tracks.get(i))
    }

    pub fn first(&self) -> Option<&Track> {
        self.tracks.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(ids: &[&str]) -> TrackList {
        let mut list = TrackList::new();
        for id in ids {
            list.add(Track::from_path(format!("/music/{}.mp3", id)));
        }
        list
    }

    #[test]
    fn test_add_deduplicates() {
        let mut tracks = list(&["a", "b"]);
        assert!(!tracks.add(Track::from_path("/music/a.mp3")));
        assert_eq!(tracks.len(), 2);
    }

    #[test]
    fn test_next_and_previous() {
        let tracks = list(&["a", "b", "c"]);
        assert_eq!(tracks.next_after("/music/a.mp3").unwrap().title, "b");
        assert!(tracks.next_after("/music/c.mp3").is_none());
        assert_eq!(tracks.previous_before("/music/c.mp3").unwrap().title, "b");
        assert!(tracks.previous_before("/music/a.mp3").is_none());
        assert!(tracks.next_after("/music/missing.mp3").is_none());
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut tracks = list(&["a", "b", "c"]);
        let removed = tracks.remove("/music/b.mp3").unwrap();
        assert_eq!(removed.title, "b");
        let titles: Vec<_> = tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["a", "c"]);
        assert!(tracks.remove("/music/b.mp3").is_none());
    }
}
