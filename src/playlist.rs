use crate::track::Track;
use std::path::Path;
use tracing::warn;

/// Supported audio extensions when loading a folder.
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "ogg", "aac", "m4a"];

/// Track catalog the orchestrator plays from.
///
/// Storage, ranking and library scanning live elsewhere; the orchestrator
/// only needs ordered navigation and a look-ahead.
pub trait TrackCatalog: Send {
    fn current(&self) -> Option<Track>;
    fn peek_next(&self) -> Option<Track>;
    /// Up to `n` tracks after the current one, in play order.
    fn upcoming(&self, n: usize) -> Vec<Track>;
    /// Move to the next track and return it.
    fn advance(&mut self) -> Option<Track>;
    /// Move to the previous track and return it.
    fn go_back(&mut self) -> Option<Track>;
}

#[derive(Debug, Clone)]
pub struct Playlist {
    pub name: String,
    pub tracks: Vec<Track>,
    pub current_index: Option<usize>,
}

impl Playlist {
    pub fn new(name: String) -> Self {
        Playlist {
            name,
            tracks: Vec::new(),
            current_index: None,
        }
    }

    pub fn from_tracks(name: String, tracks: Vec<Track>) -> Self {
        let current_index = if tracks.is_empty() { None } else { Some(0) };
        Playlist {
            name,
            tracks,
            current_index,
        }
    }

    /// Add a track by parsing metadata from a file path.
    pub fn add_track(&mut self, path: &Path) -> Result<usize, String> {
        let track = Track::from_path(path)?;
        self.tracks.push(track);
        if self.current_index.is_none() {
            self.current_index = Some(0);
        }
        Ok(self.tracks.len() - 1)
    }

    /// Add every audio file in a folder, sorted by file name. Unreadable
    /// files are skipped with a warning.
    pub fn add_folder(&mut self, folder: &Path) -> Result<usize, String> {
        let entries = std::fs::read_dir(folder)
            .map_err(|e| format!("Cannot read '{}': {}", folder.display(), e))?;
        let mut paths: Vec<_> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_file() && is_audio_file(p))
            .collect();
        paths.sort();

        let mut added = 0;
        for path in paths {
            match self.add_track(&path) {
                Ok(_) => added += 1,
                Err(e) => warn!("skipping {}: {}", path.display(), e),
            }
        }
        Ok(added)
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }
}

impl TrackCatalog for Playlist {
    fn current(&self) -> Option<Track> {
        self.current_index.and_then(|i| self.tracks.get(i)).cloned()
    }

    fn peek_next(&self) -> Option<Track> {
        self.current_index
            .and_then(|i| self.tracks.get(i + 1))
            .cloned()
    }

    fn upcoming(&self, n: usize) -> Vec<Track> {
        match self.current_index {
            Some(i) => self.tracks.iter().skip(i + 1).take(n).cloned().collect(),
            None => Vec::new(),
        }
    }

    fn advance(&mut self) -> Option<Track> {
        let next = self.current_index? + 1;
        if next >= self.tracks.len() {
            return None;
        }
        self.current_index = Some(next);
        self.current()
    }

    fn go_back(&mut self) -> Option<Track> {
        let prev = self.current_index?.checked_sub(1)?;
        self.current_index = Some(prev);
        self.current()
    }
}

fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|e| AUDIO_EXTENSIONS.contains(&e.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn make_track(name: &str) -> Track {
        Track::new(format!("{}.mp3", name), name, "X", Duration::new(60, 0))
    }

    fn abc() -> Playlist {
        Playlist::from_tracks(
            "Test".to_string(),
            vec![make_track("A"), make_track("B"), make_track("C")],
        )
    }

    #[test]
    fn new_playlist_is_empty() {
        let pl = Playlist::new("Test".to_string());
        assert_eq!(pl.track_count(), 0);
        assert!(pl.current().is_none());
        assert!(pl.upcoming(5).is_empty());
    }

    #[test]
    fn advance_walks_forward_and_stops_at_end() {
        let mut pl = abc();
        assert_eq!(pl.current().unwrap().title, "A");
        assert_eq!(pl.peek_next().unwrap().title, "B");
        assert_eq!(pl.advance().unwrap().title, "B");
        assert_eq!(pl.advance().unwrap().title, "C");
        assert!(pl.peek_next().is_none());
        assert!(pl.advance().is_none());
        assert_eq!(pl.current().unwrap().title, "C");
    }

    #[test]
    fn go_back_stops_at_start() {
        let mut pl = abc();
        pl.advance();
        assert_eq!(pl.go_back().unwrap().title, "A");
        assert!(pl.go_back().is_none());
        assert_eq!(pl.current_index, Some(0));
    }

    #[test]
    fn upcoming_is_bounded() {
        let pl = abc();
        let titles: Vec<_> = pl.upcoming(1).into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["B"]);
        assert_eq!(pl.upcoming(10).len(), 2);
    }

    #[test]
    fn add_folder_ignores_non_audio() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"not audio").unwrap();
        std::fs::write(dir.path().join("cover.jpg"), b"not audio").unwrap();
        let mut pl = Playlist::new("Folder".to_string());
        assert_eq!(pl.add_folder(dir.path()).unwrap(), 0);
    }

    #[test]
    fn add_folder_skips_unreadable_audio() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.mp3"), b"fake audio").unwrap();
        let mut pl = Playlist::new("Folder".to_string());
        assert_eq!(pl.add_folder(dir.path()).unwrap(), 0);
        assert!(pl.current().is_none());
    }

    #[test]
    fn add_folder_rejects_missing_folder() {
        let mut pl = Playlist::new("Folder".to_string());
        assert!(pl.add_folder(Path::new("__no_such_folder__")).is_err());
    }
}
