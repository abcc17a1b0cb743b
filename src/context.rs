use crate::playlist::TrackCatalog;
use crate::session::SessionMemory;
use crate::track::Track;
use std::time::Duration;

/// How many upcoming titles the DJ gets to tease.
pub const UPCOMING_LIMIT: usize = 10;

/// Song metadata as the DJ sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct SongInfo {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub year: Option<u32>,
    pub description: Option<String>,
    pub rank: Option<u32>,
}

impl SongInfo {
    /// One-paragraph description for the prompt. Missing fields are left out.
    pub fn describe(&self) -> String {
        let mut out = format!("\"{}\" by {}", self.title, self.artist);
        if let Some(album) = &self.album {
            out.push_str(&format!(", from the album \"{}\"", album));
        }
        if let Some(year) = self.year {
            out.push_str(&format!(" ({})", year));
        }
        if let Some(genre) = &self.genre {
            out.push_str(&format!(", genre: {}", genre));
        }
        if let Some(rank) = self.rank {
            out.push_str(&format!(", #{} in the listener's personal ranking", rank));
        }
        if let Some(description) = &self.description {
            out.push_str(&format!(". Notes: {}", description));
        }
        out
    }
}

impl From<&Track> for SongInfo {
    fn from(track: &Track) -> Self {
        SongInfo {
            title: track.title.clone(),
            artist: track.artist.clone(),
            album: track.album.clone(),
            genre: track.genre.clone(),
            year: track.year,
            description: track.description.clone(),
            rank: track.rank,
        }
    }
}

/// Read-only snapshot built fresh for each transition.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionContext {
    pub previous: Option<SongInfo>,
    pub next: SongInfo,
    /// Titles after `next`, in play order.
    pub upcoming: Vec<String>,
    pub session_elapsed: Duration,
    pub songs_played: u32,
}

impl TransitionContext {
    /// Build the context for the boundary between the catalog's current
    /// track and the one after it. `None` when there is no next track.
    pub fn for_next(catalog: &dyn TrackCatalog, memory: &SessionMemory) -> Option<Self> {
        let mut ahead = catalog.upcoming(UPCOMING_LIMIT + 1).into_iter();
        let next = ahead.next()?;
        Some(TransitionContext {
            previous: catalog.current().as_ref().map(SongInfo::from),
            next: SongInfo::from(&next),
            upcoming: ahead.map(|t| t.label()).collect(),
            session_elapsed: memory.elapsed().to_std().unwrap_or_default(),
            songs_played: memory.songs_played(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playlist::Playlist;

    fn playlist(n: usize) -> Playlist {
        let tracks = (0..n)
            .map(|i| {
                Track::new(
                    format!("{}.mp3", i),
                    &format!("Song {}", i),
                    "Band",
                    Duration::from_secs(120),
                )
            })
            .collect();
        Playlist::from_tracks("Test".into(), tracks)
    }

    #[test]
    fn context_spans_current_and_next() {
        let pl = playlist(3);
        let memory = SessionMemory::new();
        let ctx = TransitionContext::for_next(&pl, &memory).unwrap();
        assert_eq!(ctx.previous.unwrap().title, "Song 0");
        assert_eq!(ctx.next.title, "Song 1");
        assert_eq!(ctx.upcoming, vec!["Song 2 – Band".to_string()]);
        assert_eq!(ctx.songs_played, 0);
    }

    #[test]
    fn upcoming_is_capped() {
        let pl = playlist(30);
        let memory = SessionMemory::new();
        let ctx = TransitionContext::for_next(&pl, &memory).unwrap();
        assert_eq!(ctx.upcoming.len(), UPCOMING_LIMIT);
    }

    #[test]
    fn no_context_without_next_track() {
        let pl = playlist(1);
        let memory = SessionMemory::new();
        assert!(TransitionContext::for_next(&pl, &memory).is_none());
    }

    #[test]
    fn describe_includes_rank_and_skips_missing_fields() {
        let mut track = Track::new("x.mp3", "Heroes", "David Bowie", Duration::from_secs(300));
        track.year = Some(1977);
        track.rank = Some(2);
        let text = SongInfo::from(&track).describe();
        assert_eq!(
            text,
            "\"Heroes\" by David Bowie (1977), #2 in the listener's personal ranking"
        );
    }
}
