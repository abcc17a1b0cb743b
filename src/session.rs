use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Total characters kept across past announcement transcripts.
pub const TRANSCRIPT_CHAR_BUDGET: usize = 4000;
/// Number of previously played songs kept for context.
pub const SONG_HISTORY_CAP: usize = 10;
/// Returned by `formatted_history` before the first announcement.
pub const EMPTY_HISTORY: &str = "(no previous announcements this session)";

/// Shared handle to the one session memory of the process.
pub type SessionHandle = Arc<Mutex<SessionMemory>>;

/// Creative identity of the show, generated once per session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    pub name: String,
    pub mood: String,
    pub hook: String,
    /// Speaking-style hint for the host(s).
    pub style: String,
}

impl SessionIdentity {
    pub fn summary(&self) -> String {
        format!(
            "Show name: {}\nMood: {}\nRunning theme: {}\nSpeaking style: {}",
            self.name, self.mood, self.hook, self.style
        )
    }
}

/// Bounded rolling context used to keep announcements non-repetitive.
#[derive(Debug)]
pub struct SessionMemory {
    identity: Option<SessionIdentity>,
    transcripts: VecDeque<String>,
    transcript_chars: usize,
    songs: VecDeque<String>,
    songs_played: u32,
    announcement_count: u32,
    started_at: DateTime<Local>,
    /// Bumped by every reset. Work started in an older session checks it
    /// before writing back.
    epoch: u64,
}

impl SessionMemory {
    pub fn new() -> Self {
        SessionMemory {
            identity: None,
            transcripts: VecDeque::new(),
            transcript_chars: 0,
            songs: VecDeque::new(),
            songs_played: 0,
            announcement_count: 0,
            started_at: Local::now(),
            epoch: 0,
        }
    }

    pub fn shared() -> SessionHandle {
        Arc::new(Mutex::new(SessionMemory::new()))
    }

    /// Remember a song that just finished as "Title – Artist".
    pub fn record_song(&mut self, title: &str, artist: &str) {
        self.songs.push_back(format!("{} – {}", title, artist));
        self.songs_played = self.songs_played.saturating_add(1);
        while self.songs.len() > SONG_HISTORY_CAP {
            self.songs.pop_front();
        }
    }

    /// Append a transcript, then evict the oldest until the budget holds.
    pub fn record_announcement(&mut self, transcript: &str) {
        self.transcript_chars += transcript.chars().count();
        self.transcripts.push_back(transcript.to_string());
        self.announcement_count = self.announcement_count.saturating_add(1);
        while self.transcript_chars > TRANSCRIPT_CHAR_BUDGET {
            match self.transcripts.pop_front() {
                Some(old) => self.transcript_chars -= old.chars().count(),
                None => break,
            }
        }
    }

    pub fn identity(&self) -> Option<&SessionIdentity> {
        self.identity.as_ref()
    }

    pub fn set_identity(&mut self, identity: SessionIdentity) {
        self.identity = Some(identity);
    }

    pub fn is_first_announcement(&self) -> bool {
        self.announcement_count == 0
    }

    pub fn announcement_count(&self) -> u32 {
        self.announcement_count
    }

    pub fn songs_played(&self) -> u32 {
        self.songs_played
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn elapsed(&self) -> chrono::Duration {
        Local::now() - self.started_at
    }

    pub fn song_history(&self) -> Vec<String> {
        self.songs.iter().cloned().collect()
    }

    pub fn transcript_chars(&self) -> usize {
        self.transcript_chars
    }

    /// Numbered transcript blocks, oldest first.
    pub fn formatted_history(&self) -> String {
        if self.transcripts.is_empty() {
            return EMPTY_HISTORY.to_string();
        }
        self.transcripts
            .iter()
            .enumerate()
            .map(|(i, t)| format!("[{}]\n{}", i + 1, t))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn reset(&mut self) {
        let epoch = self.epoch.wrapping_add(1);
        *self = SessionMemory::new();
        self.epoch = epoch;
    }
}

impl Default for SessionMemory {
    fn default() -> Self {
        Self::new()
    }
}
