use lofty::file::{AudioFile, TaggedFileExt};
use lofty::tag::{Accessor, ItemKey, Tag};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub path: PathBuf,
    pub title: String,
    pub artist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u32>,
    /// Free-text note from the library, fed to the DJ as color.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Position in the listener's personal ranking (1 = favourite).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

impl Track {
    /// Create a Track by reading metadata from an audio file.
    pub fn from_path(path: &Path) -> Result<Self, String> {
        let path = path
            .canonicalize()
            .map_err(|e| format!("Invalid path '{}': {}", path.display(), e))?;

        let tagged_file = lofty::read_from_path(&path)
            .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;

        let duration = tagged_file.properties().duration();
        let tag = tagged_file.primary_tag().or_else(|| tagged_file.first_tag());

        let title = tag
            .and_then(|t| t.title().map(|s| s.to_string()))
            .unwrap_or_else(|| {
                path.file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| "Unknown".to_string())
            });
        let artist = tag
            .and_then(|t| t.artist().map(|s| s.to_string()))
            .unwrap_or_else(|| "Unknown".to_string());
        let album = tag.and_then(|t| t.album().map(|s| s.to_string()));
        let genre = tag.and_then(|t| t.genre().map(|s| s.to_string()));
        let year = tag.and_then(tag_year);

        Ok(Track {
            path,
            title,
            artist,
            album,
            genre,
            year,
            description: None,
            rank: None,
            duration,
        })
    }

    /// Minimal track, used for catalogs that carry no tags.
    pub fn new(path: impl Into<PathBuf>, title: &str, artist: &str, duration: Duration) -> Self {
        Track {
            path: path.into(),
            title: title.to_string(),
            artist: artist.to_string(),
            album: None,
            genre: None,
            year: None,
            description: None,
            rank: None,
            duration,
        }
    }

    /// Format duration as MM:SS.
    pub fn duration_display(&self) -> String {
        let secs = self.duration.as_secs();
        format!("{}:{:02}", secs / 60, secs % 60)
    }

    /// "Title – Artist", the form kept in session history.
    pub fn label(&self) -> String {
        format!("{} – {}", self.title, self.artist)
    }

    /// Two tracks are the same entry when they point at the same file.
    pub fn same_as(&self, other: &Track) -> bool {
        self.path == other.path
    }
}

/// Year from the recording date or year frame, e.g. "1987" or "1987-05-01".
fn tag_year(tag: &Tag) -> Option<u32> {
    [ItemKey::RecordingDate, ItemKey::Year]
        .iter()
        .filter_map(|key| tag.get_string(key))
        .find_map(|value| value.get(..4).and_then(|y| y.parse().ok()))
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    #[derive(Serialize, Deserialize)]
    struct DurationRepr {
        secs: u64,
        nanos: u32,
    }

    pub fn serialize<S: Serializer>(dur: &Duration, s: S) -> Result<S::Ok, S::Error> {
        DurationRepr {
            secs: dur.as_secs(),
            nanos: dur.subsec_nanos(),
        }
        .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let repr = DurationRepr::deserialize(d)?;
        Ok(Duration::new(repr.secs, repr.nanos))
    }
}
