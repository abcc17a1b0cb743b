//! Fetches raw clip bytes for an audio reference, with a small LRU cache.

use crate::error::{RadioError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_CACHE_ENTRIES: usize = 16;
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait AudioFetcher: Send + Sync {
    async fn fetch(&self, audio_ref: &str) -> Result<Arc<Vec<u8>>>;
}

/// Most-recently-used entries live at the back.
pub struct ClipCache {
    entries: VecDeque<(String, Arc<Vec<u8>>)>,
    max_entries: usize,
}

impl ClipCache {
    pub fn new(max_entries: usize) -> Self {
        ClipCache {
            entries: VecDeque::new(),
            max_entries: max_entries.max(1),
        }
    }

    pub fn get(&mut self, key: &str) -> Option<Arc<Vec<u8>>> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        let entry = self.entries.remove(pos)?;
        let bytes = entry.1.clone();
        self.entries.push_back(entry);
        Some(bytes)
    }

    pub fn insert(&mut self, key: String, bytes: Arc<Vec<u8>>) {
        self.entries.retain(|(k, _)| *k != key);
        self.entries.push_back((key, bytes));
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// HTTP(S) refs are downloaded; anything else is read as a local path.
pub struct AudioProxy {
    client: reqwest::Client,
    cache: Mutex<ClipCache>,
}

impl AudioProxy {
    pub fn new(max_entries: usize) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        AudioProxy {
            client,
            cache: Mutex::new(ClipCache::new(max_entries)),
        }
    }

    fn cached(&self, key: &str) -> Option<Arc<Vec<u8>>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).get(key)
    }

    fn remember(&self, key: &str, bytes: Arc<Vec<u8>>) {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), bytes);
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let res = self.client.get(url).send().await?;
        let status = res.status();
        if !status.is_success() {
            return Err(RadioError::Transport(format!("fetching {} returned {}", url, status)));
        }
        Ok(res.bytes().await?.to_vec())
    }
}

impl Default for AudioProxy {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_ENTRIES)
    }
}

#[async_trait]
impl AudioFetcher for AudioProxy {
    async fn fetch(&self, audio_ref: &str) -> Result<Arc<Vec<u8>>> {
        if let Some(bytes) = self.cached(audio_ref) {
            debug!(audio_ref, "clip cache hit");
            return Ok(bytes);
        }

        let bytes = if audio_ref.starts_with("http://") || audio_ref.starts_with("https://") {
            self.download(audio_ref).await?
        } else {
            tokio::fs::read(Path::new(audio_ref)).await?
        };
        if bytes.is_empty() {
            return Err(RadioError::Playback(format!("empty audio for {}", audio_ref)));
        }

        debug!(audio_ref, size = bytes.len(), "clip fetched");
        let bytes = Arc::new(bytes);
        self.remember(audio_ref, bytes.clone());
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(b: u8) -> Arc<Vec<u8>> {
        Arc::new(vec![b])
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = ClipCache::new(2);
        cache.insert("a".into(), bytes(1));
        cache.insert("b".into(), bytes(2));
        assert!(cache.get("a").is_some());
        cache.insert("c".into(), bytes(3));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("b").is_none());
        assert_eq!(cache.get("a").unwrap()[0], 1);
        assert_eq!(cache.get("c").unwrap()[0], 3);
    }

    #[test]
    fn reinsert_replaces_without_growing() {
        let mut cache = ClipCache::new(4);
        cache.insert("a".into(), bytes(1));
        cache.insert("a".into(), bytes(9));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a").unwrap()[0], 9);
    }

    #[tokio::test]
    async fn local_files_are_read_and_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        std::fs::write(&path, b"RIFF").unwrap();
        let key = path.to_string_lossy().to_string();

        let proxy = AudioProxy::new(4);
        assert_eq!(proxy.fetch(&key).await.unwrap().as_slice(), b"RIFF");

        std::fs::remove_file(&path).unwrap();
        assert_eq!(proxy.fetch(&key).await.unwrap().as_slice(), b"RIFF");
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let proxy = AudioProxy::default();
        assert!(matches!(
            proxy.fetch("/definitely/not/here.wav").await,
            Err(RadioError::Io(_))
        ));
    }
}
