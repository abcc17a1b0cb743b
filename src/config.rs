use crate::error::{RadioError, Result};
use crate::gate::AnnouncementGate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

const SETTINGS_FILE: &str = "radio.json";
const APP_DIR: &str = "onair";

pub const LLM_KEY_ENV: &str = "ONAIR_LLM_API_KEY";
pub const TTS_KEY_ENV: &str = "ONAIR_TTS_API_KEY";

/// One DJ voice: who they are and how they sound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostProfile {
    pub personality: String,
    pub voice: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_llm_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtsSettings {
    #[serde(default = "default_tts_url")]
    pub base_url: String,
    /// Model or version identifier sent with each job.
    #[serde(default = "default_tts_model")]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// Persistent radio configuration, read at the start of each transition
/// cycle and written back when the user edits it or the gate counter moves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadioSettings {
    #[serde(default)]
    pub gate: AnnouncementGate,
    #[serde(default)]
    pub dual_mode: bool,
    #[serde(default = "default_primary_host")]
    pub primary_host: HostProfile,
    #[serde(default = "default_secondary_host")]
    pub secondary_host: HostProfile,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listener_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_instructions: Option<String>,
    #[serde(default = "default_speech_speed")]
    pub speech_speed: f32,
    /// The listener's volume (0.0–1.0) that fade-ins return to.
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default = "default_pre_silence_ms")]
    pub pre_silence_ms: u64,
    #[serde(default = "default_post_silence_ms")]
    pub post_silence_ms: u64,
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub tts: TtsSettings,
    /// Where `save` writes. None (tests) makes `save` a no-op.
    #[serde(skip)]
    state_path: Option<PathBuf>,
}

fn default_llm_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_tts_url() -> String {
    "https://api.replicate.com/v1".to_string()
}

fn default_tts_model() -> String {
    "jaaari/kokoro-82m".to_string()
}

fn default_primary_host() -> HostProfile {
    HostProfile {
        personality: "A warm late-night radio host with dry wit and deep music knowledge".to_string(),
        voice: "af_bella".to_string(),
    }
}

fn default_secondary_host() -> HostProfile {
    HostProfile {
        personality: "An upbeat co-host who loves trivia and teasing the main host".to_string(),
        voice: "am_michael".to_string(),
    }
}

fn default_speech_speed() -> f32 {
    1.0
}

fn default_volume() -> f32 {
    1.0
}

fn default_pre_silence_ms() -> u64 {
    400
}

fn default_post_silence_ms() -> u64 {
    1500
}

impl Default for LlmSettings {
    fn default() -> Self {
        LlmSettings {
            base_url: default_llm_url(),
            model: default_llm_model(),
            api_key: None,
        }
    }
}

impl Default for TtsSettings {
    fn default() -> Self {
        TtsSettings {
            base_url: default_tts_url(),
            model: default_tts_model(),
            api_key: None,
        }
    }
}

impl LlmSettings {
    /// Key from the environment, falling back to the settings file.
    pub fn resolved_key(&self) -> Option<String> {
        resolve_key(LLM_KEY_ENV, &self.api_key)
    }
}

impl TtsSettings {
    pub fn resolved_key(&self) -> Option<String> {
        resolve_key(TTS_KEY_ENV, &self.api_key)
    }
}

fn resolve_key(env: &str, stored: &Option<String>) -> Option<String> {
    std::env::var(env)
        .ok()
        .or_else(|| stored.clone())
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
}

impl RadioSettings {
    pub fn new() -> Self {
        RadioSettings {
            gate: AnnouncementGate::default(),
            dual_mode: false,
            primary_host: default_primary_host(),
            secondary_host: default_secondary_host(),
            listener_name: None,
            custom_instructions: None,
            speech_speed: default_speech_speed(),
            volume: default_volume(),
            pre_silence_ms: default_pre_silence_ms(),
            post_silence_ms: default_post_silence_ms(),
            llm: LlmSettings::default(),
            tts: TtsSettings::default(),
            state_path: None,
        }
    }

    /// `<config dir>/onair/radio.json`, or the working directory when the
    /// platform has no config dir.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join(APP_DIR).join(SETTINGS_FILE))
            .unwrap_or_else(|| PathBuf::from(SETTINGS_FILE))
    }

    /// Load settings from `path`, or start from defaults if the file is
    /// missing or unreadable. The path is remembered for `save`.
    pub fn load_from(path: &Path) -> Self {
        let mut settings = if path.exists() {
            match fs::read_to_string(path) {
                Ok(data) => match serde_json::from_str::<RadioSettings>(&data) {
                    Ok(settings) => settings,
                    Err(e) => {
                        warn!("corrupt settings file {}, starting fresh: {}", path.display(), e);
                        RadioSettings::new()
                    }
                },
                Err(e) => {
                    warn!("could not read settings file {}: {}", path.display(), e);
                    RadioSettings::new()
                }
            }
        } else {
            RadioSettings::new()
        };
        settings.state_path = Some(path.to_path_buf());
        settings
    }

    pub fn state_path(&self) -> Option<&Path> {
        self.state_path.as_deref()
    }

    /// Persist to the attached path. No-op without one.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.state_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| RadioError::Settings(format!("serialize: {}", e)))?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn radio_enabled(&self) -> bool {
        self.gate.enabled
    }

    /// Hosts taking part in the next announcement.
    pub fn active_hosts(&self) -> Vec<&HostProfile> {
        if self.dual_mode {
            vec![&self.primary_host, &self.secondary_host]
        } else {
            vec![&self.primary_host]
        }
    }

    pub fn pre_silence(&self) -> Duration {
        Duration::from_millis(self.pre_silence_ms)
    }

    pub fn post_silence(&self) -> Duration {
        Duration::from_millis(self.post_silence_ms)
    }

    pub fn target_volume(&self) -> f32 {
        self.volume.clamp(0.0, 1.0)
    }
}

impl Default for RadioSettings {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let settings = RadioSettings::new();
        assert!(!settings.radio_enabled());
        assert_eq!(settings.pre_silence(), Duration::from_millis(400));
        assert_eq!(settings.active_hosts().len(), 1);
        assert!(settings.state_path().is_none());
    }

    #[test]
    fn dual_mode_uses_both_hosts() {
        let mut settings = RadioSettings::new();
        settings.dual_mode = true;
        let hosts = settings.active_hosts();
        assert_eq!(hosts.len(), 2);
        assert_ne!(hosts[0].voice, hosts[1].voice);
    }

    #[test]
    fn save_without_path_is_a_no_op() {
        let settings = RadioSettings::new();
        assert!(settings.save().is_ok());
    }

    #[test]
    fn settings_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("radio.json");

        let mut settings = RadioSettings::load_from(&path);
        settings.gate.enabled = true;
        settings.gate.frequency = 2;
        settings.gate.songs_since_last = 1;
        settings.listener_name = Some("Sam".into());
        settings.save().unwrap();

        let loaded = RadioSettings::load_from(&path);
        assert!(loaded.radio_enabled());
        assert_eq!(loaded.gate.frequency, 2);
        assert_eq!(loaded.gate.songs_since_last, 1);
        assert_eq!(loaded.listener_name.as_deref(), Some("Sam"));
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("radio.json");
        fs::write(&path, "{ not json").unwrap();
        let settings = RadioSettings::load_from(&path);
        assert_eq!(settings.gate, AnnouncementGate::default());
        assert_eq!(settings.state_path(), Some(path.as_path()));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let settings: RadioSettings = serde_json::from_str(r#"{"dual_mode":true}"#).unwrap();
        assert!(settings.dual_mode);
        assert_eq!(settings.post_silence_ms, 1500);
        assert_eq!(settings.llm, LlmSettings::default());
    }

    #[test]
    fn target_volume_is_clamped() {
        let mut settings = RadioSettings::new();
        settings.volume = 1.7;
        assert_eq!(settings.target_volume(), 1.0);
    }
}
