// Settings management and persistence
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::audio::{EngineConfig, PcmFormat};
use crate::error::{AudioError, Result};

/// Overrides the settings directory (read by the CLI)
pub const HOME_ENV: &str = "CIRCUIT_BREAKER_HOME";

/// User preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Preferences {
    pub notifications: bool,
    pub haptics: bool,
    pub audio_volume: u8, // 0-100
    pub audio_enabled: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            notifications: true,
            haptics: true,
            audio_volume: 80,
            audio_enabled: true,
        }
    }
}

impl Preferences {
    /// Guidance volume as a linear gain
    pub fn linear_volume(&self) -> f32 {
        self.audio_volume.min(100) as f32 / 100.0
    }
}

/// Output and fallback decoding parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub output_sample_rate: u32,
    /// Layout assumed for headerless speech payloads
    pub fallback_sample_rate: u32,
    pub fallback_channels: u16,
    pub voice_queue_capacity: usize,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            output_sample_rate: 24_000,
            fallback_sample_rate: 24_000,
            fallback_channels: 1,
            voice_queue_capacity: 64,
        }
    }
}

impl AudioSettings {
    pub fn engine_config(&self) -> Result<EngineConfig> {
        Ok(EngineConfig {
            output_sample_rate: self.output_sample_rate,
            fallback: PcmFormat::new(self.fallback_sample_rate, self.fallback_channels)?,
            voice_capacity: self.voice_queue_capacity,
        })
    }
}

/// A plain-text reflection, newest first in the journal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: String,
    /// RFC 3339 timestamp
    pub date: String,
    /// Title of the protocol the entry follows, or "General Reflection"
    pub protocol: String,
    pub text: String,
}

/// Main application settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub version: i32, // Settings schema version for future migrations
    pub preferences: Preferences,
    pub audio: AudioSettings,
    /// Completed runs per protocol id
    pub usage: BTreeMap<String, u32>,
    pub favorites: Vec<String>,
    pub journal: Vec<JournalEntry>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            version: 1,
            preferences: Preferences::default(),
            audio: AudioSettings::default(),
            usage: BTreeMap::new(),
            favorites: Vec::new(),
            journal: Vec::new(),
        }
    }
}

impl AppSettings {
    /// Platform config dir, used when neither `--home` nor
    /// `$CIRCUIT_BREAKER_HOME` is given
    pub fn default_app_dir() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("circuit-breaker");
        path
    }

    /// Get the settings file path
    pub fn get_settings_path(app_dir: &Path) -> PathBuf {
        app_dir.join("settings.json")
    }

    /// Load settings from file, or return defaults if file doesn't exist
    pub fn load(app_dir: &Path) -> Result<Self> {
        let path = Self::get_settings_path(app_dir);

        if !path.exists() {
            log::debug!("No settings file found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .map_err(|e| AudioError::Settings(format!("Failed to read settings file: {}", e)))?;

        let settings: AppSettings = serde_json::from_str(&content)
            .map_err(|e| AudioError::Settings(format!("Failed to parse settings: {}", e)))?;

        log::debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Count one completed run; returns the new count
    pub fn record_completion(&mut self, protocol_id: &str) -> u32 {
        let count = self.usage.entry(protocol_id.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn total_sessions(&self) -> u32 {
        self.usage.values().sum()
    }

    pub fn is_favorite(&self, protocol_id: &str) -> bool {
        self.favorites.iter().any(|f| f == protocol_id)
    }

    /// Add or remove a favorite; returns whether it is now a favorite
    pub fn toggle_favorite(&mut self, protocol_id: &str) -> bool {
        if self.is_favorite(protocol_id) {
            self.favorites.retain(|f| f != protocol_id);
            false
        } else {
            self.favorites.push(protocol_id.to_string());
            true
        }
    }

    /// Prepend a journal entry stamped with the current time
    pub fn add_journal_entry(&mut self, protocol: &str, text: &str) -> JournalEntry {
        let now = chrono::Utc::now();
        let entry = JournalEntry {
            id: now.timestamp_millis().to_string(),
            date: now.to_rfc3339(),
            protocol: protocol.to_string(),
            text: text.to_string(),
        };
        self.journal.insert(0, entry.clone());
        entry
    }

    /// Save settings to file
    pub fn save(&self, app_dir: &Path) -> Result<()> {
        // Ensure directory exists
        fs::create_dir_all(app_dir).map_err(|e| {
            AudioError::Settings(format!("Failed to create settings directory: {}", e))
        })?;

        let path = Self::get_settings_path(app_dir);
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| AudioError::Settings(format!("Failed to serialize settings: {}", e)))?;

        fs::write(&path, content)
            .map_err(|e| AudioError::Settings(format!("Failed to write settings file: {}", e)))?;

        log::info!("Saved settings to {:?}", path);
        Ok(())
    }
}
