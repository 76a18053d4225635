use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use downsampler_core::shared::constants::{
    DEFAULT_BIT_RATE, DEFAULT_QUEUE_CAPACITY, DEFAULT_TARGET_SAMPLE_RATE,
};
use downsampler_core::{AudioCodec, DownsampleConfig, TrackSelector};

/// Persisted CLI defaults. Flags given on the command line win.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub rate: u32,
    pub bit_rate: u32,
    pub codec: AudioCodec,
    pub queue_capacity: usize,
    pub track: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rate: DEFAULT_TARGET_SAMPLE_RATE,
            bit_rate: DEFAULT_BIT_RATE,
            codec: AudioCodec::Aac,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            track: None,
        }
    }
}

/// Values passed as flags; `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub rate: Option<u32>,
    pub bit_rate: Option<u32>,
    pub codec: Option<AudioCodec>,
    pub queue_capacity: Option<usize>,
    pub track: Option<usize>,
}

impl Settings {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("Downsampler").join("settings.json"))
    }

    /// Loads the default settings file. A missing or unreadable file
    /// falls back to defaults.
    pub fn load() -> Self {
        Self::default_path()
            .and_then(|path| fs::read_to_string(path).ok())
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default()
    }

    /// Loads an explicitly named settings file; errors are reported.
    pub fn load_from(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let json = fs::read_to_string(path)
            .map_err(|e| format!("cannot read settings {}: {e}", path.display()))?;
        let settings = serde_json::from_str(&json)
            .map_err(|e| format!("invalid settings {}: {e}", path.display()))?;
        Ok(settings)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn merge(mut self, overrides: &Overrides) -> Self {
        if let Some(rate) = overrides.rate {
            self.rate = rate;
        }
        if let Some(bit_rate) = overrides.bit_rate {
            self.bit_rate = bit_rate;
        }
        if let Some(codec) = overrides.codec {
            self.codec = codec;
        }
        if let Some(capacity) = overrides.queue_capacity {
            self.queue_capacity = capacity;
        }
        if overrides.track.is_some() {
            self.track = overrides.track;
        }
        self
    }

    pub fn to_config(&self) -> DownsampleConfig {
        DownsampleConfig {
            target_sample_rate: self.rate,
            codec: self.codec,
            bit_rate: self.bit_rate,
            queue_capacity: self.queue_capacity,
            track: self
                .track
                .map_or(TrackSelector::FirstAudio, TrackSelector::StreamIndex),
        }
    }
}
