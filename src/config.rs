//! Player configuration
//!
//! Loads the playlist and session settings from a TOML file.

use crate::bridge::TrackRequest;
use crate::error::{Result, SubsyncError};
use crate::processor::CaptionStyle;
use crate::sync::SyncOptions;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub display: DisplaySettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub tracks: Vec<TrackConfig>,
    /// Directory relative track paths resolve against. Set from the file's
    /// location when loading.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Poll period for clocks without notifications, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Spacing of time-update notifications while playing, in milliseconds.
    pub tick_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self { tick_ms: 250 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    pub strip_markup: bool,
    pub uppercase: bool,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            strip_markup: true,
            uppercase: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackConfig {
    pub title: String,
    pub src: String,
    /// Defaults to `src` with an `.srt` extension.
    pub subtitle: Option<String>,
}

impl TrackConfig {
    pub fn subtitle_src(&self) -> String {
        self.subtitle.clone().unwrap_or_else(|| {
            Path::new(&self.src)
                .with_extension("srt")
                .to_string_lossy()
                .into_owned()
        })
    }

    pub fn to_request(&self) -> TrackRequest {
        TrackRequest {
            src: self.src.clone(),
            title: self.title.clone(),
            subtitle: Some(self.subtitle_src()),
        }
    }
}

impl PlayerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml(&content)?;
        config.base_dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: PlayerConfig =
            toml::from_str(content).map_err(|err| SubsyncError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.tracks.is_empty() {
            return Err(SubsyncError::Config("the playlist has no tracks".to_string()));
        }
        if self.sync.poll_interval_ms == 0 {
            return Err(SubsyncError::Config(
                "sync.poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.engine.tick_ms == 0 {
            return Err(SubsyncError::Config("engine.tick_ms must be positive".to_string()));
        }
        Ok(())
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            poll_interval: Duration::from_millis(self.sync.poll_interval_ms),
        }
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.engine.tick_ms)
    }

    pub fn caption_style(&self) -> CaptionStyle {
        CaptionStyle {
            strip_markup: self.display.strip_markup,
            uppercase: self.display.uppercase,
        }
    }
}
