//! User preference for the emulator: typed model, defaults, merge of partial
//! user snippets over those defaults, and on-disk TOML persistence.

mod defaults;
mod file;
mod merge;
mod options;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use file::config_path;
pub use merge::merge_tables;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preference {
    pub emulator: EmulatorPreference,
    pub input: InputPreference,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmulatorPreference {
    /// Seconds between automatic snapshots. `0` disables auto-save.
    pub auto_save_interval: u64,
    /// Per-core option overrides, keyed by core name.
    #[serde(default)]
    pub core: BTreeMap<String, BTreeMap<String, String>>,
    /// Enter fullscreen when a game starts.
    pub fullscreen: bool,
    /// Start sessions muted.
    #[serde(default)]
    pub mute: bool,
    #[serde(default)]
    pub platform: BTreeMap<String, PlatformPreference>,
    pub shader: String,
    pub video_smooth: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformPreference {
    #[serde(default)]
    pub bioses: Vec<BiosPreference>,
    pub core: String,
    /// `"inherit"` (or absent) uses the global shader.
    #[serde(default)]
    pub shader: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiosPreference {
    pub file_name: String,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputPreference {
    pub confirm_button_style: String,
    /// Retroarch input config per gamepad id.
    #[serde(default)]
    pub gamepad_mappings: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    pub keyboard_mapping: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PreferenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse preference file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to write preference file: {0}")]
    Write(#[from] toml::ser::Error),

    #[error("Platform '{0}' has no emulator preference")]
    UnknownPlatform(String),

    #[error("No config directory available")]
    NoConfigDir,
}

impl Preference {
    /// Auto-save period, or `None` when auto-save is disabled.
    pub fn auto_save_period(&self) -> Option<Duration> {
        match self.emulator.auto_save_interval {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn platform(&self, name: &str) -> Option<&PlatformPreference> {
        self.emulator.platform.get(name)
    }

    /// Resolve the shader for a platform, falling back to the global one.
    pub fn shader_for(&self, platform: &str) -> Option<String> {
        let shader = match self.platform(platform).and_then(|p| p.shader.as_deref()) {
            None | Some("inherit") => self.emulator.shader.as_str(),
            Some(shader) => shader,
        };
        (!shader.is_empty()).then(|| shader.to_string())
    }

    pub fn default_path() -> Option<PathBuf> {
        config_path()
    }
}
