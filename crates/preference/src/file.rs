use std::fs;
use std::path::{Path, PathBuf};

use toml::Table;
use tracing::warn;

use crate::{Preference, PreferenceError};

pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("arcade").join("preference.toml"))
}

impl Preference {
    /// Load the user preference from the config directory.
    ///
    /// A missing or broken file yields the defaults.
    pub fn load() -> Self {
        let Some(path) = config_path() else {
            return Self::default();
        };

        match Self::load_from(&path) {
            Ok(preference) => preference,
            Err(PreferenceError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Self::default()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable preference file");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, PreferenceError> {
        let contents = fs::read_to_string(path)?;
        let user: Table = toml::from_str(&contents)?;
        Self::resolve(Some(user))
    }

    pub fn save(&self) -> Result<(), PreferenceError> {
        let path = config_path().ok_or(PreferenceError::NoConfigDir)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), PreferenceError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}
