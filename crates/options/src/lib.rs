use std::collections::BTreeMap;
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identifier of a ROM in the library.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RomId(pub String);

impl RomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of a libretro core, e.g. `fceumm` or `mgba`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoreName(pub String);

impl CoreName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CoreName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The ROM binary a session runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RomRef {
    pub id: RomId,
    pub file_name: String,
    /// Where the emulator fetches the binary from (URL or path).
    pub location: String,
}

/// A BIOS file handed to the core alongside the ROM.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BiosFile {
    pub file_name: String,
    pub location: String,
}

/// A single retroarch config entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Bool(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Int(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::Text(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::Text(value)
    }
}

/// Everything needed to build an emulator handle.
///
/// The value is immutable once built; sessions compare options by identity
/// (see [`OptionsKey`]) to decide whether a prepared handle can be reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmulatorOptions {
    pub rom: RomRef,
    pub core: CoreName,
    pub bios: Vec<BiosFile>,
    pub retroarch_config: BTreeMap<String, ConfigValue>,
    pub core_config: BTreeMap<String, String>,
    pub shader: Option<String>,
    /// State file to resume from, if any.
    pub state: Option<String>,
}

impl EmulatorOptions {
    pub fn new(rom: RomRef, core: CoreName) -> Self {
        Self {
            rom,
            core,
            bios: Vec::new(),
            retroarch_config: BTreeMap::new(),
            core_config: BTreeMap::new(),
            shader: None,
            state: None,
        }
    }

    pub fn key(&self) -> OptionsKey {
        OptionsKey::of(self)
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

/// Structural hash of an [`EmulatorOptions`] value.
///
/// Two option values with equal contents produce equal keys. Callers that need
/// to rule out collisions still compare the options themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OptionsKey(u64);

impl OptionsKey {
    pub fn of(options: &EmulatorOptions) -> Self {
        let mut hasher = DefaultHasher::new();
        options.hash(&mut hasher);
        Self(hasher.finish())
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for OptionsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
