mod directory;

use std::fmt;

use arcade_engine::Snapshot;
use arcade_options::{CoreName, RomId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use directory::DirectoryStore;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateId(pub String);

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who created a save-state.
///
/// At most one `Auto` record exists per ROM; the auto-save scheduler removes the
/// previous ones before persisting a new snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateKind {
    Auto,
    Manual,
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateKind::Auto => f.write_str("auto"),
            StateKind::Manual => f.write_str("manual"),
        }
    }
}

/// Metadata of a persisted save-state. The blobs are fetched separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveStateRecord {
    pub id: StateId,
    #[serde(rename = "type")]
    pub kind: StateKind,
    pub core: CoreName,
    pub rom: RomId,
    /// Milliseconds since the unix epoch.
    pub created_at: u64,
}

/// A save-state about to be persisted.
#[derive(Debug, Clone)]
pub struct NewSaveState {
    pub kind: StateKind,
    pub core: CoreName,
    pub rom: RomId,
    pub snapshot: Snapshot,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Save-state '{0}' not found")]
    NotFound(StateId),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Save-state persistence.
#[async_trait]
pub trait SaveStateStore: Send + Sync {
    async fn list(&self, rom: &RomId, kind: StateKind) -> Result<Vec<SaveStateRecord>, StoreError>;

    async fn create(&self, state: NewSaveState) -> Result<SaveStateRecord, StoreError>;

    async fn delete(&self, id: &StateId) -> Result<(), StoreError>;
}

/// Launch telemetry. Callers treat it as best-effort.
#[async_trait]
pub trait LaunchRecorder: Send + Sync {
    async fn record_launch(&self, core: &CoreName, rom: &RomId) -> Result<(), StoreError>;
}
