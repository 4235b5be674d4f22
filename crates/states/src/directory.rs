use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use arcade_engine::Snapshot;
use arcade_options::{CoreName, RomId};
use async_trait::async_trait;
use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::{
    LaunchRecorder, NewSaveState, SaveStateRecord, SaveStateStore, StateId, StateKind, StoreError,
};

const LAUNCH_LOG: &str = "launch_records.jsonl";

/// Save-states stored as files under a root directory.
///
/// Each record is `<id>.json` (metadata) with `<id>.state` and `<id>.thumbnail`
/// next to it.
#[derive(Debug)]
pub struct DirectoryStore {
    root: PathBuf,
    sequence: AtomicU64,
}

#[derive(Serialize)]
struct LaunchRecord<'a> {
    core: &'a CoreName,
    rom: &'a RomId,
    launched_at: u64,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl DirectoryStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            sequence: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn next_id(&self, created_at: u64) -> StateId {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        StateId(format!("{created_at:013}-{seq:06}"))
    }

    fn path(&self, id: &StateId, extension: &str) -> PathBuf {
        self.root.join(format!("{}.{extension}", id.0))
    }

    pub async fn read_snapshot(&self, id: &StateId) -> Result<Snapshot, StoreError> {
        let state = match fs::read(self.path(id, "state")).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        let thumbnail = fs::read(self.path(id, "thumbnail")).await?;
        Ok(Snapshot { state, thumbnail })
    }

    async fn read_record(path: &Path) -> Result<SaveStateRecord, StoreError> {
        let bytes = fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl SaveStateStore for DirectoryStore {
    async fn list(&self, rom: &RomId, kind: StateKind) -> Result<Vec<SaveStateRecord>, StoreError> {
        let mut records = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_record(&path).await {
                Ok(record) if record.rom == *rom && record.kind == kind => records.push(record),
                Ok(_) => {}
                Err(e) => debug!(path = %path.display(), error = %e, "skipping unreadable record"),
            }
        }

        records.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(records)
    }

    async fn create(&self, state: NewSaveState) -> Result<SaveStateRecord, StoreError> {
        let created_at = now_millis();
        let record = SaveStateRecord {
            id: self.next_id(created_at),
            kind: state.kind,
            core: state.core,
            rom: state.rom,
            created_at,
        };

        fs::write(self.path(&record.id, "state"), &state.snapshot.state).await?;
        fs::write(self.path(&record.id, "thumbnail"), &state.snapshot.thumbnail).await?;
        // Metadata last, so a listed record always has its blobs.
        let metadata = serde_json::to_vec_pretty(&record)?;
        fs::write(self.path(&record.id, "json"), metadata).await?;

        debug!(id = %record.id, kind = %record.kind, rom = %record.rom, "save-state created");
        Ok(record)
    }

    async fn delete(&self, id: &StateId) -> Result<(), StoreError> {
        match fs::remove_file(self.path(id, "json")).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.clone()));
            }
            Err(e) => return Err(e.into()),
        }

        for extension in ["state", "thumbnail"] {
            if let Err(e) = fs::remove_file(self.path(id, extension)).await {
                if e.kind() != ErrorKind::NotFound {
                    return Err(e.into());
                }
            }
        }

        debug!(id = %id, "save-state deleted");
        Ok(())
    }
}

#[async_trait]
impl LaunchRecorder for DirectoryStore {
    async fn record_launch(&self, core: &CoreName, rom: &RomId) -> Result<(), StoreError> {
        let record = LaunchRecord {
            core,
            rom,
            launched_at: now_millis(),
        };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root.join(LAUNCH_LOG))
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}
