use arcade_options::RomId;
use arcade_states::{NewSaveState, SaveStateRecord, SaveStateStore, StateKind, StoreError};
use tracing::info;

use crate::session::Session;

#[derive(Debug, thiserror::Error)]
pub enum ManualSaveError {
    #[error("no emulator is running")]
    NoEmulator,

    #[error("snapshot failed: {0}")]
    Snapshot(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Save the running game as a manual state.
pub async fn save_manual(
    session: &Session,
    store: &dyn SaveStateStore,
) -> Result<SaveStateRecord, ManualSaveError> {
    let view = session.view();
    let (Some(handle), Some(options)) = (view.handle, view.options) else {
        return Err(ManualSaveError::NoEmulator);
    };
    if !view.status.is_active() {
        return Err(ManualSaveError::NoEmulator);
    }

    let snapshot = handle
        .save_state()
        .await
        .map_err(|e| ManualSaveError::Snapshot(format!("{e:#}")))?;
    let record = store
        .create(NewSaveState {
            kind: StateKind::Manual,
            core: options.core.clone(),
            rom: options.rom.id.clone(),
            snapshot,
        })
        .await?;

    info!(rom = %record.rom, state = %record.id, "state saved");
    Ok(record)
}

/// Every state for a ROM: manual saves first, then the auto-save.
pub async fn list_states(
    store: &dyn SaveStateStore,
    rom: &RomId,
) -> Result<Vec<SaveStateRecord>, StoreError> {
    let mut states = store.list(rom, StateKind::Manual).await?;
    states.extend(store.list(rom, StateKind::Auto).await?);
    Ok(states)
}
