//! Session lifecycle for the emulator: preparation, launch, auto-save, muting
//! and the cleanup of host resources on exit.

pub mod autosave;
pub mod mute;
pub mod prepare;
pub mod resources;
pub mod session;
pub mod snapshot;
pub mod states;

#[cfg(test)]
mod testing;

pub use autosave::{AutoSave, AutoSaveError, AutoSaveScheduler, TickOutcome, WARM_UP};
pub use mute::{AudioContextLookup, FromHandle, HostGlobal, MuteController, MuteOutcome};
pub use prepare::{PrepareCache, Prepared};
pub use resources::{
    AudioSlot, FullscreenGuard, OwnerId, ResourceError, ResourceKind, ResourceRegistry,
    WakeLockGuard,
};
pub use session::{
    ExitOptions, ExitReport, ExitWarning, LaunchOptions, Session, SessionConfig, SessionError,
    SessionStatus, SessionView,
};
pub use snapshot::SessionSnapshot;
pub use states::{ManualSaveError, list_states, save_manual};

pub use arcade_engine::{Emulator, EmulatorHandle, HandleRef, Host, PreparationError};
pub use arcade_options::EmulatorOptions;
pub use arcade_preference::Preference;
pub use arcade_states::{DirectoryStore, SaveStateStore};
