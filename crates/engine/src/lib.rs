//! Contracts for the emulator engine a session drives.
//!
//! The engine itself (core loading, rendering, audio) is a black box. This crate
//! only describes what the session layer may ask of it, plus the host
//! capabilities in [`host`] that the session claims while a game runs.

pub mod host;

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use arcade_options::EmulatorOptions;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use host::{
    AudioContext, AudioState, FocusTarget, Fullscreen, Host, LibraryRefresh, MediaElements,
    Focus, Unsupported, UserMedia, WakeLock, WakeLockSentinel,
};

/// Status reported by a live emulator handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    Unprepared,
    Launched,
    Running,
    Paused,
}

impl EngineStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, EngineStatus::Running | EngineStatus::Paused)
    }
}

/// A serialized emulator state plus a thumbnail of the frame it was taken on.
#[derive(Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub state: Vec<u8>,
    pub thumbnail: Vec<u8>,
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("state_len", &self.state.len())
            .field("thumbnail_len", &self.thumbnail.len())
            .finish()
    }
}

/// A retroarch virtual button name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Button(Cow<'static, str>);

impl Button {
    pub const FAST_FORWARD: Button = Button(Cow::Borrowed("fast_forward"));
    pub const REWIND: Button = Button(Cow::Borrowed("rewind"));

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Identity of the surface an emulator renders into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreparationError {
    #[error("failed to fetch '{resource}': {reason}")]
    Fetch { resource: String, reason: String },

    #[error("core '{core}' is unavailable: {reason}")]
    Core { core: String, reason: String },

    #[error("emulator preparation failed: {0}")]
    Engine(String),
}

impl From<anyhow::Error> for PreparationError {
    fn from(err: anyhow::Error) -> Self {
        PreparationError::Engine(format!("{err:#}"))
    }
}

/// Builds emulator handles from options.
#[async_trait]
pub trait Emulator: Send + Sync {
    async fn prepare(&self, options: Arc<EmulatorOptions>) -> Result<HandleRef, PreparationError>;
}

/// A prepared emulator instance.
///
/// A handle is owned by exactly one session and must not be used after
/// [`EmulatorHandle::exit`] returns.
#[async_trait]
pub trait EmulatorHandle: Send + Sync {
    /// Bring the core up and begin emulation.
    async fn start(&self) -> anyhow::Result<()>;

    fn exit(&self);

    fn pause(&self);

    fn resume(&self);

    fn status(&self) -> EngineStatus;

    async fn save_state(&self) -> anyhow::Result<Snapshot>;

    fn press_down(&self, button: &Button);

    fn press_up(&self, button: &Button);

    fn surface(&self) -> SurfaceId;

    /// Remove the on-disk auto-resume state so the next start boots fresh.
    fn discard_auto_resume(&self) -> anyhow::Result<()>;

    /// The audio context the engine created internally, if it exposes one.
    fn audio_context(&self) -> Option<Arc<dyn AudioContext>> {
        None
    }
}

pub type HandleRef = Arc<dyn EmulatorHandle>;

/// Pointer identity of a handle, used to tell handles apart without `Eq`.
pub fn handle_id(handle: &HandleRef) -> usize {
    Arc::as_ptr(handle) as *const () as usize
}
