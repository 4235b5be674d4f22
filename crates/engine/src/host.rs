//! Host capabilities a running session claims or pokes at.
//!
//! Each trait covers one scarce host facility. The session layer wraps the
//! claimable ones (wake-lock, fullscreen, audio context) in guards that track
//! ownership; the rest are fire-and-forget.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::SurfaceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioState {
    Running,
    Suspended,
    Closed,
}

/// An audio output context. Owned by the engine; the session only toggles it.
#[async_trait]
pub trait AudioContext: Send + Sync {
    fn state(&self) -> AudioState;

    async fn suspend(&self) -> anyhow::Result<()>;

    async fn resume(&self) -> anyhow::Result<()>;
}

/// Screen wake-lock requests.
#[async_trait]
pub trait WakeLock: Send + Sync {
    async fn request(&self) -> anyhow::Result<Box<dyn WakeLockSentinel>>;
}

/// A granted wake-lock. Released exactly once by its owner.
#[async_trait]
pub trait WakeLockSentinel: Send + Sync {
    async fn release(&self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait Fullscreen: Send + Sync {
    fn is_active(&self) -> bool;

    async fn enter(&self) -> anyhow::Result<()>;

    async fn exit(&self) -> anyhow::Result<()>;
}

/// Every audio/video element currently rendered by the host.
pub trait MediaElements: Send + Sync {
    /// Set the native mute flag on each element, returning how many were touched.
    fn set_muted(&self, muted: bool) -> usize;
}

/// Something that can receive input focus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FocusTarget {
    Surface(SurfaceId),
    Element(String),
}

pub trait Focus: Send + Sync {
    fn focus(&self, target: &FocusTarget);
}

/// The host's camera/microphone accessor.
pub trait UserMedia: Send + Sync {
    /// Enable or disable the permission prompt path, returning the previous setting.
    fn set_prompt_enabled(&self, enabled: bool) -> anyhow::Result<bool>;
}

/// Reloads library data after a session ends.
#[async_trait]
pub trait LibraryRefresh: Send + Sync {
    async fn reload(&self) -> anyhow::Result<()>;
}

/// The set of host capabilities handed to a session.
#[derive(Clone)]
pub struct Host {
    pub wake_lock: Arc<dyn WakeLock>,
    pub fullscreen: Arc<dyn Fullscreen>,
    pub media_elements: Arc<dyn MediaElements>,
    pub focus: Arc<dyn Focus>,
    pub user_media: Arc<dyn UserMedia>,
    pub refresh: Option<Arc<dyn LibraryRefresh>>,
}

impl Host {
    /// A host with none of the optional capabilities.
    ///
    /// Wake-lock and fullscreen requests fail, media and focus calls do nothing.
    pub fn headless() -> Self {
        let unsupported = Arc::new(Unsupported);
        Self {
            wake_lock: unsupported.clone(),
            fullscreen: unsupported.clone(),
            media_elements: unsupported.clone(),
            focus: unsupported.clone(),
            user_media: unsupported,
            refresh: None,
        }
    }
}

/// Stand-in for a capability the host does not provide.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unsupported;

#[async_trait]
impl WakeLock for Unsupported {
    async fn request(&self) -> anyhow::Result<Box<dyn WakeLockSentinel>> {
        anyhow::bail!("wake-lock is not supported by this host")
    }
}

#[async_trait]
impl Fullscreen for Unsupported {
    fn is_active(&self) -> bool {
        false
    }

    async fn enter(&self) -> anyhow::Result<()> {
        anyhow::bail!("fullscreen is not supported by this host")
    }

    async fn exit(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl MediaElements for Unsupported {
    fn set_muted(&self, _muted: bool) -> usize {
        0
    }
}

impl Focus for Unsupported {
    fn focus(&self, _target: &FocusTarget) {}
}

impl UserMedia for Unsupported {
    fn set_prompt_enabled(&self, _enabled: bool) -> anyhow::Result<bool> {
        Ok(false)
    }
}
