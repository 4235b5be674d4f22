//! Ownership-tracking guards around the host's scarce resources.
//!
//! The wake-lock, fullscreen mode and the engine's audio context are
//! process-wide singletons. [`ResourceRegistry`] holds one guard per resource
//! and records which session owns each claim, so a claim leaked by an earlier
//! session is detected (and force-released) before a new one is taken.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arcade_engine::{AudioContext, AudioState, Fullscreen, Host, UserMedia, WakeLock, WakeLockSentinel};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

/// Identity of one session lifetime, used as the owner of resource claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(u64);

impl OwnerId {
    pub fn next() -> Self {
        Self(NEXT_OWNER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    WakeLock,
    Fullscreen,
    Audio,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::WakeLock => f.write_str("wake-lock"),
            ResourceKind::Fullscreen => f.write_str("fullscreen"),
            ResourceKind::Audio => f.write_str("audio context"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("failed to acquire {kind}: {reason}")]
    Acquire { kind: ResourceKind, reason: String },

    #[error("failed to release {kind}: {reason}")]
    Release { kind: ResourceKind, reason: String },
}

impl ResourceError {
    fn acquire(kind: ResourceKind, err: anyhow::Error) -> Self {
        ResourceError::Acquire {
            kind,
            reason: format!("{err:#}"),
        }
    }

    fn release(kind: ResourceKind, err: anyhow::Error) -> Self {
        ResourceError::Release {
            kind,
            reason: format!("{err:#}"),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceError::Acquire { kind, .. } | ResourceError::Release { kind, .. } => *kind,
        }
    }
}

struct WakeLockClaim {
    owner: OwnerId,
    sentinel: Box<dyn WakeLockSentinel>,
}

pub struct WakeLockGuard {
    provider: Arc<dyn WakeLock>,
    claim: Mutex<Option<WakeLockClaim>>,
}

impl WakeLockGuard {
    pub fn new(provider: Arc<dyn WakeLock>) -> Self {
        Self {
            provider,
            claim: Mutex::new(None),
        }
    }

    pub fn holder(&self) -> Option<OwnerId> {
        self.claim.lock().as_ref().map(|claim| claim.owner)
    }

    /// Take the wake-lock for `owner`. Holding it already is a no-op.
    pub async fn acquire(&self, owner: OwnerId) -> Result<(), ResourceError> {
        match self.holder() {
            Some(holder) if holder == owner => return Ok(()),
            Some(stale) => {
                warn!(%stale, %owner, "wake-lock still held by a previous session");
                if let Err(e) = self.force_release().await {
                    debug!(error = %e, "stale wake-lock release failed");
                }
            }
            None => {}
        }

        let sentinel = self
            .provider
            .request()
            .await
            .map_err(|e| ResourceError::acquire(ResourceKind::WakeLock, e))?;

        let lost = {
            let mut claim = self.claim.lock();
            match claim.as_ref().map(|held| held.owner) {
                None => {
                    *claim = Some(WakeLockClaim { owner, sentinel });
                    None
                }
                Some(winner) => Some((winner, sentinel)),
            }
        };

        // Another acquire finished first; hand back the duplicate.
        if let Some((winner, sentinel)) = lost {
            if let Err(e) = sentinel.release().await {
                debug!(error = %e, "duplicate wake-lock release failed");
            }
            if winner != owner {
                return Err(ResourceError::Acquire {
                    kind: ResourceKind::WakeLock,
                    reason: format!("claimed concurrently by {winner}"),
                });
            }
        }
        Ok(())
    }

    /// Release the wake-lock if `owner` holds it.
    ///
    /// The claim is dropped even if the host fails to release it. Returns
    /// whether a claim was held.
    pub async fn release(&self, owner: OwnerId) -> Result<bool, ResourceError> {
        let claim = {
            let mut claim = self.claim.lock();
            if claim.as_ref().is_some_and(|held| held.owner == owner) {
                claim.take()
            } else {
                None
            }
        };
        Self::release_claim(claim).await
    }

    /// Release the wake-lock whoever holds it.
    pub async fn force_release(&self) -> Result<bool, ResourceError> {
        let claim = self.claim.lock().take();
        Self::release_claim(claim).await
    }

    async fn release_claim(claim: Option<WakeLockClaim>) -> Result<bool, ResourceError> {
        let Some(claim) = claim else {
            return Ok(false);
        };
        claim
            .sentinel
            .release()
            .await
            .map_err(|e| ResourceError::release(ResourceKind::WakeLock, e))?;
        Ok(true)
    }
}

pub struct FullscreenGuard {
    api: Arc<dyn Fullscreen>,
    owner: Mutex<Option<OwnerId>>,
}

impl FullscreenGuard {
    pub fn new(api: Arc<dyn Fullscreen>) -> Self {
        Self {
            api,
            owner: Mutex::new(None),
        }
    }

    pub fn is_active(&self) -> bool {
        self.api.is_active()
    }

    pub fn holder(&self) -> Option<OwnerId> {
        *self.owner.lock()
    }

    pub async fn acquire(&self, owner: OwnerId) -> Result<(), ResourceError> {
        match self.holder() {
            Some(holder) if holder == owner && self.api.is_active() => return Ok(()),
            Some(holder) if holder != owner => {
                warn!(stale = %holder, %owner, "fullscreen still claimed by a previous session");
                if let Err(e) = self.force_release().await {
                    debug!(error = %e, "stale fullscreen release failed");
                }
            }
            _ => {}
        }

        self.api
            .enter()
            .await
            .map_err(|e| ResourceError::acquire(ResourceKind::Fullscreen, e))?;
        *self.owner.lock() = Some(owner);
        Ok(())
    }

    /// Leave fullscreen if it is active and not claimed by another session.
    pub async fn release(&self, owner: OwnerId) -> Result<bool, ResourceError> {
        {
            let mut held = self.owner.lock();
            match *held {
                Some(holder) if holder != owner => return Ok(false),
                _ => *held = None,
            }
        }
        self.exit_if_active().await
    }

    pub async fn force_release(&self) -> Result<bool, ResourceError> {
        self.owner.lock().take();
        self.exit_if_active().await
    }

    /// Record a fullscreen change the host made on its own.
    pub fn sync(&self, owner: OwnerId, active: bool) {
        let mut held = self.owner.lock();
        match (active, *held) {
            (false, _) => *held = None,
            (true, None) => *held = Some(owner),
            (true, Some(_)) => {}
        }
    }

    async fn exit_if_active(&self) -> Result<bool, ResourceError> {
        if !self.api.is_active() {
            return Ok(false);
        }
        self.api
            .exit()
            .await
            .map_err(|e| ResourceError::release(ResourceKind::Fullscreen, e))?;
        Ok(true)
    }
}

/// The engine's audio context once something has found it.
///
/// The context belongs to the engine; this slot only remembers it so the mute
/// controller and exit cleanup act on the same instance.
#[derive(Default)]
pub struct AudioSlot {
    context: Mutex<Option<Arc<dyn AudioContext>>>,
}

impl AudioSlot {
    pub fn capture(&self, context: Arc<dyn AudioContext>) {
        *self.context.lock() = Some(context);
    }

    pub fn current(&self) -> Option<Arc<dyn AudioContext>> {
        self.context.lock().clone()
    }

    pub fn is_captured(&self) -> bool {
        self.context.lock().is_some()
    }

    /// Discard the context, resuming it first if it was left suspended.
    pub async fn quiesce(&self) -> Result<bool, ResourceError> {
        let context = self.context.lock().take();
        let Some(context) = context else {
            return Ok(false);
        };
        if context.state() == AudioState::Suspended {
            context
                .resume()
                .await
                .map_err(|e| ResourceError::release(ResourceKind::Audio, e))?;
        }
        Ok(true)
    }
}

/// One guard per host resource, shared by every session in the process.
pub struct ResourceRegistry {
    pub wake_lock: WakeLockGuard,
    pub fullscreen: FullscreenGuard,
    pub audio: Arc<AudioSlot>,
}

impl ResourceRegistry {
    pub fn new(host: &Host) -> Self {
        Self {
            wake_lock: WakeLockGuard::new(host.wake_lock.clone()),
            fullscreen: FullscreenGuard::new(host.fullscreen.clone()),
            audio: Arc::new(AudioSlot::default()),
        }
    }

    /// Claims currently recorded for `owner`.
    pub fn held_by(&self, owner: OwnerId) -> Vec<ResourceKind> {
        let mut held = Vec::new();
        if self.wake_lock.holder() == Some(owner) {
            held.push(ResourceKind::WakeLock);
        }
        if self.fullscreen.holder() == Some(owner) {
            held.push(ResourceKind::Fullscreen);
        }
        held
    }

    /// Release every claim `owner` still holds, attempting each independently.
    pub async fn release_all(&self, owner: OwnerId) -> Vec<ResourceError> {
        let (fullscreen, wake_lock) = tokio::join!(
            self.fullscreen.release(owner),
            self.wake_lock.release(owner)
        );
        [fullscreen, wake_lock]
            .into_iter()
            .filter_map(Result::err)
            .collect()
    }
}

/// Disables the host's camera/microphone prompt until dropped.
pub(crate) struct PromptSuppression<'a> {
    media: &'a dyn UserMedia,
    previous: Option<bool>,
}

impl<'a> PromptSuppression<'a> {
    pub(crate) fn engage(media: &'a dyn UserMedia) -> Self {
        let previous = match media.set_prompt_enabled(false) {
            Ok(previous) => Some(previous),
            Err(e) => {
                debug!(error = %e, "could not disable media prompt");
                None
            }
        };
        Self { media, previous }
    }
}

impl Drop for PromptSuppression<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous {
            if let Err(e) = self.media.set_prompt_enabled(previous) {
                debug!(error = %e, "could not restore media prompt");
            }
        }
    }
}
