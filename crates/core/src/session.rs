use std::fmt;
use std::sync::Arc;

use arcade_engine::{
    Button, Emulator, FocusTarget, HandleRef, Host, PreparationError, handle_id,
};
use arcade_options::EmulatorOptions;
use arcade_preference::Preference;
use arcade_states::LaunchRecorder;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::mute::{FromHandle, MuteController};
use crate::prepare::{PrepareCache, Prepared};
use crate::resources::{OwnerId, PromptSuppression, ResourceError, ResourceRegistry};
use crate::snapshot::SessionSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Unprepared,
    Prepared,
    Launched,
    Running,
    Paused,
    Exited,
}

impl SessionStatus {
    /// Running or paused: the states `exit` acts on.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::Running | SessionStatus::Paused)
    }

    /// Launched, running or paused.
    pub fn is_engaged(&self) -> bool {
        matches!(self, SessionStatus::Launched) || self.is_active()
    }
}

/// Observable session state, published on a watch channel.
#[derive(Clone)]
pub struct SessionView {
    pub status: SessionStatus,
    /// Owner of every resource claim made during the current lifetime.
    pub owner: OwnerId,
    pub launched_at: Option<Instant>,
    pub is_fullscreen: bool,
    pub is_muted: bool,
    pub is_turbo: bool,
    pub navigation_paused: bool,
    pub handle: Option<HandleRef>,
    pub options: Option<Arc<EmulatorOptions>>,
    /// Element that triggered the launch; receives focus back on exit.
    pub origin: Option<FocusTarget>,
    pub last_error: Option<PreparationError>,
}

impl SessionView {
    fn fresh(muted: bool) -> Self {
        Self {
            status: SessionStatus::Unprepared,
            owner: OwnerId::next(),
            launched_at: None,
            is_fullscreen: false,
            is_muted: muted,
            is_turbo: false,
            navigation_paused: false,
            handle: None,
            options: None,
            origin: None,
            last_error: None,
        }
    }

    fn holds(&self, handle: &HandleRef) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|held| handle_id(held) == handle_id(handle))
    }

    fn tracks(&self, options: &EmulatorOptions) -> bool {
        self.options.as_deref().is_some_and(|held| held == options)
    }
}

impl fmt::Debug for SessionView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionView")
            .field("status", &self.status)
            .field("owner", &self.owner)
            .field("launched_at", &self.launched_at)
            .field("is_fullscreen", &self.is_fullscreen)
            .field("is_muted", &self.is_muted)
            .field("is_turbo", &self.is_turbo)
            .field("navigation_paused", &self.navigation_paused)
            .field("handle", &self.handle.as_ref().map(handle_id))
            .field("rom", &self.options.as_ref().map(|o| o.rom.id.clone()))
            .field("last_error", &self.last_error)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionConfig {
    pub fullscreen_on_start: bool,
    pub muted_by_default: bool,
    /// Demo sessions send no launch telemetry.
    pub demo: bool,
}

impl SessionConfig {
    pub fn from_preference(preference: &Preference) -> Self {
        Self {
            fullscreen_on_start: preference.emulator.fullscreen,
            muted_by_default: preference.emulator.mute,
            demo: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// Keep the engine's auto-resume state. When false it is discarded before start.
    pub with_state: bool,
    pub origin: Option<FocusTarget>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExitOptions {
    pub reload_after_exit: bool,
}

/// A failure absorbed while exiting.
#[derive(Debug, thiserror::Error)]
pub enum ExitWarning {
    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("re-prepare failed: {0}")]
    Reprepare(PreparationError),

    #[error("library refresh failed: {0}")]
    Refresh(String),
}

#[derive(Debug, Default)]
pub struct ExitReport {
    pub warnings: Vec<ExitWarning>,
    /// Whether a fresh handle was ready when exit returned.
    pub reprepared: bool,
    /// A newer `prepare` replaced the session while it was exiting, so the old
    /// options were not re-prepared.
    pub superseded: bool,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Preparation(#[from] PreparationError),

    #[error("emulator failed to start: {0}")]
    Start(String),

    #[error("options were replaced before the emulator was ready")]
    Superseded,
}

/// What a finished lifetime leaves behind for re-preparation.
struct WoundDown {
    owner: OwnerId,
    options: Option<Arc<EmulatorOptions>>,
    warnings: Vec<ExitWarning>,
}

/// Lifecycle controller for one emulator session.
///
/// All state lives in a [`SessionView`] behind a watch channel; the auto-save
/// scheduler and the UI observe it through [`Session::subscribe`].
pub struct Session {
    cache: PrepareCache,
    host: Host,
    resources: Arc<ResourceRegistry>,
    mute: MuteController,
    recorder: Option<Arc<dyn LaunchRecorder>>,
    config: SessionConfig,
    state: watch::Sender<SessionView>,
}

impl Session {
    pub fn new(
        emulator: Arc<dyn Emulator>,
        host: Host,
        resources: Arc<ResourceRegistry>,
        config: SessionConfig,
    ) -> Self {
        let mute = MuteController::new(resources.audio.clone(), host.media_elements.clone())
            .with_lookup(FromHandle);
        let (state, _) = watch::channel(SessionView::fresh(config.muted_by_default));

        Self {
            cache: PrepareCache::new(emulator),
            host,
            resources,
            mute,
            recorder: None,
            config,
            state,
        }
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn LaunchRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Replace the mute controller, e.g. to add host-specific audio lookups.
    pub fn with_mute(mut self, mute: MuteController) -> Self {
        self.mute = mute;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.state.subscribe()
    }

    pub fn view(&self) -> SessionView {
        self.state.borrow().clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::from(&*self.state.borrow())
    }

    pub fn status(&self) -> SessionStatus {
        self.state.borrow().status
    }

    pub fn handle(&self) -> Option<HandleRef> {
        self.state.borrow().handle.clone()
    }

    pub fn options(&self) -> Option<Arc<EmulatorOptions>> {
        self.state.borrow().options.clone()
    }

    pub fn is_muted(&self) -> bool {
        self.state.borrow().is_muted
    }

    pub fn is_fullscreen(&self) -> bool {
        self.state.borrow().is_fullscreen
    }

    pub fn is_turbo(&self) -> bool {
        self.state.borrow().is_turbo
    }

    pub fn last_error(&self) -> Option<PreparationError> {
        self.state.borrow().last_error.clone()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn resources(&self) -> &Arc<ResourceRegistry> {
        &self.resources
    }

    /// Get a handle for `options`, building one if needed.
    ///
    /// Unchanged options return the installed handle or join the build already
    /// in flight. New options end the current lifetime first.
    pub async fn prepare(&self, options: Arc<EmulatorOptions>) -> Result<HandleRef, SessionError> {
        let view = self.view();
        if view.tracks(&options) {
            if let Some(handle) = view.handle {
                return Ok(handle);
            }
        } else {
            if view.status.is_active() {
                info!(rom = %options.rom.id, "options changed while running");
                if let Some(wound_down) = self.wind_down().await {
                    for warning in &wound_down.warnings {
                        warn!(warning = %warning, "cleanup after options change");
                    }
                }
            }
            let muted = self.config.muted_by_default;
            let next = options.clone();
            self.state.send_modify(|view| {
                *view = SessionView::fresh(muted);
                view.options = Some(next);
            });
        }

        match self.cache.get(options.clone()).await {
            Ok(Prepared::Current(handle)) => self.install(&options, handle),
            Ok(Prepared::Superseded) => Err(SessionError::Superseded),
            Err(e) => {
                warn!(rom = %options.rom.id, error = %e, "emulator preparation failed");
                let failure = e.clone();
                self.state.send_if_modified(|view| {
                    if !view.tracks(&options) || view.handle.is_some() {
                        return false;
                    }
                    view.status = SessionStatus::Unprepared;
                    view.last_error = Some(failure);
                    true
                });
                Err(SessionError::Preparation(e))
            }
        }
    }

    fn install(&self, options: &Arc<EmulatorOptions>, handle: HandleRef) -> Result<HandleRef, SessionError> {
        let muted = self.config.muted_by_default;
        self.state.send_if_modified(|view| {
            if !view.tracks(options) || view.holds(&handle) || view.status.is_engaged() {
                return false;
            }
            *view = SessionView::fresh(muted);
            view.status = SessionStatus::Prepared;
            view.handle = Some(handle.clone());
            view.options = Some(options.clone());
            true
        });

        if self.state.borrow().holds(&handle) {
            debug!(rom = %options.rom.id, "emulator prepared");
            Ok(handle)
        } else {
            Err(SessionError::Superseded)
        }
    }

    /// Hand the prepared emulator to the player.
    ///
    /// Returns false without doing anything unless the session is prepared.
    pub fn launch(&self, launch: LaunchOptions) -> bool {
        let view = self.view();
        let (SessionStatus::Prepared, Some(handle)) = (view.status, view.handle) else {
            debug!(status = ?view.status, "launch ignored");
            return false;
        };

        if !launch.with_state {
            if let Err(e) = handle.discard_auto_resume() {
                debug!(error = %e, "could not discard auto-resume state");
            }
        }
        self.host.focus.focus(&FocusTarget::Surface(handle.surface()));

        let launched = self.state.send_if_modified(|view| {
            if view.status != SessionStatus::Prepared || !view.holds(&handle) {
                return false;
            }
            view.status = SessionStatus::Launched;
            view.launched_at = Some(Instant::now());
            view.origin = launch.origin.clone();
            true
        });
        if !launched {
            return false;
        }

        if let Some(options) = view.options {
            info!(rom = %options.rom.id, core = %options.core, "session launched");
            self.record_launch(&options);
        }
        true
    }

    fn record_launch(&self, options: &EmulatorOptions) {
        if self.config.demo {
            return;
        }
        let Some(recorder) = self.recorder.clone() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no runtime for launch telemetry");
            return;
        };

        let core = options.core.clone();
        let rom = options.rom.id.clone();
        runtime.spawn(async move {
            if let Err(e) = recorder.record_launch(&core, &rom).await {
                debug!(rom = %rom, error = %e, "launch telemetry failed");
            }
        });
    }

    /// Start emulation. Returns `Ok(false)` unless the session is launched.
    pub async fn start(&self) -> Result<bool, SessionError> {
        let view = self.view();
        let (SessionStatus::Launched, Some(handle)) = (view.status, view.handle) else {
            debug!(status = ?view.status, "start ignored");
            return Ok(false);
        };

        {
            let _prompt = PromptSuppression::engage(self.host.user_media.as_ref());
            handle
                .start()
                .await
                .map_err(|e| SessionError::Start(format!("{e:#}")))?;
        }

        let started = self.state.send_if_modified(|view| {
            if view.status != SessionStatus::Launched || !view.holds(&handle) {
                return false;
            }
            view.status = SessionStatus::Running;
            true
        });
        if !started {
            debug!("session ended while starting");
            return Ok(false);
        }
        self.host.focus.focus(&FocusTarget::Surface(handle.surface()));

        let owner = view.owner;
        if self.config.fullscreen_on_start {
            self.enter_fullscreen_on_start(owner, &handle).await;
        }

        match self.resources.wake_lock.acquire(owner).await {
            Ok(()) if !self.lifetime_active(owner, &handle) => {
                debug!(%owner, "session ended while taking the wake-lock");
                if let Err(e) = self.resources.wake_lock.release(owner).await {
                    warn!(error = %e, "late wake-lock release failed");
                }
            }
            Ok(()) => {}
            Err(e) => debug!(error = %e, "running without wake-lock"),
        }

        if !self.lifetime_active(owner, &handle) {
            return Ok(false);
        }
        if self.is_muted() {
            self.mute.apply(true, Some(&handle)).await;
        }
        Ok(true)
    }

    async fn enter_fullscreen_on_start(&self, owner: OwnerId, handle: &HandleRef) {
        if let Err(e) = self.resources.fullscreen.acquire(owner).await {
            debug!(error = %e, "could not enter fullscreen");
            return;
        }

        let entered = self.state.send_if_modified(|view| {
            if view.owner != owner || !view.status.is_active() || !view.holds(handle) {
                return false;
            }
            view.is_fullscreen = true;
            true
        });
        if !entered && !self.lifetime_active(owner, handle) {
            debug!(%owner, "session ended while entering fullscreen");
            if let Err(e) = self.resources.fullscreen.release(owner).await {
                warn!(error = %e, "late fullscreen release failed");
            }
        }
    }

    /// Whether `owner`'s lifetime is still running or paused on `handle`.
    fn lifetime_active(&self, owner: OwnerId, handle: &HandleRef) -> bool {
        let view = self.state.borrow();
        view.owner == owner && view.status.is_active() && view.holds(handle)
    }

    pub fn pause(&self) -> bool {
        self.cycle(SessionStatus::Running, SessionStatus::Paused)
    }

    pub fn resume(&self) -> bool {
        self.cycle(SessionStatus::Paused, SessionStatus::Running)
    }

    fn cycle(&self, from: SessionStatus, to: SessionStatus) -> bool {
        let mut target = None;
        self.state.send_if_modified(|view| {
            if view.status != from {
                return false;
            }
            view.status = to;
            target = view.handle.clone();
            true
        });

        let Some(handle) = target else {
            return false;
        };
        match to {
            SessionStatus::Paused => handle.pause(),
            _ => handle.resume(),
        }
        true
    }

    /// Enter or leave fullscreen. Failures leave the flag unchanged.
    pub async fn toggle_fullscreen(&self) -> bool {
        let owner = self.state.borrow().owner;
        let enter = !self.resources.fullscreen.is_active();
        self.set_fullscreen(owner, enter).await;

        if let Some(handle) = self.handle() {
            self.host.focus.focus(&FocusTarget::Surface(handle.surface()));
        }
        self.is_fullscreen()
    }

    async fn set_fullscreen(&self, owner: OwnerId, enter: bool) {
        let result = if enter {
            self.resources.fullscreen.acquire(owner).await.map(|()| true)
        } else {
            self.resources.fullscreen.force_release().await.map(|_| false)
        };

        match result {
            Ok(active) => {
                self.state.send_if_modified(|view| {
                    let changed = view.is_fullscreen != active;
                    view.is_fullscreen = active;
                    changed
                });
            }
            Err(e) => debug!(error = %e, "fullscreen toggle failed"),
        }
    }

    /// Reflect a fullscreen change the host made on its own.
    pub fn sync_fullscreen(&self, active: bool) {
        let owner = self.state.borrow().owner;
        self.resources.fullscreen.sync(owner, active);
        self.state.send_if_modified(|view| {
            let changed = view.is_fullscreen != active;
            view.is_fullscreen = active;
            changed
        });
    }

    /// Flip the mute flag, then bring audio output in line with it.
    ///
    /// The flag always flips, even when no audio context could be changed.
    pub async fn toggle_mute(&self) -> bool {
        let mut muted = false;
        let mut handle = None;
        self.state.send_modify(|view| {
            view.is_muted = !view.is_muted;
            muted = view.is_muted;
            handle = view.handle.clone();
        });

        let outcome = self.mute.apply(muted, handle.as_ref()).await;
        debug!(
            muted,
            context = outcome.context_found,
            hardware = outcome.hardware_changed,
            elements = outcome.elements,
            "mute toggled"
        );
        muted
    }

    /// Hold or release fast-forward.
    pub fn toggle_turbo(&self) -> bool {
        let mut turbo = false;
        let mut handle = None;
        self.state.send_modify(|view| {
            view.is_turbo = !view.is_turbo;
            turbo = view.is_turbo;
            handle = view.handle.clone();
        });

        if let Some(handle) = handle {
            if turbo {
                handle.press_down(&Button::FAST_FORWARD);
            } else {
                handle.press_up(&Button::FAST_FORWARD);
            }
        }
        turbo
    }

    pub fn set_navigation_paused(&self, paused: bool) {
        self.state.send_if_modified(|view| {
            let changed = view.navigation_paused != paused;
            view.navigation_paused = paused;
            changed
        });
    }

    /// End a running or paused session and prepare a fresh handle.
    ///
    /// Returns `None` if the session was not running or paused. Release
    /// failures are collected in the report, never returned as errors.
    pub async fn exit(&self, exit: ExitOptions) -> Option<ExitReport> {
        let WoundDown {
            owner,
            options,
            mut warnings,
        } = self.wind_down().await?;

        let superseded = self.state.borrow().owner != owner;
        let mut reprepared = false;
        if superseded {
            debug!(%owner, "session replaced while exiting; re-prepare skipped");
        } else if let Some(options) = options {
            match self.prepare(options).await {
                Ok(_) => reprepared = true,
                Err(SessionError::Preparation(e)) => warnings.push(ExitWarning::Reprepare(e)),
                Err(e) => debug!(error = %e, "re-prepare skipped"),
            }
        }

        if exit.reload_after_exit {
            if let Some(refresh) = &self.host.refresh {
                if let Err(e) = refresh.reload().await {
                    warnings.push(ExitWarning::Refresh(format!("{e:#}")));
                }
            }
        }

        for warning in &warnings {
            warn!(warning = %warning, "exit completed with a warning");
        }
        Some(ExitReport {
            warnings,
            reprepared,
            superseded,
        })
    }

    /// Tear the session down for good, e.g. when navigating away.
    ///
    /// Runs the exit cleanup without re-preparing, releases any claim this
    /// session still holds and leaves the session unprepared.
    pub async fn close(&self) -> Vec<ExitWarning> {
        let mut warnings = match self.wind_down().await {
            Some(wound_down) => wound_down.warnings,
            None => Vec::new(),
        };

        let owner = self.state.borrow().owner;
        warnings.extend(
            self.resources
                .release_all(owner)
                .await
                .into_iter()
                .map(ExitWarning::from),
        );

        self.cache.invalidate();
        let muted = self.config.muted_by_default;
        self.state.send_modify(|view| *view = SessionView::fresh(muted));

        for warning in &warnings {
            warn!(warning = %warning, "close completed with a warning");
        }
        warnings
    }

    /// Stop the active handle and release everything it held.
    async fn wind_down(&self) -> Option<WoundDown> {
        let mut ending = None;
        self.state.send_if_modified(|view| {
            if !view.status.is_active() {
                return false;
            }
            ending = Some(view.clone());
            view.status = SessionStatus::Exited;
            view.handle = None;
            true
        });
        let ending = ending?;
        // A prepare issued from here on must build a new handle.
        self.cache.invalidate();
        info!(owner = %ending.owner, "session exiting");

        if let Some(handle) = &ending.handle {
            handle.exit();
        }

        let resources = &self.resources;
        let (fullscreen, wake_lock, audio) = tokio::join!(
            resources.fullscreen.release(ending.owner),
            resources.wake_lock.release(ending.owner),
            resources.audio.quiesce(),
        );
        let warnings = [fullscreen.err(), wake_lock.err(), audio.err()]
            .into_iter()
            .flatten()
            .map(ExitWarning::from)
            .collect();

        let current = self.state.send_if_modified(|view| {
            if view.owner != ending.owner {
                return false;
            }
            view.launched_at = None;
            view.is_fullscreen = false;
            view.is_muted = false;
            view.is_turbo = false;
            view.navigation_paused = false;
            true
        });

        if current {
            if let Some(origin) = &ending.origin {
                self.host.focus.focus(origin);
            }
        }

        Some(WoundDown {
            owner: ending.owner,
            options: ending.options,
            warnings,
        })
    }
}
