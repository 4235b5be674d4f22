//! Periodic auto-save while a session runs.
//!
//! A driver task watches the session view and the configured interval. Each
//! distinct combination of session lifetime, core, ROM and period gets its own timer
//! task; when any of them changes the old timer is cancelled before a new one
//! is armed. A tick already in flight is allowed to finish, but re-checks the
//! session before persisting anything.

use std::sync::Arc;
use std::time::Duration;

use arcade_engine::{HandleRef, handle_id};
use arcade_options::{CoreName, EmulatorOptions, RomId};
use arcade_states::{NewSaveState, SaveStateStore, StateKind, StoreError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::resources::OwnerId;
use crate::session::SessionView;

/// Minimum run time before the first auto-save.
pub const WARM_UP: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not running or paused, or the session changed mid-tick.
    Inactive,
    WarmingUp,
    Saved { replaced: usize },
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub enum AutoSaveError {
    #[error("snapshot failed: {0}")]
    Snapshot(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One auto-save attempt against a session.
pub struct AutoSave {
    store: Arc<dyn SaveStateStore>,
}

impl AutoSave {
    pub fn new(store: Arc<dyn SaveStateStore>) -> Self {
        Self { store }
    }

    /// Snapshot the session and replace the ROM's auto-save with it.
    ///
    /// Failures are logged and reported as [`TickOutcome::Failed`].
    pub async fn tick(&self, session: &watch::Receiver<SessionView>) -> TickOutcome {
        let view = session.borrow().clone();
        if !view.status.is_active() {
            return TickOutcome::Inactive;
        }
        let (Some(handle), Some(options), Some(launched_at)) =
            (view.handle, view.options, view.launched_at)
        else {
            return TickOutcome::Inactive;
        };
        if launched_at.elapsed() < WARM_UP {
            return TickOutcome::WarmingUp;
        }

        match self.save(&handle, &options, session).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(rom = %options.rom.id, error = %e, "auto-save failed");
                TickOutcome::Failed
            }
        }
    }

    async fn save(
        &self,
        handle: &HandleRef,
        options: &EmulatorOptions,
        session: &watch::Receiver<SessionView>,
    ) -> Result<TickOutcome, AutoSaveError> {
        let snapshot = handle
            .save_state()
            .await
            .map_err(|e| AutoSaveError::Snapshot(format!("{e:#}")))?;

        // The session may have exited while the engine was snapshotting.
        if !still_running(&session.borrow(), handle) {
            debug!(rom = %options.rom.id, "session ended mid auto-save");
            return Ok(TickOutcome::Inactive);
        }

        let rom = &options.rom.id;
        let previous = self.store.list(rom, StateKind::Auto).await?;
        for record in &previous {
            self.store.delete(&record.id).await?;
        }

        let record = self
            .store
            .create(NewSaveState {
                kind: StateKind::Auto,
                core: options.core.clone(),
                rom: rom.clone(),
                snapshot,
            })
            .await?;
        info!(rom = %rom, state = %record.id, replaced = previous.len(), "auto-saved");

        Ok(TickOutcome::Saved {
            replaced: previous.len(),
        })
    }
}

fn still_running(view: &SessionView, handle: &HandleRef) -> bool {
    view.status.is_active()
        && view
            .handle
            .as_ref()
            .is_some_and(|held| handle_id(held) == handle_id(handle))
}

/// Everything a timer is armed against. A change to any field re-arms.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ArmKey {
    owner: OwnerId,
    core: CoreName,
    rom: RomId,
    period: Duration,
}

impl ArmKey {
    fn of(view: &SessionView, interval_secs: u64) -> Option<Self> {
        if interval_secs == 0 || !view.status.is_active() {
            return None;
        }
        view.handle.as_ref()?;
        let options = view.options.as_ref()?;
        Some(Self {
            owner: view.owner,
            core: options.core.clone(),
            rom: options.rom.id.clone(),
            period: Duration::from_secs(interval_secs),
        })
    }

    fn matches(&self, view: &SessionView) -> bool {
        view.status.is_active()
            && view.owner == self.owner
            && view.handle.is_some()
            && view
                .options
                .as_ref()
                .is_some_and(|o| o.core == self.core && o.rom.id == self.rom)
    }
}

struct Armed {
    key: ArmKey,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Armed {
    fn arm(key: ArmKey, session: watch::Receiver<SessionView>, auto_save: Arc<AutoSave>) -> Self {
        debug!(rom = %key.rom, period = ?key.period, "auto-save armed");
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_timer(key.clone(), session, auto_save, cancel.clone()));
        Self { key, cancel, task }
    }

    fn disarm(&self) {
        debug!(rom = %self.key.rom, "auto-save disarmed");
        self.cancel.cancel();
    }
}

async fn run_timer(
    key: ArmKey,
    session: watch::Receiver<SessionView>,
    auto_save: Arc<AutoSave>,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval_at(Instant::now() + key.period, key.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if !key.matches(&session.borrow()) {
            continue;
        }
        let outcome = auto_save.tick(&session).await;
        debug!(rom = %key.rom, ?outcome, "auto-save tick");
    }
}

/// Keeps an auto-save timer armed while the watched session runs.
pub struct AutoSaveScheduler {
    shutdown: CancellationToken,
    driver: Option<JoinHandle<()>>,
}

impl AutoSaveScheduler {
    /// Start watching. `interval` carries the period in seconds; `0` disables.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        session: watch::Receiver<SessionView>,
        interval: watch::Receiver<u64>,
        store: Arc<dyn SaveStateStore>,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let auto_save = Arc::new(AutoSave::new(store));
        let driver = tokio::spawn(drive(session, interval, auto_save, shutdown.clone()));

        Self {
            shutdown,
            driver: Some(driver),
        }
    }

    /// Stop the scheduler, waiting for an in-flight tick to finish.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Some(driver) = self.driver.take() {
            if let Err(e) = driver.await {
                warn!(error = %e, "auto-save driver panicked");
            }
        }
    }
}

impl Drop for AutoSaveScheduler {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn drive(
    mut session: watch::Receiver<SessionView>,
    mut interval: watch::Receiver<u64>,
    auto_save: Arc<AutoSave>,
    shutdown: CancellationToken,
) {
    let mut armed: Option<Armed> = None;
    let mut interval_open = true;

    loop {
        let wanted = {
            let secs = *interval.borrow_and_update();
            ArmKey::of(&session.borrow_and_update(), secs)
        };
        if armed.as_ref().map(|a| &a.key) != wanted.as_ref() {
            if let Some(previous) = armed.take() {
                previous.disarm();
            }
            armed = wanted.map(|key| Armed::arm(key, session.clone(), auto_save.clone()));
        }

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            changed = session.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = interval.changed(), if interval_open => {
                if changed.is_err() {
                    interval_open = false;
                }
            }
        }
    }

    if let Some(armed) = armed {
        armed.disarm();
        if let Err(e) = armed.task.await {
            warn!(error = %e, "auto-save timer panicked");
        }
    }
}
