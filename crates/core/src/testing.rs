//! Fakes for the engine, host and store, shared by the unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use arcade_engine::{
    AudioContext, AudioState, Button, Emulator, EmulatorHandle, EngineStatus, Focus, FocusTarget,
    Fullscreen, HandleRef, Host, LibraryRefresh, MediaElements, PreparationError, Snapshot,
    SurfaceId, UserMedia, WakeLock, WakeLockSentinel,
};
use arcade_options::{CoreName, EmulatorOptions, RomId, RomRef};
use arcade_states::{
    LaunchRecorder, NewSaveState, SaveStateRecord, SaveStateStore, StateId, StateKind, StoreError,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::resources::ResourceRegistry;
use crate::session::{LaunchOptions, Session, SessionConfig};

pub(crate) fn options_for(rom: &str) -> Arc<EmulatorOptions> {
    let rom = RomRef {
        id: RomId::new(rom),
        file_name: format!("{rom}.nes"),
        location: format!("/files/{rom}"),
    };
    Arc::new(EmulatorOptions::new(rom, CoreName::new("fceumm")))
}

#[derive(Default)]
pub(crate) struct FakeEmulator {
    builds: AtomicUsize,
    fail_next: AtomicBool,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    handles: Mutex<Vec<Arc<FakeHandle>>>,
    audio: Mutex<Option<Arc<FakeAudio>>>,
    user_media: Mutex<Option<Arc<FakeUserMedia>>>,
}

impl FakeEmulator {
    pub(crate) fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_next(&self, fail: bool) {
        self.fail_next.store(fail, Ordering::SeqCst);
    }

    /// Hold builds for `rom` until a permit is added.
    pub(crate) fn gate(&self, rom: &str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.gates.lock().insert(rom.to_string(), gate.clone());
        gate
    }

    /// Give every handle built from now on this audio context.
    pub(crate) fn with_audio(&self, audio: Arc<FakeAudio>) {
        *self.audio.lock() = Some(audio);
    }

    pub(crate) fn observe_prompt(&self, user_media: Arc<FakeUserMedia>) {
        *self.user_media.lock() = Some(user_media);
    }

    pub(crate) fn last_handle(&self) -> Arc<FakeHandle> {
        self.handles.lock().last().cloned().expect("no handle built")
    }
}

#[async_trait]
impl Emulator for FakeEmulator {
    async fn prepare(&self, options: Arc<EmulatorOptions>) -> Result<HandleRef, PreparationError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        let gate = self.gates.lock().get(options.rom.id.as_str()).cloned();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await.expect("gate closed");
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(PreparationError::Fetch {
                resource: options.rom.location.clone(),
                reason: "connection reset".to_string(),
            });
        }

        let mut handle = FakeHandle::new();
        handle.audio = self.audio.lock().clone();
        handle.user_media = self.user_media.lock().clone();
        let handle = Arc::new(handle);
        self.handles.lock().push(handle.clone());
        Ok(handle)
    }
}

pub(crate) struct FakeHandle {
    status: Mutex<EngineStatus>,
    auto_resume: AtomicBool,
    resumed_from_auto: AtomicBool,
    prompt_at_start: AtomicBool,
    fail_start: AtomicBool,
    fail_save: AtomicBool,
    starts: AtomicUsize,
    exits: AtomicUsize,
    saves: AtomicUsize,
    presses: Mutex<Vec<(String, bool)>>,
    save_gate: Mutex<Option<Arc<Semaphore>>>,
    audio: Option<Arc<FakeAudio>>,
    user_media: Option<Arc<FakeUserMedia>>,
}

impl FakeHandle {
    /// A prepared handle with an auto-resume state on disk.
    pub(crate) fn new() -> Self {
        Self {
            status: Mutex::new(EngineStatus::Unprepared),
            auto_resume: AtomicBool::new(true),
            resumed_from_auto: AtomicBool::new(false),
            prompt_at_start: AtomicBool::new(true),
            fail_start: AtomicBool::new(false),
            fail_save: AtomicBool::new(false),
            starts: AtomicUsize::new(0),
            exits: AtomicUsize::new(0),
            saves: AtomicUsize::new(0),
            presses: Mutex::new(Vec::new()),
            save_gate: Mutex::new(None),
            audio: None,
            user_media: None,
        }
    }

    pub(crate) fn with_audio(mut self, audio: Arc<FakeAudio>) -> Self {
        self.audio = Some(audio);
        self
    }

    pub(crate) fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub(crate) fn exits(&self) -> usize {
        self.exits.load(Ordering::SeqCst)
    }

    /// Completed snapshots.
    pub(crate) fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub(crate) fn resumed_from_auto(&self) -> bool {
        self.resumed_from_auto.load(Ordering::SeqCst)
    }

    pub(crate) fn prompt_enabled_at_start(&self) -> bool {
        self.prompt_at_start.load(Ordering::SeqCst)
    }

    pub(crate) fn presses(&self) -> Vec<(String, bool)> {
        self.presses.lock().clone()
    }

    pub(crate) fn fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_save(&self, fail: bool) {
        self.fail_save.store(fail, Ordering::SeqCst);
    }

    /// Hold snapshots until a permit is added.
    pub(crate) fn gate_saves(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.save_gate.lock() = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl EmulatorHandle for FakeHandle {
    async fn start(&self) -> anyhow::Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if let Some(media) = &self.user_media {
            self.prompt_at_start.store(media.enabled(), Ordering::SeqCst);
        }
        if self.fail_start.load(Ordering::SeqCst) {
            anyhow::bail!("core crashed during boot");
        }
        self.resumed_from_auto
            .store(self.auto_resume.load(Ordering::SeqCst), Ordering::SeqCst);
        *self.status.lock() = EngineStatus::Running;
        Ok(())
    }

    fn exit(&self) {
        self.exits.fetch_add(1, Ordering::SeqCst);
        *self.status.lock() = EngineStatus::Unprepared;
    }

    fn pause(&self) {
        *self.status.lock() = EngineStatus::Paused;
    }

    fn resume(&self) {
        *self.status.lock() = EngineStatus::Running;
    }

    fn status(&self) -> EngineStatus {
        *self.status.lock()
    }

    async fn save_state(&self) -> anyhow::Result<Snapshot> {
        let gate = self.save_gate.lock().clone();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await?;
        }
        if self.fail_save.load(Ordering::SeqCst) {
            anyhow::bail!("state buffer unavailable");
        }
        let count = self.saves.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Snapshot {
            state: vec![count as u8; 16],
            thumbnail: vec![0x89, 0x50, 0x4e, 0x47],
        })
    }

    fn press_down(&self, button: &Button) {
        self.presses.lock().push((button.as_str().to_string(), true));
    }

    fn press_up(&self, button: &Button) {
        self.presses.lock().push((button.as_str().to_string(), false));
    }

    fn surface(&self) -> SurfaceId {
        SurfaceId(7)
    }

    fn discard_auto_resume(&self) -> anyhow::Result<()> {
        self.auto_resume.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn audio_context(&self) -> Option<Arc<dyn AudioContext>> {
        self.audio.clone().map(|audio| audio as Arc<dyn AudioContext>)
    }
}

#[derive(Default)]
struct WakeLockCounters {
    requests: AtomicUsize,
    releases: AtomicUsize,
    fail_request: AtomicBool,
    fail_release: AtomicBool,
}

#[derive(Default)]
pub(crate) struct FakeWakeLock {
    counters: Arc<WakeLockCounters>,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl FakeWakeLock {
    /// Hold requests until a permit is added.
    pub(crate) fn gate(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    /// Granted requests.
    pub(crate) fn requests(&self) -> usize {
        self.counters.requests.load(Ordering::SeqCst)
    }

    /// Successful releases.
    pub(crate) fn releases(&self) -> usize {
        self.counters.releases.load(Ordering::SeqCst)
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.requests() - self.releases()
    }

    pub(crate) fn fail_request(&self, fail: bool) {
        self.counters.fail_request.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_release(&self, fail: bool) {
        self.counters.fail_release.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl WakeLock for FakeWakeLock {
    async fn request(&self) -> anyhow::Result<Box<dyn WakeLockSentinel>> {
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await.expect("gate closed");
        }
        if self.counters.fail_request.load(Ordering::SeqCst) {
            anyhow::bail!("wake-lock denied");
        }
        self.counters.requests.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSentinel {
            counters: self.counters.clone(),
        }))
    }
}

struct FakeSentinel {
    counters: Arc<WakeLockCounters>,
}

#[async_trait]
impl WakeLockSentinel for FakeSentinel {
    async fn release(&self) -> anyhow::Result<()> {
        if self.counters.fail_release.load(Ordering::SeqCst) {
            anyhow::bail!("wake-lock release rejected");
        }
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeFullscreen {
    active: AtomicBool,
    enters: AtomicUsize,
    exits: AtomicUsize,
    fail_enter: AtomicBool,
    fail_exit: AtomicBool,
    enter_gate: Mutex<Option<Arc<Semaphore>>>,
    exit_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl FakeFullscreen {
    /// Hold `enter` until a permit is added.
    pub(crate) fn gate_enter(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.enter_gate.lock() = Some(gate.clone());
        gate
    }

    /// Hold `exit` until a permit is added.
    pub(crate) fn gate_exit(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.exit_gate.lock() = Some(gate.clone());
        gate
    }

    pub(crate) fn enters(&self) -> usize {
        self.enters.load(Ordering::SeqCst)
    }

    pub(crate) fn exits(&self) -> usize {
        self.exits.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_enter(&self, fail: bool) {
        self.fail_enter.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_exit(&self, fail: bool) {
        self.fail_exit.store(fail, Ordering::SeqCst);
    }

    /// Simulate the user entering or leaving fullscreen through the host.
    pub(crate) fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }
}

#[async_trait]
impl Fullscreen for FakeFullscreen {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> anyhow::Result<()> {
        let gate = self.enter_gate.lock().clone();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await.expect("gate closed");
        }
        if self.fail_enter.load(Ordering::SeqCst) {
            anyhow::bail!("fullscreen request denied");
        }
        self.enters.fetch_add(1, Ordering::SeqCst);
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn exit(&self) -> anyhow::Result<()> {
        let gate = self.exit_gate.lock().clone();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await.expect("gate closed");
        }
        if self.fail_exit.load(Ordering::SeqCst) {
            anyhow::bail!("fullscreen exit rejected");
        }
        self.exits.fetch_add(1, Ordering::SeqCst);
        self.active.store(false, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) struct FakeAudio {
    state: Mutex<AudioState>,
    suspends: AtomicUsize,
    resumes: AtomicUsize,
    fail: AtomicBool,
}

impl FakeAudio {
    pub(crate) fn new(state: AudioState) -> Self {
        Self {
            state: Mutex::new(state),
            suspends: AtomicUsize::new(0),
            resumes: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    pub(crate) fn suspends(&self) -> usize {
        self.suspends.load(Ordering::SeqCst)
    }

    pub(crate) fn resumes(&self) -> usize {
        self.resumes.load(Ordering::SeqCst)
    }

    pub(crate) fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl AudioContext for FakeAudio {
    fn state(&self) -> AudioState {
        *self.state.lock()
    }

    async fn suspend(&self) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("suspend rejected");
        }
        self.suspends.fetch_add(1, Ordering::SeqCst);
        *self.state.lock() = AudioState::Suspended;
        Ok(())
    }

    async fn resume(&self) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("resume rejected");
        }
        self.resumes.fetch_add(1, Ordering::SeqCst);
        *self.state.lock() = AudioState::Running;
        Ok(())
    }
}

pub(crate) struct FakeMedia {
    elements: usize,
    muted: Mutex<Option<bool>>,
}

impl FakeMedia {
    pub(crate) fn new(elements: usize) -> Self {
        Self {
            elements,
            muted: Mutex::new(None),
        }
    }

    /// The last mute flag applied to the elements.
    pub(crate) fn muted(&self) -> Option<bool> {
        *self.muted.lock()
    }
}

impl MediaElements for FakeMedia {
    fn set_muted(&self, muted: bool) -> usize {
        *self.muted.lock() = Some(muted);
        self.elements
    }
}

#[derive(Default)]
pub(crate) struct FakeFocus {
    history: Mutex<Vec<FocusTarget>>,
}

impl FakeFocus {
    pub(crate) fn last(&self) -> Option<FocusTarget> {
        self.history.lock().last().cloned()
    }

    pub(crate) fn clear(&self) {
        self.history.lock().clear();
    }
}

impl Focus for FakeFocus {
    fn focus(&self, target: &FocusTarget) {
        self.history.lock().push(target.clone());
    }
}

pub(crate) struct FakeUserMedia {
    enabled: AtomicBool,
}

impl Default for FakeUserMedia {
    fn default() -> Self {
        Self {
            enabled: AtomicBool::new(true),
        }
    }
}

impl FakeUserMedia {
    pub(crate) fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

impl UserMedia for FakeUserMedia {
    fn set_prompt_enabled(&self, enabled: bool) -> anyhow::Result<bool> {
        Ok(self.enabled.swap(enabled, Ordering::SeqCst))
    }
}

#[derive(Default)]
pub(crate) struct FakeRefresh {
    reloads: AtomicUsize,
}

impl FakeRefresh {
    pub(crate) fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LibraryRefresh for FakeRefresh {
    async fn reload(&self) -> anyhow::Result<()> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeRecorder {
    launches: Mutex<Vec<(String, String)>>,
    fail: AtomicBool,
}

impl FakeRecorder {
    pub(crate) fn launches(&self) -> Vec<(String, String)> {
        self.launches.lock().clone()
    }

    pub(crate) fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl LaunchRecorder for FakeRecorder {
    async fn record_launch(&self, core: &CoreName, rom: &RomId) -> Result<(), StoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("telemetry endpoint down".to_string()));
        }
        self.launches
            .lock()
            .push((core.as_str().to_string(), rom.as_str().to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeStore {
    records: Mutex<Vec<SaveStateRecord>>,
    next_id: AtomicU64,
    lists: AtomicUsize,
    creates: AtomicUsize,
    deletes: AtomicUsize,
    fail_create: AtomicBool,
}

impl FakeStore {
    pub(crate) fn seed(&self, kind: StateKind, rom: &str) {
        let record = self.record(kind, CoreName::new("fceumm"), RomId::new(rom));
        self.records.lock().push(record);
    }

    pub(crate) fn count(&self, kind: StateKind, rom: &str) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|r| r.kind == kind && r.rom.as_str() == rom)
            .count()
    }

    pub(crate) fn lists(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    /// Successful creates.
    pub(crate) fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub(crate) fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    fn record(&self, kind: StateKind, core: CoreName, rom: RomId) -> SaveStateRecord {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        SaveStateRecord {
            id: StateId(format!("state-{n}")),
            kind,
            core,
            rom,
            created_at: 1_700_000_000_000 + n,
        }
    }
}

#[async_trait]
impl SaveStateStore for FakeStore {
    async fn list(&self, rom: &RomId, kind: StateKind) -> Result<Vec<SaveStateRecord>, StoreError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .records
            .lock()
            .iter()
            .filter(|r| r.kind == kind && &r.rom == rom)
            .cloned()
            .collect())
    }

    async fn create(&self, state: NewSaveState) -> Result<SaveStateRecord, StoreError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("disk full".to_string()));
        }
        let record = self.record(state.kind, state.core, state.rom);
        self.records.lock().push(record.clone());
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(record)
    }

    async fn delete(&self, id: &StateId) -> Result<(), StoreError> {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|r| &r.id != id);
        if records.len() == before {
            return Err(StoreError::NotFound(id.clone()));
        }
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A session wired to a full set of fakes.
pub(crate) struct Rig {
    pub(crate) session: Arc<Session>,
    pub(crate) emulator: Arc<FakeEmulator>,
    pub(crate) resources: Arc<ResourceRegistry>,
    pub(crate) wake_lock: Arc<FakeWakeLock>,
    pub(crate) fullscreen: Arc<FakeFullscreen>,
    pub(crate) media: Arc<FakeMedia>,
    pub(crate) focus: Arc<FakeFocus>,
    pub(crate) user_media: Arc<FakeUserMedia>,
    pub(crate) refresh: Arc<FakeRefresh>,
    pub(crate) recorder: Arc<FakeRecorder>,
}

impl Rig {
    pub(crate) fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    pub(crate) fn with_config(config: SessionConfig) -> Self {
        let emulator = Arc::new(FakeEmulator::default());
        let wake_lock = Arc::new(FakeWakeLock::default());
        let fullscreen = Arc::new(FakeFullscreen::default());
        let media = Arc::new(FakeMedia::new(1));
        let focus = Arc::new(FakeFocus::default());
        let user_media = Arc::new(FakeUserMedia::default());
        let refresh = Arc::new(FakeRefresh::default());
        let recorder = Arc::new(FakeRecorder::default());
        emulator.observe_prompt(user_media.clone());

        let host = Host {
            wake_lock: wake_lock.clone(),
            fullscreen: fullscreen.clone(),
            media_elements: media.clone(),
            focus: focus.clone(),
            user_media: user_media.clone(),
            refresh: Some(refresh.clone()),
        };
        let resources = Arc::new(ResourceRegistry::new(&host));
        let session = Session::new(emulator.clone(), host, resources.clone(), config)
            .with_recorder(recorder.clone());

        Self {
            session: Arc::new(session),
            emulator,
            resources,
            wake_lock,
            fullscreen,
            media,
            focus,
            user_media,
            refresh,
            recorder,
        }
    }

    /// The most recently built handle.
    pub(crate) fn handle(&self) -> Arc<FakeHandle> {
        self.emulator.last_handle()
    }

    /// Prepare, launch and start `rom`.
    pub(crate) async fn running(&self, rom: &str) {
        self.session.prepare(options_for(rom)).await.expect("prepare");
        assert!(self.session.launch(LaunchOptions::default()));
        assert!(self.session.start().await.expect("start"));
    }
}
