use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use arcade_engine::{Emulator, HandleRef, PreparationError};
use arcade_options::{EmulatorOptions, OptionsKey};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::debug;

type Build = Shared<BoxFuture<'static, Result<HandleRef, PreparationError>>>;

struct Flight {
    key: OptionsKey,
    options: Arc<EmulatorOptions>,
    generation: u64,
    build: Build,
}

/// Outcome of [`PrepareCache::get`].
#[derive(Clone)]
pub enum Prepared {
    /// The handle built for the options the cache currently tracks.
    Current(HandleRef),
    /// The options were replaced while the build was running; the result was dropped.
    Superseded,
}

/// Memoized single-flight handle builds, keyed by options contents.
///
/// Only the most recently requested options are tracked. Every caller asking
/// for those options shares one build, in flight or finished. A failed build is
/// evicted so the next call retries.
pub struct PrepareCache {
    emulator: Arc<dyn Emulator>,
    current: Mutex<Option<Flight>>,
    generation: AtomicU64,
    builds: AtomicUsize,
}

impl PrepareCache {
    pub fn new(emulator: Arc<dyn Emulator>) -> Self {
        Self {
            emulator,
            current: Mutex::new(None),
            generation: AtomicU64::new(0),
            builds: AtomicUsize::new(0),
        }
    }

    pub async fn get(&self, options: Arc<EmulatorOptions>) -> Result<Prepared, PreparationError> {
        let key = options.key();
        let (generation, build) = {
            let mut current = self.current.lock();
            match current.as_ref() {
                Some(flight) if flight.key == key && flight.options == options => {
                    (flight.generation, flight.build.clone())
                }
                _ => {
                    let flight = self.start_build(key, options);
                    let joined = (flight.generation, flight.build.clone());
                    *current = Some(flight);
                    joined
                }
            }
        };

        let result = build.await;

        let mut current = self.current.lock();
        let is_current = current
            .as_ref()
            .is_some_and(|flight| flight.generation == generation);
        if !is_current {
            debug!(generation, "discarding superseded emulator build");
            return Ok(Prepared::Superseded);
        }

        match result {
            Ok(handle) => Ok(Prepared::Current(handle)),
            Err(e) => {
                current.take();
                Err(e)
            }
        }
    }

    /// Whether `options` match the tracked build.
    pub fn tracks(&self, options: &EmulatorOptions) -> bool {
        self.current
            .lock()
            .as_ref()
            .is_some_and(|flight| *flight.options == *options)
    }

    /// Forget the tracked build so the next `get` builds a fresh handle.
    pub fn invalidate(&self) {
        if self.current.lock().take().is_some() {
            self.generation.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Total number of builds started.
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }

    fn start_build(&self, key: OptionsKey, options: Arc<EmulatorOptions>) -> Flight {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        self.builds.fetch_add(1, Ordering::Relaxed);
        debug!(generation, options = %key, rom = %options.rom.id, "building emulator handle");

        let emulator = self.emulator.clone();
        let for_build = options.clone();
        let build = async move { emulator.prepare(for_build).await }
            .boxed()
            .shared();

        Flight {
            key,
            options,
            generation,
            build,
        }
    }
}
