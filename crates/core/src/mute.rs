//! Audio mute controller.
//!
//! The engine creates its audio context internally, so the controller has to go
//! looking for it. Lookups are tried in order until one succeeds, and the first
//! context found is cached in the shared [`AudioSlot`].

use std::sync::Arc;

use arcade_engine::{AudioContext, AudioState, HandleRef, MediaElements};
use tracing::{debug, warn};

use crate::resources::AudioSlot;

/// One way of finding the engine's audio context.
pub trait AudioContextLookup: Send + Sync {
    fn name(&self) -> &str;

    fn locate(&self, handle: Option<&HandleRef>) -> Option<Arc<dyn AudioContext>>;
}

/// Asks the emulator handle for the context it created.
#[derive(Debug, Default, Clone, Copy)]
pub struct FromHandle;

impl AudioContextLookup for FromHandle {
    fn name(&self) -> &str {
        "handle"
    }

    fn locate(&self, handle: Option<&HandleRef>) -> Option<Arc<dyn AudioContext>> {
        handle.and_then(|handle| handle.audio_context())
    }
}

/// Reads a context the engine runtime publishes somewhere on the host.
pub struct HostGlobal<F> {
    name: String,
    read: F,
}

impl<F> HostGlobal<F>
where
    F: Fn() -> Option<Arc<dyn AudioContext>> + Send + Sync,
{
    pub fn new(name: impl Into<String>, read: F) -> Self {
        Self {
            name: name.into(),
            read,
        }
    }
}

impl<F> AudioContextLookup for HostGlobal<F>
where
    F: Fn() -> Option<Arc<dyn AudioContext>> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn locate(&self, _handle: Option<&HandleRef>) -> Option<Arc<dyn AudioContext>> {
        (self.read)()
    }
}

/// What a mute change managed to touch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MuteOutcome {
    pub context_found: bool,
    pub hardware_changed: bool,
    pub elements: usize,
}

pub struct MuteController {
    slot: Arc<AudioSlot>,
    lookups: Vec<Box<dyn AudioContextLookup>>,
    media: Arc<dyn MediaElements>,
}

impl MuteController {
    pub fn new(slot: Arc<AudioSlot>, media: Arc<dyn MediaElements>) -> Self {
        Self {
            slot,
            lookups: Vec::new(),
            media,
        }
    }

    /// Append a lookup, tried after the ones already registered.
    pub fn with_lookup(mut self, lookup: impl AudioContextLookup + 'static) -> Self {
        self.lookups.push(Box::new(lookup));
        self
    }

    /// Find the audio context, preferring the cached one.
    pub fn locate(&self, handle: Option<&HandleRef>) -> Option<Arc<dyn AudioContext>> {
        if let Some(context) = self.slot.current() {
            return Some(context);
        }

        for lookup in &self.lookups {
            if let Some(context) = lookup.locate(handle) {
                debug!(lookup = lookup.name(), "found audio context");
                self.slot.capture(context.clone());
                return Some(context);
            }
        }
        None
    }

    /// Bring audio output in line with `muted`.
    ///
    /// Never fails: a missing context or a rejected suspend/resume only means
    /// the hardware state is left as it was. Media elements are updated either
    /// way.
    pub async fn apply(&self, muted: bool, handle: Option<&HandleRef>) -> MuteOutcome {
        let mut outcome = MuteOutcome::default();

        if let Some(context) = self.locate(handle) {
            outcome.context_found = true;
            let result = match (muted, context.state()) {
                (true, AudioState::Running) => Some(context.suspend().await),
                (false, AudioState::Suspended) => Some(context.resume().await),
                _ => None,
            };
            match result {
                Some(Ok(())) => outcome.hardware_changed = true,
                Some(Err(e)) => warn!(muted, error = %e, "audio context did not follow mute"),
                None => {}
            }
        } else {
            debug!(muted, "no audio context to mute");
        }

        outcome.elements = self.media.set_muted(muted);
        outcome
    }
}
