//! Serializable view of a session for the UI layer.

use arcade_options::{CoreName, RomId};
use serde::{Deserialize, Serialize};

use crate::session::{SessionStatus, SessionView};

/// Session state at a point in time, as sent to the frontend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub rom: Option<RomId>,
    pub core: Option<CoreName>,
    pub is_fullscreen: bool,
    pub is_muted: bool,
    pub is_turbo: bool,
    pub navigation_paused: bool,
    /// Milliseconds since launch, while launched.
    pub launched_for_ms: Option<u64>,
    /// Set when the last preparation failed; drives the retry affordance.
    pub last_error: Option<String>,
}

impl From<&SessionView> for SessionSnapshot {
    fn from(view: &SessionView) -> Self {
        Self {
            status: view.status,
            rom: view.options.as_ref().map(|o| o.rom.id.clone()),
            core: view.options.as_ref().map(|o| o.core.clone()),
            is_fullscreen: view.is_fullscreen,
            is_muted: view.is_muted,
            is_turbo: view.is_turbo,
            navigation_paused: view.navigation_paused,
            launched_for_ms: view
                .launched_at
                .map(|at| u64::try_from(at.elapsed().as_millis()).unwrap_or(u64::MAX)),
            last_error: view.last_error.as_ref().map(ToString::to_string),
        }
    }
}
