//! Session Events
//!
//! Two event surfaces: attempts report to the orchestrator over a typed mpsc
//! channel, and the orchestrator re-publishes presentation-facing events on a
//! per-launch broadcast channel.

use serde::{Deserialize, Serialize};

use super::protocol::ControlHandle;
use super::state::{LaunchStatus, StopCode};
use crate::error::LaunchError;

/// Events a connection attempt reports to the orchestrator
#[derive(Debug)]
pub enum AttemptEvent {
    /// Informational message for the presentation layer
    Status { attempt_id: usize, message: String },

    /// Terminal: the attempt ended with the given stop code
    Exit { attempt_id: usize, code: StopCode },

    /// Connect failed; the attempt already removed itself from tracking.
    /// `none_remaining` was computed atomically with the removal.
    ConnectFailed {
        attempt_id: usize,
        error: LaunchError,
        none_remaining: bool,
    },

    /// Winner only: the handshake completed and the live control channel is
    /// handed over
    Operational {
        attempt_id: usize,
        handle: ControlHandle,
    },
}

impl AttemptEvent {
    /// Get the attempt ID from any event
    pub fn attempt_id(&self) -> usize {
        match self {
            Self::Status { attempt_id, .. } => *attempt_id,
            Self::Exit { attempt_id, .. } => *attempt_id,
            Self::ConnectFailed { attempt_id, .. } => *attempt_id,
            Self::Operational { attempt_id, .. } => *attempt_id,
        }
    }
}

/// Presentation-facing launch events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LaunchEvent {
    /// Launch status changed
    StatusChanged {
        launch_id: String,
        old_status: LaunchStatus,
        new_status: LaunchStatus,
    },

    /// Progress message from an attempt or the orchestrator
    Message { launch_id: String, text: String },

    /// The session exited with a code
    Exited { launch_id: String, code: StopCode },
}

impl LaunchEvent {
    /// Get the launch ID from any event
    pub fn launch_id(&self) -> &str {
        match self {
            Self::StatusChanged { launch_id, .. } => launch_id,
            Self::Message { launch_id, .. } => launch_id,
            Self::Exited { launch_id, .. } => launch_id,
        }
    }
}
