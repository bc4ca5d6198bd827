//! Session State
//!
//! Stop codes, attempt phases, and per-launch bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::events::LaunchEvent;

/// Why a connection attempt or session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StopCode(pub i32);

impl StopCode {
    /// Normal termination; also used for user-initiated cancellation
    pub const NORMAL: StopCode = StopCode(0);

    /// Reserved: the attempt was superseded by a concurrent session. Emitted
    /// to arbitration losers, never surfaced to the caller. The negative
    /// sentinel cannot collide with nonnegative workload exit codes.
    pub const CONCURRENT_SESSION: StopCode = StopCode(-4095);

    /// Raw code value
    pub fn code(self) -> i32 {
        self.0
    }

    /// Whether this is a normal termination
    pub fn is_normal(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for StopCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if *self == Self::CONCURRENT_SESSION {
            write!(f, "concurrent-session")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Phase of one connection attempt, from transport connect through the
/// control channel handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptPhase {
    /// Transport connection being established
    Connecting,
    /// Control channel up; waiting for the node's first command request
    AwaitingFirstRequest,
    /// Running the network-quality probe
    CollectingDiagnostics,
    /// Waiting for the second command request
    AwaitingSecondRequest,
    /// At the arbitration point
    Arbitrating,
    /// Winner only: writing the launch request
    SendingLaunch,
    /// Waiting for the node to acknowledge the launch
    AwaitingAck,
    /// Live session control channel
    Operational,
    /// Connection ended with the given stop code
    Terminated(StopCode),
    /// Destroyed before becoming operational
    Destroyed,
}

impl AttemptPhase {
    /// Whether the attempt can still make progress
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated(_) | Self::Destroyed)
    }
}

/// Status of a launch invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchStatus {
    /// Racing candidate connections
    Connecting,
    /// A winner is operational and the workload is running
    Streaming,
    /// The session exited and the outcome was delivered
    Completed,
    /// The launch failed before producing an exit code
    Failed,
    /// The deadline elapsed before any attempt produced a result
    TimedOut,
}

impl Default for LaunchStatus {
    fn default() -> Self {
        Self::Connecting
    }
}

impl std::fmt::Display for LaunchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Streaming => write!(f, "streaming"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::TimedOut => write!(f, "timedout"),
        }
    }
}

/// Bookkeeping for one launch invocation
#[derive(Debug)]
pub struct LaunchState {
    /// Unique launch identifier
    pub id: String,
    /// Workload being launched
    pub workload: String,
    /// Current status
    pub status: LaunchStatus,
    /// Exit code once completed
    pub exit_code: Option<StopCode>,
    /// Error message if failed
    pub error_message: Option<String>,
    /// Event broadcaster for the presentation layer
    pub event_tx: broadcast::Sender<LaunchEvent>,
    /// When the launch started
    pub created_at: DateTime<Utc>,
    /// When the launch last changed state
    pub updated_at: DateTime<Utc>,
}

impl LaunchState {
    /// Create bookkeeping for a new launch
    pub fn new(id: impl Into<String>, workload: impl Into<String>) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let now = Utc::now();

        Self {
            id: id.into(),
            workload: workload.into(),
            status: LaunchStatus::Connecting,
            exit_code: None,
            error_message: None,
            event_tx,
            created_at: now,
            updated_at: now,
        }
    }

    /// Subscribe to launch events
    pub fn subscribe(&self) -> broadcast::Receiver<LaunchEvent> {
        self.event_tx.subscribe()
    }

    /// Update status and emit event
    pub fn set_status(&mut self, status: LaunchStatus) {
        let old_status = self.status;
        self.status = status;
        self.updated_at = Utc::now();

        let _ = self.event_tx.send(LaunchEvent::StatusChanged {
            launch_id: self.id.clone(),
            old_status,
            new_status: status,
        });
    }

    /// Mark the winner operational
    pub fn set_streaming(&mut self) {
        self.set_status(LaunchStatus::Streaming);
    }

    /// Record the session's exit code
    pub fn set_completed(&mut self, code: StopCode) {
        self.exit_code = Some(code);
        let _ = self.event_tx.send(LaunchEvent::Exited {
            launch_id: self.id.clone(),
            code,
        });
        self.set_status(LaunchStatus::Completed);
    }

    /// Record a launch failure
    pub fn set_failed(&mut self, error: impl Into<String>) {
        self.error_message = Some(error.into());
        self.set_status(LaunchStatus::Failed);
    }

    /// Record deadline expiry
    pub fn set_timed_out(&mut self) {
        self.set_status(LaunchStatus::TimedOut);
    }

    /// Whether the launch is still in flight
    pub fn is_active(&self) -> bool {
        matches!(self.status, LaunchStatus::Connecting | LaunchStatus::Streaming)
    }

    /// Whether the launch is finished
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

/// Serializable launch info for callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchInfo {
    pub id: String,
    pub workload: String,
    pub status: LaunchStatus,
    pub exit_code: Option<StopCode>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&LaunchState> for LaunchInfo {
    fn from(state: &LaunchState) -> Self {
        Self {
            id: state.id.clone(),
            workload: state.workload.clone(),
            status: state.status,
            exit_code: state.exit_code,
            error_message: state.error_message.clone(),
            created_at: state.created_at.to_rfc3339(),
            updated_at: state.updated_at.to_rfc3339(),
        }
    }
}
