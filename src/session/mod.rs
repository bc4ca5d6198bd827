//! Session Module
//!
//! The session-establishment and arbitration engine:
//! - One connection attempt per candidate offer, raced concurrently
//! - First attempt through the control channel handshake wins arbitration
//! - The winner launches the workload; everything else is destroyed
//! - One outcome per launch: exit code, failure, or deadline expiry

pub mod arbiter;
pub mod attempt;
pub mod events;
pub mod launcher;
pub mod protocol;
pub mod state;

pub use arbiter::Arbiter;
pub use attempt::{ConnectionAttempt, ControlCommand};
pub use events::{AttemptEvent, LaunchEvent};
pub use launcher::{SessionLauncher, DEFAULT_DEADLINE};
pub use protocol::ControlHandle;
pub use state::{AttemptPhase, LaunchInfo, LaunchStatus, StopCode};
