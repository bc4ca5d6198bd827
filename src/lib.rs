//! nodeplay - session launcher and arbitration engine for remote streaming
//! nodes.
//!
//! Given a list of candidate node offers, the engine connects to all of them
//! concurrently, drives a fixed handshake over each connection's control
//! side-channel, keeps the first attempt to reach the arbitration point, and
//! launches the workload on that winner. The session then runs until the node
//! reports an exit, the caller cancels, or the launch deadline fires; exactly
//! one outcome is produced per launch.
//!
//! The transport, diagnostics probe, persistence client, and login service
//! are collaborator traits supplied by the embedder.

pub mod auth;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod persistence;
pub mod session;
pub mod transport;

pub use auth::{NoAuth, PersistenceRoot, SessionAuth, StaticAuth};
pub use config::{QualityTier, StreamConfig, DEFAULT_ENCODER_BITRATE};
pub use diagnostics::{DiagnosticsReport, NetworkProbe, NullProbe};
pub use error::{LaunchError, LaunchResult};
pub use persistence::PersistenceSync;
pub use session::{
    AttemptPhase, LaunchEvent, LaunchInfo, LaunchStatus, SessionLauncher, StopCode,
    DEFAULT_DEADLINE,
};
pub use transport::{
    CandidateOffer, ConfigUpdate, ConnectionControl, ConnectionEvent, ControlChannel,
    LaunchRequest, NamedChannel, NodeConnection, NodeTransport,
};
