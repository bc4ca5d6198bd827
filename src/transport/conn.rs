//! Transport Collaborator Seam
//!
//! Traits the underlying connection layer implements. The launch engine never
//! speaks the transport protocol itself; it consumes a ready connection as a
//! bundle of typed channels plus a destroy control.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::config::StreamConfig;
use crate::error::LaunchResult;
use crate::session::StopCode;

/// Events surfaced by a live connection
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Informational progress message for the presentation layer
    Status(String),
    /// Terminal: the connection ended with the given stop code
    Exit(StopCode),
}

/// Bidirectional message channel on a connection
#[async_trait]
pub trait ControlChannel: Send {
    /// Send one frame to the remote endpoint
    async fn send(&mut self, payload: Bytes) -> LaunchResult<()>;

    /// Receive the next frame. Errors once the connection is destroyed.
    async fn recv(&mut self) -> LaunchResult<Bytes>;
}

/// A named side-channel announced by the remote node
pub struct NamedChannel {
    /// Channel name ("control", "persistence", ...)
    pub name: String,
    /// The channel itself
    pub channel: Box<dyn ControlChannel>,
}

impl std::fmt::Debug for NamedChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedChannel").field("name", &self.name).finish()
    }
}

/// Destroy control for a connection, owned exclusively by its attempt
pub trait ConnectionControl: Send + Sync {
    /// Tear the connection down with the given stop code. Idempotent.
    fn destroy(&self, code: StopCode);
}

/// A ready connection as handed over by the transport
pub struct NodeConnection {
    /// Teardown handle
    pub control: Box<dyn ConnectionControl>,
    /// Status/exit event stream
    pub events: mpsc::UnboundedReceiver<ConnectionEvent>,
    /// Side-channel announcements
    pub channels: mpsc::UnboundedReceiver<NamedChannel>,
}

/// Trait for the transport collaborator: turns a signaling offer into a live
/// connection
#[async_trait]
pub trait NodeTransport: Send + Sync {
    /// Establish a connection to the node that produced `payload`. Suspends
    /// until the connection is ready or has failed.
    async fn connect(
        &self,
        session_id: &str,
        payload: &serde_json::Value,
        config: &StreamConfig,
    ) -> LaunchResult<NodeConnection>;
}

/// Well-known side-channel names
pub const CHANNEL_CONTROL: &str = "control";
pub const CHANNEL_PERSISTENCE: &str = "persistence";
