//! Scripted in-memory transport for tests.
//!
//! Each node is prepared by session id before the launch; the test then drives
//! it through a `NodeDriver`: announcing side-channels, pushing frames, and
//! emitting status/exit events, while observing what the engine sent and how
//! the connection was torn down.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use super::conn::{
    ConnectionControl, ConnectionEvent, ControlChannel, NamedChannel, NodeConnection,
    NodeTransport, CHANNEL_CONTROL, CHANNEL_PERSISTENCE,
};
use crate::config::StreamConfig;
use crate::error::{LaunchError, LaunchResult};
use crate::session::StopCode;

/// Channel half handed to the engine
pub(crate) struct TestChannel {
    incoming: mpsc::UnboundedReceiver<Bytes>,
    outgoing: mpsc::UnboundedSender<Bytes>,
    closed: watch::Receiver<bool>,
}

#[async_trait]
impl ControlChannel for TestChannel {
    async fn send(&mut self, payload: Bytes) -> LaunchResult<()> {
        if *self.closed.borrow() {
            return Err(LaunchError::ChannelClosed);
        }
        self.outgoing
            .send(payload)
            .map_err(|_| LaunchError::ChannelClosed)
    }

    async fn recv(&mut self) -> LaunchResult<Bytes> {
        loop {
            // Frames that arrived before the close are still readable
            if let Ok(frame) = self.incoming.try_recv() {
                return Ok(frame);
            }
            if *self.closed.borrow() {
                return Err(LaunchError::ChannelClosed);
            }
            tokio::select! {
                changed = self.closed.changed() => {
                    if changed.is_err() {
                        return Err(LaunchError::ChannelClosed);
                    }
                }
                frame = self.incoming.recv() => {
                    return frame.ok_or(LaunchError::ChannelClosed);
                }
            }
        }
    }
}

/// Test-side half of a channel pair
pub(crate) struct ChannelDriver {
    to_engine: mpsc::UnboundedSender<Bytes>,
    from_engine: tokio::sync::Mutex<mpsc::UnboundedReceiver<Bytes>>,
    closed_tx: Arc<watch::Sender<bool>>,
}

impl ChannelDriver {
    /// A standalone channel pair, not tied to any connection
    pub fn pair() -> (Box<dyn ControlChannel>, ChannelDriver) {
        let (closed_tx, closed_rx) = watch::channel(false);
        Self::pair_with(Arc::new(closed_tx), closed_rx)
    }

    fn pair_with(
        closed_tx: Arc<watch::Sender<bool>>,
        closed_rx: watch::Receiver<bool>,
    ) -> (Box<dyn ControlChannel>, ChannelDriver) {
        let (to_engine, incoming) = mpsc::unbounded_channel();
        let (outgoing, from_engine) = mpsc::unbounded_channel();
        let channel = TestChannel {
            incoming,
            outgoing,
            closed: closed_rx,
        };
        let driver = ChannelDriver {
            to_engine,
            from_engine: tokio::sync::Mutex::new(from_engine),
            closed_tx,
        };
        (Box::new(channel), driver)
    }

    /// Push a raw frame to the engine
    pub fn push(&self, frame: Bytes) {
        let _ = self.to_engine.send(frame);
    }

    /// Send a command-request frame, as the remote node does
    pub fn send_command_request(&self) {
        self.push(super::wire::command_request_frame());
    }

    /// Await the next frame the engine sent
    pub async fn next_sent(&self) -> Option<Bytes> {
        self.from_engine.lock().await.recv().await
    }

    /// Non-blocking read of the next frame the engine sent
    pub fn try_next_sent(&self) -> Option<Bytes> {
        self.from_engine.try_lock().ok()?.try_recv().ok()
    }

    /// Close the channel under the engine
    pub fn close(&self) {
        let _ = self.closed_tx.send(true);
    }
}

struct MockConnectionControl {
    closed_tx: Arc<watch::Sender<bool>>,
    destroyed_with: Arc<Mutex<Option<StopCode>>>,
}

impl ConnectionControl for MockConnectionControl {
    fn destroy(&self, code: StopCode) {
        let mut destroyed = self.destroyed_with.lock();
        if destroyed.is_none() {
            *destroyed = Some(code);
        }
        let _ = self.closed_tx.send(true);
    }
}

/// Test-side handle for one prepared node
pub(crate) struct NodeDriver {
    event_tx: mpsc::UnboundedSender<ConnectionEvent>,
    channel_tx: mpsc::UnboundedSender<NamedChannel>,
    closed_tx: Arc<watch::Sender<bool>>,
    closed_rx: watch::Receiver<bool>,
    destroyed_with: Arc<Mutex<Option<StopCode>>>,
}

impl NodeDriver {
    /// Announce the control side-channel and return its driver
    pub fn announce_control(&self) -> ChannelDriver {
        self.announce(CHANNEL_CONTROL)
    }

    /// Announce the persistence side-channel and return its driver
    pub fn announce_persistence(&self) -> ChannelDriver {
        self.announce(CHANNEL_PERSISTENCE)
    }

    /// Announce an arbitrary side-channel
    pub fn announce(&self, name: &str) -> ChannelDriver {
        let (channel, driver) =
            ChannelDriver::pair_with(self.closed_tx.clone(), self.closed_rx.clone());
        let _ = self.channel_tx.send(NamedChannel {
            name: name.to_string(),
            channel,
        });
        driver
    }

    /// Emit a status event from the connection
    pub fn emit_status(&self, message: impl Into<String>) {
        let _ = self.event_tx.send(ConnectionEvent::Status(message.into()));
    }

    /// Emit the terminal exit event from the connection
    pub fn emit_exit(&self, code: StopCode) {
        let _ = self.event_tx.send(ConnectionEvent::Exit(code));
    }

    /// Stop code the engine destroyed this connection with, if it did
    pub fn destroyed_with(&self) -> Option<StopCode> {
        *self.destroyed_with.lock()
    }

    /// Whether the engine tore the connection down
    pub fn is_destroyed(&self) -> bool {
        *self.closed_rx.borrow()
    }
}

struct PreparedNode {
    control: Box<dyn ConnectionControl>,
    events: mpsc::UnboundedReceiver<ConnectionEvent>,
    channels: mpsc::UnboundedReceiver<NamedChannel>,
}

/// Transport whose connections are scripted per session id. Connecting to an
/// unprepared session id fails, which is also how connect failures are
/// scripted.
pub(crate) struct ScriptedTransport {
    nodes: Mutex<HashMap<String, PreparedNode>>,
    hanging: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            nodes: Mutex::new(HashMap::new()),
            hanging: Mutex::new(Vec::new()),
        }
    }

    /// Prepare a node that will accept the connection; drive it through the
    /// returned handle
    pub fn prepare(&self, session_id: &str) -> NodeDriver {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (channel_tx, channels) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = watch::channel(false);
        let closed_tx = Arc::new(closed_tx);
        let destroyed_with = Arc::new(Mutex::new(None));

        self.nodes.lock().insert(
            session_id.to_string(),
            PreparedNode {
                control: Box::new(MockConnectionControl {
                    closed_tx: closed_tx.clone(),
                    destroyed_with: destroyed_with.clone(),
                }),
                events,
                channels,
            },
        );

        NodeDriver {
            event_tx,
            channel_tx,
            closed_tx,
            closed_rx,
            destroyed_with,
        }
    }

    /// Prepare a node whose connect never completes
    pub fn prepare_hanging(&self, session_id: &str) {
        self.hanging.lock().push(session_id.to_string());
    }
}

#[async_trait]
impl NodeTransport for ScriptedTransport {
    async fn connect(
        &self,
        session_id: &str,
        _payload: &serde_json::Value,
        _config: &StreamConfig,
    ) -> LaunchResult<NodeConnection> {
        if self.hanging.lock().iter().any(|s| s == session_id) {
            std::future::pending::<()>().await;
        }
        let node = self.nodes.lock().remove(session_id).ok_or_else(|| {
            LaunchError::ConnectionFailed(format!("no route to node {}", session_id))
        })?;
        Ok(NodeConnection {
            control: node.control,
            events: node.events,
            channels: node.channels,
        })
    }
}
