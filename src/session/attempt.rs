//! Candidate Connection Attempt
//!
//! Wraps one offer's connection lifecycle: connect through the transport
//! collaborator, forward connection events to the orchestrator, hand the
//! control channel to the handshake, and support idempotent teardown from any
//! task. Exactly one terminal `Exit` event is ever emitted per attempt.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc};

use super::arbiter::Arbiter;
use super::events::AttemptEvent;
use super::protocol;
use super::state::{AttemptPhase, StopCode};
use crate::auth::{PersistenceRoot, SessionAuth};
use crate::config::StreamConfig;
use crate::diagnostics::NetworkProbe;
use crate::error::LaunchError;
use crate::persistence::{self, PersistenceSync};
use crate::transport::conn::{CHANNEL_CONTROL, CHANNEL_PERSISTENCE};
use crate::transport::{
    CandidateOffer, ConnectionControl, ConnectionEvent, NamedChannel, NodeConnection, NodeTransport,
};

/// Command from the caller's control-input path (hotkeys)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Cancel the session; pending attempts are destroyed with
    /// `StopCode::NORMAL`
    Cancel,
}

/// Shared collaborators and settings for every attempt of one launch
pub(crate) struct AttemptContext {
    pub transport: Arc<dyn NodeTransport>,
    pub probe: Arc<dyn NetworkProbe>,
    pub auth: Arc<dyn SessionAuth>,
    pub persistence: Option<Arc<dyn PersistenceSync>>,
    pub arbiter: Arc<Arbiter>,
    pub config: StreamConfig,
    pub persistence_root: Option<PersistenceRoot>,
    pub control_input: broadcast::Sender<ControlCommand>,
}

impl AttemptContext {
    /// Persistence root for the launch request: the caller-supplied root, or
    /// the auth collaborator's, and only for authenticated callers.
    pub fn resolved_root(&self) -> Option<PersistenceRoot> {
        if !self.auth.is_authenticated() {
            return None;
        }
        self.persistence_root
            .clone()
            .or_else(|| self.auth.persistence_root())
    }
}

/// One candidate connection attempt
pub struct ConnectionAttempt {
    id: usize,
    offer: CandidateOffer,
    alive: AtomicBool,
    winner: AtomicBool,
    phase: RwLock<AttemptPhase>,
    conn_control: Mutex<Option<Box<dyn ConnectionControl>>>,
    destroyed_with: Mutex<Option<StopCode>>,
    events: mpsc::UnboundedSender<AttemptEvent>,
}

impl ConnectionAttempt {
    /// Create an attempt for one offer
    pub fn new(
        id: usize,
        offer: CandidateOffer,
        events: mpsc::UnboundedSender<AttemptEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            offer,
            alive: AtomicBool::new(true),
            winner: AtomicBool::new(false),
            phase: RwLock::new(AttemptPhase::Connecting),
            conn_control: Mutex::new(None),
            destroyed_with: Mutex::new(None),
            events,
        })
    }

    /// Attempt ID, unique within one launch
    pub fn id(&self) -> usize {
        self.id
    }

    /// Session ID of the wrapped offer
    pub fn session_id(&self) -> &str {
        &self.offer.session_id
    }

    /// The wrapped offer
    pub fn offer(&self) -> &CandidateOffer {
        &self.offer
    }

    /// Whether the attempt can still make progress
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Whether this attempt won arbitration
    pub fn is_winner(&self) -> bool {
        self.winner.load(Ordering::SeqCst)
    }

    /// Current protocol phase
    pub fn phase(&self) -> AttemptPhase {
        *self.phase.read()
    }

    /// Stop code this attempt was destroyed with, if it was
    pub fn destroyed_with(&self) -> Option<StopCode> {
        *self.destroyed_with.lock()
    }

    pub(crate) fn set_phase(&self, phase: AttemptPhase) {
        *self.phase.write() = phase;
    }

    pub(crate) fn mark_winner(&self) {
        self.winner.store(true, Ordering::SeqCst);
    }

    /// Tear the attempt down with the given stop code. Idempotent; the first
    /// call closes the connection and emits the terminal `Exit` event, later
    /// calls are no-ops.
    pub fn destroy(&self, code: StopCode) {
        if !self.alive.swap(false, Ordering::SeqCst) {
            return;
        }
        debug!(
            "attempt {} ({}) destroyed with code {}",
            self.id,
            self.session_id(),
            code
        );
        *self.destroyed_with.lock() = Some(code);
        if let Some(control) = self.conn_control.lock().take() {
            control.destroy(code);
        }
        if self.phase() == AttemptPhase::Operational {
            self.set_phase(AttemptPhase::Terminated(code));
        } else {
            self.set_phase(AttemptPhase::Destroyed);
        }
        let _ = self.events.send(AttemptEvent::Exit {
            attempt_id: self.id,
            code,
        });
    }

    /// Forward a transport-reported exit. Only the first terminal path wins.
    fn forward_exit(&self, code: StopCode) {
        if !self.alive.swap(false, Ordering::SeqCst) {
            return;
        }
        self.set_phase(AttemptPhase::Terminated(code));
        if let Some(control) = self.conn_control.lock().take() {
            control.destroy(code);
        }
        let _ = self.events.send(AttemptEvent::Exit {
            attempt_id: self.id,
            code,
        });
    }

    /// Emit a non-terminal event, suppressed once the attempt is dead
    pub(crate) fn emit(&self, event: AttemptEvent) {
        if self.is_alive() {
            let _ = self.events.send(event);
        }
    }

    /// Emit a status message for the presentation layer
    pub(crate) fn send_status(&self, message: impl Into<String>) {
        self.emit(AttemptEvent::Status {
            attempt_id: self.id,
            message: message.into(),
        });
    }

    /// Connect failed: leave tracking without emitting an exit event. Reports
    /// nothing if the attempt was already destroyed.
    fn fail_connect(&self, ctx: &AttemptContext, error: LaunchError) {
        if !self.alive.swap(false, Ordering::SeqCst) {
            return;
        }
        self.set_phase(AttemptPhase::Destroyed);
        let (removed, none_remaining) = ctx.arbiter.remove_and_check(self.id);
        warn!(
            "attempt {} ({}) failed to connect: {}",
            self.id,
            self.session_id(),
            error
        );
        if removed {
            let _ = self.events.send(AttemptEvent::ConnectFailed {
                attempt_id: self.id,
                error,
                none_remaining,
            });
        }
    }
}

/// Run one attempt to completion: connect, then forward events and channels
/// until the attempt terminates.
pub(crate) async fn run(attempt: Arc<ConnectionAttempt>, ctx: Arc<AttemptContext>) {
    // Control-input subscription lives exactly as long as this task
    let mut control_input = ctx.control_input.subscribe();

    let payload = match attempt.offer().signaling_payload() {
        Ok(payload) => payload,
        Err(e) => {
            attempt.fail_connect(&ctx, e);
            return;
        }
    };

    attempt.send_status(format!("connecting to node {}", attempt.session_id()));

    let connection = tokio::select! {
        result = ctx
            .transport
            .connect(attempt.session_id(), &payload, &ctx.config) =>
        {
            match result {
                Ok(connection) => connection,
                Err(e) => {
                    attempt.fail_connect(&ctx, e);
                    return;
                }
            }
        }
        _ = wait_for_cancel(&mut control_input) => {
            attempt.destroy(StopCode::NORMAL);
            return;
        }
    };

    let NodeConnection {
        control,
        mut events,
        mut channels,
    } = connection;

    *attempt.conn_control.lock() = Some(control);
    if !attempt.is_alive() {
        // Destroyed while connecting; release the late connection
        if let Some(control) = attempt.conn_control.lock().take() {
            control.destroy(attempt.destroyed_with().unwrap_or(StopCode::NORMAL));
        }
        return;
    }

    attempt.send_status(format!("connected to node {}", attempt.session_id()));

    let mut handshake: Option<tokio::task::JoinHandle<()>> = None;
    let mut events_done = false;
    let mut channels_done = false;

    loop {
        tokio::select! {
            event = events.recv(), if !events_done => match event {
                Some(ConnectionEvent::Status(message)) => attempt.send_status(message),
                Some(ConnectionEvent::Exit(code)) => {
                    attempt.forward_exit(code);
                    break;
                }
                None => events_done = true,
            },
            named = channels.recv(), if !channels_done => match named {
                Some(NamedChannel { name, channel }) if name == CHANNEL_CONTROL => {
                    if handshake.is_none() && attempt.is_alive() {
                        handshake = Some(tokio::spawn(protocol::run_handshake(
                            attempt.clone(),
                            ctx.clone(),
                            channel,
                        )));
                    } else {
                        debug!("attempt {}: duplicate control channel ignored", attempt.id());
                    }
                }
                Some(NamedChannel { name, channel }) if name == CHANNEL_PERSISTENCE => {
                    if attempt.is_winner() && ctx.auth.is_authenticated() {
                        if let Some(sync) = ctx.persistence.clone() {
                            let root = ctx.resolved_root();
                            tokio::spawn(async move {
                                persistence::attach(&sync, channel, root).await;
                            });
                        } else {
                            debug!("no persistence collaborator configured");
                        }
                    } else {
                        debug!(
                            "attempt {}: persistence channel left unused",
                            attempt.id()
                        );
                    }
                }
                Some(NamedChannel { name, .. }) => {
                    debug!("attempt {}: unhandled channel {}", attempt.id(), name);
                }
                None => channels_done = true,
            },
            _ = wait_for_cancel(&mut control_input) => {
                attempt.destroy(StopCode::NORMAL);
                break;
            }
        }

        if events_done && channels_done {
            // Transport went away without an exit event; stay destroyable but
            // stop forwarding
            break;
        }
    }

    // An abandoned handshake stops being scheduled
    if let Some(task) = handshake {
        task.abort();
    }
}

/// Resolves only when the caller requests cancellation; pends forever once the
/// input channel is gone.
async fn wait_for_cancel(input: &mut broadcast::Receiver<ControlCommand>) {
    loop {
        match input.recv().await {
            Ok(ControlCommand::Cancel) => return,
            Err(broadcast::error::RecvError::Closed) => std::future::pending::<()>().await,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
        }
    }
}
