//! Control Channel Handshake
//!
//! Drives the fixed command sequence that turns a fresh connection into the
//! live session. Two command requests bracket the network probe, arbitration
//! picks the winner, and the winner sends the launch request and waits for
//! the node's acknowledgement. The phases run strictly in order; a destroyed
//! connection aborts the handshake silently at its next channel read.

use std::sync::Arc;

use log::{debug, info};

use super::attempt::{AttemptContext, ConnectionAttempt};
use super::events::AttemptEvent;
use super::state::AttemptPhase;
use crate::error::LaunchResult;
use crate::transport::wire::{self, ConfigUpdate, LaunchRequest};
use crate::transport::ControlChannel;

/// Live session control channel, handed to the orchestrator once the winning
/// attempt becomes operational and discarded at teardown
pub struct ControlHandle {
    channel: Box<dyn ControlChannel>,
}

impl ControlHandle {
    pub(crate) fn new(channel: Box<dyn ControlChannel>) -> Self {
        Self { channel }
    }

    /// Push an in-session configuration update to the node
    pub async fn send_config(&mut self, update: &ConfigUpdate) -> LaunchResult<()> {
        self.channel.send(update.encode()?).await
    }
}

impl std::fmt::Debug for ControlHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlHandle").finish()
    }
}

/// Run the handshake on an announced control channel
pub(crate) async fn run_handshake(
    attempt: Arc<ConnectionAttempt>,
    ctx: Arc<AttemptContext>,
    channel: Box<dyn ControlChannel>,
) {
    if let Err(e) = drive(&attempt, &ctx, channel).await {
        // The connection died mid-handshake; nothing observes the abandoned
        // handler
        debug!("attempt {} handshake abandoned: {}", attempt.id(), e);
    }
}

async fn drive(
    attempt: &Arc<ConnectionAttempt>,
    ctx: &AttemptContext,
    mut channel: Box<dyn ControlChannel>,
) -> LaunchResult<()> {
    attempt.set_phase(AttemptPhase::AwaitingFirstRequest);
    wait_for_command_request(channel.as_mut()).await?;

    attempt.set_phase(AttemptPhase::CollectingDiagnostics);
    let report = ctx.probe.collect(channel.as_mut()).await?;
    debug!(
        "attempt {} diagnostics: rtt {:?} ms, throughput {:?} kbps",
        attempt.id(),
        report.rtt_ms,
        report.throughput_kbps
    );

    attempt.set_phase(AttemptPhase::AwaitingSecondRequest);
    wait_for_command_request(channel.as_mut()).await?;

    attempt.set_phase(AttemptPhase::Arbitrating);
    if !ctx.arbiter.arbitrate(attempt) {
        // Lost the race; the arbiter already destroyed this attempt
        return Ok(());
    }

    attempt.set_phase(AttemptPhase::SendingLaunch);
    let request = LaunchRequest::new(ctx.config.workload.clone(), ctx.resolved_root());
    channel.send(request.encode()?).await?;
    info!(
        "attempt {} sent launch request for {}",
        attempt.id(),
        ctx.config.workload
    );

    attempt.set_phase(AttemptPhase::AwaitingAck);
    wait_for_command_request(channel.as_mut()).await?;

    attempt.set_phase(AttemptPhase::Operational);
    attempt.emit(AttemptEvent::Operational {
        attempt_id: attempt.id(),
        handle: ControlHandle::new(channel),
    });
    Ok(())
}

/// Suspend until the remote sends a command-request frame; other frames are
/// skipped.
async fn wait_for_command_request(channel: &mut dyn ControlChannel) -> LaunchResult<()> {
    loop {
        let frame = channel.recv().await?;
        if wire::is_command_request(&frame) {
            return Ok(());
        }
        debug!("skipping non-command frame ({} bytes)", frame.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{PersistenceRoot, StaticAuth};
    use crate::config::StreamConfig;
    use crate::diagnostics::NullProbe;
    use crate::session::arbiter::Arbiter;
    use crate::session::state::StopCode;
    use crate::transport::testing::{ChannelDriver, ScriptedTransport};
    use crate::transport::CandidateOffer;
    use tokio::sync::{broadcast, mpsc};

    fn context(auth: StaticAuth, root: Option<PersistenceRoot>) -> Arc<AttemptContext> {
        let (control_input, _) = broadcast::channel(16);
        Arc::new(AttemptContext {
            transport: Arc::new(ScriptedTransport::new()),
            probe: Arc::new(NullProbe),
            auth: Arc::new(auth),
            persistence: None,
            arbiter: Arc::new(Arbiter::new()),
            config: StreamConfig::new("factory-sim"),
            persistence_root: root,
            control_input,
        })
    }

    #[tokio::test]
    async fn test_winner_handshake_sends_launch() {
        let ctx = context(
            StaticAuth::new(),
            Some(PersistenceRoot::new("root-1")),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let attempt = ConnectionAttempt::new(0, CandidateOffer::new("sess-0", "{}"), tx);
        ctx.arbiter.register(attempt.clone());

        let (channel, driver) = ChannelDriver::pair();
        let task = tokio::spawn(run_handshake(attempt.clone(), ctx.clone(), channel));

        driver.send_command_request();
        driver.send_command_request();

        let frame = driver.next_sent().await.unwrap();
        let request = LaunchRequest::decode(&frame).unwrap();
        assert_eq!(request.launch, "factory-sim");
        assert_eq!(request.persistence_root, Some(PersistenceRoot::new("root-1")));
        assert_eq!(attempt.phase(), AttemptPhase::AwaitingAck);
        assert!(attempt.is_winner());

        driver.send_command_request();
        task.await.unwrap();
        assert_eq!(attempt.phase(), AttemptPhase::Operational);

        match rx.recv().await.unwrap() {
            AttemptEvent::Operational { attempt_id, .. } => assert_eq!(attempt_id, 0),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unauthenticated_launch_has_no_root() {
        let ctx = {
            let (control_input, _) = broadcast::channel(16);
            Arc::new(AttemptContext {
                transport: Arc::new(ScriptedTransport::new()),
                probe: Arc::new(NullProbe),
                auth: Arc::new(crate::auth::NoAuth),
                persistence: None,
                arbiter: Arc::new(Arbiter::new()),
                config: StreamConfig::new("factory-sim"),
                persistence_root: Some(PersistenceRoot::new("root-1")),
                control_input,
            })
        };
        let (tx, _rx) = mpsc::unbounded_channel();
        let attempt = ConnectionAttempt::new(0, CandidateOffer::new("sess-0", "{}"), tx);
        ctx.arbiter.register(attempt.clone());

        let (channel, driver) = ChannelDriver::pair();
        tokio::spawn(run_handshake(attempt.clone(), ctx.clone(), channel));

        driver.send_command_request();
        driver.send_command_request();

        let frame = driver.next_sent().await.unwrap();
        let request = LaunchRequest::decode(&frame).unwrap();
        assert_eq!(request.persistence_root, None);
    }

    #[tokio::test]
    async fn test_loser_handshake_stops_at_arbitration() {
        let ctx = context(StaticAuth::new(), None);
        let (tx, _rx) = mpsc::unbounded_channel();
        let winner = ConnectionAttempt::new(0, CandidateOffer::new("sess-0", "{}"), tx.clone());
        let loser = ConnectionAttempt::new(1, CandidateOffer::new("sess-1", "{}"), tx);
        ctx.arbiter.register(winner.clone());
        ctx.arbiter.register(loser.clone());
        assert!(ctx.arbiter.arbitrate(&winner));

        let (channel, driver) = ChannelDriver::pair();
        let task = tokio::spawn(run_handshake(loser.clone(), ctx.clone(), channel));

        driver.send_command_request();
        driver.send_command_request();
        task.await.unwrap();

        // The loser never sent a launch request
        assert!(driver.try_next_sent().is_none());
        assert!(!loser.is_winner());
        assert_eq!(loser.destroyed_with(), Some(StopCode::CONCURRENT_SESSION));
    }

    #[tokio::test]
    async fn test_handshake_abandoned_when_connection_destroyed() {
        let ctx = context(StaticAuth::new(), None);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let attempt = ConnectionAttempt::new(0, CandidateOffer::new("sess-0", "{}"), tx);
        ctx.arbiter.register(attempt.clone());

        let (channel, driver) = ChannelDriver::pair();
        let task = tokio::spawn(run_handshake(attempt.clone(), ctx.clone(), channel));

        driver.send_command_request();
        driver.close();
        task.await.unwrap();

        // Abandoned silently: no arbitration, no events, attempt untouched
        assert_eq!(attempt.phase(), AttemptPhase::AwaitingSecondRequest);
        assert!(attempt.is_alive());
        assert_eq!(ctx.arbiter.winner(), None);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_command_request_skips_other_frames() {
        let ctx = context(StaticAuth::new(), None);
        let (tx, _rx) = mpsc::unbounded_channel();
        let attempt = ConnectionAttempt::new(0, CandidateOffer::new("sess-0", "{}"), tx);
        ctx.arbiter.register(attempt.clone());

        let (channel, driver) = ChannelDriver::pair();
        tokio::spawn(run_handshake(attempt.clone(), ctx.clone(), channel));

        driver.push(bytes::Bytes::from_static(b"noise"));
        driver.send_command_request();
        driver.send_command_request();

        let frame = driver.next_sent().await.unwrap();
        assert!(LaunchRequest::decode(&frame).is_ok());
    }
}
