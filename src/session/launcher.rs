//! Session Orchestrator
//!
//! Fans out one connection attempt per candidate offer, races the whole group
//! against the launch deadline, resolves exactly one outcome for the caller,
//! and tears everything down on every exit path. Multiple launches can be in
//! flight at once; each is tracked for presentation, cancellation, and
//! in-session configuration updates.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use log::{debug, info, warn};
use tokio::sync::{broadcast, mpsc};

use super::arbiter::Arbiter;
use super::attempt::{self, AttemptContext, ConnectionAttempt, ControlCommand};
use super::events::{AttemptEvent, LaunchEvent};
use super::protocol::ControlHandle;
use super::state::{LaunchInfo, LaunchState, StopCode};
use crate::auth::{PersistenceRoot, SessionAuth};
use crate::config::StreamConfig;
use crate::diagnostics::NetworkProbe;
use crate::error::{LaunchError, LaunchResult};
use crate::persistence::PersistenceSync;
use crate::transport::{CandidateOffer, ConfigUpdate, NodeTransport};

/// Default launch deadline
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(3 * 60);

type ControlSlot = Arc<tokio::sync::Mutex<Option<ControlHandle>>>;

/// Live control surfaces of one in-flight launch
struct LaunchControl {
    /// Cancel path into every attempt of the launch
    control_input: broadcast::Sender<ControlCommand>,
    /// The winner's control channel, once operational
    handle: ControlSlot,
}

/// Session Launcher - races candidate connections and manages session
/// lifecycles
pub struct SessionLauncher {
    transport: Arc<dyn NodeTransport>,
    auth: Arc<dyn SessionAuth>,
    probe: Arc<dyn NetworkProbe>,
    persistence: Option<Arc<dyn PersistenceSync>>,
    /// Launch bookkeeping (launch_id -> LaunchState)
    launches: Arc<DashMap<String, LaunchState>>,
    /// Control surfaces of in-flight launches (launch_id -> LaunchControl)
    controls: Arc<DashMap<String, LaunchControl>>,
}

impl SessionLauncher {
    /// Create a launcher over the given collaborators
    pub fn new(
        transport: Arc<dyn NodeTransport>,
        auth: Arc<dyn SessionAuth>,
        probe: Arc<dyn NetworkProbe>,
    ) -> Self {
        Self {
            transport,
            auth,
            probe,
            persistence: None,
            launches: Arc::new(DashMap::new()),
            controls: Arc::new(DashMap::new()),
        }
    }

    /// Attach the persistence collaborator
    pub fn with_persistence(mut self, sync: Arc<dyn PersistenceSync>) -> Self {
        self.persistence = Some(sync);
        self
    }

    /// Launch a session on the first candidate node to win arbitration.
    /// Resolves exactly once: with the session's exit code, or with the first
    /// unrecovered failure.
    pub async fn launch(
        &self,
        offers: Vec<CandidateOffer>,
        persistence_root: Option<PersistenceRoot>,
        config: StreamConfig,
        deadline: Duration,
    ) -> LaunchResult<StopCode> {
        let launch_id = uuid::Uuid::new_v4().to_string();
        self.launch_with_id(&launch_id, offers, persistence_root, config, deadline)
            .await
    }

    /// Launch with a caller-chosen launch id, so the caller can subscribe,
    /// cancel, and push configuration updates while the launch is in flight
    pub async fn launch_with_id(
        &self,
        launch_id: &str,
        offers: Vec<CandidateOffer>,
        persistence_root: Option<PersistenceRoot>,
        config: StreamConfig,
        deadline: Duration,
    ) -> LaunchResult<StopCode> {
        if offers.is_empty() {
            return Err(LaunchError::NoCandidates);
        }
        if self.launches.contains_key(launch_id) {
            return Err(LaunchError::Internal(format!(
                "launch already exists: {}",
                launch_id
            )));
        }

        self.launches.insert(
            launch_id.to_string(),
            LaunchState::new(launch_id, config.workload.as_str()),
        );

        let (control_input, _) = broadcast::channel(16);
        let control_slot: ControlSlot = Arc::new(tokio::sync::Mutex::new(None));
        self.controls.insert(
            launch_id.to_string(),
            LaunchControl {
                control_input: control_input.clone(),
                handle: control_slot.clone(),
            },
        );

        info!(
            "launch {}: racing {} candidate node(s) for {}",
            launch_id,
            offers.len(),
            config.workload
        );

        let result = self
            .run_launch(
                launch_id,
                offers,
                persistence_root,
                config,
                deadline,
                control_input,
                control_slot,
            )
            .await;

        self.finish(launch_id, &result);
        result
    }

    /// Subscribe to a launch's presentation events
    pub fn subscribe(&self, launch_id: &str) -> Option<broadcast::Receiver<LaunchEvent>> {
        self.launches.get(launch_id).map(|state| state.subscribe())
    }

    /// Request cancellation of an in-flight launch. Pending attempts are
    /// destroyed with `StopCode::NORMAL`.
    pub fn cancel(&self, launch_id: &str) -> LaunchResult<()> {
        let control = self
            .controls
            .get(launch_id)
            .ok_or_else(|| LaunchError::LaunchNotFound(launch_id.to_string()))?;
        let _ = control.control_input.send(ControlCommand::Cancel);
        Ok(())
    }

    /// Push a configuration update over the winner's control channel
    pub async fn send_config(&self, launch_id: &str, update: ConfigUpdate) -> LaunchResult<()> {
        let slot = {
            let control = self
                .controls
                .get(launch_id)
                .ok_or_else(|| LaunchError::LaunchNotFound(launch_id.to_string()))?;
            control.handle.clone()
        };
        let mut guard = slot.lock().await;
        match guard.as_mut() {
            Some(handle) => handle.send_config(&update).await,
            None => Err(LaunchError::NotOperational(launch_id.to_string())),
        }
    }

    /// Get launch info by ID
    pub fn launch_info(&self, launch_id: &str) -> Option<LaunchInfo> {
        self.launches.get(launch_id).map(|state| LaunchInfo::from(&*state))
    }

    /// Get all launches still in flight
    pub fn list_active(&self) -> Vec<LaunchInfo> {
        self.launches
            .iter()
            .filter(|state| state.is_active())
            .map(|state| LaunchInfo::from(state.value()))
            .collect()
    }

    /// Get all tracked launches
    pub fn list_all(&self) -> Vec<LaunchInfo> {
        self.launches
            .iter()
            .map(|state| LaunchInfo::from(state.value()))
            .collect()
    }

    /// Count of launches still in flight
    pub fn active_count(&self) -> usize {
        self.launches.iter().filter(|state| state.is_active()).count()
    }

    /// Drop bookkeeping for finished launches
    pub fn cleanup_finished(&self) {
        let finished: Vec<String> = self
            .launches
            .iter()
            .filter(|state| state.is_terminal())
            .map(|state| state.id.clone())
            .collect();

        for id in finished {
            self.launches.remove(&id);
        }
    }

    async fn run_launch(
        &self,
        launch_id: &str,
        offers: Vec<CandidateOffer>,
        persistence_root: Option<PersistenceRoot>,
        config: StreamConfig,
        deadline: Duration,
        control_input: broadcast::Sender<ControlCommand>,
        control_slot: ControlSlot,
    ) -> LaunchResult<StopCode> {
        let arbiter = Arc::new(Arbiter::new());
        let (attempt_tx, mut attempt_rx) = mpsc::unbounded_channel();

        let ctx = Arc::new(AttemptContext {
            transport: self.transport.clone(),
            probe: self.probe.clone(),
            auth: self.auth.clone(),
            persistence: self.persistence.clone(),
            arbiter: arbiter.clone(),
            config,
            persistence_root,
            control_input,
        });

        let mut tasks = Vec::with_capacity(offers.len());
        for (id, offer) in offers.into_iter().enumerate() {
            let candidate = ConnectionAttempt::new(id, offer, attempt_tx.clone());
            arbiter.register(candidate.clone());
            tasks.push(tokio::spawn(attempt::run(candidate, ctx.clone())));
        }
        drop(attempt_tx);

        let outcome = self
            .drive(launch_id, &mut attempt_rx, &arbiter, &control_slot, deadline)
            .await;

        // Teardown on every path: destroy whatever is still tracked, then stop
        // the attempt tasks
        for candidate in arbiter.live_attempts() {
            candidate.destroy(StopCode::NORMAL);
        }
        for task in tasks {
            task.abort();
        }

        outcome
    }

    /// Consume attempt events until the launch has an outcome or the deadline
    /// fires
    async fn drive(
        &self,
        launch_id: &str,
        attempt_rx: &mut mpsc::UnboundedReceiver<AttemptEvent>,
        arbiter: &Arc<Arbiter>,
        control_slot: &ControlSlot,
        deadline: Duration,
    ) -> LaunchResult<StopCode> {
        let timeout = tokio::time::sleep(deadline);
        tokio::pin!(timeout);

        loop {
            tokio::select! {
                _ = &mut timeout => {
                    warn!(
                        "launch {}: deadline exceeded after {}ms",
                        launch_id,
                        deadline.as_millis()
                    );
                    return Err(LaunchError::DeadlineExceeded(deadline.as_millis() as u64));
                }
                event = attempt_rx.recv() => match event {
                    Some(AttemptEvent::Status { attempt_id, message }) => {
                        debug!("launch {}: attempt {}: {}", launch_id, attempt_id, message);
                        self.emit_message(launch_id, message);
                    }
                    Some(AttemptEvent::Operational { attempt_id, handle }) => {
                        info!("launch {}: attempt {} is operational", launch_id, attempt_id);
                        *control_slot.lock().await = Some(handle);
                        if let Some(mut state) = self.launches.get_mut(launch_id) {
                            state.set_streaming();
                        }
                    }
                    Some(AttemptEvent::Exit { attempt_id, code })
                        if code == StopCode::CONCURRENT_SESSION =>
                    {
                        // Superseded attempt: silent bookkeeping, never an
                        // outcome even when it empties the set
                        debug!(
                            "launch {}: attempt {} superseded by a concurrent session",
                            launch_id, attempt_id
                        );
                        arbiter.remove_and_check(attempt_id);
                    }
                    Some(AttemptEvent::Exit { attempt_id, code }) => {
                        info!(
                            "launch {}: attempt {} exited with code {}",
                            launch_id, attempt_id, code
                        );
                        arbiter.remove_and_check(attempt_id);
                        return Ok(code);
                    }
                    Some(AttemptEvent::ConnectFailed { attempt_id, error, none_remaining }) => {
                        warn!(
                            "launch {}: attempt {} failed: {} (none_remaining: {})",
                            launch_id, attempt_id, error, none_remaining
                        );
                        if none_remaining {
                            return Err(error);
                        }
                    }
                    None => {
                        // Every attempt task ended without a terminal event
                        return Err(LaunchError::Internal(
                            "all attempts ended without an outcome".to_string(),
                        ));
                    }
                }
            }
        }
    }

    /// Record the outcome and release the launch's control surfaces
    fn finish(&self, launch_id: &str, result: &LaunchResult<StopCode>) {
        self.controls.remove(launch_id);
        if let Some(mut state) = self.launches.get_mut(launch_id) {
            match result {
                Ok(code) => state.set_completed(*code),
                Err(LaunchError::DeadlineExceeded(_)) => state.set_timed_out(),
                Err(e) => state.set_failed(e.to_string()),
            }
        }
    }

    fn emit_message(&self, launch_id: &str, text: String) {
        if let Some(state) = self.launches.get(launch_id) {
            let _ = state.event_tx.send(LaunchEvent::Message {
                launch_id: launch_id.to_string(),
                text,
            });
        }
    }
}
