//! Persistence Wiring
//!
//! Collaborator seam for the save-data synchronization client. Once
//! arbitration names a winner and the node announces the persistence
//! side-channel, the collaborator is attached bound to the session's
//! persistence root. Attach-only and fire-and-forget: a failed attach is
//! logged and the session continues without save-data sync.

use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};

use crate::auth::PersistenceRoot;
use crate::error::LaunchResult;
use crate::transport::ControlChannel;

/// Trait for the persistence collaborator
#[async_trait]
pub trait PersistenceSync: Send + Sync {
    /// Attach the synchronization handler to the persistence channel. The
    /// handler owns the channel for the rest of the session.
    async fn attach(
        &self,
        channel: Box<dyn ControlChannel>,
        roots: Vec<PersistenceRoot>,
    ) -> LaunchResult<()>;
}

/// Attach the collaborator to the winner's persistence channel. No retries.
pub(crate) async fn attach(
    sync: &Arc<dyn PersistenceSync>,
    channel: Box<dyn ControlChannel>,
    root: Option<PersistenceRoot>,
) {
    let roots: Vec<PersistenceRoot> = root.into_iter().collect();
    match sync.attach(channel, roots).await {
        Ok(()) => info!("persistence enabled"),
        Err(e) => warn!("persistence attach failed, continuing without sync: {}", e),
    }
}
