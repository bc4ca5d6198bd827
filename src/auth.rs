//! Session Authentication
//!
//! Collaborator seam for the caller's login/session service. The launcher only
//! needs two facts from it: whether the caller is authenticated, and the
//! persistence root their save data lives under.

use serde::{Deserialize, Serialize};

/// Opaque identifier under which the session's save data is stored by the
/// persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersistenceRoot(String);

impl PersistenceRoot {
    /// Create a persistence root from an opaque identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PersistenceRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trait for the authentication/session collaborator
pub trait SessionAuth: Send + Sync {
    /// Whether the caller holds a valid login
    fn is_authenticated(&self) -> bool;

    /// Persistence root for the caller's save data, if any
    fn persistence_root(&self) -> Option<PersistenceRoot>;
}

/// Unauthenticated session - launches proceed without persistence
#[derive(Debug, Clone, Default)]
pub struct NoAuth;

impl SessionAuth for NoAuth {
    fn is_authenticated(&self) -> bool {
        false
    }

    fn persistence_root(&self) -> Option<PersistenceRoot> {
        None
    }
}

/// Fixed credentials, for embedders whose login flow happens elsewhere
#[derive(Debug, Clone, Default)]
pub struct StaticAuth {
    root: Option<PersistenceRoot>,
}

impl StaticAuth {
    /// Create an authenticated session without a persistence root
    pub fn new() -> Self {
        Self { root: None }
    }

    /// Create an authenticated session with a persistence root
    pub fn with_root(root: PersistenceRoot) -> Self {
        Self { root: Some(root) }
    }
}

impl SessionAuth for StaticAuth {
    fn is_authenticated(&self) -> bool {
        true
    }

    fn persistence_root(&self) -> Option<PersistenceRoot> {
        self.root.clone()
    }
}
