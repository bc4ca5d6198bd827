//! Launch Error Types
//!
//! Comprehensive error handling for session launch operations

use thiserror::Error;

/// Launch-specific errors
#[derive(Error, Debug)]
pub enum LaunchError {
    // Precondition errors
    #[error("No candidate nodes available")]
    NoCandidates,

    // Connection errors
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Malformed candidate offer: {0}")]
    MalformedOffer(String),

    #[error("Control channel closed")]
    ChannelClosed,

    // Session errors
    #[error("Deadline exceeded after {0}ms")]
    DeadlineExceeded(u64),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Launch not found: {0}")]
    LaunchNotFound(String),

    #[error("Launch not operational: {0}")]
    NotOperational(String),

    // Persistence errors
    #[error("Persistence attach failed: {0}")]
    PersistenceAttach(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for launch operations
pub type LaunchResult<T> = Result<T, LaunchError>;
