//! Stream Configuration
//!
//! Caller-supplied settings for a launch: the workload to start on the winning
//! node and the encoder parameters handed to the transport.

use serde::{Deserialize, Serialize};

/// Default encoder bitrate in Mbps when the caller supplies none
pub const DEFAULT_ENCODER_BITRATE: u32 = 2;

/// Configuration for one session launch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Workload identifier sent in the launch request
    pub workload: String,
    /// Desired encoder bitrate in Mbps
    pub encoder_bitrate: u32,
}

impl StreamConfig {
    /// Create a config for a workload with the default bitrate
    pub fn new(workload: impl Into<String>) -> Self {
        Self {
            workload: workload.into(),
            encoder_bitrate: DEFAULT_ENCODER_BITRATE,
        }
    }

    /// Set the encoder bitrate
    pub fn with_bitrate(mut self, mbps: u32) -> Self {
        self.encoder_bitrate = mbps;
        self
    }

    /// Quality tier implied by the configured bitrate
    pub fn quality(&self) -> QualityTier {
        QualityTier::from_mbps(self.encoder_bitrate)
    }
}

/// Coarse quality tier for a given encoder bitrate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Low,
    Medium,
    High,
    Ultra,
}

impl QualityTier {
    /// Map an encoder bitrate in Mbps to its tier
    pub fn from_mbps(mbps: u32) -> Self {
        if mbps < 4 {
            Self::Low
        } else if mbps < 8 {
            Self::Medium
        } else if mbps < 12 {
            Self::High
        } else {
            Self::Ultra
        }
    }
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Ultra => write!(f, "ultra"),
        }
    }
}
