//! Network Diagnostics
//!
//! Collaborator seam for the network-quality probe run during the control
//! channel handshake. The probe is a blocking round-trip over the control
//! channel and owns its internal timeout; the handshake only cares that it
//! completes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LaunchResult;
use crate::transport::ControlChannel;

/// Result of a network-quality probe. Opaque to the handshake; surfaced for
/// logging and presentation only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosticsReport {
    /// Measured round-trip time in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtt_ms: Option<u64>,
    /// Measured throughput in kbps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throughput_kbps: Option<u64>,
    /// Probe-specific detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

/// Trait for the diagnostics collaborator
#[async_trait]
pub trait NetworkProbe: Send + Sync {
    /// Run the quality probe over the control channel
    async fn collect(&self, channel: &mut dyn ControlChannel) -> LaunchResult<DiagnosticsReport>;
}

/// Probe that measures nothing, for callers that skip diagnostics
#[derive(Debug, Clone, Default)]
pub struct NullProbe;

#[async_trait]
impl NetworkProbe for NullProbe {
    async fn collect(&self, _channel: &mut dyn ControlChannel) -> LaunchResult<DiagnosticsReport> {
        Ok(DiagnosticsReport::default())
    }
}
