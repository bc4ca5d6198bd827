//! Control Channel Wire Format
//!
//! Every control message is a single-byte marker followed by a JSON body.
//! This is the only wire format owned by the launch engine; everything else on
//! the connection belongs to the transport collaborator.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::auth::PersistenceRoot;
use crate::error::{LaunchError, LaunchResult};

/// Marker for a command-request frame sent by the remote node
pub const MARKER_COMMAND_REQUEST: u8 = 0x05;
/// Marker for the workload launch request
pub const MARKER_LAUNCH: u8 = 0x15;
/// Marker for an in-session configuration update
pub const MARKER_CONFIG: u8 = 0x11;

/// Launch request sent exactly once, by the winning attempt only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchRequest {
    /// Workload identifier to start on the node
    #[serde(rename = "Launch")]
    pub launch: String,
    /// Save-data root, present only for authenticated callers
    #[serde(rename = "PersistenceRoot", skip_serializing_if = "Option::is_none")]
    pub persistence_root: Option<PersistenceRoot>,
}

impl LaunchRequest {
    /// Build a launch request for a workload
    pub fn new(workload: impl Into<String>, persistence_root: Option<PersistenceRoot>) -> Self {
        Self {
            launch: workload.into(),
            persistence_root,
        }
    }

    /// Encode as a marker-prefixed frame
    pub fn encode(&self) -> LaunchResult<Bytes> {
        encode_frame(MARKER_LAUNCH, self)
    }

    /// Decode a marker-prefixed launch frame
    pub fn decode(frame: &[u8]) -> LaunchResult<Self> {
        match frame.split_first() {
            Some((&MARKER_LAUNCH, body)) => Ok(serde_json::from_slice(body)?),
            _ => Err(LaunchError::ProtocolError(
                "frame is not a launch request".to_string(),
            )),
        }
    }
}

/// In-session configuration update pushed over the live control channel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    /// New encoder bitrate in Mbps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoder_bitrate: Option<u32>,
}

impl ConfigUpdate {
    /// Update the encoder bitrate
    pub fn bitrate(mbps: u32) -> Self {
        Self {
            encoder_bitrate: Some(mbps),
        }
    }

    /// Encode as a marker-prefixed frame
    pub fn encode(&self) -> LaunchResult<Bytes> {
        encode_frame(MARKER_CONFIG, self)
    }
}

/// Whether a received frame is a command-request signal
pub fn is_command_request(frame: &[u8]) -> bool {
    frame.first() == Some(&MARKER_COMMAND_REQUEST)
}

/// A bare command-request frame, as the remote node sends it
pub fn command_request_frame() -> Bytes {
    Bytes::from_static(&[MARKER_COMMAND_REQUEST])
}

fn encode_frame<T: Serialize>(marker: u8, body: &T) -> LaunchResult<Bytes> {
    let json = serde_json::to_vec(body)?;
    let mut buf = BytesMut::with_capacity(json.len() + 1);
    buf.put_u8(marker);
    buf.put_slice(&json);
    Ok(buf.freeze())
}
