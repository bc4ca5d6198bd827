//! Candidate Offers
//!
//! One offer per remote node able to host the session. Offers are immutable
//! and supplied by the caller from whatever node-discovery service it uses.

use serde::{Deserialize, Serialize};

use crate::error::{LaunchError, LaunchResult};

/// A signaling offer describing one candidate node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateOffer {
    /// Opaque session identifier assigned by the node
    pub session_id: String,
    /// Signaling-offer blob; a JSON envelope whose `Offer` field is itself a
    /// JSON-encoded signaling description
    pub peer_connection_offer: String,
}

/// Envelope layer of the offer blob
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OfferEnvelope {
    #[serde(rename = "Offer")]
    offer: String,
}

impl CandidateOffer {
    /// Create an offer from a session id and its raw signaling blob
    pub fn new(session_id: impl Into<String>, peer_connection_offer: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            peer_connection_offer: peer_connection_offer.into(),
        }
    }

    /// Decode the nested signaling payload. A malformed envelope is a
    /// connection failure for the attempt wrapping this offer.
    pub fn signaling_payload(&self) -> LaunchResult<serde_json::Value> {
        let envelope: OfferEnvelope = serde_json::from_str(&self.peer_connection_offer)
            .map_err(|e| LaunchError::MalformedOffer(e.to_string()))?;
        serde_json::from_str(&envelope.offer).map_err(|e| LaunchError::MalformedOffer(e.to_string()))
    }
}
