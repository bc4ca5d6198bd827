//! Transport Module
//!
//! The seam between the launch engine and the underlying connection layer:
//! - Collaborator traits for establishing and tearing down node connections
//! - Candidate offer decoding
//! - The marker-framed control channel wire format

pub mod conn;
pub mod offer;
pub mod wire;

#[cfg(test)]
pub(crate) mod testing;

pub use conn::{
    ConnectionControl, ConnectionEvent, ControlChannel, NamedChannel, NodeConnection, NodeTransport,
};
pub use offer::CandidateOffer;
pub use wire::{ConfigUpdate, LaunchRequest};
