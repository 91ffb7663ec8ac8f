//! Error types for the transceiver and the user-facing facade.

use comms_transport::TransportError;
use comms_wire::WireError;
use thiserror::Error;

/// Errors surfaced to callers of the transceiver and facade APIs
#[derive(Error, Debug)]
pub enum CommsError {
    /// Operation attempted outside the Connected state
    #[error("transceiver is not connected")]
    NotConnected,

    /// Unicast destination is not a current neighbor
    #[error("invalid destination {destination}: node is not a current neighbor")]
    InvalidDestination {
        /// The rejected destination id
        destination: u64,
    },

    /// Transport-level failure (connect, identity)
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Wire-level failure (outbound encoding)
    #[error(transparent)]
    Wire(#[from] WireError),
}
