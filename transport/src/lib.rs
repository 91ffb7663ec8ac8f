//! Mesh transport abstraction for tower communication.
//!
//! [`MeshTransport`] is the capability contract shared by every link type:
//! connect/close, node identity, one-hop neighbor discovery, broadcast or
//! unicast send with optional acknowledgment, and pull-based reception.
//! Acknowledgment outcomes are published asynchronously on a channel handed
//! to the transport at construction.
//!
//! [`SimulatedTransport`] implements the contract over an injectable
//! in-process node table ([`SimRegistry`]) so multiple nodes in one process
//! can exchange messages without a radio.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod simulated;
mod transport;

pub use error::TransportError;
pub use simulated::{SimRegistry, SimulatedConfig, SimulatedTransport, DEFAULT_ACK_SUCCESS_PERCENT};
pub use transport::{AckOutcome, MeshTransport, NodeIdentity};
