//! The mesh transport capability contract.

use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// Identity of a node on the mesh, fixed for the transport's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    /// Numeric node id used for addressing
    pub numeric_id: u64,
    /// Human-readable node name
    pub display_name: String,
}

/// Asynchronous acknowledgment result for a previously sent packet.
///
/// Published exactly once per acknowledgment-requesting send that the
/// transport resolves. Failure is a normal outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckOutcome {
    /// Packet id returned by the originating `send`
    pub packet_id: u64,
    /// Whether the destination acknowledged delivery
    pub success: bool,
}

/// Capability contract implemented by every mesh link.
///
/// All methods take `&self` so a transport can be shared behind an `Arc`
/// between the send and receive loops; implementations use interior
/// mutability for connection state. `connect` is single-use per instance;
/// calling it twice without `close` is undefined.
#[async_trait]
pub trait MeshTransport: Send + Sync {
    /// Establish the underlying link.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Release link resources. Safe to call when not connected.
    async fn close(&self);

    /// This node's identity.
    ///
    /// Real links only know their identity after `connect` and return
    /// [`TransportError::UnknownIdentity`] before that; simulated links
    /// know it at construction.
    fn identity(&self) -> Result<NodeIdentity, TransportError>;

    /// Node ids currently reachable in one hop. Empty if none known.
    fn neighbors(&self) -> Vec<u64>;

    /// Hand a payload to the link.
    ///
    /// `None` destination broadcasts to all current neighbors. Returns the
    /// link-assigned packet id, or `Ok(None)` when the link accepted the
    /// send without reporting one (logged by the caller, not fatal).
    /// Acknowledgment, if requested, is reported on the ack channel rather
    /// than as a return value.
    async fn send(
        &self,
        payload: Bytes,
        destination: Option<u64>,
        want_ack: bool,
    ) -> Result<Option<u64>, TransportError>;

    /// Poll for one inbound payload addressed to this node, waiting up to
    /// `timeout`. Decoding is the caller's job.
    async fn recv(&self, timeout: Duration) -> Option<Bytes>;
}
