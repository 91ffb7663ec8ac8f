//! In-process simulated mesh network.
//!
//! [`SimRegistry`] is a shared node table keyed by numeric id: each entry
//! holds the node's display name, its explicitly configured neighbor list,
//! and an inbox queue. Entries are created on first reference and live as
//! long as the registry. Tests construct isolated registries instead of
//! sharing process-wide state.
//!
//! Delivery is inbox-only: a receiving node must actively poll via
//! [`MeshTransport::recv`], modeling half-duplex, non-blocking reception.

use crate::error::TransportError;
use crate::transport::{AckOutcome, MeshTransport, NodeIdentity};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use rand::Rng;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default probability (percent) that a reachable acknowledgment-requesting
/// send is acknowledged, modeling radio unreliability.
pub const DEFAULT_ACK_SUCCESS_PERCENT: u8 = 80;

/// How often a blocked `recv` re-checks the inbox.
const INBOX_POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug)]
struct SimNode {
    display_name: String,
    neighbors: Vec<u64>,
    inbox: VecDeque<Bytes>,
}

impl SimNode {
    fn new(display_name: String) -> Self {
        Self {
            display_name,
            neighbors: Vec::new(),
            inbox: VecDeque::new(),
        }
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    nodes: DashMap<u64, SimNode>,
    // Packet ids start at 1; 0 is reserved.
    packet_ids: AtomicU64,
}

/// Shared, injectable node table for a simulated mesh.
///
/// Cloning yields another handle to the same table. Packet ids allocated
/// through one registry are unique and monotonically increasing across all
/// of its nodes.
#[derive(Debug, Clone, Default)]
pub struct SimRegistry {
    inner: Arc<RegistryInner>,
}

impl SimRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the node entry for `id` if absent; otherwise overwrite its
    /// display name only.
    pub fn register_node(&self, id: u64, display_name: &str) {
        self.inner
            .nodes
            .entry(id)
            .and_modify(|node| node.display_name = display_name.to_string())
            .or_insert_with(|| SimNode::new(display_name.to_string()));
    }

    /// Replace the neighbor list of `id`. Test setup only; neighbor sets
    /// are never inferred.
    pub fn set_neighbors(&self, id: u64, neighbors: Vec<u64>) {
        let mut entry = self
            .inner
            .nodes
            .entry(id)
            .or_insert_with(|| SimNode::new(default_display_name(id)));
        entry.neighbors = neighbors;
    }

    /// Current neighbor ids of `id`, in configuration order.
    pub fn neighbors_of(&self, id: u64) -> Vec<u64> {
        self.inner
            .nodes
            .get(&id)
            .map(|node| node.neighbors.clone())
            .unwrap_or_default()
    }

    /// Display name of `id`, if the node has been referenced.
    pub fn display_name(&self, id: u64) -> Option<String> {
        self.inner.nodes.get(&id).map(|n| n.display_name.clone())
    }

    /// Number of payloads waiting in `id`'s inbox.
    pub fn inbox_len(&self, id: u64) -> usize {
        self.inner.nodes.get(&id).map(|n| n.inbox.len()).unwrap_or(0)
    }

    /// Append an inbound payload to `id`'s inbox, creating the node entry
    /// on first reference.
    pub fn enqueue(&self, id: u64, payload: Bytes) {
        let mut entry = self
            .inner
            .nodes
            .entry(id)
            .or_insert_with(|| SimNode::new(default_display_name(id)));
        entry.inbox.push_back(payload);
    }

    fn pop_inbox(&self, id: u64) -> Option<Bytes> {
        self.inner
            .nodes
            .get_mut(&id)
            .and_then(|mut node| node.inbox.pop_front())
    }

    fn alloc_packet_id(&self) -> u64 {
        self.inner.packet_ids.fetch_add(1, Ordering::Relaxed) + 1
    }
}

fn default_display_name(id: u64) -> String {
    format!("node-{id}")
}

/// Construction parameters for a [`SimulatedTransport`].
#[derive(Debug, Clone)]
pub struct SimulatedConfig {
    /// Numeric id of this node
    pub numeric_id: u64,
    /// Display name; defaults to `node-<id>` when absent
    pub display_name: Option<String>,
    /// Probability (percent) that a reachable ack-requesting send succeeds.
    /// Pin to 0 or 100 for deterministic tests.
    pub ack_success_percent: u8,
    /// Shared node table this node joins
    pub registry: SimRegistry,
}

impl SimulatedConfig {
    /// Config with the default display name and ack bias.
    pub fn new(numeric_id: u64, registry: SimRegistry) -> Self {
        Self {
            numeric_id,
            display_name: None,
            ack_success_percent: DEFAULT_ACK_SUCCESS_PERCENT,
            registry,
        }
    }
}

/// Simulated mesh link over a [`SimRegistry`].
pub struct SimulatedTransport {
    identity: NodeIdentity,
    registry: SimRegistry,
    ack_success_percent: u8,
    ack_tx: mpsc::UnboundedSender<AckOutcome>,
    connected: AtomicBool,
}

impl SimulatedTransport {
    /// Join the registry as `config.numeric_id` and publish acknowledgment
    /// outcomes on `ack_tx`.
    pub fn new(config: SimulatedConfig, ack_tx: mpsc::UnboundedSender<AckOutcome>) -> Self {
        let display_name = config
            .display_name
            .unwrap_or_else(|| default_display_name(config.numeric_id));
        config.registry.register_node(config.numeric_id, &display_name);

        Self {
            identity: NodeIdentity {
                numeric_id: config.numeric_id,
                display_name,
            },
            registry: config.registry,
            ack_success_percent: config.ack_success_percent,
            ack_tx,
            connected: AtomicBool::new(false),
        }
    }

    fn resolve_ack(&self, packet_id: u64) {
        let success = rand::thread_rng().gen_range(0..100u8) < self.ack_success_percent;
        debug!(packet_id, success, "simulated ack outcome");
        let _ = self.ack_tx.send(AckOutcome { packet_id, success });
    }
}

#[async_trait]
impl MeshTransport for SimulatedTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        self.connected.store(true, Ordering::SeqCst);
        info!(
            node_id = self.identity.numeric_id,
            name = %self.identity.display_name,
            "simulated node connected"
        );
        Ok(())
    }

    async fn close(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            info!(node_id = self.identity.numeric_id, "simulated node disconnected");
        }
    }

    fn identity(&self) -> Result<NodeIdentity, TransportError> {
        Ok(self.identity.clone())
    }

    fn neighbors(&self) -> Vec<u64> {
        self.registry.neighbors_of(self.identity.numeric_id)
    }

    async fn send(
        &self,
        payload: Bytes,
        destination: Option<u64>,
        want_ack: bool,
    ) -> Result<Option<u64>, TransportError> {
        let src = self.identity.numeric_id;
        let packet_id = self.registry.alloc_packet_id();
        let neighbors = self.registry.neighbors_of(src);

        match destination {
            None => {
                for nbr in &neighbors {
                    self.registry.enqueue(*nbr, payload.clone());
                }
                debug!(
                    src,
                    packet_id,
                    fanout = neighbors.len(),
                    len = payload.len(),
                    "broadcast"
                );
            }
            Some(dst) if neighbors.contains(&dst) => {
                self.registry.enqueue(dst, payload);
                debug!(src, dst, packet_id, want_ack, "unicast");
            }
            Some(dst) => {
                // Unreachable destination: nothing is enqueued and a
                // requested ack resolves immediately as failure.
                warn!(src, dst, packet_id, "destination is not a neighbor; failing ack");
                if want_ack {
                    let _ = self.ack_tx.send(AckOutcome {
                        packet_id,
                        success: false,
                    });
                }
                return Ok(Some(packet_id));
            }
        }

        if want_ack {
            self.resolve_ack(packet_id);
        }

        Ok(Some(packet_id))
    }

    async fn recv(&self, timeout: Duration) -> Option<Bytes> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(payload) = self.registry.pop_inbox(self.identity.numeric_id) {
                return Some(payload);
            }
            if Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(INBOX_POLL_INTERVAL).await;
        }
    }
}
