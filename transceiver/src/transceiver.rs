//! The transceiver: outbound queue, send loop, receive loop, and
//! acknowledgment correlation.
//!
//! State machine: `Created -> Connected -> Stopped` (terminal). `start`
//! connects the transport and spawns both loops; `stop` signals them via a
//! watch channel, joins each with a bounded timeout, and closes the
//! transport. `enqueue` never blocks on transport I/O: it encodes and
//! pushes onto an unbounded FIFO drained by the send loop.

use crate::error::CommsError;
use bytes::Bytes;
use comms_transport::{AckOutcome, MeshTransport, NodeIdentity};
use comms_wire::{codec, Packet};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long `stop` waits for each loop to exit.
const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Receive poll granularity; bounds how quickly the receive loop observes
/// the stop signal.
const RECV_POLL_TIMEOUT: Duration = Duration::from_millis(100);

const PHASE_CREATED: u8 = 0;
const PHASE_CONNECTED: u8 = 1;
const PHASE_STOPPED: u8 = 2;

type Outbound = (Option<u64>, Bytes);

/// Hook invoked with every successfully decoded inbound packet.
pub type PacketHook = Arc<dyn Fn(Packet) + Send + Sync>;

/// Acknowledgment callbacks supplied at construction.
///
/// Each resolved acknowledgment invokes exactly one of the pair with the
/// packet id of the originating send.
#[derive(Clone)]
pub struct AckCallbacks {
    on_success: Arc<dyn Fn(u64) + Send + Sync>,
    on_failure: Arc<dyn Fn(u64) + Send + Sync>,
}

impl AckCallbacks {
    /// Build the callback pair.
    pub fn new(
        on_success: impl Fn(u64) + Send + Sync + 'static,
        on_failure: impl Fn(u64) + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_success: Arc::new(on_success),
            on_failure: Arc::new(on_failure),
        }
    }

    fn resolve(&self, outcome: AckOutcome) {
        if outcome.success {
            (self.on_success)(outcome.packet_id);
        } else {
            (self.on_failure)(outcome.packet_id);
        }
    }
}

/// An in-flight send awaiting its acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingSend {
    /// Packet id assigned by the transport
    pub packet_id: u64,
    /// Unicast destination, or `None` for broadcast
    pub destination: Option<u64>,
    /// Whether an acknowledgment was requested
    pub want_ack: bool,
}

/// Owns the outbound queue and the two background loops.
pub struct Transceiver {
    transport: Arc<dyn MeshTransport>,
    queue_tx: mpsc::UnboundedSender<Outbound>,
    queue_rx: Option<mpsc::UnboundedReceiver<Outbound>>,
    ack_rx: Option<mpsc::UnboundedReceiver<AckOutcome>>,
    callbacks: AckCallbacks,
    on_packet: PacketHook,
    pending: Arc<DashMap<u64, PendingSend>>,
    phase: AtomicU8,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Transceiver {
    /// Create a transceiver over `transport`.
    ///
    /// `ack_rx` is the receiving half of the channel the transport publishes
    /// [`AckOutcome`]s on; `on_packet` receives every decoded inbound packet.
    pub fn new(
        transport: Arc<dyn MeshTransport>,
        ack_rx: mpsc::UnboundedReceiver<AckOutcome>,
        callbacks: AckCallbacks,
        on_packet: PacketHook,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            transport,
            queue_tx,
            queue_rx: Some(queue_rx),
            ack_rx: Some(ack_rx),
            callbacks,
            on_packet,
            pending: Arc::new(DashMap::new()),
            phase: AtomicU8::new(PHASE_CREATED),
            shutdown_tx,
            tasks: Vec::new(),
        }
    }

    /// Connect the transport and launch the send and receive loops.
    ///
    /// Valid only once, from the Created state.
    pub async fn start(&mut self) -> Result<(), CommsError> {
        if self.phase.load(Ordering::SeqCst) != PHASE_CREATED {
            return Err(CommsError::NotConnected);
        }

        self.transport.connect().await?;

        let queue_rx = self.queue_rx.take().ok_or(CommsError::NotConnected)?;
        let ack_rx = self.ack_rx.take().ok_or(CommsError::NotConnected)?;

        self.tasks.push(tokio::spawn(send_loop(
            Arc::clone(&self.transport),
            queue_rx,
            ack_rx,
            Arc::clone(&self.pending),
            self.callbacks.clone(),
            self.shutdown_tx.subscribe(),
        )));
        self.tasks.push(tokio::spawn(recv_loop(
            Arc::clone(&self.transport),
            Arc::clone(&self.on_packet),
            self.shutdown_tx.subscribe(),
        )));

        self.phase.store(PHASE_CONNECTED, Ordering::SeqCst);
        match self.transport.identity() {
            Ok(identity) => info!(
                node_id = identity.numeric_id,
                name = %identity.display_name,
                "transceiver started"
            ),
            Err(_) => info!("transceiver started (identity not yet known)"),
        }
        Ok(())
    }

    /// Signal both loops to exit, wait a bounded time for them, then close
    /// the transport. No-op unless Connected.
    pub async fn stop(&mut self) {
        if self.phase.swap(PHASE_STOPPED, Ordering::SeqCst) != PHASE_CONNECTED {
            return;
        }

        let _ = self.shutdown_tx.send(true);
        for task in self.tasks.drain(..) {
            if tokio::time::timeout(STOP_JOIN_TIMEOUT, task).await.is_err() {
                warn!("transceiver loop did not exit within {:?}", STOP_JOIN_TIMEOUT);
            }
        }
        self.transport.close().await;
        info!("transceiver stopped");
    }

    /// Encode `packet` and queue it for transmission. Returns immediately;
    /// the send loop performs the transport I/O.
    pub fn enqueue(&self, packet: &Packet, destination: Option<u64>) -> Result<(), CommsError> {
        if self.phase.load(Ordering::SeqCst) != PHASE_CONNECTED {
            return Err(CommsError::NotConnected);
        }
        let payload = codec::encode(packet)?;
        self.queue_tx
            .send((destination, payload))
            .map_err(|_| CommsError::NotConnected)
    }

    /// Whether a unicast send is still awaiting its acknowledgment.
    pub fn is_pending(&self, packet_id: u64) -> bool {
        self.pending.contains_key(&packet_id)
    }

    /// This node's identity, per the transport.
    pub fn identity(&self) -> Result<NodeIdentity, CommsError> {
        Ok(self.transport.identity()?)
    }

    /// Current one-hop neighbor ids.
    pub fn neighbors(&self) -> Vec<u64> {
        self.transport.neighbors()
    }
}

fn resolve_ack(
    pending: &DashMap<u64, PendingSend>,
    callbacks: &AckCallbacks,
    outcome: AckOutcome,
) {
    if pending.remove(&outcome.packet_id).is_none() {
        debug!(packet_id = outcome.packet_id, "ack for send with no pending entry");
    }
    callbacks.resolve(outcome);
}

/// Drains the outbound queue into the transport and correlates ack
/// outcomes with outstanding sends. A failed send is logged and the loop
/// moves on to the next queued item.
async fn send_loop(
    transport: Arc<dyn MeshTransport>,
    mut queue_rx: mpsc::UnboundedReceiver<Outbound>,
    mut ack_rx: mpsc::UnboundedReceiver<AckOutcome>,
    pending: Arc<DashMap<u64, PendingSend>>,
    callbacks: AckCallbacks,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut acks_open = true;
    loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }

            outcome = ack_rx.recv(), if acks_open => {
                match outcome {
                    Some(outcome) => resolve_ack(&pending, &callbacks, outcome),
                    None => acks_open = false,
                }
            }

            item = queue_rx.recv() => {
                let Some((destination, payload)) = item else {
                    break;
                };
                // Only unicast requests an ack: broadcast has no single
                // recipient to acknowledge.
                let want_ack = destination.is_some();
                match transport.send(payload, destination, want_ack).await {
                    Ok(Some(packet_id)) if want_ack => {
                        pending.insert(
                            packet_id,
                            PendingSend { packet_id, destination, want_ack },
                        );
                    }
                    Ok(Some(_)) => {}
                    Ok(None) => {
                        warn!("transport accepted send but returned no packet id");
                    }
                    Err(e) => {
                        warn!(error = %e, "send failed; continuing with next queued packet");
                    }
                }
            }
        }
    }
    debug!("send loop exited");
}

/// Polls the transport for inbound payloads and forwards decoded packets
/// to the hook. A payload that fails to decode is logged and dropped.
async fn recv_loop(
    transport: Arc<dyn MeshTransport>,
    on_packet: PacketHook,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }

            payload = transport.recv(RECV_POLL_TIMEOUT) => {
                let Some(payload) = payload else {
                    continue;
                };
                match codec::decode(&payload) {
                    Ok(packet) => on_packet(packet),
                    Err(e) => {
                        debug!(error = %e, len = payload.len(), "dropping undecodable payload");
                    }
                }
            }
        }
    }
    debug!("receive loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use comms_transport::{SimRegistry, SimulatedConfig, SimulatedTransport};
    use comms_wire::{Envelope, PacketBody, PingData};

    fn ping_packet(origin: u64) -> Packet {
        Packet::new(
            Envelope {
                origin_node_id: origin,
                timestamp_us: 1,
            },
            PacketBody::Ping(PingData {
                frequency: 440.0,
                amplitude: 0.5,
                latitude: 0.0,
                longitude: 0.0,
                altitude: 0.0,
            }),
        )
    }

    fn make_transceiver(id: u64, registry: &SimRegistry) -> Transceiver {
        let (ack_tx, ack_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(SimulatedTransport::new(
            SimulatedConfig::new(id, registry.clone()),
            ack_tx,
        ));
        Transceiver::new(
            transport,
            ack_rx,
            AckCallbacks::new(|_| {}, |_| {}),
            Arc::new(|_| {}),
        )
    }

    #[tokio::test]
    async fn enqueue_before_start_fails() {
        let registry = SimRegistry::new();
        let transceiver = make_transceiver(1, &registry);
        assert!(matches!(
            transceiver.enqueue(&ping_packet(1), None),
            Err(CommsError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn enqueue_after_stop_fails() {
        let registry = SimRegistry::new();
        let mut transceiver = make_transceiver(1, &registry);
        transceiver.start().await.unwrap();
        transceiver.stop().await;
        assert!(matches!(
            transceiver.enqueue(&ping_packet(1), None),
            Err(CommsError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn start_twice_fails() {
        let registry = SimRegistry::new();
        let mut transceiver = make_transceiver(1, &registry);
        transceiver.start().await.unwrap();
        assert!(matches!(
            transceiver.start().await,
            Err(CommsError::NotConnected)
        ));
        transceiver.stop().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let registry = SimRegistry::new();
        let mut transceiver = make_transceiver(1, &registry);
        transceiver.start().await.unwrap();
        transceiver.stop().await;
        transceiver.stop().await;
    }

    #[tokio::test]
    async fn nothing_is_pending_initially() {
        let registry = SimRegistry::new();
        let transceiver = make_transceiver(1, &registry);
        assert!(!transceiver.is_pending(123));
    }
}
