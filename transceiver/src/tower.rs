//! User-facing facade tying the transceiver and dispatcher together.
//!
//! [`TowerComms`] is what application code holds: typed `send_*` methods
//! stamp the envelope and queue the packet, and `register_*` methods attach
//! handlers to the dispatcher that the receive loop feeds.

use crate::dispatch::{Dispatcher, HandlerId};
use crate::error::CommsError;
use crate::transceiver::{AckCallbacks, Transceiver};
use comms_transport::{AckOutcome, MeshTransport, NodeIdentity, SimulatedConfig, SimulatedTransport};
use comms_wire::{
    current_timestamp_us, ConfigData, Envelope, ErrorData, NoConfigData, NoPingData, Packet,
    PacketBody, PingData, RequestConfigData, RequestPingData,
};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Which transport implementation a node runs on.
///
/// Selected by configuration value rather than by code path, so a deployment
/// flips between transports without touching call sites.
pub enum TransportKind {
    /// In-process simulated mesh, for tests and local development
    Simulated(SimulatedConfig),
}

/// Node-level configuration for [`TowerComms::new`].
pub struct NodeConfig {
    /// Transport selection and its settings
    pub transport: TransportKind,
}

/// Top-level communication handle for one tower node.
pub struct TowerComms {
    transceiver: Transceiver,
    dispatcher: Arc<Dispatcher>,
}

impl TowerComms {
    /// Build a node from configuration. The acknowledgment callbacks receive
    /// the packet id of each resolved unicast send.
    pub fn new(
        config: NodeConfig,
        on_ack_success: impl Fn(u64) + Send + Sync + 'static,
        on_ack_failure: impl Fn(u64) + Send + Sync + 'static,
    ) -> Self {
        let (ack_tx, ack_rx) = mpsc::unbounded_channel();
        let transport: Arc<dyn MeshTransport> = match config.transport {
            TransportKind::Simulated(sim) => Arc::new(SimulatedTransport::new(sim, ack_tx)),
        };
        Self::with_transport(transport, ack_rx, on_ack_success, on_ack_failure)
    }

    /// Build a node over an already-constructed transport. `ack_rx` must be
    /// the receiving half of the channel the transport publishes
    /// [`AckOutcome`]s on.
    pub fn with_transport(
        transport: Arc<dyn MeshTransport>,
        ack_rx: mpsc::UnboundedReceiver<AckOutcome>,
        on_ack_success: impl Fn(u64) + Send + Sync + 'static,
        on_ack_failure: impl Fn(u64) + Send + Sync + 'static,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher::new());
        let routing = Arc::clone(&dispatcher);
        let transceiver = Transceiver::new(
            transport,
            ack_rx,
            AckCallbacks::new(on_ack_success, on_ack_failure),
            Arc::new(move |packet| routing.route(&packet)),
        );
        Self {
            transceiver,
            dispatcher,
        }
    }

    /// Connect the transport and launch the background loops.
    pub async fn start(&mut self) -> Result<(), CommsError> {
        self.transceiver.start().await
    }

    /// Stop the background loops and close the transport.
    pub async fn stop(&mut self) {
        self.transceiver.stop().await
    }

    /// This node's identity, per the transport.
    pub fn identity(&self) -> Result<NodeIdentity, CommsError> {
        self.transceiver.identity()
    }

    /// This node's numeric id.
    pub fn node_id(&self) -> Result<u64, CommsError> {
        Ok(self.transceiver.identity()?.numeric_id)
    }

    /// Current one-hop neighbor ids.
    pub fn neighbors(&self) -> Vec<u64> {
        self.transceiver.neighbors()
    }

    /// Whether a unicast send is still awaiting its acknowledgment.
    pub fn is_pending(&self, packet_id: u64) -> bool {
        self.transceiver.is_pending(packet_id)
    }

    /// Stamp the envelope and queue a packet. Unicast destinations are
    /// validated against the current neighbor set before queueing.
    fn send_body(&self, body: PacketBody, destination: Option<u64>) -> Result<(), CommsError> {
        if let Some(dest) = destination {
            if !self.transceiver.neighbors().contains(&dest) {
                return Err(CommsError::InvalidDestination { destination: dest });
            }
        }
        let envelope = Envelope {
            origin_node_id: self.transceiver.identity()?.numeric_id,
            timestamp_us: current_timestamp_us(),
        };
        self.transceiver.enqueue(&Packet::new(envelope, body), destination)
    }

    /// Send configuration data.
    pub fn send_config(&self, data: ConfigData, destination: Option<u64>) -> Result<(), CommsError> {
        self.send_body(PacketBody::Config(data), destination)
    }

    /// Send a no-configuration reply.
    pub fn send_no_config(&self, destination: Option<u64>) -> Result<(), CommsError> {
        self.send_body(PacketBody::NoConfig(NoConfigData), destination)
    }

    /// Send detected ping data.
    pub fn send_ping(&self, data: PingData, destination: Option<u64>) -> Result<(), CommsError> {
        self.send_body(PacketBody::Ping(data), destination)
    }

    /// Send a no-ping reply.
    pub fn send_no_ping(&self, destination: Option<u64>) -> Result<(), CommsError> {
        self.send_body(PacketBody::NoPing(NoPingData), destination)
    }

    /// Request the recipient's configuration.
    pub fn send_request_config(&self, destination: Option<u64>) -> Result<(), CommsError> {
        self.send_body(PacketBody::RequestConfig(RequestConfigData), destination)
    }

    /// Request the recipient's latest ping data.
    pub fn send_request_ping(&self, destination: Option<u64>) -> Result<(), CommsError> {
        self.send_body(PacketBody::RequestPing(RequestPingData), destination)
    }

    /// Send an error report.
    pub fn send_error(&self, data: ErrorData, destination: Option<u64>) -> Result<(), CommsError> {
        self.send_body(PacketBody::Error(data), destination)
    }

    /// Register a handler for configuration packets.
    pub fn register_config(
        &self,
        handler: impl Fn(&Envelope, &ConfigData) + Send + Sync + 'static,
        one_shot: bool,
    ) -> HandlerId {
        self.dispatcher.config().register(handler, one_shot)
    }

    /// Remove a configuration handler by its token.
    pub fn unregister_config(&self, id: HandlerId) -> bool {
        self.dispatcher.config().unregister(id)
    }

    /// Register a handler for no-config replies.
    pub fn register_no_config(
        &self,
        handler: impl Fn(&Envelope, &NoConfigData) + Send + Sync + 'static,
        one_shot: bool,
    ) -> HandlerId {
        self.dispatcher.no_config().register(handler, one_shot)
    }

    /// Remove a no-config handler by its token.
    pub fn unregister_no_config(&self, id: HandlerId) -> bool {
        self.dispatcher.no_config().unregister(id)
    }

    /// Register a handler for ping packets.
    pub fn register_ping(
        &self,
        handler: impl Fn(&Envelope, &PingData) + Send + Sync + 'static,
        one_shot: bool,
    ) -> HandlerId {
        self.dispatcher.ping().register(handler, one_shot)
    }

    /// Remove a ping handler by its token.
    pub fn unregister_ping(&self, id: HandlerId) -> bool {
        self.dispatcher.ping().unregister(id)
    }

    /// Register a handler for no-ping replies.
    pub fn register_no_ping(
        &self,
        handler: impl Fn(&Envelope, &NoPingData) + Send + Sync + 'static,
        one_shot: bool,
    ) -> HandlerId {
        self.dispatcher.no_ping().register(handler, one_shot)
    }

    /// Remove a no-ping handler by its token.
    pub fn unregister_no_ping(&self, id: HandlerId) -> bool {
        self.dispatcher.no_ping().unregister(id)
    }

    /// Register a handler for config requests.
    pub fn register_request_config(
        &self,
        handler: impl Fn(&Envelope, &RequestConfigData) + Send + Sync + 'static,
        one_shot: bool,
    ) -> HandlerId {
        self.dispatcher.request_config().register(handler, one_shot)
    }

    /// Remove a config-request handler by its token.
    pub fn unregister_request_config(&self, id: HandlerId) -> bool {
        self.dispatcher.request_config().unregister(id)
    }

    /// Register a handler for ping requests.
    pub fn register_request_ping(
        &self,
        handler: impl Fn(&Envelope, &RequestPingData) + Send + Sync + 'static,
        one_shot: bool,
    ) -> HandlerId {
        self.dispatcher.request_ping().register(handler, one_shot)
    }

    /// Remove a ping-request handler by its token.
    pub fn unregister_request_ping(&self, id: HandlerId) -> bool {
        self.dispatcher.request_ping().unregister(id)
    }

    /// Register a handler for error reports.
    pub fn register_error(
        &self,
        handler: impl Fn(&Envelope, &ErrorData) + Send + Sync + 'static,
        one_shot: bool,
    ) -> HandlerId {
        self.dispatcher.error().register(handler, one_shot)
    }

    /// Remove an error handler by its token.
    pub fn unregister_error(&self, id: HandlerId) -> bool {
        self.dispatcher.error().unregister(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comms_transport::SimRegistry;

    fn simulated_tower(id: u64, registry: &SimRegistry) -> TowerComms {
        TowerComms::new(
            NodeConfig {
                transport: TransportKind::Simulated(SimulatedConfig::new(id, registry.clone())),
            },
            |_| {},
            |_| {},
        )
    }

    #[tokio::test]
    async fn unicast_to_non_neighbor_is_rejected_before_queueing() {
        let registry = SimRegistry::new();
        registry.set_neighbors(1, vec![2]);
        let mut tower = simulated_tower(1, &registry);
        tower.start().await.unwrap();

        assert!(matches!(
            tower.send_request_ping(Some(99)),
            Err(CommsError::InvalidDestination { destination: 99 })
        ));
        assert!(tower.send_request_ping(Some(2)).is_ok());

        tower.stop().await;
    }

    #[tokio::test]
    async fn send_before_start_reports_not_connected() {
        let registry = SimRegistry::new();
        registry.set_neighbors(1, vec![2]);
        let tower = simulated_tower(1, &registry);
        assert!(matches!(
            tower.send_no_config(Some(2)),
            Err(CommsError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn node_id_matches_configuration() {
        let registry = SimRegistry::new();
        let tower = simulated_tower(7, &registry);
        assert_eq!(tower.node_id().unwrap(), 7);
    }

    #[tokio::test]
    async fn register_and_unregister_round_trip() {
        let registry = SimRegistry::new();
        let tower = simulated_tower(1, &registry);

        let id = tower.register_error(|_, _| {}, false);
        assert!(tower.unregister_error(id));
        assert!(!tower.unregister_error(id));
    }
}
