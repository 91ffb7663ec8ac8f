//! Typed message exchange between radio telemetry towers over an
//! unreliable, neighbor-only broadcast mesh.
//!
//! The crates split along the layer boundaries: [`comms_wire`] defines the
//! packet types and binary codec, [`comms_transport`] the transport
//! abstraction plus the in-process simulated mesh, and [`comms_transceiver`]
//! the send/receive loops, acknowledgment correlation, and typed dispatch.
//! This crate re-exports the pieces application code needs.
//!
//! ```no_run
//! use tower_comms::{NodeConfig, SimRegistry, SimulatedConfig, TowerComms, TransportKind};
//!
//! # async fn run() -> Result<(), tower_comms::CommsError> {
//! let registry = SimRegistry::new();
//! registry.set_neighbors(1, vec![2]);
//! registry.set_neighbors(2, vec![1]);
//!
//! let mut tower = TowerComms::new(
//!     NodeConfig {
//!         transport: TransportKind::Simulated(SimulatedConfig::new(1, registry)),
//!     },
//!     |packet_id| println!("acked {packet_id}"),
//!     |packet_id| println!("lost {packet_id}"),
//! );
//! tower.start().await?;
//! tower.send_request_config(Some(2))?;
//! tower.stop().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub use comms_transceiver::{
    CommsError, Dispatcher, Handler, HandlerId, HandlerList, NodeConfig, TowerComms,
    Transceiver, TransportKind,
};
pub use comms_transport::{
    AckOutcome, MeshTransport, NodeIdentity, SimRegistry, SimulatedConfig, SimulatedTransport,
    TransportError, DEFAULT_ACK_SUCCESS_PERCENT,
};
pub use comms_wire::{
    current_timestamp_us, ConfigData, Envelope, ErrorData, NoConfigData, NoPingData, Packet,
    PacketBody, PacketKind, PingData, RequestConfigData, RequestPingData, WireError,
};
