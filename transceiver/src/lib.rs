//! Packet transmission, reception, and dispatch for tower mesh nodes.
//!
//! The [`Transceiver`] owns the outbound queue and runs the two background
//! loops: the send loop drains the queue into the transport and correlates
//! acknowledgment outcomes with outstanding sends; the receive loop polls
//! the transport, decodes payloads, and hands packets to a dispatch hook.
//!
//! The [`Dispatcher`] routes decoded packets to per-kind ordered handler
//! lists with one-shot semantics, and [`TowerComms`] ties both together
//! behind the user-facing send/register API.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dispatch;
pub mod error;
pub mod tower;
mod transceiver;

pub use dispatch::{Dispatcher, Handler, HandlerId, HandlerList};
pub use error::CommsError;
pub use tower::{NodeConfig, TowerComms, TransportKind};
pub use transceiver::{AckCallbacks, PacketHook, PendingSend, Transceiver};
