//! Typed packets and wire encoding for tower mesh communication.
//!
//! This crate defines the tagged-union packet exchanged between telemetry
//! towers and its binary wire format: a fixed checksummed header followed
//! by a CBOR-encoded body for the variants that carry one.
//!
//! ## Wire Format
//!
//! ```text
//! +----------------------+----------------------------+
//! | u8  version          | must be WIRE_VERSION       |
//! +----------------------+----------------------------+
//! | u8  kind tag         | 0 = no variant set         |
//! +----------------------+----------------------------+
//! | u16 reserved         | must be zero               |
//! +----------------------+----------------------------+
//! | u64 origin_node_id   | envelope                   |
//! +----------------------+----------------------------+
//! | u64 timestamp_us     | envelope, stamped at send  |
//! +----------------------+----------------------------+
//! | u32 body_len         | 0 for bodyless kinds       |
//! +----------------------+----------------------------+
//! | u32 header crc32     | over the 24 bytes above    |
//! +----------------------+----------------------------+
//! | body                 | canonical CBOR             |
//! +----------------------+----------------------------+
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod error;
pub mod packet;

pub use codec::{decode, encode, HEADER_SIZE, MAX_BODY_SIZE, WIRE_VERSION};
pub use error::WireError;
pub use packet::{
    current_timestamp_us, ConfigData, Envelope, ErrorData, NoConfigData, NoPingData, Packet,
    PacketBody, PacketKind, PingData, RequestConfigData, RequestPingData,
};
