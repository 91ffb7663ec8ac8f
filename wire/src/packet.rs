//! Typed packet definitions for the tower mesh.
//!
//! A [`Packet`] is an [`Envelope`] common to every variant plus a
//! [`PacketBody`] holding exactly one active variant. Variant payloads are
//! plain data structs so callers never touch the wire representation.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Envelope fields carried by every packet variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Numeric id of the node that built the packet
    pub origin_node_id: u64,
    /// Microseconds since the Unix epoch, stamped at send time
    pub timestamp_us: u64,
}

/// Radio sampling configuration for a telemetry tower.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigData {
    /// Receiver gain in dB
    pub gain: f64,
    /// Sampling rate in Hz
    pub sampling_rate: u32,
    /// Center frequency in Hz
    pub center_frequency: u32,
    /// Run number for this collection session
    pub run_num: u32,
    /// Whether to substitute synthetic test data
    pub enable_test_data: bool,
    /// Expected ping width in milliseconds
    pub ping_width_ms: f64,
    /// Minimum SNR for ping detection
    pub ping_min_snr: f64,
    /// Maximum ping length multiplier
    pub ping_max_len_mult: f64,
    /// Minimum ping length multiplier
    pub ping_min_len_mult: f64,
    /// Transmitter frequencies to track, in Hz
    pub target_frequencies: Vec<u32>,
}

/// A detected radio ping with the detecting tower's position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PingData {
    /// Detected frequency in Hz
    pub frequency: f64,
    /// Detected amplitude
    pub amplitude: f64,
    /// Tower latitude in degrees
    pub latitude: f64,
    /// Tower longitude in degrees
    pub longitude: f64,
    /// Tower altitude in meters
    pub altitude: f64,
}

/// An error report from a remote tower.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    /// Human-readable error description
    pub error_message: String,
}

/// Negative reply: no configuration is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NoConfigData;

/// Negative reply: no ping data is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NoPingData;

/// Request for the recipient's configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestConfigData;

/// Request for the recipient's latest ping data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestPingData;

/// Packet kinds as encoded in the wire header tag byte.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    /// No variant set; decodes successfully and is dropped by the dispatcher
    None = 0x00,
    /// Configuration data
    Config = 0x01,
    /// No configuration available
    NoConfig = 0x02,
    /// Detected ping data
    Ping = 0x03,
    /// No ping data available
    NoPing = 0x04,
    /// Configuration request
    RequestConfig = 0x05,
    /// Ping data request
    RequestPing = 0x06,
    /// Error report
    Error = 0x07,
}

impl TryFrom<u8> for PacketKind {
    type Error = crate::WireError;

    fn try_from(value: u8) -> Result<Self, crate::WireError> {
        match value {
            0x00 => Ok(PacketKind::None),
            0x01 => Ok(PacketKind::Config),
            0x02 => Ok(PacketKind::NoConfig),
            0x03 => Ok(PacketKind::Ping),
            0x04 => Ok(PacketKind::NoPing),
            0x05 => Ok(PacketKind::RequestConfig),
            0x06 => Ok(PacketKind::RequestPing),
            0x07 => Ok(PacketKind::Error),
            _ => Err(crate::WireError::Kind(value)),
        }
    }
}

/// The active variant of a packet. Exactly one per packet.
#[derive(Debug, Clone, PartialEq)]
pub enum PacketBody {
    /// Valid encoding with no variant set
    None,
    /// Configuration data
    Config(ConfigData),
    /// No configuration available
    NoConfig(NoConfigData),
    /// Detected ping data
    Ping(PingData),
    /// No ping data available
    NoPing(NoPingData),
    /// Configuration request
    RequestConfig(RequestConfigData),
    /// Ping data request
    RequestPing(RequestPingData),
    /// Error report
    Error(ErrorData),
}

impl PacketBody {
    /// The wire kind tag for this body.
    pub fn kind(&self) -> PacketKind {
        match self {
            PacketBody::None => PacketKind::None,
            PacketBody::Config(_) => PacketKind::Config,
            PacketBody::NoConfig(_) => PacketKind::NoConfig,
            PacketBody::Ping(_) => PacketKind::Ping,
            PacketBody::NoPing(_) => PacketKind::NoPing,
            PacketBody::RequestConfig(_) => PacketKind::RequestConfig,
            PacketBody::RequestPing(_) => PacketKind::RequestPing,
            PacketBody::Error(_) => PacketKind::Error,
        }
    }
}

/// A complete mesh packet: envelope plus one active variant.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// Fields common to every variant
    pub envelope: Envelope,
    /// The active variant
    pub body: PacketBody,
}

impl Packet {
    /// Create a packet from an envelope and body.
    pub fn new(envelope: Envelope, body: PacketBody) -> Self {
        Self { envelope, body }
    }
}

/// Current time in microseconds since the Unix epoch.
pub fn current_timestamp_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or_default()
}
