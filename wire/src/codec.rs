//! Binary encoding and decoding of [`Packet`]s.
//!
//! Encoding writes the fixed header, a CRC32 over it, and the CBOR body.
//! Decoding validates length, version, reserved bits, checksum, and kind
//! tag before parsing the body; any failure is a [`WireError`]. A header
//! with kind tag 0 and an empty body decodes successfully to
//! [`PacketBody::None`].

use crate::error::WireError;
use crate::packet::{
    ConfigData, Envelope, ErrorData, NoConfigData, NoPingData, Packet, PacketBody, PacketKind,
    PingData, RequestConfigData, RequestPingData,
};
use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Wire protocol version
pub const WIRE_VERSION: u8 = 1;

/// Fixed header size in bytes, including the trailing CRC32
pub const HEADER_SIZE: usize = 28;

/// Maximum CBOR body size (64 KiB)
pub const MAX_BODY_SIZE: usize = 64 * 1024;

// Header bytes covered by the CRC: everything before the checksum field.
const CRC_COVERED: usize = HEADER_SIZE - 4;

fn encode_body<T: Serialize>(value: &T) -> Result<Vec<u8>, WireError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|_| WireError::Body)?;
    Ok(buf)
}

fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, WireError> {
    ciborium::from_reader(body).map_err(|_| WireError::Body)
}

/// Encode a packet to wire bytes.
///
/// Never fails for well-formed input except when the body exceeds
/// [`MAX_BODY_SIZE`].
pub fn encode(packet: &Packet) -> Result<Bytes, WireError> {
    let body = match &packet.body {
        PacketBody::Config(data) => encode_body(data)?,
        PacketBody::Ping(data) => encode_body(data)?,
        PacketBody::Error(data) => encode_body(data)?,
        PacketBody::None
        | PacketBody::NoConfig(_)
        | PacketBody::NoPing(_)
        | PacketBody::RequestConfig(_)
        | PacketBody::RequestPing(_) => Vec::new(),
    };

    if body.len() > MAX_BODY_SIZE {
        return Err(WireError::Size(body.len()));
    }

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + body.len());
    buf.put_u8(WIRE_VERSION);
    buf.put_u8(packet.body.kind() as u8);
    buf.put_u16(0); // reserved
    buf.put_u64(packet.envelope.origin_node_id);
    buf.put_u64(packet.envelope.timestamp_us);
    buf.put_u32(body.len() as u32);

    let crc = crc32fast::hash(&buf[..CRC_COVERED]);
    buf.put_u32(crc);
    buf.put_slice(&body);

    Ok(buf.freeze())
}

/// Decode a packet from wire bytes.
pub fn decode(buf: &[u8]) -> Result<Packet, WireError> {
    if buf.len() < HEADER_SIZE {
        return Err(WireError::Truncated);
    }

    let version = buf[0];
    if version != WIRE_VERSION {
        return Err(WireError::Version(version));
    }

    let reserved = u16::from_be_bytes([buf[2], buf[3]]);
    if reserved != 0 {
        return Err(WireError::Reserved);
    }

    let stored_crc = u32::from_be_bytes([
        buf[CRC_COVERED],
        buf[CRC_COVERED + 1],
        buf[CRC_COVERED + 2],
        buf[CRC_COVERED + 3],
    ]);
    if crc32fast::hash(&buf[..CRC_COVERED]) != stored_crc {
        return Err(WireError::HdrCsum);
    }

    let kind = PacketKind::try_from(buf[1])?;
    let origin_node_id = u64::from_be_bytes(buf[4..12].try_into().map_err(|_| WireError::Body)?);
    let timestamp_us = u64::from_be_bytes(buf[12..20].try_into().map_err(|_| WireError::Body)?);
    let body_len = u32::from_be_bytes(buf[20..24].try_into().map_err(|_| WireError::Body)?) as usize;

    if body_len > MAX_BODY_SIZE {
        return Err(WireError::Size(body_len));
    }
    if buf.len() - HEADER_SIZE != body_len {
        return Err(WireError::Body);
    }
    let body_bytes = &buf[HEADER_SIZE..];

    let body = match kind {
        PacketKind::Config => PacketBody::Config(decode_body::<ConfigData>(body_bytes)?),
        PacketKind::Ping => PacketBody::Ping(decode_body::<PingData>(body_bytes)?),
        PacketKind::Error => PacketBody::Error(decode_body::<ErrorData>(body_bytes)?),
        PacketKind::None
        | PacketKind::NoConfig
        | PacketKind::NoPing
        | PacketKind::RequestConfig
        | PacketKind::RequestPing => {
            if body_len != 0 {
                return Err(WireError::Body);
            }
            match kind {
                PacketKind::None => PacketBody::None,
                PacketKind::NoConfig => PacketBody::NoConfig(NoConfigData),
                PacketKind::NoPing => PacketBody::NoPing(NoPingData),
                PacketKind::RequestConfig => PacketBody::RequestConfig(RequestConfigData),
                PacketKind::RequestPing => PacketBody::RequestPing(RequestPingData),
                _ => unreachable!(),
            }
        }
    };

    Ok(Packet {
        envelope: Envelope {
            origin_node_id,
            timestamp_us,
        },
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope() -> Envelope {
        Envelope {
            origin_node_id: 42,
            timestamp_us: 1_700_000_000_000_000,
        }
    }

    fn sample_config() -> ConfigData {
        ConfigData {
            gain: 2.0,
            sampling_rate: 48_000,
            center_frequency: 915_000_000,
            run_num: 999,
            enable_test_data: false,
            ping_width_ms: 15.0,
            ping_min_snr: 5.0,
            ping_max_len_mult: 2.0,
            ping_min_len_mult: 1.0,
            target_frequencies: vec![100, 200, 300],
        }
    }

    #[test]
    fn config_round_trip() {
        let packet = Packet::new(envelope(), PacketBody::Config(sample_config()));
        let bytes = encode(&packet).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn ping_round_trip() {
        let packet = Packet::new(
            envelope(),
            PacketBody::Ping(PingData {
                frequency: 440.0,
                amplitude: 0.75,
                latitude: 37.0,
                longitude: -122.0,
                altitude: 50.0,
            }),
        );
        let decoded = decode(&encode(&packet).unwrap()).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn error_round_trip() {
        let packet = Packet::new(
            envelope(),
            PacketBody::Error(ErrorData {
                error_message: "gps lost fix".into(),
            }),
        );
        let decoded = decode(&encode(&packet).unwrap()).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn bodyless_kinds_round_trip() {
        for body in [
            PacketBody::NoConfig(NoConfigData),
            PacketBody::NoPing(NoPingData),
            PacketBody::RequestConfig(RequestConfigData),
            PacketBody::RequestPing(RequestPingData),
        ] {
            let packet = Packet::new(envelope(), body);
            let bytes = encode(&packet).unwrap();
            assert_eq!(bytes.len(), HEADER_SIZE);
            assert_eq!(decode(&bytes).unwrap(), packet);
        }
    }

    #[test]
    fn empty_variant_decodes_to_none() {
        let packet = Packet::new(envelope(), PacketBody::None);
        let decoded = decode(&encode(&packet).unwrap()).unwrap();
        assert_eq!(decoded.body, PacketBody::None);
        assert_eq!(decoded.envelope, envelope());
    }

    #[test]
    fn truncated_buffer_rejected() {
        let bytes = encode(&Packet::new(envelope(), PacketBody::None)).unwrap();
        assert!(matches!(
            decode(&bytes[..HEADER_SIZE - 1]),
            Err(WireError::Truncated)
        ));
        assert!(matches!(decode(&[]), Err(WireError::Truncated)));
    }

    #[test]
    fn bad_version_rejected() {
        let mut bytes = encode(&Packet::new(envelope(), PacketBody::None))
            .unwrap()
            .to_vec();
        bytes[0] = 9;
        assert!(matches!(decode(&bytes), Err(WireError::Version(9))));
    }

    #[test]
    fn corrupted_header_fails_checksum() {
        let mut bytes = encode(&Packet::new(envelope(), PacketBody::None))
            .unwrap()
            .to_vec();
        bytes[4] ^= 0xFF; // flip a bit in origin_node_id
        assert!(matches!(decode(&bytes), Err(WireError::HdrCsum)));
    }

    #[test]
    fn unknown_kind_rejected() {
        let mut bytes = encode(&Packet::new(envelope(), PacketBody::None))
            .unwrap()
            .to_vec();
        bytes[1] = 0x7F;
        // Fix up the checksum so only the kind check fires.
        let crc = crc32fast::hash(&bytes[..CRC_COVERED]);
        bytes[CRC_COVERED..HEADER_SIZE].copy_from_slice(&crc.to_be_bytes());
        assert!(matches!(decode(&bytes), Err(WireError::Kind(0x7F))));
    }

    #[test]
    fn body_length_mismatch_rejected() {
        let mut bytes = encode(&Packet::new(envelope(), PacketBody::Config(sample_config())))
            .unwrap()
            .to_vec();
        bytes.push(0);
        assert!(matches!(decode(&bytes), Err(WireError::Body)));
    }

    #[test]
    fn garbage_body_rejected() {
        let packet = Packet::new(envelope(), PacketBody::Config(sample_config()));
        let good = encode(&packet).unwrap();
        let mut bytes = good[..HEADER_SIZE].to_vec();
        bytes.extend(std::iter::repeat(0xAB).take(good.len() - HEADER_SIZE));
        assert!(matches!(decode(&bytes), Err(WireError::Body)));
    }

    #[test]
    fn arbitrary_bytes_rejected() {
        let junk: Vec<u8> = (0..64).map(|i| (i * 37) as u8).collect();
        assert!(decode(&junk).is_err());
    }
}
