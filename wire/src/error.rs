//! Wire protocol error types.

use thiserror::Error;

/// Wire protocol errors
#[derive(Error, Debug)]
pub enum WireError {
    /// Packet shorter than the fixed header
    #[error("packet truncated")]
    Truncated,

    /// Unsupported protocol version
    #[error("version unsupported: {0}")]
    Version(u8),

    /// Reserved bits nonzero
    #[error("reserved bits nonzero")]
    Reserved,

    /// Header checksum mismatch
    #[error("hdr checksum mismatch")]
    HdrCsum,

    /// Unknown packet kind
    #[error("unknown kind {0}")]
    Kind(u8),

    /// Size limit exceeded
    #[error("size limit exceeded: {0}")]
    Size(usize),

    /// Body length disagrees with the buffer, or the body fails to parse
    #[error("malformed packet body")]
    Body,
}
