//! Transport error types.

use thiserror::Error;

/// Errors surfaced by a mesh transport
#[derive(Error, Debug)]
pub enum TransportError {
    /// The underlying link could not be opened
    #[error("failed to open mesh link: {0}")]
    Connection(String),

    /// Identity requested before the link was connected
    #[error("node identity unknown before connect")]
    UnknownIdentity,

    /// A single send attempt failed
    #[error("send failed: {0}")]
    Send(String),
}
