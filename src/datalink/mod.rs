//! BACnet Data Link Layer
//!
//! The server speaks BACnet/IP (Annex J) only: BVLL frames over UDP.

use thiserror::Error;

pub mod bip;

pub use bip::{BipTransport, BvlcFunction, BvlcHeader};

/// Result type for data link operations
pub type Result<T> = std::result::Result<T, DataLinkError>;

/// Errors that can occur at the data link layer
#[derive(Debug, Error)]
pub enum DataLinkError {
    #[error("BVLL frame too short")]
    Truncated,
    #[error("not a BVLL frame (type 0x{0:02X})")]
    NotBvll(u8),
    #[error("unknown BVLC function 0x{0:02X}")]
    UnknownFunction(u8),
    #[error("BVLL length field {field} does not match frame length {actual}")]
    LengthMismatch { field: u16, actual: usize },
    #[error("BVLC control message (function {0:?}), no NPDU")]
    ControlMessage(BvlcFunction),
}
