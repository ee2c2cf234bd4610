//! HCI Transport Error Types

use thiserror::Error;

/// Errors raised by the wire format and the serial link
#[derive(Debug, Error)]
pub enum HciError {
    /// Serial port error
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// The link tasks have stopped
    #[error("Serial link closed")]
    LinkClosed,

    /// A transfer was started while the previous one is still running
    #[error("Transfer already in progress")]
    TransferInProgress,

    /// Packet starts with a byte that is not a known packet type
    #[error("Unknown packet type {0:#04X}")]
    UnknownPacketType(u8),

    /// Packet is shorter than the fixed header of its type
    #[error("Truncated {packet_type:#04X} header: {len} bytes")]
    TruncatedHeader { packet_type: u8, len: usize },
}

impl From<std::io::Error> for HciError {
    fn from(err: std::io::Error) -> Self {
        HciError::SerialError(err.to_string())
    }
}

impl From<tokio_serial::Error> for HciError {
    fn from(err: tokio_serial::Error) -> Self {
        HciError::SerialError(err.to_string())
    }
}
