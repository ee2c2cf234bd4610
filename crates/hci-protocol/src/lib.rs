//! HCI Transport Protocol
//!
//! Wire-level pieces of the HCI UART transport: packet type discriminators
//! and header shapes, a restartable parser that reassembles packets from an
//! arbitrarily chunked byte stream, builders for the controller replies the
//! transport synthesizes itself, and the async serial link that moves frames
//! over a UART.

mod error;
mod event;
mod link;
mod packet;
mod parser;

pub use error::HciError;
pub use event::{
    command_complete, command_disallowed, command_status, is_controller_busy,
    lost_events_notification, reply_status, unknown_command, LOST_EVENTS_LEN, MAX_RETURN_PARAMS,
};
pub use link::{LinkConfig, LinkEvent, SerialLink, SerialPeripheral};
pub use packet::{CommandHeader, HciPacket, PacketType};
pub use parser::{FrameParser, Packets, ParseState};

/// Command opcodes the transport itself cares about
pub mod opcode {
    /// HCI_Reset
    pub const RESET: u16 = 0x0C03;
    /// HCI_Read_Local_Version_Information
    pub const READ_LOCAL_VERSION_INFORMATION: u16 = 0x1001;
    /// HCI_LE_Create_Connection
    pub const LE_CREATE_CONNECTION: u16 = 0x200D;
    /// HCI_LE_Extended_Create_Connection
    pub const LE_EXTENDED_CREATE_CONNECTION: u16 = 0x2043;
    /// HCI_LE_Periodic_Advertising_Create_Sync
    pub const LE_PERIODIC_ADVERTISING_CREATE_SYNC: u16 = 0x2044;
    /// ACI_L2CAP_Connection_Parameter_Update_Resp, never buffered on busy
    pub const L2CAP_CONNECTION_PARAMETER_UPDATE_RESP: u16 = 0xFD82;

    /// Legacy advertising command family
    pub const LEGACY_ADVERTISING: core::ops::RangeInclusive<u16> = 0x2006..=0x200D;
    /// Extended advertising command family
    pub const EXTENDED_ADVERTISING: core::ops::RangeInclusive<u16> = 0x2036..=0x204A;
}

/// Event codes
pub mod event_code {
    /// Command Complete
    pub const COMMAND_COMPLETE: u8 = 0x0E;
    /// Command Status
    pub const COMMAND_STATUS: u8 = 0x0F;
    /// LE Meta event, followed by a subevent code
    pub const LE_META: u8 = 0x3E;
    /// Vendor-specific event, followed by a 16-bit vendor event code
    pub const VENDOR: u8 = 0xFF;
    /// Vendor event code of the "events lost" notification
    pub const VENDOR_EVENTS_LOST: u16 = 0x0002;
}

/// Controller status codes
pub mod status {
    pub const SUCCESS: u8 = 0x00;
    pub const UNKNOWN_COMMAND: u8 = 0x01;
    pub const COMMAND_DISALLOWED: u8 = 0x0C;
    /// Transient refusal; the command may be offered again later
    pub const CONTROLLER_BUSY: u8 = 0x3A;
}
