//! HCI Packet Definitions

use crate::error::HciError;

/// Packet type discriminator, the first byte of every packet on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Command: `type + opcode(2) + param_len(1)`
    Command = 0x01,
    /// ACL data: `type + handle(2) + data_len(2)`
    AclData = 0x02,
    /// Event: `type + code(1) + param_len(1)`
    Event = 0x04,
    /// ISO data: `type + handle(2) + data_len(2)`, top two length bits reserved
    IsoData = 0x05,
    /// Extended command: `type + opcode(2) + param_len(2)`
    ExtCommand = 0x81,
    /// Extended event: `type + code(1) + param_len(2)`
    ExtEvent = 0x82,
    /// Vendor: `type + opcode(1) + param_len(2)`
    Vendor = 0xFF,
}

impl PacketType {
    /// Look up the packet type for a discriminator byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(PacketType::Command),
            0x02 => Some(PacketType::AclData),
            0x04 => Some(PacketType::Event),
            0x05 => Some(PacketType::IsoData),
            0x81 => Some(PacketType::ExtCommand),
            0x82 => Some(PacketType::ExtEvent),
            0xFF => Some(PacketType::Vendor),
            _ => None,
        }
    }

    /// Get the discriminator byte
    pub fn as_byte(&self) -> u8 {
        *self as u8
    }

    /// Length of the fixed header, type byte included
    pub fn header_len(&self) -> usize {
        match self {
            PacketType::Event => 3,
            PacketType::Command | PacketType::ExtEvent | PacketType::Vendor => 4,
            PacketType::ExtCommand | PacketType::AclData | PacketType::IsoData => 5,
        }
    }

    /// Payload length declared by the trailing field of a complete header
    pub fn payload_len(&self, header: &[u8]) -> usize {
        let le16 = |at: usize| u16::from_le_bytes([header[at], header[at + 1]]) as usize;
        match self {
            PacketType::Event => header[2] as usize,
            PacketType::Command => header[3] as usize,
            PacketType::ExtEvent | PacketType::Vendor => le16(2),
            PacketType::ExtCommand | PacketType::AclData => le16(3),
            PacketType::IsoData => le16(3) & 0x3FFF,
        }
    }

    /// Check if this is one of the two command types
    pub fn is_command(&self) -> bool {
        matches!(self, PacketType::Command | PacketType::ExtCommand)
    }
}

/// A complete packet reassembled from the byte stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HciPacket {
    packet_type: PacketType,
    bytes: Vec<u8>,
}

impl HciPacket {
    pub(crate) fn from_parts(packet_type: PacketType, bytes: Vec<u8>) -> Self {
        Self { packet_type, bytes }
    }

    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    /// Full packet, header included
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Bytes after the fixed header
    pub fn payload(&self) -> &[u8] {
        &self.bytes[self.packet_type.header_len()..]
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Opcode and parameter offset of a queued command packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader {
    /// Command opcode
    pub opcode: u16,
    /// Offset of the first parameter byte
    pub params_offset: usize,
}

impl CommandHeader {
    /// Decode the header of a plain or extended command packet
    pub fn parse(bytes: &[u8]) -> Result<Self, HciError> {
        let first = *bytes.first().ok_or(HciError::TruncatedHeader {
            packet_type: 0,
            len: 0,
        })?;
        let packet_type = PacketType::from_byte(first)
            .filter(PacketType::is_command)
            .ok_or(HciError::UnknownPacketType(first))?;

        let params_offset = packet_type.header_len();
        if bytes.len() < params_offset {
            return Err(HciError::TruncatedHeader {
                packet_type: first,
                len: bytes.len(),
            });
        }

        Ok(Self {
            opcode: u16::from_le_bytes([bytes[1], bytes[2]]),
            params_offset,
        })
    }
}
