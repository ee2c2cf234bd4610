//! Byte-Stream Packet Reassembly
//!
//! The UART guarantees byte order but not packet boundaries: chunks may hold
//! half a header, several packets, or anything in between. [`FrameParser`]
//! keeps its state between calls so the stream can be fed as it arrives.

use crate::packet::{HciPacket, PacketType};
use tracing::trace;

/// Parser state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    /// Next byte is a packet type discriminator
    WaitingType,
    /// Accumulating the fixed header of the current type
    WaitingHeader,
    /// Accumulating the payload announced by the header
    WaitingPayload,
}

/// Restartable state machine reassembling HCI packets
#[derive(Debug, Clone)]
pub struct FrameParser {
    state: ParseState,
    packet_type: PacketType,
    /// Header and payload bytes of the packet being assembled
    buffer: Vec<u8>,
    /// Payload bytes still expected
    remaining: usize,
    /// Bytes dropped while resynchronizing
    discarded: u64,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser {
    /// Create a new parser waiting for a packet type
    pub fn new() -> Self {
        Self {
            state: ParseState::WaitingType,
            packet_type: PacketType::Command,
            buffer: Vec::new(),
            remaining: 0,
            discarded: 0,
        }
    }

    /// Feed a chunk of the stream
    ///
    /// The returned iterator yields every packet the chunk completes. Bytes
    /// are only consumed as the iterator is driven; dropping it early loses
    /// the rest of the chunk.
    pub fn feed<'a>(&'a mut self, chunk: &'a [u8]) -> Packets<'a> {
        Packets {
            parser: self,
            input: chunk,
        }
    }

    /// Current state
    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Number of bytes dropped because they did not start a known packet type
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    fn next_packet(&mut self, input: &mut &[u8]) -> Option<HciPacket> {
        while let Some((&byte, rest)) = input.split_first() {
            match self.state {
                ParseState::WaitingType => {
                    *input = rest;
                    match PacketType::from_byte(byte) {
                        Some(packet_type) => {
                            self.packet_type = packet_type;
                            self.buffer.clear();
                            self.buffer.push(byte);
                            self.state = ParseState::WaitingHeader;
                        }
                        None => {
                            self.discarded += 1;
                            trace!("Dropping unknown packet type {:#04X}", byte);
                        }
                    }
                }
                ParseState::WaitingHeader => {
                    let header_len = self.packet_type.header_len();
                    let take = (header_len - self.buffer.len()).min(input.len());
                    self.buffer.extend_from_slice(&input[..take]);
                    *input = &input[take..];

                    if self.buffer.len() == header_len {
                        self.remaining = self.packet_type.payload_len(&self.buffer);
                        if self.remaining == 0 {
                            return Some(self.finish());
                        }
                        self.buffer.reserve(self.remaining);
                        self.state = ParseState::WaitingPayload;
                    }
                }
                ParseState::WaitingPayload => {
                    let take = self.remaining.min(input.len());
                    self.buffer.extend_from_slice(&input[..take]);
                    *input = &input[take..];
                    self.remaining -= take;

                    if self.remaining == 0 {
                        return Some(self.finish());
                    }
                }
            }
        }
        None
    }

    fn finish(&mut self) -> HciPacket {
        self.state = ParseState::WaitingType;
        HciPacket::from_parts(self.packet_type, std::mem::take(&mut self.buffer))
    }
}

/// Packets completed by one fed chunk
#[must_use = "the chunk is only parsed as the iterator is driven"]
pub struct Packets<'a> {
    parser: &'a mut FrameParser,
    input: &'a [u8],
}

impl Iterator for Packets<'_> {
    type Item = HciPacket;

    fn next(&mut self) -> Option<HciPacket> {
        self.parser.next_packet(&mut self.input)
    }
}
