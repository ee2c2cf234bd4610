//! Byte Ring Buffer
//!
//! Fixed-capacity circular byte store used as the command and event queues of
//! the HCI transport. Supports raw byte runs and length-framed items, with a
//! zero-copy peek for handing the oldest item straight to a serial transfer.

mod buffer;

pub use buffer::{RingBuffer, FRAME_HEADER_LEN, MAX_FRAMED_PAYLOAD};

use thiserror::Error;

/// Ring buffer errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RingBufferError {
    /// Not enough free space for the write; nothing was written
    #[error("Overflow: {requested} bytes requested, {free} free")]
    Overflow { requested: usize, free: usize },

    /// Not enough unread bytes for the read; nothing was consumed
    #[error("Underflow: {requested} bytes requested, {available} available")]
    Underflow { requested: usize, available: usize },

    /// No framed item is queued
    #[error("No framed item queued")]
    Empty,

    /// The unread region does not start with a well-formed framed item
    #[error("Framed item header is inconsistent with the unread region")]
    Corrupted,

    /// Framed payload does not fit in the 16-bit length prefix
    #[error("Framed payload of {0} bytes exceeds the length prefix")]
    ItemTooLarge(usize),

    /// Alignment quantum is not a power of two
    #[error("Alignment {0} is not a power of two")]
    InvalidAlignment(usize),

    /// Capacity is zero or not a multiple of the alignment quantum
    #[error("Capacity {capacity} is not a non-zero multiple of alignment {alignment}")]
    InvalidCapacity { capacity: usize, alignment: usize },
}
