//! Replies Synthesized by the Transport
//!
//! Shapes of the Command Complete / Command Status events the transport
//! produces on its own (unknown command, disallowed command, lost events),
//! plus the status probe used to detect a busy controller.

use crate::{event_code, status};

/// Length of the "events lost" notification
pub const LOST_EVENTS_LEN: usize = 13;

/// Command Status event: `[0x04, 0x0F, 0x04, status, 1, opcode]`
pub fn command_status(status: u8, opcode: u16) -> Vec<u8> {
    let [lo, hi] = opcode.to_le_bytes();
    vec![0x04, event_code::COMMAND_STATUS, 0x04, status, 0x01, lo, hi]
}

/// Largest return parameter block a Command Complete event can carry
pub const MAX_RETURN_PARAMS: usize = u8::MAX as usize - 3;

/// Command Complete event: `[0x04, 0x0E, len, 1, opcode, return_params]`
///
/// # Panics
///
/// Panics if `return_params` is longer than [`MAX_RETURN_PARAMS`], since the
/// one-byte length field cannot describe it.
pub fn command_complete(opcode: u16, return_params: &[u8]) -> Vec<u8> {
    let param_len = u8::try_from(3 + return_params.len()).unwrap_or_else(|_| {
        panic!(
            "Command Complete return parameters of {} bytes exceed {}",
            return_params.len(),
            MAX_RETURN_PARAMS
        )
    });
    let [lo, hi] = opcode.to_le_bytes();
    let mut event = Vec::with_capacity(6 + return_params.len());
    event.extend_from_slice(&[
        0x04,
        event_code::COMMAND_COMPLETE,
        param_len,
        0x01,
        lo,
        hi,
    ]);
    event.extend_from_slice(return_params);
    event
}

/// Reply for an opcode no handler is registered for
///
/// Always Command Status shaped, whatever the opcode.
pub fn unknown_command(opcode: u16) -> Vec<u8> {
    command_status(status::UNKNOWN_COMMAND, opcode)
}

/// Reply for a command rejected by the advertising-mode latch
///
/// Long-running procedures answer with Command Status, everything else with
/// Command Complete.
pub fn command_disallowed(opcode: u16, long_running: bool) -> Vec<u8> {
    if long_running {
        command_status(status::COMMAND_DISALLOWED, opcode)
    } else {
        command_complete(opcode, &[status::COMMAND_DISALLOWED])
    }
}

/// Status byte of a Command Complete or Command Status reply
pub fn reply_status(reply: &[u8]) -> Option<u8> {
    let offset = match reply.get(1).copied()? {
        event_code::COMMAND_COMPLETE => 6,
        event_code::COMMAND_STATUS => 3,
        _ => return None,
    };
    reply.get(offset).copied()
}

/// Check if a reply reports a busy controller
pub fn is_controller_busy(reply: &[u8]) -> bool {
    reply_status(reply) == Some(status::CONTROLLER_BUSY)
}

/// Vendor event listing the overflow reasons that lost events
pub fn lost_events_notification(mask: u64) -> [u8; LOST_EVENTS_LEN] {
    let mut event = [0u8; LOST_EVENTS_LEN];
    let [lo, hi] = event_code::VENDOR_EVENTS_LOST.to_le_bytes();
    event[..5].copy_from_slice(&[0x04, event_code::VENDOR, 0x0A, lo, hi]);
    event[5..].copy_from_slice(&mask.to_le_bytes());
    event
}
