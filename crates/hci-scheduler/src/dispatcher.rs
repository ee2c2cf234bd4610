//! Command and Event Dispatch

use hci_protocol::{command_disallowed, event_code, opcode, unknown_command, PacketType};
use std::collections::HashMap;
use tracing::debug;

/// Largest reply a command handler may produce
pub const DEFAULT_MAX_REPLY_LEN: usize = 536;

/// Executes one command
///
/// Receives the command parameters and a reply buffer, returns the number of
/// reply bytes written. A zero-length reply sends nothing.
pub trait CommandHandler: Send {
    fn execute(&mut self, params: &[u8], reply: &mut [u8]) -> usize;
}

impl<F> CommandHandler for F
where
    F: FnMut(&[u8], &mut [u8]) -> usize + Send,
{
    fn execute(&mut self, params: &[u8], reply: &mut [u8]) -> usize {
        self(params, reply)
    }
}

/// Pre-processes one stack event; returns true when the event is consumed
pub trait EventHandler: Send {
    fn handle(&mut self, payload: &[u8]) -> bool;
}

impl<F> EventHandler for F
where
    F: FnMut(&[u8]) -> bool + Send,
{
    fn handle(&mut self, payload: &[u8]) -> bool {
        self(payload)
    }
}

/// Result of the advertising-mode check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeCheck {
    Allowed,
    /// Rejected, with the reply to send instead
    Disallowed(Vec<u8>),
}

/// Legacy/extended advertising latch
///
/// Once a command of one family has been seen, commands of the other family
/// are rejected until restart.
#[derive(Debug, Clone, Default)]
pub struct ModeLatch {
    legacy_seen: bool,
    extended_seen: bool,
}

impl ModeLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check `opcode` against the latch, latching its family if allowed
    pub fn check(&mut self, opcode: u16) -> ModeCheck {
        let allowed = if opcode::LEGACY_ADVERTISING.contains(&opcode) {
            if !self.extended_seen {
                self.legacy_seen = true;
            }
            !self.extended_seen
        } else if opcode::EXTENDED_ADVERTISING.contains(&opcode) {
            if !self.legacy_seen {
                self.extended_seen = true;
            }
            !self.legacy_seen
        } else {
            true
        };

        if allowed {
            return ModeCheck::Allowed;
        }

        let long_running = matches!(
            opcode,
            opcode::LE_CREATE_CONNECTION
                | opcode::LE_EXTENDED_CREATE_CONNECTION
                | opcode::LE_PERIODIC_ADVERTISING_CREATE_SYNC
        );
        ModeCheck::Disallowed(command_disallowed(opcode, long_running))
    }
}

/// Routes commands and stack events to registered handlers
pub struct Dispatcher {
    commands: HashMap<u16, Box<dyn CommandHandler>>,
    events: HashMap<u8, Box<dyn EventHandler>>,
    meta_events: HashMap<u8, Box<dyn EventHandler>>,
    vendor_events: HashMap<u16, Box<dyn EventHandler>>,
    mode_latch: ModeLatch,
    max_reply_len: usize,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Create a dispatcher with no handlers
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
            events: HashMap::new(),
            meta_events: HashMap::new(),
            vendor_events: HashMap::new(),
            mode_latch: ModeLatch::new(),
            max_reply_len: DEFAULT_MAX_REPLY_LEN,
        }
    }

    /// Register the handler for a command opcode
    pub fn with_command(mut self, opcode: u16, handler: impl CommandHandler + 'static) -> Self {
        self.commands.insert(opcode, Box::new(handler));
        self
    }

    /// Register a handler for a plain event code
    pub fn with_event(mut self, code: u8, handler: impl EventHandler + 'static) -> Self {
        self.events.insert(code, Box::new(handler));
        self
    }

    /// Register a handler for an LE meta subevent code
    pub fn with_meta_event(mut self, subevent: u8, handler: impl EventHandler + 'static) -> Self {
        self.meta_events.insert(subevent, Box::new(handler));
        self
    }

    /// Register a handler for a vendor event code
    pub fn with_vendor_event(mut self, code: u16, handler: impl EventHandler + 'static) -> Self {
        self.vendor_events.insert(code, Box::new(handler));
        self
    }

    pub fn set_max_reply_len(&mut self, max_reply_len: usize) {
        self.max_reply_len = max_reply_len;
    }

    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    /// Apply the legacy/extended advertising latch
    pub fn check_mode_exclusivity(&mut self, opcode: u16) -> ModeCheck {
        self.mode_latch.check(opcode)
    }

    /// Execute a command and return its reply
    pub fn execute_command(&mut self, opcode: u16, params: &[u8]) -> Vec<u8> {
        if let ModeCheck::Disallowed(reply) = self.check_mode_exclusivity(opcode) {
            debug!("Command {:#06X} disallowed by advertising mode", opcode);
            return reply;
        }

        match self.commands.get_mut(&opcode) {
            Some(handler) => {
                let mut reply = vec![0u8; self.max_reply_len];
                let len = handler.execute(params, &mut reply);
                reply.truncate(len.min(self.max_reply_len));
                reply
            }
            None => {
                debug!("Unknown command {:#06X}", opcode);
                unknown_command(opcode)
            }
        }
    }

    /// Offer a stack event to the pre-processing handlers
    ///
    /// LE meta subevents are looked up first, then vendor event codes, then
    /// plain event codes. Returns true if a handler consumed the event; an
    /// unconsumed event is forwarded to the host unchanged.
    pub fn dispatch_event(&mut self, packet: &[u8]) -> bool {
        let packet_type = packet.first().copied().and_then(PacketType::from_byte);
        let (code, params) = match packet_type {
            Some(PacketType::Event) if packet.len() >= 3 => (packet[1], &packet[3..]),
            Some(PacketType::ExtEvent) if packet.len() >= 4 => (packet[1], &packet[4..]),
            _ => return false,
        };

        match code {
            event_code::LE_META => {
                if packet_type != Some(PacketType::Event) {
                    return false;
                }
                match params.split_first() {
                    Some((subevent, data)) => self
                        .meta_events
                        .get_mut(subevent)
                        .map_or(false, |handler| handler.handle(data)),
                    None => false,
                }
            }
            event_code::VENDOR => {
                if params.len() < 2 {
                    return false;
                }
                let vendor_code = u16::from_le_bytes([params[0], params[1]]);
                self.vendor_events
                    .get_mut(&vendor_code)
                    .map_or(false, |handler| handler.handle(&params[2..]))
            }
            _ if packet_type == Some(PacketType::Event) => self
                .events
                .get_mut(&code)
                .map_or(false, |handler| handler.handle(params)),
            _ => false,
        }
    }
}
