//! Lost-Event Accounting

use crate::TransportError;
use hci_protocol::{lost_events_notification, LOST_EVENTS_LEN};

/// One bit of the lost-event mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReasonCode(u8);

impl ReasonCode {
    /// Number of distinct reasons the mask can hold
    pub const COUNT: u8 = 64;

    /// Reason used for command replies
    pub const COMMAND_REPLY: ReasonCode = ReasonCode(1);

    /// Create a reason code, `None` if `index` does not fit the mask
    pub const fn new(index: u8) -> Option<Self> {
        if index < Self::COUNT {
            Some(ReasonCode(index))
        } else {
            None
        }
    }

    pub fn index(self) -> u8 {
        self.0
    }
}

/// What to do with an event that does not fit in the outbound queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowReason {
    /// Drop it and set this bit in the lost-event mask
    Tracked(ReasonCode),
    /// The event must not be lost; failing to queue it is fatal
    Mandatory,
}

impl TryFrom<i8> for OverflowReason {
    type Error = TransportError;

    /// Negative indices mean mandatory, 0..64 are tracked reasons
    fn try_from(index: i8) -> Result<Self, Self::Error> {
        if index < 0 {
            return Ok(OverflowReason::Mandatory);
        }
        ReasonCode::new(index as u8)
            .map(OverflowReason::Tracked)
            .ok_or(TransportError::InvalidReason(index))
    }
}

/// Which overflow reasons lost events since the last report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LostEventRegister {
    mask: u64,
}

impl LostEventRegister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a dropped event
    pub fn record(&mut self, reason: ReasonCode) {
        self.mask |= 1u64 << reason.index();
    }

    /// Check if a loss is waiting to be reported
    pub fn is_pending(&self) -> bool {
        self.mask != 0
    }

    pub fn mask(&self) -> u64 {
        self.mask
    }

    /// The "events lost" vendor event for the current mask
    pub fn notification(&self) -> [u8; LOST_EVENTS_LEN] {
        lost_events_notification(self.mask)
    }

    /// Forget reported losses
    pub fn clear(&mut self) {
        self.mask = 0;
    }
}
