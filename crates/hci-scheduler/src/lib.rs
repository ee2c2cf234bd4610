//! HCI Transport Scheduler
//!
//! Sits between the serial link and the command/event processor: queues
//! reassembled commands, runs them one at a time through the [`Dispatcher`],
//! serializes replies and stack events onto the UART with at most one
//! transfer in flight, re-offers commands the controller was too busy to
//! accept, and reports events it had to drop.

mod dispatcher;
mod lost_events;
mod runtime;
mod scheduler;

pub use dispatcher::{CommandHandler, Dispatcher, EventHandler, ModeCheck, ModeLatch};
pub use lost_events::{LostEventRegister, OverflowReason, ReasonCode};
pub use runtime::TransportRuntime;
pub use scheduler::{
    CommandOutcome, NoHooks, SchedulerConfig, TickReport, TransportHooks, TransportScheduler,
    TransportStats,
};

use hci_protocol::HciError;
use ring_buffer::RingBufferError;
use thiserror::Error;

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Queue error: {0}")]
    Queue(#[from] RingBufferError),

    #[error("Link error: {0}")]
    Link(#[from] HciError),

    /// Outbound queue full; the loss is recorded under `reason`
    #[error("Event dropped, overflow reason {reason}")]
    EventDropped { reason: u8 },

    /// Outbound queue full for an event that must never be dropped
    #[error("Mandatory event of {len} bytes dropped: outbound queue full")]
    MandatoryEventDropped { len: usize },

    /// Overflow reason index outside the 64-bit lost-event mask
    #[error("Overflow reason {0} out of range")]
    InvalidReason(i8),
}
