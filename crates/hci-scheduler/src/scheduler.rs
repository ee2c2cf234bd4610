//! Transport Scheduler Implementation
//!
//! Two execution contexts touch the scheduler: the main loop, which calls
//! [`TransportScheduler::tick`] and [`TransportScheduler::on_bytes_received`],
//! and the peripheral completion, which calls
//! [`TransportScheduler::on_transfer_complete`]. Both take `&mut self`, so they
//! must be funneled into one task; [`crate::TransportRuntime`] does that with
//! a channel. The completion path only ever discards the oldest outbound item
//! and starts the next one, and the main loop only starts a transfer when
//! none is in flight.

use crate::dispatcher::Dispatcher;
use crate::lost_events::{LostEventRegister, OverflowReason, ReasonCode};
use crate::TransportError;
use hci_protocol::{
    is_controller_busy, opcode, CommandHeader, FrameParser, HciPacket, SerialPeripheral,
};
use ring_buffer::RingBuffer;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Configuration for the transport scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Command queue size in bytes
    pub inbound_capacity: usize,
    /// Event queue size in bytes
    pub outbound_capacity: usize,
    /// Queue items are padded to a multiple of this
    pub alignment: usize,
    /// Largest reply a command may produce
    pub max_reply_len: usize,
    /// Re-offer commands whose reply reports a busy controller
    pub buffer_commands_on_busy: bool,
    /// Deliver the busy reply after this many re-offers (`None`: never give up)
    pub max_busy_retries: Option<u32>,
    /// Idle tick interval of the runtime loop in milliseconds
    pub idle_tick_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: 540,
            outbound_capacity: 2300,
            alignment: 4,
            max_reply_len: 536,
            buffer_commands_on_busy: true,
            max_busy_retries: None,
            idle_tick_ms: 10,
        }
    }
}

/// Callbacks into the surrounding firmware
pub trait TransportHooks {
    /// New work is queued; wake whoever calls `tick`
    fn process_request(&mut self) {}

    /// A reset command is about to execute and the transmitter is idle
    fn reset_request(&mut self) {}

    /// A complete non-command packet arrived from the host
    fn host_packet(&mut self, _packet: &HciPacket) {}
}

/// Hooks that do nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl TransportHooks for NoHooks {}

/// What a tick did with the oldest queued command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Executed; its reply (if any) was queued
    Completed { opcode: u16 },
    /// Controller busy; the command stays at the head of the queue
    Busy { opcode: u16, attempt: u32 },
    /// Reset waiting for the transmitter to drain
    AwaitingDrain { opcode: u16 },
    /// Not a command packet; dropped
    Discarded,
}

/// Summary of one scheduling step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub transfer_started: bool,
    pub command: Option<CommandOutcome>,
    pub lost_events_reported: bool,
}

impl TickReport {
    /// Check if another tick right away could do more
    pub fn made_progress(&self) -> bool {
        self.transfer_started
            || self.lost_events_reported
            || matches!(
                self.command,
                Some(CommandOutcome::Completed { .. }) | Some(CommandOutcome::Discarded)
            )
    }
}

/// Running counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub commands_received: u64,
    pub commands_dropped: u64,
    pub commands_executed: u64,
    pub busy_retries: u64,
    pub events_dropped: u64,
    pub lost_event_reports: u64,
    pub transfers: u64,
    /// Host bytes skipped while resynchronizing on a packet type
    pub stream_bytes_discarded: u64,
}

/// Command/event queues and the single-transfer UART scheduler
pub struct TransportScheduler<P, H = NoHooks> {
    config: SchedulerConfig,
    /// Commands awaiting execution
    inbound: RingBuffer,
    /// Replies and events awaiting transmission
    outbound: RingBuffer,
    parser: FrameParser,
    dispatcher: Dispatcher,
    lost_events: LostEventRegister,
    /// The peripheral owns the oldest outbound item
    transfer_in_flight: bool,
    /// Busy re-offers of the command at the head of the queue
    busy_attempts: u32,
    stats: TransportStats,
    peripheral: P,
    hooks: H,
}

impl<P: SerialPeripheral> TransportScheduler<P> {
    /// Create a scheduler without hooks
    pub fn new(
        config: SchedulerConfig,
        dispatcher: Dispatcher,
        peripheral: P,
    ) -> Result<Self, TransportError> {
        Self::with_hooks(config, dispatcher, peripheral, NoHooks)
    }
}

impl<P: SerialPeripheral, H: TransportHooks> TransportScheduler<P, H> {
    /// Create a scheduler, allocating both queues
    pub fn with_hooks(
        config: SchedulerConfig,
        mut dispatcher: Dispatcher,
        peripheral: P,
        hooks: H,
    ) -> Result<Self, TransportError> {
        let inbound = RingBuffer::new(config.inbound_capacity, config.alignment)?;
        let outbound = RingBuffer::new(config.outbound_capacity, config.alignment)?;
        dispatcher.set_max_reply_len(config.max_reply_len);

        info!(
            "Transport scheduler created: {}B command queue, {}B event queue, {} commands",
            config.inbound_capacity,
            config.outbound_capacity,
            dispatcher.command_count()
        );

        Ok(Self {
            config,
            inbound,
            outbound,
            parser: FrameParser::new(),
            dispatcher,
            lost_events: LostEventRegister::new(),
            transfer_in_flight: false,
            busy_attempts: 0,
            stats: TransportStats::default(),
            peripheral,
            hooks,
        })
    }

    /// Feed bytes received from the host
    ///
    /// Complete command packets are queued for execution, other packets go to
    /// [`TransportHooks::host_packet`]. Returns the number of commands queued.
    pub fn on_bytes_received(&mut self, chunk: &[u8]) -> usize {
        let mut queued = 0;
        for packet in self.parser.feed(chunk) {
            if !packet.packet_type().is_command() {
                self.hooks.host_packet(&packet);
                continue;
            }
            match self.inbound.put_framed(packet.as_bytes(), &[]) {
                Ok(()) => {
                    queued += 1;
                    self.stats.commands_received += 1;
                }
                Err(e) => {
                    self.stats.commands_dropped += 1;
                    warn!("Command queue full, dropping {}B command: {}", packet.len(), e);
                }
            }
        }
        self.stats.stream_bytes_discarded = self.parser.discarded();
        if queued > 0 {
            self.hooks.process_request();
        }
        queued
    }

    /// Queue an event made of `first` followed by `second`
    ///
    /// When the event queue is full a tracked reason is recorded in the
    /// lost-event register and `EventDropped` is returned; a mandatory event
    /// returns `MandatoryEventDropped`, which callers treat as fatal.
    pub fn enqueue_event(
        &mut self,
        first: &[u8],
        second: &[u8],
        reason: OverflowReason,
    ) -> Result<(), TransportError> {
        let result = match self.outbound.put_framed(first, second) {
            Ok(()) => Ok(()),
            Err(e) => match reason {
                OverflowReason::Tracked(code) => {
                    self.lost_events.record(code);
                    self.stats.events_dropped += 1;
                    debug!("Event queue full, dropped event (reason {}): {}", code.index(), e);
                    Err(TransportError::EventDropped {
                        reason: code.index(),
                    })
                }
                OverflowReason::Mandatory => {
                    let len = first.len() + second.len();
                    error!("Event queue full, cannot queue mandatory {}B event", len);
                    Err(TransportError::MandatoryEventDropped { len })
                }
            },
        };
        self.hooks.process_request();
        result
    }

    /// Queue a single-buffer event; empty events are ignored
    pub fn send_event(
        &mut self,
        event: &[u8],
        reason: OverflowReason,
    ) -> Result<(), TransportError> {
        self.send_event_parts(event, &[], reason)
    }

    /// Queue a header and body as one event; ignored if `first` is empty
    pub fn send_event_parts(
        &mut self,
        first: &[u8],
        second: &[u8],
        reason: OverflowReason,
    ) -> Result<(), TransportError> {
        if first.is_empty() {
            return Ok(());
        }
        self.enqueue_event(first, second, reason)
    }

    /// Route an event produced by the stack
    ///
    /// Returns true if a pre-processing handler consumed it; otherwise it is
    /// queued for the host and must not be lost.
    pub fn on_stack_event(&mut self, packet: &[u8]) -> Result<bool, TransportError> {
        let consumed = self.dispatcher.dispatch_event(packet);
        if !consumed {
            self.send_event(packet, OverflowReason::Mandatory)?;
        }
        Ok(consumed)
    }

    /// Run one scheduling step
    pub fn tick(&mut self) -> Result<TickReport, TransportError> {
        let mut report = TickReport::default();

        if !self.transfer_in_flight {
            report.transfer_started = self.start_next_transfer()?;
        }

        if !self.inbound.is_empty() {
            report.command = Some(self.process_next_command()?);
        }

        if self.lost_events.is_pending() {
            report.lost_events_reported = self.report_lost_events();
        }

        Ok(report)
    }

    /// The peripheral finished the transfer started last
    pub fn on_transfer_complete(&mut self) -> Result<(), TransportError> {
        if !self.transfer_in_flight {
            warn!("Transfer completion with no transfer in flight");
            return Ok(());
        }
        self.outbound.discard_framed()?;
        self.transfer_in_flight = false;
        self.start_next_transfer()?;
        Ok(())
    }

    fn start_next_transfer(&mut self) -> Result<bool, TransportError> {
        if self.outbound.is_empty() {
            return Ok(false);
        }
        let frame = self.outbound.peek_framed()?;
        self.peripheral.start_transfer(frame)?;
        self.transfer_in_flight = true;
        self.stats.transfers += 1;
        Ok(true)
    }

    fn process_next_command(&mut self) -> Result<CommandOutcome, TransportError> {
        let item = self.inbound.get_framed()?;
        let footprint = self.inbound.framed_footprint(item.len());

        let header = match CommandHeader::parse(&item) {
            Ok(header) => header,
            Err(e) => {
                warn!("Discarding malformed command item: {}", e);
                return Ok(CommandOutcome::Discarded);
            }
        };
        let opcode = header.opcode;

        if opcode == opcode::RESET {
            if !self.transmitter_drained() {
                self.inbound.rollback(footprint);
                debug!("Reset waiting for the transmitter to drain");
                return Ok(CommandOutcome::AwaitingDrain { opcode });
            }
            info!("Reset requested");
            self.hooks.reset_request();
        }

        let reply = self
            .dispatcher
            .execute_command(opcode, &item[header.params_offset..]);

        if self.should_retry(opcode, &reply) {
            self.inbound.rollback(footprint);
            self.busy_attempts += 1;
            self.stats.busy_retries += 1;
            debug!(
                "Controller busy, command {:#06X} re-offered (attempt {})",
                opcode, self.busy_attempts
            );
            return Ok(CommandOutcome::Busy {
                opcode,
                attempt: self.busy_attempts,
            });
        }

        self.busy_attempts = 0;
        self.stats.commands_executed += 1;
        if opcode == opcode::RESET {
            self.inbound.flush();
        }

        match self.send_event(&reply, OverflowReason::Tracked(ReasonCode::COMMAND_REPLY)) {
            Ok(()) | Err(TransportError::EventDropped { .. }) => {}
            Err(e) => return Err(e),
        }
        Ok(CommandOutcome::Completed { opcode })
    }

    fn should_retry(&self, opcode: u16, reply: &[u8]) -> bool {
        if !self.config.buffer_commands_on_busy
            || opcode == opcode::L2CAP_CONNECTION_PARAMETER_UPDATE_RESP
            || !is_controller_busy(reply)
        {
            return false;
        }
        match self.config.max_busy_retries {
            Some(max) if self.busy_attempts >= max => {
                warn!(
                    "Command {:#06X} still busy after {} retries, delivering busy status",
                    opcode, max
                );
                false
            }
            _ => true,
        }
    }

    /// No transfer running, nothing queued, last byte out of the UART
    fn transmitter_drained(&self) -> bool {
        !self.transfer_in_flight && self.outbound.is_empty() && self.peripheral.transmit_complete()
    }

    fn report_lost_events(&mut self) -> bool {
        let notification = self.lost_events.notification();
        if self.outbound.put_framed(&notification, &[]).is_err() {
            return false;
        }
        info!("Reported lost events, mask {:#018X}", self.lost_events.mask());
        self.lost_events.clear();
        self.stats.lost_event_reports += 1;
        true
    }

    /// Check if the peripheral currently owns an outbound item
    pub fn transfer_in_flight(&self) -> bool {
        self.transfer_in_flight
    }

    pub fn inbound(&self) -> &RingBuffer {
        &self.inbound
    }

    pub fn outbound(&self) -> &RingBuffer {
        &self.outbound
    }

    pub fn lost_events(&self) -> &LostEventRegister {
        &self.lost_events
    }

    pub fn stats(&self) -> TransportStats {
        self.stats
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn peripheral(&self) -> &P {
        &self.peripheral
    }

    pub fn peripheral_mut(&mut self) -> &mut P {
        &mut self.peripheral
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }
}
