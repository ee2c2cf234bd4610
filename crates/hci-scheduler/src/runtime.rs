//! Hosted Transport Loop
//!
//! Drives a [`TransportScheduler`] from one tokio task: link events, stack
//! events and an idle timer are multiplexed with `select!`, and after every
//! wake-up the scheduler is ticked until it stops making progress.

use crate::scheduler::{NoHooks, TransportHooks, TransportScheduler};
use crate::TransportError;
use hci_protocol::{HciError, LinkEvent, SerialPeripheral};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

/// Upper bound on ticks run back to back after one wake-up
const MAX_TICKS_PER_WAKE: usize = 64;

/// Event loop owning the scheduler
pub struct TransportRuntime<P, H = NoHooks> {
    scheduler: TransportScheduler<P, H>,
    link_events: mpsc::Receiver<LinkEvent>,
    /// Events produced by the stack, forwarded to the host unless consumed
    stack_events: mpsc::Receiver<Vec<u8>>,
}

impl<P: SerialPeripheral, H: TransportHooks> TransportRuntime<P, H> {
    pub fn new(
        scheduler: TransportScheduler<P, H>,
        link_events: mpsc::Receiver<LinkEvent>,
        stack_events: mpsc::Receiver<Vec<u8>>,
    ) -> Self {
        Self {
            scheduler,
            link_events,
            stack_events,
        }
    }

    /// Run until the peer closes the link
    ///
    /// Returns an error if a mandatory event could not be queued, the queues
    /// fail, or the UART reports a read or write failure.
    pub async fn run(&mut self) -> Result<(), TransportError> {
        let period = Duration::from_millis(self.scheduler.config().idle_tick_ms.max(1));
        let mut idle = interval(period);
        idle.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Transport runtime started (idle tick {:?})", period);

        loop {
            tokio::select! {
                event = self.link_events.recv() => match event {
                    Some(LinkEvent::Received(chunk)) => {
                        self.scheduler.on_bytes_received(&chunk);
                    }
                    Some(LinkEvent::TransferComplete) => {
                        self.scheduler.on_transfer_complete()?;
                    }
                    Some(LinkEvent::Closed) | None => {
                        info!("Serial link closed, stopping transport runtime");
                        return Ok(());
                    }
                    Some(LinkEvent::Failed(reason)) => {
                        error!(
                            "Serial link failed with {}B still queued: {}",
                            self.scheduler.outbound().size(),
                            reason
                        );
                        return Err(TransportError::Link(HciError::SerialError(reason)));
                    }
                },
                Some(packet) = self.stack_events.recv() => {
                    if let Err(e) = self.scheduler.on_stack_event(&packet) {
                        error!("Stack event lost: {}", e);
                        return Err(e);
                    }
                }
                _ = idle.tick() => {}
            }

            self.drain()?;
        }
    }

    /// Tick until nothing more can be done right now
    fn drain(&mut self) -> Result<(), TransportError> {
        for _ in 0..MAX_TICKS_PER_WAKE {
            let report = self.scheduler.tick()?;
            if !report.made_progress() {
                return Ok(());
            }
        }
        debug!("Tick budget exhausted, yielding");
        Ok(())
    }

    pub fn scheduler(&self) -> &TransportScheduler<P, H> {
        &self.scheduler
    }

    pub fn into_scheduler(self) -> TransportScheduler<P, H> {
        self.scheduler
    }
}
