//! HCI Transport Daemon
//!
//! Hosts the transport on a real serial port: opens the link, wires it to a
//! scheduler with the built-in command set and runs the event loop until the
//! port closes.

mod settings;

pub use settings::{load_config, DaemonConfig, ENV_PREFIX};

use anyhow::Context;
use hci_protocol::{command_complete, opcode, status, HciPacket, LinkEvent, SerialLink};
use hci_scheduler::{
    Dispatcher, SchedulerConfig, TransportHooks, TransportRuntime, TransportScheduler,
    TransportStats,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Pending link events before the serial reader applies backpressure
const LINK_EVENT_CAPACITY: usize = 64;

/// Version reported by HCI_Read_Local_Version_Information
pub mod version {
    pub const HCI_VERSION: u8 = 0x0E;
    pub const HCI_SUBVERSION: u16 = 0x0001;
    pub const LMP_VERSION: u8 = 0x0E;
    pub const COMPANY_ID: u16 = 0x0030;
    pub const LMP_SUBVERSION: u16 = 0x0001;
}

/// Initialize logging
pub fn init_logging(level: &str) -> anyhow::Result<()> {
    let max_level = level.parse::<Level>().unwrap_or_else(|_| {
        eprintln!("Unknown log level {:?}, using info", level);
        Level::INFO
    });

    let subscriber = FmtSubscriber::builder()
        .with_max_level(max_level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Hooks of the standalone daemon
///
/// There is no controller behind the transport, so host data packets are
/// counted and dropped.
#[derive(Debug, Default)]
pub struct DaemonHooks {
    pub resets: u64,
    pub host_packets: u64,
}

impl TransportHooks for DaemonHooks {
    fn reset_request(&mut self) {
        self.resets += 1;
        info!("Controller reset requested");
    }

    fn host_packet(&mut self, packet: &HciPacket) {
        self.host_packets += 1;
        debug!(
            "Dropping {:?} packet of {} bytes: no controller attached",
            packet.packet_type(),
            packet.len()
        );
    }
}

fn write_reply(reply: &mut [u8], event: &[u8]) -> usize {
    reply[..event.len()].copy_from_slice(event);
    event.len()
}

fn reset(_params: &[u8], reply: &mut [u8]) -> usize {
    write_reply(reply, &command_complete(opcode::RESET, &[status::SUCCESS]))
}

fn read_local_version(_params: &[u8], reply: &mut [u8]) -> usize {
    let mut params = vec![status::SUCCESS, version::HCI_VERSION];
    params.extend_from_slice(&version::HCI_SUBVERSION.to_le_bytes());
    params.push(version::LMP_VERSION);
    params.extend_from_slice(&version::COMPANY_ID.to_le_bytes());
    params.extend_from_slice(&version::LMP_SUBVERSION.to_le_bytes());
    write_reply(
        reply,
        &command_complete(opcode::READ_LOCAL_VERSION_INFORMATION, &params),
    )
}

/// Commands answered by the daemon itself
pub fn builtin_dispatcher() -> Dispatcher {
    Dispatcher::new()
        .with_command(opcode::RESET, reset)
        .with_command(opcode::READ_LOCAL_VERSION_INFORMATION, read_local_version)
}

/// Run the transport over an already spawned link until it closes
pub async fn serve(
    link: SerialLink,
    link_events: mpsc::Receiver<LinkEvent>,
    config: SchedulerConfig,
) -> anyhow::Result<TransportStats> {
    // No stack attached: every outbound event is a command reply
    let (_stack_tx, stack_rx) = mpsc::channel(1);

    let scheduler = TransportScheduler::with_hooks(
        config,
        builtin_dispatcher(),
        link,
        DaemonHooks::default(),
    )?;
    let mut runtime = TransportRuntime::new(scheduler, link_events, stack_rx);
    runtime.run().await?;

    let scheduler = runtime.into_scheduler();
    let stats = scheduler.stats();
    info!(
        "Transport stopped: {} commands executed, {} dropped, {} events lost, {} resets",
        stats.commands_executed,
        stats.commands_dropped,
        stats.events_dropped,
        scheduler.hooks().resets
    );
    if stats.stream_bytes_discarded > 0 {
        warn!(
            "{} bytes of unrecognized host data were skipped",
            stats.stream_bytes_discarded
        );
    }
    if scheduler.hooks().host_packets > 0 {
        warn!(
            "{} host data packets were dropped",
            scheduler.hooks().host_packets
        );
    }
    Ok(stats)
}

/// Open the configured serial port and run the transport
pub async fn run(config: DaemonConfig) -> anyhow::Result<TransportStats> {
    let (link_tx, link_rx) = mpsc::channel(LINK_EVENT_CAPACITY);
    let link = SerialLink::open(&config.link, link_tx)
        .with_context(|| format!("Failed to open serial port {}", config.link.device))?;

    serve(link, link_rx, config.scheduler).await
}
