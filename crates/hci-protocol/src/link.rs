//! Serial Link
//!
//! The boundary with the UART: [`SerialPeripheral`] is what the transport
//! scheduler drives, [`SerialLink`] implements it over any async byte stream.
//! Received chunks and transfer completions come back as [`LinkEvent`]s on a
//! bounded channel, so they are handled in the same task that ticks the
//! scheduler.

use crate::error::HciError;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, error, info};

/// Peripheral able to transmit one buffer at a time in the background
pub trait SerialPeripheral {
    /// Start transmitting `frame`
    ///
    /// Fire-and-forget: completion is reported exactly once per started
    /// transfer through the scheduler's `on_transfer_complete`.
    fn start_transfer(&mut self, frame: &[u8]) -> Result<(), HciError>;

    /// Check if the last byte has physically left the transmitter
    fn transmit_complete(&self) -> bool {
        true
    }
}

/// Notification from the link tasks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Bytes read from the UART, in order
    Received(Vec<u8>),
    /// The frame passed to `start_transfer` has been written and flushed
    TransferComplete,
    /// The peer closed the link
    Closed,
    /// Reading or writing the UART failed; the link is unusable
    Failed(String),
}

/// Serial link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Serial port device path (e.g., "/dev/ttyUSB0" or "COM3")
    pub device: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Largest chunk handed over per read
    pub rx_chunk_size: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            rx_chunk_size: 64,
        }
    }
}

/// Async serial link with one writer and one reader task
pub struct SerialLink {
    /// Frames waiting for the writer; capacity one, as at most one transfer runs
    frames: mpsc::Sender<Vec<u8>>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl SerialLink {
    /// Open the serial port described by `config`
    pub fn open(config: &LinkConfig, events: mpsc::Sender<LinkEvent>) -> Result<Self, HciError> {
        info!(
            "Opening serial link on {} at {} baud",
            config.device, config.baud_rate
        );
        let port = tokio_serial::new(&config.device, config.baud_rate).open_native_async()?;
        Ok(Self::spawn(port, events, config.rx_chunk_size))
    }

    /// Run the link over an already open byte stream
    pub fn spawn<T>(io: T, events: mpsc::Sender<LinkEvent>, rx_chunk_size: usize) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut rx, mut tx) = tokio::io::split(io);
        let (frames, mut pending) = mpsc::channel::<Vec<u8>>(1);

        let writer_events = events.clone();
        let writer = tokio::spawn(async move {
            while let Some(frame) = pending.recv().await {
                if let Err(e) = write_frame(&mut tx, &frame).await {
                    error!("Serial write failed: {}", e);
                    let _ = writer_events.send(LinkEvent::Failed(e.to_string())).await;
                    break;
                }
                if writer_events.send(LinkEvent::TransferComplete).await.is_err() {
                    break;
                }
            }
            debug!("Serial writer stopped");
        });

        let reader = tokio::spawn(async move {
            let mut chunk = vec![0u8; rx_chunk_size.max(1)];
            loop {
                match rx.read(&mut chunk).await {
                    Ok(0) => {
                        info!("Serial link closed by peer");
                        let _ = events.send(LinkEvent::Closed).await;
                        break;
                    }
                    Ok(n) => {
                        if events.send(LinkEvent::Received(chunk[..n].to_vec())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Serial read failed: {}", e);
                        let _ = events.send(LinkEvent::Failed(e.to_string())).await;
                        break;
                    }
                }
            }
            debug!("Serial reader stopped");
        });

        Self {
            frames,
            reader,
            writer,
        }
    }
}

impl SerialPeripheral for SerialLink {
    fn start_transfer(&mut self, frame: &[u8]) -> Result<(), HciError> {
        self.frames.try_send(frame.to_vec()).map_err(|e| match e {
            TrySendError::Full(_) => HciError::TransferInProgress,
            TrySendError::Closed(_) => HciError::LinkClosed,
        })
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

async fn write_frame<W: AsyncWrite + Unpin>(tx: &mut W, frame: &[u8]) -> std::io::Result<()> {
    tx.write_all(frame).await?;
    tx.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{duplex, ReadBuf};

    /// UART whose transmitter always fails and whose receiver never yields
    struct BrokenUart;

    impl AsyncRead for BrokenUart {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Pending
        }
    }

    impl AsyncWrite for BrokenUart {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "line down")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_received_chunks_are_forwarded() {
        let (local, mut remote) = duplex(64);
        let (events_tx, mut events) = mpsc::channel(8);
        let _link = SerialLink::spawn(local, events_tx, 16);

        remote.write_all(&[0x01, 0x03, 0x0C, 0x00]).await.unwrap();

        let mut received = Vec::new();
        while received.len() < 4 {
            match events.recv().await.unwrap() {
                LinkEvent::Received(chunk) => received.extend(chunk),
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert_eq!(received, vec![0x01, 0x03, 0x0C, 0x00]);
    }

    #[tokio::test]
    async fn test_transfer_reports_completion() {
        let (local, mut remote) = duplex(64);
        let (events_tx, mut events) = mpsc::channel(8);
        let mut link = SerialLink::spawn(local, events_tx, 16);

        link.start_transfer(&[0x04, 0x0E, 0x01, 0x00]).unwrap();
        assert_eq!(events.recv().await, Some(LinkEvent::TransferComplete));

        let mut wire = [0u8; 4];
        remote.read_exact(&mut wire).await.unwrap();
        assert_eq!(wire, [0x04, 0x0E, 0x01, 0x00]);
    }

    #[tokio::test]
    async fn test_peer_close_is_reported() {
        let (local, remote) = duplex(64);
        let (events_tx, mut events) = mpsc::channel(8);
        let _link = SerialLink::spawn(local, events_tx, 16);

        drop(remote);
        assert_eq!(events.recv().await, Some(LinkEvent::Closed));
    }

    #[tokio::test]
    async fn test_write_error_is_reported_as_failure() {
        let (events_tx, mut events) = mpsc::channel(8);
        let mut link = SerialLink::spawn(BrokenUart, events_tx, 16);

        link.start_transfer(&[0x04, 0x0E, 0x01, 0x00]).unwrap();
        match events.recv().await {
            Some(LinkEvent::Failed(reason)) => assert!(reason.contains("line down")),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_default_config() {
        let config = LinkConfig::default();
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.rx_chunk_size, 64);
    }
}
