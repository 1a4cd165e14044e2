//! Network infrastructure for the streamer.
//!
//! The streamer is the connecting side of the single TCP connection:
//! - `StreamerConnection` owns the stream, split into halves.
//! - Outbound frames are written through the write half, serialised by an
//!   async mutex so whole records never interleave.
//! - Inbound 24-byte UI event messages are decoded by a reader task and
//!   forwarded on an `mpsc` channel.
//!
//! A failed write or a malformed event ends that direction for good; the
//! streamer does not reconnect.

use std::net::SocketAddr;

use async_trait::async_trait;
use mirror_core::protocol::messages::{EVENT_MESSAGE_SIZE, EVENT_RECORD_SIZE, LENGTH_PREFIX_SIZE};
use mirror_core::protocol::{decode_event_record, encode_frame, ProtocolError};
use mirror_core::UiEvent;
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    net::{tcp::OwnedWriteHalf, TcpStream},
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::application::stream_window::FrameTransmitter;

/// Errors that can occur in the streamer network layer.
#[derive(Debug, Error)]
pub enum StreamerError {
    /// TCP connection to the viewer failed.
    #[error("failed to connect to viewer at {addr}: {source}")]
    ConnectFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// An I/O error occurred on the established connection.
    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A record could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// The write half is gone after an earlier failure or shutdown.
    #[error("not connected")]
    NotConnected,
}

/// The streamer's end of the connection to the viewer.
pub struct StreamerConnection {
    peer: SocketAddr,
    write_half: Mutex<Option<OwnedWriteHalf>>,
    reader: JoinHandle<()>,
}

impl StreamerConnection {
    /// Connects to the viewer and starts the event reader task.
    ///
    /// Returns the connection and a receiver for inbound UI events; the
    /// channel closes when the viewer disconnects or sends garbage.
    ///
    /// # Errors
    ///
    /// Returns [`StreamerError::ConnectFailed`] if the viewer is not
    /// listening.
    pub async fn connect(
        addr: SocketAddr,
        capacity: usize,
    ) -> Result<(Self, mpsc::Receiver<UiEvent>), StreamerError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| StreamerError::ConnectFailed { addr, source })?;
        // Frames are written as single records; don't hold them back.
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        info!("connected to viewer at {peer}");

        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let reader = tokio::spawn(async move {
            match read_event_loop(read_half, tx).await {
                Ok(count) => info!("viewer closed the event stream after {count} events"),
                Err(e) => warn!("event stream ended: {e}"),
            }
        });

        Ok((
            Self {
                peer,
                write_half: Mutex::new(Some(write_half)),
                reader,
            },
            rx,
        ))
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Whether frames can still be written.
    pub async fn is_connected(&self) -> bool {
        self.write_half.lock().await.is_some()
    }

    /// Encodes and writes one frame record.
    ///
    /// # Errors
    ///
    /// Returns [`StreamerError::Protocol`] if a header field contains the
    /// separator, [`StreamerError::NotConnected`] after an earlier failure,
    /// and [`StreamerError::Io`] if the write fails.  A write failure drops
    /// the write half so later calls fail fast.
    pub async fn write_frame(
        &self,
        window_id: &str,
        data_type: &str,
        payload: &[u8],
    ) -> Result<(), StreamerError> {
        let bytes = encode_frame(window_id, data_type, payload)?;
        let mut guard = self.write_half.lock().await;
        let writer = guard.as_mut().ok_or(StreamerError::NotConnected)?;

        let result = async {
            writer.write_all(&bytes).await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = result {
            *guard = None;
            return Err(e.into());
        }
        debug!("wrote {} byte record for window {window_id}", bytes.len());
        Ok(())
    }

    /// Closes the write direction and stops the reader task.
    pub async fn shutdown(&self) {
        if let Some(mut writer) = self.write_half.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                debug!("shutdown of write half failed: {e}");
            }
        }
        self.reader.abort();
    }
}

#[async_trait]
impl FrameTransmitter for StreamerConnection {
    async fn send_frame(
        &self,
        window_id: &str,
        data_type: &str,
        payload: &[u8],
    ) -> Result<(), String> {
        self.write_frame(window_id, data_type, payload)
            .await
            .map_err(|e| e.to_string())
    }
}

impl Drop for StreamerConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Reads UI event messages from `reader` and forwards them on `tx`.
///
/// Returns the number of events forwarded when the stream ends cleanly on a
/// message boundary or the receiver is dropped.  Events with an unknown type
/// are skipped; the stream stays in sync because every message has the same
/// size.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedEvent`] if a length prefix is not 20,
/// [`ProtocolError::ConnectionClosed`] if the stream ends inside a record,
/// and [`StreamerError::Io`] for other read failures.
pub async fn read_event_loop<R: AsyncRead + Unpin>(
    mut reader: R,
    tx: mpsc::Sender<UiEvent>,
) -> Result<u64, StreamerError> {
    let mut forwarded = 0u64;
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    let mut record = [0u8; EVENT_RECORD_SIZE];

    loop {
        match read_full(&mut reader, &mut prefix).await? {
            0 => return Ok(forwarded),
            LENGTH_PREFIX_SIZE => {}
            received => {
                return Err(ProtocolError::ConnectionClosed {
                    expected: EVENT_MESSAGE_SIZE,
                    received,
                }
                .into())
            }
        }
        let declared = u32::from_le_bytes(prefix) as usize;
        if declared != EVENT_RECORD_SIZE {
            return Err(ProtocolError::MalformedEvent(format!(
                "length prefix {declared}, expected {EVENT_RECORD_SIZE}"
            ))
            .into());
        }

        let received = read_full(&mut reader, &mut record).await?;
        if received < EVENT_RECORD_SIZE {
            return Err(ProtocolError::ConnectionClosed {
                expected: EVENT_MESSAGE_SIZE,
                received: LENGTH_PREFIX_SIZE + received,
            }
            .into());
        }

        match decode_event_record(&record) {
            Ok(event) => {
                debug!("received {event}");
                if tx.send(event).await.is_err() {
                    return Ok(forwarded);
                }
                forwarded += 1;
            }
            Err(e) => warn!("skipping event: {e}"),
        }
    }
}

/// Fills `buf` unless the stream ends first; returns the bytes read.
async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mirror_core::{encode_event, UiEventType};
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_read_event_loop_forwards_events_in_order() {
        // Arrange
        let a = UiEvent::new(UiEventType::LeftButtonDown, 0, 120, 340, 7);
        let b = UiEvent::new(UiEventType::Keystroke, 13, 0, 0, 7);
        let encoded_a = encode_event(&a);
        let encoded_b = encode_event(&b);
        let mock = Builder::new()
            .read(&encoded_a[..10])
            .read(&encoded_a[10..])
            .read(&encoded_b)
            .build();
        let (tx, mut rx) = mpsc::channel(4);

        // Act
        let result = read_event_loop(mock, tx).await;

        // Assert
        assert_eq!(result.unwrap(), 2);
        assert_eq!(rx.recv().await, Some(a));
        assert_eq!(rx.recv().await, Some(b));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_read_event_loop_rejects_wrong_length_prefix() {
        // The loop gives up after the prefix, so only the prefix is scripted.
        let mock = Builder::new().read(&21u32.to_le_bytes()).build();
        let (tx, mut rx) = mpsc::channel(4);

        let result = read_event_loop(mock, tx).await;

        assert!(matches!(
            result,
            Err(StreamerError::Protocol(ProtocolError::MalformedEvent(_)))
        ));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_read_event_loop_skips_unknown_event_type() {
        // Arrange: type code 4 is not assigned
        let mut unknown = encode_event(&UiEvent::new(UiEventType::Scroll, 1, 1, 1, 1));
        unknown[4..8].copy_from_slice(&4i32.to_le_bytes());
        let known = UiEvent::new(UiEventType::RightDoubleClick, 0, 3, 4, 5);
        let mock = Builder::new().read(&unknown).read(&encode_event(&known)).build();
        let (tx, mut rx) = mpsc::channel(4);

        // Act
        let result = read_event_loop(mock, tx).await;

        // Assert
        assert_eq!(result.unwrap(), 1);
        assert_eq!(rx.recv().await, Some(known));
    }

    #[tokio::test]
    async fn test_read_event_loop_reports_truncated_record() {
        let bytes = encode_event(&UiEvent::new(UiEventType::Scroll, 1, 1, 1, 1));
        let mock = Builder::new().read(&bytes[..12]).build();
        let (tx, _rx) = mpsc::channel(4);

        let result = read_event_loop(mock, tx).await;

        assert!(matches!(
            result,
            Err(StreamerError::Protocol(ProtocolError::ConnectionClosed {
                expected: 24,
                received: 12
            }))
        ));
    }

    #[tokio::test]
    async fn test_read_event_loop_stops_when_receiver_dropped() {
        let event = UiEvent::new(UiEventType::Scroll, 1, 1, 1, 1);
        let mock = Builder::new().read(&encode_event(&event)).build();
        let (tx, rx) = mpsc::channel(4);
        drop(rx);

        let result = read_event_loop(mock, tx).await;

        assert_eq!(result.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_is_connect_failed() {
        // Bind then drop to get a port nobody listens on.
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };

        let result = StreamerConnection::connect(addr, 8).await;

        assert!(matches!(result, Err(StreamerError::ConnectFailed { .. })));
    }
}
