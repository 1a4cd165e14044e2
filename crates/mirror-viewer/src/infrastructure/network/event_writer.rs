//! Outbound event loop run on the writer thread.
//!
//! Waits on the [`EventOutbox`], encodes each event as its 24-byte wire
//! message and writes it out, in the order events were pushed.  A write
//! failure closes the outbox (discarding whatever is still queued) and ends
//! the loop; nothing is retried.

use std::io::Write;

use mirror_core::encode_event;
use tracing::{info, trace, warn};

use crate::application::event_outbox::EventOutbox;

#[derive(Debug)]
pub enum WriterExitReason {
    /// The outbox was closed by connection teardown.
    Cancelled,
    /// Writing to the peer failed.
    WriteFailure(std::io::Error),
}

/// Summary returned by [`run_event_writer`].
#[derive(Debug)]
pub struct WriterExit {
    pub events_sent: u64,
    pub reason: WriterExitReason,
}

/// Drains `outbox` into `writer` until the outbox closes or a write fails.
pub fn run_event_writer<W: Write>(mut writer: W, outbox: &EventOutbox) -> WriterExit {
    let mut events_sent = 0u64;

    while let Some(event) = outbox.pop_blocking() {
        let bytes = encode_event(&event);
        if let Err(e) = writer.write_all(&bytes).and_then(|()| writer.flush()) {
            let discarded = outbox.close();
            warn!("event write failed after {events_sent} events ({discarded} unsent discarded): {e}");
            return WriterExit {
                events_sent,
                reason: WriterExitReason::WriteFailure(e),
            };
        }
        trace!("sent {event}");
        events_sent += 1;
    }

    info!("event writer stopped after {events_sent} events");
    WriterExit {
        events_sent,
        reason: WriterExitReason::Cancelled,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mirror_core::{decode_event, UiEvent, UiEventType};
    use std::io;
    use std::sync::{Arc, Mutex};
    use std::thread;

    /// Writer that records everything into a shared buffer.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Writer that fails after accepting `budget` bytes.
    struct FailingWriter {
        budget: usize,
    }

    impl Write for FailingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"));
            }
            let n = buf.len().min(self.budget);
            self.budget -= n;
            Ok(n)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn key(c: char) -> UiEvent {
        UiEvent::new(UiEventType::Keystroke, c as i32, 0, 0, 7)
    }

    #[test]
    fn test_events_are_written_in_push_order() {
        // Arrange
        let outbox = EventOutbox::new();
        for c in ['a', 'b', 'c'] {
            outbox.push(key(c));
        }
        outbox.push(UiEvent::new(UiEventType::LeftButtonDown, 0, 120, 340, 7));
        let buf = SharedBuf::default();

        // Act: close after the queue is drained by a second thread
        let exit = thread::scope(|s| {
            let writer = s.spawn(|| run_event_writer(buf.clone(), &outbox));
            while !outbox.is_empty() {
                thread::yield_now();
            }
            // The last pop may still be writing; wait for its bytes.
            while buf.0.lock().unwrap().len() < 4 * 24 {
                thread::yield_now();
            }
            outbox.close();
            writer.join().unwrap()
        });

        // Assert
        assert_eq!(exit.events_sent, 4);
        assert!(matches!(exit.reason, WriterExitReason::Cancelled));
        let bytes = buf.0.lock().unwrap().clone();
        let values: Vec<i32> = bytes
            .chunks(24)
            .map(|chunk| decode_event(chunk).unwrap().0.value)
            .collect();
        assert_eq!(values, vec!['a' as i32, 'b' as i32, 'c' as i32, 0]);
    }

    #[test]
    fn test_closed_outbox_ends_writer_immediately() {
        let outbox = EventOutbox::new();
        outbox.close();

        let exit = run_event_writer(SharedBuf::default(), &outbox);

        assert_eq!(exit.events_sent, 0);
        assert!(matches!(exit.reason, WriterExitReason::Cancelled));
    }

    #[test]
    fn test_write_failure_closes_outbox_and_discards_rest() {
        // Arrange: room for one full message plus a partial second one
        let outbox = EventOutbox::new();
        for c in ['x', 'y', 'z'] {
            outbox.push(key(c));
        }

        // Act
        let exit = run_event_writer(FailingWriter { budget: 30 }, &outbox);

        // Assert
        assert_eq!(exit.events_sent, 1);
        assert!(matches!(exit.reason, WriterExitReason::WriteFailure(_)));
        assert!(outbox.is_closed());
        assert!(outbox.is_empty());
        assert!(!outbox.push(key('w')), "pushes after failure are dropped");
    }
}
