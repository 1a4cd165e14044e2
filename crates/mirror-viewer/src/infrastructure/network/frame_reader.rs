//! Inbound frame loop run on the reader thread.
//!
//! Each iteration reads one header, then exactly the declared number of
//! payload bytes, then schedules delivery of the complete frame on the
//! consumer thread.  The loop is fail-stop: the first decode or read error
//! ends it, and a frame whose payload was cut short is never scheduled.
//! There is no resynchronisation and no retry.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mirror_core::{decode_header, decode_payload, Frame, ProtocolError};
use tracing::{debug, info, warn};

use crate::application::dispatcher::MainThreadDispatcher;
use crate::application::frames::FrameHub;

/// Why the reader loop ended.
#[derive(Debug)]
pub enum ReaderExitReason {
    /// The cancellation flag was set (normal shutdown).
    Cancelled,
    /// A header, payload or stream error ended the loop.
    Protocol(ProtocolError),
}

/// Summary returned by [`run_frame_reader`].
#[derive(Debug)]
pub struct ReaderExit {
    /// Complete frames handed to the dispatcher.
    pub frames_received: u64,
    pub reason: ReaderExitReason,
}

/// Reads frames from `reader` until an error occurs or `cancel` is set.
///
/// Frames are not delivered inline: each one is moved into a closure queued
/// on `dispatcher`, which calls `hub.deliver` on the consumer thread.
pub fn run_frame_reader<R: Read>(
    mut reader: R,
    dispatcher: &MainThreadDispatcher,
    hub: &Arc<FrameHub>,
    cancel: &AtomicBool,
) -> ReaderExit {
    let mut frames_received = 0u64;

    loop {
        if cancel.load(Ordering::Acquire) {
            return finish(frames_received, ReaderExitReason::Cancelled);
        }

        let frame = match read_frame(&mut reader) {
            Ok(frame) => frame,
            // Shutting the socket down to unblock us surfaces as a read error.
            Err(_) if cancel.load(Ordering::Acquire) => {
                return finish(frames_received, ReaderExitReason::Cancelled);
            }
            Err(e) => return finish(frames_received, ReaderExitReason::Protocol(e)),
        };

        debug!(
            "frame #{frames_received} for window {}: {} bytes of {:?}",
            frame.window_id,
            frame.payload.len(),
            frame.data_type
        );
        frames_received += 1;

        let hub = Arc::clone(hub);
        dispatcher.schedule(move || {
            hub.deliver(&frame);
        });
    }
}

fn read_frame<R: Read>(reader: &mut R) -> Result<Frame, ProtocolError> {
    let header = decode_header(reader)?;
    let payload = decode_payload(reader, header.payload_length)?;
    Ok(Frame::from_parts(header, payload))
}

fn finish(frames_received: u64, reason: ReaderExitReason) -> ReaderExit {
    match &reason {
        ReaderExitReason::Cancelled => {
            info!("frame reader cancelled after {frames_received} frames")
        }
        ReaderExitReason::Protocol(e) => {
            warn!("frame reader stopped after {frames_received} frames: {e}")
        }
    }
    ReaderExit {
        frames_received,
        reason,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
