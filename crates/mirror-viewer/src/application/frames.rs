//! Frame subscription: fan-out of decoded image frames to consumers.
//!
//! The reader thread never calls consumers directly.  It schedules
//! [`FrameHub::deliver`] on the [`MainThreadDispatcher`], so every
//! [`FrameSink`] runs on the consumer thread.
//!
//! Only frames whose data type is `"frame"` reach sinks.  Other data types
//! are accepted on the wire and dropped here with a debug log.
//!
//! [`MainThreadDispatcher`]: crate::application::dispatcher::MainThreadDispatcher

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use mirror_core::Frame;
use tracing::{debug, info};

/// Consumer of image frames, e.g. the component that uploads a texture for
/// the mirrored window.
#[cfg_attr(test, mockall::automock)]
pub trait FrameSink: Send + Sync {
    /// Applies one encoded image to the window identified by `window_id`.
    fn apply_frame(&self, window_id: &str, payload: &[u8]);
}

/// Handle returned by [`FrameHub::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Registry of frame sinks.
#[derive(Default)]
pub struct FrameHub {
    sinks: Mutex<Vec<(SubscriptionId, Arc<dyn FrameSink>)>>,
    next_id: AtomicU64,
}

impl FrameHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `sink` for every subsequent image frame.
    pub fn subscribe(&self, sink: Arc<dyn FrameSink>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, sink));
        id
    }

    /// Removes a sink.  Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut sinks = self.lock();
        let before = sinks.len();
        sinks.retain(|(sid, _)| *sid != id);
        sinks.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Hands `frame` to every sink in subscription order.
    ///
    /// Returns the number of sinks notified; zero for non-image frames.
    pub fn deliver(&self, frame: &Frame) -> usize {
        if !frame.is_image() {
            debug!(
                "ignoring {} bytes of data type {:?} for window {}",
                frame.payload.len(),
                frame.data_type,
                frame.window_id
            );
            return 0;
        }

        // Snapshot so a sink may subscribe or unsubscribe while being called.
        let sinks: Vec<Arc<dyn FrameSink>> =
            self.lock().iter().map(|(_, s)| Arc::clone(s)).collect();
        for sink in &sinks {
            sink.apply_frame(&frame.window_id, &frame.payload);
        }
        sinks.len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(SubscriptionId, Arc<dyn FrameSink>)>> {
        self.sinks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Window registry ───────────────────────────────────────────────────────────

/// What the viewer knows about one mirrored window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowStats {
    pub first_seen: Instant,
    pub last_seen: Instant,
    pub frames: u64,
    pub last_payload_len: usize,
}

/// A [`FrameSink`] that keeps one entry per mirrored window.
///
/// The host uses it to notice new windows (so it can create a surface for
/// them) and to report per-window frame counts.
#[derive(Debug, Default)]
pub struct WindowRegistry {
    windows: Mutex<HashMap<String, WindowStats>>,
}

impl WindowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a frame for `window_id`.  Returns `true` if the window was not
    /// known before.
    pub fn record(&self, window_id: &str, payload_len: usize) -> bool {
        let now = Instant::now();
        let mut windows = self.lock();
        match windows.get_mut(window_id) {
            Some(stats) => {
                stats.frames += 1;
                stats.last_seen = now;
                stats.last_payload_len = payload_len;
                false
            }
            None => {
                windows.insert(
                    window_id.to_string(),
                    WindowStats {
                        first_seen: now,
                        last_seen: now,
                        frames: 1,
                        last_payload_len: payload_len,
                    },
                );
                true
            }
        }
    }

    pub fn stats(&self, window_id: &str) -> Option<WindowStats> {
        self.lock().get(window_id).copied()
    }

    /// Known window identifiers, sorted.
    pub fn window_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, WindowStats>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FrameSink for WindowRegistry {
    fn apply_frame(&self, window_id: &str, payload: &[u8]) {
        if self.record(window_id, payload.len()) {
            info!("new mirrored window {window_id} ({} byte frame)", payload.len());
        } else {
            debug!("frame for window {window_id}: {} bytes", payload.len());
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
