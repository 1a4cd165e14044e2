//! StreamWindowUseCase: captures one window at a fixed rate and sends the
//! frames that changed.
//!
//! The use case depends only on two traits: [`FrameSource`] (where encoded
//! frames come from) and [`FrameTransmitter`] (where they go).  The
//! infrastructure layer supplies a directory-backed source and the TCP
//! connection; tests supply in-memory versions.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mirror_core::protocol::messages::DATA_TYPE_FRAME;
use thiserror::Error;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Frame rate used when none is configured.
pub const DEFAULT_FPS: u32 = 5;

/// Error type for frame sources.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read frame from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no frames available in {0}")]
    Empty(PathBuf),
}

/// Produces encoded frames (usually JPEG) of one window.
pub trait FrameSource: Send {
    /// Captures the next frame.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if no frame could be captured this time; the
    /// streamer logs it and tries again on the next tick.
    fn next_frame(&mut self) -> Result<Vec<u8>, SourceError>;
}

/// Sends a frame to the viewer.
///
/// The TCP connection implements this; test implementations record calls.
#[async_trait]
pub trait FrameTransmitter: Send + Sync {
    /// Writes one `"<window_id>|<data_type>|<len>"` record and its payload.
    async fn send_frame(
        &self,
        window_id: &str,
        data_type: &str,
        payload: &[u8],
    ) -> Result<(), String>;
}

// ── Change detection ──────────────────────────────────────────────────────────

/// Remembers a hash of the last frame and reports whether a new one differs.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    previous: Option<u64>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` for the first frame and for every frame whose content
    /// differs from the one before it.
    pub fn has_changed(&mut self, frame: &[u8]) -> bool {
        let mut hasher = DefaultHasher::new();
        frame.hash(&mut hasher);
        let current = hasher.finish();
        let changed = self.previous != Some(current);
        self.previous = Some(current);
        changed
    }

    /// Forgets the last frame so the next one is always sent.
    pub fn reset(&mut self) {
        self.previous = None;
    }
}

// ── Streaming ─────────────────────────────────────────────────────────────────

/// Counters reported when streaming ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub frames_captured: u64,
    pub frames_sent: u64,
    pub frames_unchanged: u64,
    pub capture_errors: u64,
}

/// Why [`WindowStreamer::run`] returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamExit {
    /// The running flag was cleared.
    Stopped,
    /// Sending a frame failed; the connection is not retried.
    SendFailed(String),
}

/// Result of a single capture step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Sent,
    Unchanged,
    CaptureFailed,
}

/// Streams one window through a [`FrameTransmitter`].
pub struct WindowStreamer<S: FrameSource> {
    window_id: String,
    source: S,
    detector: ChangeDetector,
    frame_interval: Duration,
    stats: StreamStats,
}

impl<S: FrameSource> WindowStreamer<S> {
    /// Creates a streamer for `window_id` paced at `fps` frames per second.
    /// An `fps` of zero is treated as one.
    pub fn new(window_id: impl Into<String>, source: S, fps: u32) -> Self {
        Self {
            window_id: window_id.into(),
            source,
            detector: ChangeDetector::new(),
            frame_interval: Duration::from_secs(1) / fps.max(1),
            stats: StreamStats::default(),
        }
    }

    pub fn window_id(&self) -> &str {
        &self.window_id
    }

    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    /// Captures one frame and sends it if it changed.
    ///
    /// # Errors
    ///
    /// Returns the transmitter's error message if sending failed.
    pub async fn step<T: FrameTransmitter>(
        &mut self,
        transmitter: &T,
    ) -> Result<StepOutcome, String> {
        let frame = match self.source.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.capture_errors += 1;
                warn!("window {}: capture failed: {e}", self.window_id);
                return Ok(StepOutcome::CaptureFailed);
            }
        };
        self.stats.frames_captured += 1;

        if !self.detector.has_changed(&frame) {
            self.stats.frames_unchanged += 1;
            return Ok(StepOutcome::Unchanged);
        }

        transmitter
            .send_frame(&self.window_id, DATA_TYPE_FRAME, &frame)
            .await?;
        self.stats.frames_sent += 1;
        debug!("window {}: sent {} byte frame", self.window_id, frame.len());
        Ok(StepOutcome::Sent)
    }

    /// Streams until `running` is cleared or a send fails.
    pub async fn run<T: FrameTransmitter>(
        &mut self,
        transmitter: &T,
        running: &AtomicBool,
    ) -> StreamExit {
        info!(
            "streaming window {} every {:?}",
            self.window_id, self.frame_interval
        );
        let mut ticker = time::interval(self.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let exit = loop {
            ticker.tick().await;
            if !running.load(Ordering::Relaxed) {
                break StreamExit::Stopped;
            }
            if let Err(e) = self.step(transmitter).await {
                warn!("window {}: send failed, stopping: {e}", self.window_id);
                break StreamExit::SendFailed(e);
            }
        };

        info!(
            "window {} stream ended: {} sent, {} unchanged, {} capture errors",
            self.window_id,
            self.stats.frames_sent,
            self.stats.frames_unchanged,
            self.stats.capture_errors
        );
        exit
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
