//! In-memory frame source for tests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::application::stream_window::{FrameSource, SourceError};

/// Hands out a fixed list of frames, cycling when it runs out.
///
/// `calls` is shared so tests can observe the source after moving it into a
/// streamer.
#[derive(Debug, Clone, Default)]
pub struct MockFrameSource {
    frames: Vec<Vec<u8>>,
    next: usize,
    pub calls: Arc<AtomicUsize>,
    pub should_fail: bool,
}

impl MockFrameSource {
    pub fn new(frames: Vec<Vec<u8>>) -> Self {
        Self {
            frames,
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FrameSource for MockFrameSource {
    fn next_frame(&mut self) -> Result<Vec<u8>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail || self.frames.is_empty() {
            return Err(SourceError::Empty(PathBuf::from("mock")));
        }
        let frame = self.frames[self.next].clone();
        self.next = (self.next + 1) % self.frames.len();
        Ok(frame)
    }
}
