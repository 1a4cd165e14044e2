//! mirror-streamer library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does the streamer do? (for beginners)
//!
//! The streamer runs on the desktop whose windows are being mirrored.  It
//! is the connecting side of the single TCP connection to the viewer:
//!
//! 1. Connects to the viewer's listening port.
//! 2. Captures a window at a fixed frame rate, skips frames identical to
//!    the previous one, and sends the rest as `"<window>|frame|<len>"`
//!    records.
//! 3. Receives 24-byte UI event messages back, validates them, and hands
//!    them to an interaction simulator that replays the click, scroll or
//!    key press on the real window.

/// Application layer: streaming and event-handling use cases.
pub mod application;

/// Infrastructure layer: TCP connection, frame sources, simulators.
pub mod infrastructure;
