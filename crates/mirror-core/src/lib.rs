//! # mirror-core
//!
//! Shared library for the window-mirror transport: the wire record types and
//! the codec that turns them into bytes and back.
//!
//! Both the viewer (which accepts one TCP connection, receives window frames
//! and sends back UI events) and the desktop streamer (which connects, sends
//! frames and replays the events) depend on this crate.  It has no socket,
//! thread or UI code of its own; every decoder works on `std::io::Read`.
//!
//! # How the pieces fit (for beginners)
//!
//! - **`protocol::messages`** – Plain data: `FrameHeader`, `Frame`,
//!   `UiEvent` and the `UiEventType` codes.  The numeric codes are part of
//!   the wire format and must never be renumbered.
//!
//! - **`protocol::codec`** – Byte layout.  Frames are a length-prefixed
//!   `"window|type|len"` text header followed by the payload.  Events are a
//!   fixed 24-byte message: a `20` length prefix and five little-endian
//!   `i32` fields.

pub mod protocol;

// Re-export the most-used items so callers can write `mirror_core::UiEvent`.
pub use protocol::codec::{
    decode_event, decode_header, decode_payload, encode_event, encode_frame, ProtocolError,
};
pub use protocol::messages::{Frame, FrameHeader, UiEvent, UiEventType};
