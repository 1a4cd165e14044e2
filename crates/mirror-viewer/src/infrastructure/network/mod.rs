//! Network infrastructure for the viewer.
//!
//! # Sub-modules
//!
//! - **`connection_manager`** – Owns the listening socket, accepts exactly
//!   one streamer connection and runs the reader and writer threads until
//!   `stop()`.
//!
//! - **`frame_reader`** – The inbound loop: decode a frame header, read the
//!   payload, schedule delivery on the consumer thread.  Stops at the first
//!   error.
//!
//! - **`event_writer`** – The outbound loop: wait for a UI event in the
//!   outbox, encode it, write it.  Stops at the first write failure.

pub mod connection_manager;
pub mod event_writer;
pub mod frame_reader;

pub use connection_manager::{ConnectionManager, ConnectionState, NetworkError};
