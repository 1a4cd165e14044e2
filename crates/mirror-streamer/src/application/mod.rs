//! Application layer use cases for the streamer.
//!
//! # Sub-modules
//!
//! - **`stream_window`** – Paces frame capture, drops unchanged frames and
//!   hands the rest to a [`FrameTransmitter`](stream_window::FrameTransmitter).
//!
//! - **`handle_events`** – Turns received [`UiEvent`](mirror_core::UiEvent)s
//!   into concrete interactions and passes them to an
//!   [`InteractionSimulator`](handle_events::InteractionSimulator).

pub mod handle_events;
pub mod stream_window;
