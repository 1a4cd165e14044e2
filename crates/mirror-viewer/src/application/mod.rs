//! Application layer for the viewer.
//!
//! Everything here is thread-safe plumbing with no socket I/O, so it can be
//! unit-tested without a network.  The infrastructure layer feeds it bytes
//! and drains it; the host UI thread drains the dispatcher.
//!
//! # Sub-modules
//!
//! - **`event_outbox`** – FIFO of outbound UI events.  Input handlers push
//!   from the UI thread; the writer thread pops and blocks while it is empty.
//!
//! - **`dispatcher`** – Hands work from the network reader thread to the
//!   single consumer (UI) thread.  Callbacks run in FIFO order, one batch per
//!   drain.
//!
//! - **`frames`** – Subscription hub that fans decoded image frames out to
//!   registered sinks, plus a registry of the windows seen so far.

pub mod dispatcher;
pub mod event_outbox;
pub mod frames;
