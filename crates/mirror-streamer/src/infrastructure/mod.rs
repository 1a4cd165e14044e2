//! Infrastructure layer: adapters behind the application-layer traits.

pub mod frame_source;
pub mod interaction;
pub mod network;
