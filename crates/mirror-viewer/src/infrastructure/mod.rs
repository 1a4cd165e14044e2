//! Infrastructure layer for the viewer.
//!
//! Contains OS-facing adapters: the TCP listener with its reader and writer
//! threads, and configuration file storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `mirror_core`, but MUST NOT be imported by the `application` layer.

pub mod network;
pub mod storage;
