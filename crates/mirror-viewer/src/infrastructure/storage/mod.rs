//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the viewer's TOML file from the platform
//! config directory (or an explicit path), falls back to defaults when the
//! file does not exist yet, and writes it back on request.

pub mod config;
