//! Frame sources.
//!
//! Screen capture itself is platform-specific; the streamer ships a source
//! that replays pre-encoded images from a directory (useful for demos and
//! soak tests) and an in-memory mock for tests.

pub mod directory;
pub mod mock;

pub use directory::DirectoryFrameSource;
pub use mock::MockFrameSource;
