//! ConnectionManager: owns the viewer's single streamer connection.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──start()──▶ Listening ──accept──▶ Connected
//!   │                   │                     │
//!   └──────────────── stop() ─────────────────┴──▶ Closed
//! ```
//!
//! `start()` binds the listening socket and spawns the accept thread.  The
//! accept thread takes exactly one connection and then spawns two threads
//! bound to it: the frame reader and the event writer.  Accept is never
//! re-armed; the listening socket stays open (so later connection attempts
//! queue up unanswered) until `stop()`.
//!
//! # Threads (for beginners)
//!
//! All socket I/O here is blocking and runs on dedicated OS threads, not on
//! the Tokio runtime:
//!
//! - **accept** – polls a non-blocking listener every few milliseconds so it
//!   can notice the cancellation flag.
//! - **reader** – blocks in `read` until a frame arrives.  Decoded frames are
//!   handed to the dispatcher, never to consumers directly.
//! - **writer** – blocks on the outbox condition variable until an event is
//!   pushed.
//!
//! # Shutdown
//!
//! `stop()` sets the shared cancellation flag, joins the accept thread,
//! closes the listener, shuts the connected socket down in both directions
//! (which makes a blocked `read` return), closes the outbox (which wakes the
//! writer) and joins the reader and writer.  It is idempotent and is also
//! called on drop.
//!
//! Without `stop()`, each loop ends only on its own error (fail-stop): a
//! malformed header or a peer disconnect ends the reader, a write failure ends
//! the writer.  A silent peer blocks the reader indefinitely.

use std::fmt;
use std::io::BufReader;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::event_writer::{run_event_writer, WriterExit};
use super::frame_reader::{run_frame_reader, ReaderExit};
use crate::application::dispatcher::MainThreadDispatcher;
use crate::application::event_outbox::EventOutbox;
use crate::application::frames::FrameHub;

/// How long the accept thread sleeps between polls of the listener.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Error type for connection management operations.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: ConnectionState,
    },

    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}

/// Observable lifecycle state of a [`ConnectionManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Listening,
    Connected,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Listening => "listening",
            ConnectionState::Connected => "connected",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

#[derive(Default)]
struct Session {
    listener: Option<TcpListener>,
    stream: Option<TcpStream>,
    local_addr: Option<SocketAddr>,
    peer_addr: Option<SocketAddr>,
    connection_id: Option<Uuid>,
}

#[derive(Default)]
struct Threads {
    accept: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<ReaderExit>>,
    writer: Option<JoinHandle<WriterExit>>,
}

/// State shared between the manager and its background threads.
///
/// Lock order: `state`, then `session`, then `threads`.
struct Shared {
    state: Mutex<ConnectionState>,
    cancel: AtomicBool,
    session: Mutex<Session>,
    threads: Mutex<Threads>,
}

/// Everything the accept thread needs to start a session.
struct AcceptContext {
    shared: Arc<Shared>,
    dispatcher: Arc<MainThreadDispatcher>,
    outbox: Arc<EventOutbox>,
    frames: Arc<FrameHub>,
}

/// Accepts one streamer connection and runs its reader and writer threads.
pub struct ConnectionManager {
    bind_addr: SocketAddr,
    dispatcher: Arc<MainThreadDispatcher>,
    outbox: Arc<EventOutbox>,
    frames: Arc<FrameHub>,
    shared: Arc<Shared>,
}

impl ConnectionManager {
    /// Creates an idle manager.  Nothing is bound until [`start`].
    ///
    /// [`start`]: ConnectionManager::start
    pub fn new(
        bind_addr: SocketAddr,
        dispatcher: Arc<MainThreadDispatcher>,
        outbox: Arc<EventOutbox>,
        frames: Arc<FrameHub>,
    ) -> Self {
        Self {
            bind_addr,
            dispatcher,
            outbox,
            frames,
            shared: Arc::new(Shared {
                state: Mutex::new(ConnectionState::Idle),
                cancel: AtomicBool::new(false),
                session: Mutex::new(Session::default()),
                threads: Mutex::new(Threads::default()),
            }),
        }
    }

    /// Binds the listening socket and starts waiting for the streamer.
    ///
    /// Returns the bound address (useful when binding port 0).
    ///
    /// # Errors
    ///
    /// - [`NetworkError::InvalidState`] unless the manager is `Idle`.
    /// - [`NetworkError::BindFailed`] if the address cannot be bound; the
    ///   manager stays `Idle`.
    /// - [`NetworkError::Spawn`] if the accept thread cannot be created.
    pub fn start(&self) -> Result<SocketAddr, NetworkError> {
        let mut state = lock(&self.shared.state);
        if *state != ConnectionState::Idle {
            return Err(NetworkError::InvalidState {
                operation: "start",
                state: *state,
            });
        }

        let addr = self.bind_addr;
        let bind_failed = |source| NetworkError::BindFailed { addr, source };
        let listener = TcpListener::bind(addr).map_err(bind_failed)?;
        listener.set_nonblocking(true).map_err(bind_failed)?;
        let local = listener.local_addr().map_err(bind_failed)?;

        let ctx = AcceptContext {
            shared: Arc::clone(&self.shared),
            dispatcher: Arc::clone(&self.dispatcher),
            outbox: Arc::clone(&self.outbox),
            frames: Arc::clone(&self.frames),
        };
        let handle = thread::Builder::new()
            .name("mirror-accept".to_string())
            .spawn(move || accept_loop(listener, ctx))
            .map_err(|source| NetworkError::Spawn {
                name: "accept",
                source,
            })?;

        lock(&self.shared.session).local_addr = Some(local);
        lock(&self.shared.threads).accept = Some(handle);
        *state = ConnectionState::Listening;
        info!("listening for a streamer on {local}");
        Ok(local)
    }

    /// Tears everything down and joins all background threads.
    ///
    /// Safe to call in any state and more than once.
    pub fn stop(&self) {
        if self.shared.cancel.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("stopping connection manager");

        // Once the accept thread is gone no new session can appear.
        let accept = lock(&self.shared.threads).accept.take();
        join_logged("accept", accept);

        let (listener, stream, connection_id) = {
            let mut session = lock(&self.shared.session);
            (
                session.listener.take(),
                session.stream.take(),
                session.connection_id,
            )
        };
        drop(listener);
        if let Some(stream) = stream {
            if let Err(e) = stream.shutdown(Shutdown::Both) {
                debug!("socket shutdown: {e}");
            }
        }

        let discarded = self.outbox.close();
        if discarded > 0 {
            debug!("discarded {discarded} unsent events");
        }

        let (reader, writer) = {
            let mut threads = lock(&self.shared.threads);
            (threads.reader.take(), threads.writer.take())
        };
        if let Some(exit) = join_logged("reader", reader) {
            debug!("reader delivered {} frames", exit.frames_received);
        }
        if let Some(exit) = join_logged("writer", writer) {
            debug!("writer sent {} events", exit.events_sent);
        }

        *lock(&self.shared.state) = ConnectionState::Closed;
        match connection_id {
            Some(id) => info!("connection {id} closed"),
            None => info!("listener closed without a connection"),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *lock(&self.shared.state)
    }

    /// The bound listening address, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        lock(&self.shared.session).local_addr
    }

    /// The streamer's address, once connected.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        lock(&self.shared.session).peer_addr
    }

    /// Identifier attached to this connection's log lines.
    pub fn connection_id(&self) -> Option<Uuid> {
        lock(&self.shared.session).connection_id
    }

    /// `true` while the reader thread exists and has not exited.
    pub fn reader_running(&self) -> bool {
        lock(&self.shared.threads)
            .reader
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// `true` while the writer thread exists and has not exited.
    pub fn writer_running(&self) -> bool {
        lock(&self.shared.threads)
            .writer
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Background threads ────────────────────────────────────────────────────────

/// Waits for one connection, then hands it to [`start_session`].
fn accept_loop(listener: TcpListener, ctx: AcceptContext) {
    let (stream, peer) = loop {
        if ctx.shared.cancel.load(Ordering::Acquire) {
            debug!("accept cancelled");
            return;
        }
        match listener.accept() {
            Ok(pair) => break pair,
            Err(e) if is_retryable(&e) => thread::sleep(ACCEPT_POLL_INTERVAL),
            Err(e) => {
                error!("accept failed: {e}");
                return;
            }
        }
    };

    let connection_id = Uuid::new_v4();
    info!("streamer connected from {peer} (connection {connection_id})");
    if let Err(e) = start_session(&ctx, listener, stream, peer, connection_id) {
        error!("connection {connection_id}: {e}");
        if let Some(stream) = lock(&ctx.shared.session).stream.as_ref() {
            stream.shutdown(Shutdown::Both).ok();
        }
    }
}

fn start_session(
    ctx: &AcceptContext,
    listener: TcpListener,
    stream: TcpStream,
    peer: SocketAddr,
    connection_id: Uuid,
) -> Result<(), NetworkError> {
    let mut state = lock(&ctx.shared.state);
    if ctx.shared.cancel.load(Ordering::Acquire) {
        return Ok(());
    }

    // Accepted sockets may inherit the listener's non-blocking mode.
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true).ok();
    let read_half = stream.try_clone()?;
    let write_half = stream.try_clone()?;

    {
        let mut session = lock(&ctx.shared.session);
        session.listener = Some(listener);
        session.stream = Some(stream);
        session.peer_addr = Some(peer);
        session.connection_id = Some(connection_id);
    }
    *state = ConnectionState::Connected;

    let reader = {
        let dispatcher = Arc::clone(&ctx.dispatcher);
        let frames = Arc::clone(&ctx.frames);
        let shared = Arc::clone(&ctx.shared);
        thread::Builder::new()
            .name("mirror-reader".to_string())
            .spawn(move || {
                run_frame_reader(BufReader::new(read_half), &dispatcher, &frames, &shared.cancel)
            })
            .map_err(|source| NetworkError::Spawn {
                name: "reader",
                source,
            })?
    };
    lock(&ctx.shared.threads).reader = Some(reader);

    let writer = {
        let outbox = Arc::clone(&ctx.outbox);
        thread::Builder::new()
            .name("mirror-writer".to_string())
            .spawn(move || run_event_writer(write_half, &outbox))
            .map_err(|source| NetworkError::Spawn {
                name: "writer",
                source,
            })?
    };
    lock(&ctx.shared.threads).writer = Some(writer);

    debug!("connection {connection_id}: reader and writer started");
    Ok(())
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn join_logged<T>(name: &str, handle: Option<JoinHandle<T>>) -> Option<T> {
    match handle?.join() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("{name} thread panicked");
            None
        }
    }
}

/// Returns `true` for accept errors that should just be polled again.
fn is_retryable(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock
            | std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::Interrupted
            | std::io::ErrorKind::ConnectionAborted
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn make_manager(addr: SocketAddr) -> ConnectionManager {
        ConnectionManager::new(
            addr,
            Arc::new(MainThreadDispatcher::new()),
            Arc::new(EventOutbox::new()),
            Arc::new(FrameHub::new()),
        )
    }

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_new_manager_is_idle() {
        let manager = make_manager(loopback());
        assert_eq!(manager.state(), ConnectionState::Idle);
        assert_eq!(manager.local_addr(), None);
        assert!(!manager.reader_running());
    }

    #[test]
    fn test_start_binds_and_reports_listening() {
        // Arrange
        let manager = make_manager(loopback());

        // Act
        let addr = manager.start().expect("start must succeed");

        // Assert
        assert_ne!(addr.port(), 0);
        assert_eq!(manager.local_addr(), Some(addr));
        assert_eq!(manager.state(), ConnectionState::Listening);
    }

    #[test]
    fn test_start_twice_is_invalid_state() {
        let manager = make_manager(loopback());
        manager.start().unwrap();

        let result = manager.start();

        assert!(matches!(
            result,
            Err(NetworkError::InvalidState {
                state: ConnectionState::Listening,
                ..
            })
        ));
    }

    #[test]
    fn test_start_on_occupied_port_is_bind_failed() {
        // Arrange
        let blocker = TcpListener::bind(loopback()).unwrap();
        let manager = make_manager(blocker.local_addr().unwrap());

        // Act
        let result = manager.start();

        // Assert
        assert!(matches!(result, Err(NetworkError::BindFailed { .. })));
        assert_eq!(manager.state(), ConnectionState::Idle);
    }

    #[test]
    fn test_stop_is_idempotent_and_closes() {
        let manager = make_manager(loopback());
        manager.start().unwrap();

        manager.stop();
        manager.stop();

        assert_eq!(manager.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_stop_before_start_closes_and_blocks_start() {
        let manager = make_manager(loopback());
        manager.stop();

        assert_eq!(manager.state(), ConnectionState::Closed);
        assert!(matches!(
            manager.start(),
            Err(NetworkError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_accepting_a_client_moves_to_connected() {
        // Arrange
        let manager = make_manager(loopback());
        let addr = manager.start().unwrap();

        // Act
        let client = TcpStream::connect(addr).unwrap();

        // Assert
        assert!(wait_until(|| manager.state() == ConnectionState::Connected));
        assert_eq!(manager.peer_addr(), Some(client.local_addr().unwrap()));
        assert!(manager.connection_id().is_some());
        assert!(wait_until(|| manager.reader_running() && manager.writer_running()));
    }

    #[test]
    fn test_stop_unblocks_reader_waiting_on_silent_peer() {
        // Arrange
        let manager = make_manager(loopback());
        let addr = manager.start().unwrap();
        let _client = TcpStream::connect(addr).unwrap();
        assert!(wait_until(|| manager.reader_running()));

        // Act
        let started = Instant::now();
        manager.stop();

        // Assert
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!manager.reader_running());
        assert!(!manager.writer_running());
        assert_eq!(manager.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Listening.to_string(), "listening");
        assert_eq!(ConnectionState::Closed.to_string(), "closed");
    }
}
