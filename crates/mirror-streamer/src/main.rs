//! Window-mirror streamer entry point.
//!
//! Connects to the viewer, streams one window's frames and replays the UI
//! events that come back.
//!
//! # Usage
//!
//! ```text
//! mirror-streamer --window-id <ID> --frames-dir <DIR> [OPTIONS]
//!
//! Options:
//!   --host <IP>        Viewer address      [default: 127.0.0.1]
//!   --port <PORT>      Viewer port         [default: 9999]
//!   --fps  <N>         Capture rate        [default: 5]
//! ```
//!
//! # Architecture
//!
//! ```text
//! main()
//!  ├─ StreamerConnection::connect()  -- TCP stream + event reader task
//!  ├─ HandleEventsUseCase::run()     -- spawned; events -> simulator
//!  └─ WindowStreamer::run()          -- capture, dedupe, send until Ctrl-C
//! ```
//!
//! Capture comes from a directory of encoded images and interactions are
//! logged by [`LoggingSimulator`]; platform capture and input back ends
//! plug in behind the same traits.
//!
//! [`LoggingSimulator`]: mirror_streamer::infrastructure::interaction::LoggingSimulator

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mirror_streamer::application::handle_events::HandleEventsUseCase;
use mirror_streamer::application::stream_window::{StreamExit, WindowStreamer, DEFAULT_FPS};
use mirror_streamer::infrastructure::frame_source::DirectoryFrameSource;
use mirror_streamer::infrastructure::interaction::LoggingSimulator;
use mirror_streamer::infrastructure::network::StreamerConnection;

/// Capacity of the inbound UI event channel.
const EVENT_CHANNEL_CAPACITY: usize = 128;

/// Window-mirror streamer.
#[derive(Debug, Parser)]
#[command(name = "mirror-streamer", version)]
struct Cli {
    /// IP address of the viewer.
    #[arg(long, env = "MIRROR_HOST", default_value = "127.0.0.1")]
    host: IpAddr,

    /// TCP port the viewer listens on.
    #[arg(long, env = "MIRROR_PORT", default_value_t = 9999)]
    port: u16,

    /// Identifier of the window being streamed.
    #[arg(long, env = "MIRROR_WINDOW_ID")]
    window_id: i32,

    /// Directory of JPEG/PNG frames to stream in name order.
    #[arg(long, env = "MIRROR_FRAMES_DIR")]
    frames_dir: PathBuf,

    /// Frames captured per second.
    #[arg(long, env = "MIRROR_FPS", default_value_t = DEFAULT_FPS)]
    fps: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    info!("window-mirror streamer starting");

    let source = DirectoryFrameSource::open(&cli.frames_dir)
        .with_context(|| format!("opening frames in {}", cli.frames_dir.display()))?;
    let viewer_addr = SocketAddr::new(cli.host, cli.port);
    let (connection, events) = StreamerConnection::connect(viewer_addr, EVENT_CHANNEL_CAPACITY)
        .await
        .with_context(|| format!("connecting to viewer at {viewer_addr}"))?;

    // ── Inbound events ────────────────────────────────────────────────────────
    let handler = HandleEventsUseCase::new(LoggingSimulator::new());
    let event_task = tokio::spawn(async move { handler.run(events).await });

    // ── Outbound frames ───────────────────────────────────────────────────────
    let running = AtomicBool::new(true);
    let mut streamer = WindowStreamer::new(cli.window_id.to_string(), source, cli.fps);

    tokio::select! {
        exit = streamer.run(&connection, &running) => {
            if let StreamExit::SendFailed(e) = exit {
                warn!("viewer connection lost: {e}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            running.store(false, Ordering::Relaxed);
        }
    }

    connection.shutdown().await;
    match event_task.await {
        Ok(performed) => info!("{performed} UI events replayed"),
        Err(e) if e.is_cancelled() => {}
        Err(e) => warn!("event handler task failed: {e}"),
    }

    let stats = streamer.stats();
    info!(
        "window-mirror streamer stopped: {} frames sent, {} unchanged",
        stats.frames_sent, stats.frames_unchanged
    );
    Ok(())
}
