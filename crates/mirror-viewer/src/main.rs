//! Window-mirror viewer: headless host for the viewer-side transport.
//!
//! Listens for one desktop streamer, receives window frames on a background
//! thread and applies them on the main thread, once per tick.  A 3D host
//! would subscribe its texture uploader to the [`FrameHub`] and push UI
//! events into the [`EventOutbox`]; this binary subscribes a
//! [`WindowRegistry`] and logs what it sees.
//!
//! # Usage
//!
//! ```text
//! mirror-viewer [OPTIONS]
//!
//! Options:
//!   --config <PATH>   TOML config file [default: platform config dir]
//!   --bind   <IP>     Address to listen on (overrides the config file)
//!   --port   <PORT>   Port to listen on (overrides the config file)
//! ```
//!
//! # Architecture
//!
//! ```text
//! main()  (current-thread runtime = the consumer thread)
//!  ├─ ConnectionManager::start()
//!  │    └─ accept thread ─▶ reader thread ─▶ MainThreadDispatcher
//!  │                      writer thread ◀─ EventOutbox
//!  └─ tick loop: dispatcher.drain_and_run_once() every 1/tick_rate_hz
//! ```
//!
//! [`FrameHub`]: mirror_viewer::application::frames::FrameHub
//! [`EventOutbox`]: mirror_viewer::application::event_outbox::EventOutbox
//! [`WindowRegistry`]: mirror_viewer::application::frames::WindowRegistry

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mirror_viewer::application::dispatcher::MainThreadDispatcher;
use mirror_viewer::application::event_outbox::EventOutbox;
use mirror_viewer::application::frames::{FrameHub, WindowRegistry};
use mirror_viewer::infrastructure::network::{ConnectionManager, ConnectionState};
use mirror_viewer::infrastructure::storage::config::{load_config, load_config_from, ViewerConfig};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Window-mirror viewer.
///
/// Accepts one streamer connection, receives window frames and sends UI
/// events back.
#[derive(Debug, Parser)]
#[command(name = "mirror-viewer", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "MIRROR_VIEWER_CONFIG")]
    config: Option<PathBuf>,

    /// IP address to listen on.
    #[arg(long, env = "MIRROR_VIEWER_BIND")]
    bind: Option<String>,

    /// TCP port to listen on.
    #[arg(long, env = "MIRROR_VIEWER_PORT")]
    port: Option<u16>,
}

impl Cli {
    /// Loads the config file and applies command-line overrides.
    fn into_config(self) -> anyhow::Result<ViewerConfig> {
        let mut config = match &self.config {
            Some(path) => load_config_from(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => load_config().context("loading config")?,
        };
        if let Some(bind) = self.bind {
            config.network.bind_address = bind;
        }
        if let Some(port) = self.port {
            config.network.port = port;
        }
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Runs on a current-thread runtime so every drain happens on this thread.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.viewer.log_level)),
        )
        .init();

    info!("window-mirror viewer starting");

    let bind_addr = config.socket_addr().context("resolving bind address")?;
    let dispatcher = Arc::new(MainThreadDispatcher::new());
    dispatcher
        .bind_to_current_thread()
        .context("binding dispatcher to the main thread")?;
    let outbox = Arc::new(EventOutbox::new());
    let frames = Arc::new(FrameHub::new());
    let registry = Arc::new(WindowRegistry::new());
    frames.subscribe(registry.clone());

    let manager = ConnectionManager::new(
        bind_addr,
        Arc::clone(&dispatcher),
        Arc::clone(&outbox),
        Arc::clone(&frames),
    );
    let local = manager
        .start()
        .with_context(|| format!("starting listener on {bind_addr}"))?;
    info!("viewer ready on {local}.  Press Ctrl-C to exit.");

    // ── Tick loop ─────────────────────────────────────────────────────────────
    let mut ticker = tokio::time::interval(config.tick_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut disconnect_reported = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = dispatcher.drain_and_run_once() {
                    error!("dispatcher drain failed: {e}");
                    break;
                }
                if !disconnect_reported
                    && manager.state() == ConnectionState::Connected
                    && !manager.reader_running()
                {
                    info!("streamer stopped sending; connection will not be re-accepted");
                    disconnect_reported = true;
                }
            }
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    manager.stop();
    // Frames already handed over by the reader are still applied.
    dispatcher.drain_and_run_once().ok();

    for window_id in registry.window_ids() {
        if let Some(stats) = registry.stats(&window_id) {
            info!(
                "window {window_id}: {} frames, last {} bytes",
                stats.frames, stats.last_payload_len
            );
        }
    }
    info!("window-mirror viewer stopped");
    Ok(())
}
