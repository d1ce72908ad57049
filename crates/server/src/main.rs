// crates/server/src/main.rs
//! chattail server binary.
//!
//! Starts the Axum HTTP server, then the watch/debounce/re-read loop that
//! keeps the in-memory thread set current and pushes live updates to
//! subscribers.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use chattail_server::{create_app, watcher, AppState, ServerConfig};

/// Default port for the server.
const DEFAULT_PORT: u16 = 47721;

#[derive(Debug, Parser)]
#[command(name = "chattail", version, about = "Browse conversation logs with live updates")]
struct Cli {
    /// Root directory to watch for session logs (repeatable).
    /// Defaults to ~/.chattail/projects.
    #[arg(long = "root", value_name = "DIR")]
    roots: Vec<PathBuf>,

    /// Port to listen on.
    #[arg(long, env = "CHATTAIL_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Debounce window for bursts of writes to one log file, in milliseconds.
    #[arg(long, default_value_t = 500)]
    debounce_ms: u64,

    /// Window within which repeated hook deliveries collapse, in seconds.
    #[arg(long, default_value_t = 5)]
    dedup_window_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .compact()
        .init();

    let roots = if cli.roots.is_empty() {
        chattail_server::state::default_roots()
    } else {
        cli.roots
    };
    if roots.is_empty() {
        anyhow::bail!("No watch roots configured and no home directory found");
    }

    let config = ServerConfig {
        roots,
        debounce: Duration::from_millis(cli.debounce_ms),
        dedup_window: Duration::from_secs(cli.dedup_window_secs),
    };
    tracing::info!(
        roots = ?config.roots,
        debounce_ms = cli.debounce_ms,
        dedup_window_secs = cli.dedup_window_secs,
        "Starting chattail v{}",
        env!("CARGO_PKG_VERSION")
    );

    let state = AppState::new(config);
    let app = create_app(state.clone());

    // The watcher owns the thread store's write side for the process lifetime.
    tokio::spawn(watcher::run(state));

    let addr = SocketAddr::from(([127, 0, 0, 1], cli.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Listening");

    axum::serve(listener, app).await?;

    Ok(())
}
