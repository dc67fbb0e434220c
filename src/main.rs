//! Graceful HTTP server demo.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request          ┌──────────────────────────────────────────────┐
//!     ────────────────────────┼─▶ net::listener ─▶ net::connection (hyper)   │
//!                             │                          │                    │
//!                             │                          ▼                    │
//!                             │   routing::Router ─▶ http::interceptor        │
//!                             │                          │  enter / exit      │
//!                             │                          ▼                    │
//!                             │               lifecycle::barrier              │
//!                             │                          ▲                    │
//!     SIGTERM ────────────────┼─▶ lifecycle::signals ─▶ http::server          │
//!                             │     close listener → drain ⟷ timeout → exit  │
//!                             └──────────────────────────────────────────────┘
//! ```
//!
//! Routes:
//! - `/` answers immediately
//! - `/sleep/{secs}` holds the request open, for watching a drain
//! - `/panic` panics inside the handler

use std::path::PathBuf;
use std::time::Duration;

use axum::extract::Path;
use clap::Parser;

use grace::config::validation::validate_config;
use grace::config::{load_config, ConfigError, ServerConfig};
use grace::lifecycle::TerminationSignal;
use grace::observability::logging;
use grace::{GracefulServer, Router};

#[derive(Parser)]
#[command(name = "grace")]
#[command(about = "HTTP server that drains in-flight requests on SIGTERM", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, e.g. ":8080" or "127.0.0.1:3000".
    #[arg(short, long)]
    address: Option<String>,

    /// Shutdown timeout in seconds (0 = default).
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Also shut down gracefully on Ctrl-C.
    #[arg(long)]
    ctrl_c: bool,
}

async fn index() -> &'static str {
    "Hello, graceful world!\n"
}

async fn sleep(Path(secs): Path<u64>) -> String {
    tracing::info!(secs, "Slow request started");
    tokio::time::sleep(Duration::from_secs(secs)).await;
    tracing::info!(secs, "Slow request finished");
    format!("slept {}s\n", secs)
}

async fn explode() -> &'static str {
    panic!("demo handler panic")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(address) = cli.address {
        config.listener.address = address;
    }
    if let Some(timeout) = cli.timeout {
        config.shutdown.timeout_secs = timeout;
    }
    if cli.ctrl_c && !config.shutdown.signals.contains(&TerminationSignal::Interrupt) {
        config.shutdown.signals.push(TerminationSignal::Interrupt);
    }

    validate_config(&config).map_err(ConfigError::Validation)?;
    logging::init(&config.observability)?;

    tracing::info!(
        address = %config.listener.resolved_address(),
        shutdown_timeout_secs = config.shutdown.timeout().as_secs(),
        signals = ?config.shutdown.signals,
        "Configuration loaded"
    );

    let mut router = Router::default();
    router
        .handle_func("/", index)?
        .handle_func("/sleep/{secs}", sleep)?
        .handle_func("/panic", explode)?;

    GracefulServer::new(config, router).listen_and_serve().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
