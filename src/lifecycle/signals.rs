//! OS signal handling.
//!
//! # Responsibilities
//! - Register handlers for the configured termination signals
//! - Deliver the first observed signal as an async event
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Handlers are registered eagerly by [`listen`], before the accept loop
//!   starts, so a signal sent right after startup is never lost
//! - Non-unix targets only support Ctrl-C

use serde::{Deserialize, Serialize};
use std::fmt;

/// A process signal that triggers graceful shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum TerminationSignal {
    #[serde(rename = "SIGTERM")]
    Terminate,
    #[serde(rename = "SIGINT")]
    Interrupt,
    #[serde(rename = "SIGQUIT")]
    Quit,
    #[serde(rename = "SIGHUP")]
    Hangup,
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TerminationSignal::Terminate => "SIGTERM",
            TerminationSignal::Interrupt => "SIGINT",
            TerminationSignal::Quit => "SIGQUIT",
            TerminationSignal::Hangup => "SIGHUP",
        };
        f.write_str(name)
    }
}

/// Registered signal handlers, ready to be awaited.
pub struct SignalStream {
    #[cfg(unix)]
    streams: Vec<(TerminationSignal, tokio::signal::unix::Signal)>,
}

/// Register handlers for `signals`.
#[cfg(unix)]
pub fn listen(signals: &[TerminationSignal]) -> std::io::Result<SignalStream> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut streams = Vec::with_capacity(signals.len());
    for &sig in signals {
        let kind = match sig {
            TerminationSignal::Terminate => SignalKind::terminate(),
            TerminationSignal::Interrupt => SignalKind::interrupt(),
            TerminationSignal::Quit => SignalKind::quit(),
            TerminationSignal::Hangup => SignalKind::hangup(),
        };
        streams.push((sig, signal(kind)?));
    }
    tracing::debug!(?signals, "Shutdown signal handlers registered");
    Ok(SignalStream { streams })
}

#[cfg(not(unix))]
pub fn listen(_signals: &[TerminationSignal]) -> std::io::Result<SignalStream> {
    Ok(SignalStream {})
}

impl SignalStream {
    /// Wait for the first registered signal.
    ///
    /// With nothing registered this never completes.
    #[cfg(unix)]
    pub async fn recv(mut self) -> TerminationSignal {
        use futures_util::future::{select_all, FutureExt};

        if self.streams.is_empty() {
            return std::future::pending().await;
        }

        let waits = self
            .streams
            .iter_mut()
            .map(|(sig, stream)| {
                let sig = *sig;
                async move {
                    stream.recv().await;
                    sig
                }
                .boxed()
            })
            .collect::<Vec<_>>();

        let (sig, _, _) = select_all(waits).await;
        tracing::info!(signal = %sig, "Received shutdown signal");
        sig
    }

    #[cfg(not(unix))]
    pub async fn recv(self) -> TerminationSignal {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            return std::future::pending().await;
        }
        tracing::info!("Received Ctrl+C");
        TerminationSignal::Interrupt
    }
}
