use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Result of a bounded stop of the producer or the worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The component acknowledged before the deadline.
    Clean,
    /// The deadline elapsed first; background work may still be running.
    TimedOut,
}

impl StopOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, StopOutcome::Clean)
    }
}

impl std::fmt::Display for StopOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopOutcome::Clean => write!(f, "clean"),
            StopOutcome::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Install a shutdown handler that listens for SIGTERM and SIGINT.
///
/// Returns a `CancellationToken` that is cancelled when either signal is received.
pub fn install_shutdown_handler() -> std::io::Result<CancellationToken> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, initiating graceful shutdown");
            }
        }

        token_clone.cancel();
    });

    Ok(token)
}
