use anyhow::{Context, Result};
use tokio::signal;

/// OS signal that ended the wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownSignal {
    CtrlC,
    #[cfg(unix)]
    Sigterm,
}

/// Wait for Ctrl+C or, on unix, SIGTERM.
///
/// # Errors
/// Returns an error if a signal handler cannot be installed.
#[cfg(unix)]
pub async fn wait_for_shutdown() -> Result<ShutdownSignal> {
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("failed to install SIGTERM handler")?;

    let signal = tokio::select! {
        result = signal::ctrl_c() => {
            result.context("failed to listen for Ctrl+C")?;
            ShutdownSignal::CtrlC
        }
        _ = sigterm.recv() => ShutdownSignal::Sigterm,
    };

    tracing::info!(?signal, "Shutdown signal received");
    Ok(signal)
}

/// Wait for Ctrl+C.
///
/// # Errors
/// Returns an error if the Ctrl+C handler cannot be installed.
#[cfg(not(unix))]
pub async fn wait_for_shutdown() -> Result<ShutdownSignal> {
    signal::ctrl_c().await.context("failed to listen for Ctrl+C")?;
    tracing::info!(signal = ?ShutdownSignal::CtrlC, "Shutdown signal received");
    Ok(ShutdownSignal::CtrlC)
}
