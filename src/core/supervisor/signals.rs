//! Host interruption hook for the supervisor.

use tokio::signal;
use tracing::{info, warn};

/// Resolves when the host process is asked to stop: SIGINT or SIGTERM on
/// Unix, Ctrl+C elsewhere.
///
/// The handlers live only as long as the returned future, so dropping it
/// (once the child has exited) leaves nothing armed against a later process.
/// If the handlers cannot be installed the future never resolves; the
/// supervisor's child guard still kills the child when it is dropped.
pub async fn interrupt_signal() {
    if let Err(e) = wait_for_signal().await {
        warn!("Cannot install interrupt handler: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn wait_for_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT"),
            _ = sigterm.recv() => info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
