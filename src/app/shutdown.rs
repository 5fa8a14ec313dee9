use tokio::signal;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal as unix_signal};
use tracing::{error, info};

/// Completes when SIGINT or SIGTERM arrives. Signal handler setup failures
/// are logged and fall back to SIGINT only.
pub async fn wait_for_signal() {
    #[cfg(unix)]
    {
        match unix_signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    result = signal::ctrl_c() => match result {
                        Ok(()) => info!("received SIGINT, initiating graceful shutdown"),
                        Err(err) => error!(error = %err, "failed to listen for SIGINT"),
                    },
                    _ = sigterm.recv() => {
                        info!("received SIGTERM, initiating graceful shutdown");
                    }
                }
            }
            Err(err) => {
                error!(error = %err, "failed to create SIGTERM handler");
                wait_for_interrupt().await;
            }
        }
    }

    #[cfg(not(unix))]
    wait_for_interrupt().await;
}

async fn wait_for_interrupt() {
    match signal::ctrl_c().await {
        Ok(()) => info!("received SIGINT, initiating graceful shutdown"),
        Err(err) => error!(error = %err, "failed to listen for SIGINT"),
    }
}
