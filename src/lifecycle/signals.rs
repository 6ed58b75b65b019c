//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGINT (Ctrl-C) or SIGTERM
//! - Translate the first one into a [`Shutdown`] trigger
//!
//! A handler that cannot be installed is logged and never fires; the other
//! one still works.

use tokio::task::JoinHandle;

use super::Shutdown;

/// Resolves on the first SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutdown signal received");
}

/// Trigger `shutdown` when the process is asked to stop.
pub fn forward(shutdown: Shutdown) -> JoinHandle<()> {
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.trigger();
    })
}
