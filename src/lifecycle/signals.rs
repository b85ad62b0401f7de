//! OS signal handling.
//!
//! # Responsibilities
//! - SIGINT / Ctrl+C and SIGTERM → graceful shutdown
//! - SIGHUP → configuration reload (Unix only)

use std::future::pending;

/// Resolves when the process is asked to stop.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            pending::<()>().await;
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
                pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Interrupt received, shutting down"),
        _ = terminate => tracing::info!("SIGTERM received, shutting down"),
    }
}

/// Call `on_hangup` for every SIGHUP until the process exits.
#[cfg(unix)]
pub async fn reload_on_hangup<F>(mut on_hangup: F)
where
    F: FnMut(),
{
    use tokio::signal::unix::{signal, SignalKind};
    let mut stream = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(error = %e, "Failed to install SIGHUP handler");
            return;
        }
    };
    while stream.recv().await.is_some() {
        tracing::info!("SIGHUP received, reloading configuration");
        on_hangup();
    }
}
