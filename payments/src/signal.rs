//! Graceful shutdown signal handling.
//!
//! [`ShutdownSignal`] watches for SIGTERM/SIGINT (Ctrl+C on other platforms)
//! and cancels a [`CancellationToken`] that the HTTP server waits on.

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

/// Cancels its token on the first shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    /// Registers the signal handlers and spawns the listener task.
    ///
    /// # Errors
    ///
    /// Returns an [`std::io::Error`] if signal registration fails.
    #[allow(clippy::unnecessary_wraps)]
    pub fn listen() -> Result<Self, std::io::Error> {
        let token = CancellationToken::new();
        let trigger = token.clone();

        #[cfg(unix)]
        {
            let mut sigterm = signal(SignalKind::terminate())?;
            let mut sigint = signal(SignalKind::interrupt())?;
            tokio::spawn(async move {
                tokio::select! {
                    _ = sigterm.recv() => tracing::info!("SIGTERM received, shutting down"),
                    _ = sigint.recv() => tracing::info!("SIGINT received, shutting down"),
                }
                trigger.cancel();
            });
        }

        #[cfg(not(unix))]
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Ctrl+C received, shutting down");
            trigger.cancel();
        });

        Ok(Self { token })
    }

    /// Resolves once a shutdown signal has been received.
    pub async fn triggered(self) {
        self.token.cancelled_owned().await;
    }
}
