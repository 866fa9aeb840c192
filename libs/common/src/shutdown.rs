//! Graceful shutdown utilities
//!
//! Signal handling shared by the services: a future that resolves on Ctrl+C or
//! SIGTERM, and a cancellation token tied to it for background tasks.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Wait for shutdown signal (Ctrl+C or SIGTERM on Unix)
pub async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let term_signal = match signal(SignalKind::terminate()) {
            Ok(sig) => Some(sig),
            Err(e) => {
                warn!(
                    "Failed to install SIGTERM handler: {}. Service will only respond to Ctrl+C",
                    e
                );
                None
            },
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                if let Some(mut sig) = term_signal {
                    sig.recv().await;
                } else {
                    std::future::pending::<()>().await
                }
            } => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Create a token that is cancelled once a shutdown signal arrives
///
/// Background loops select on `token.cancelled()`; the HTTP server uses
/// `token.cancelled_owned()` as its graceful-shutdown future.
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let signal_token = token.clone();

    tokio::spawn(async move {
        tokio::select! {
            _ = wait_for_shutdown() => {
                info!("Shutdown signal received");
                signal_token.cancel();
            }
            () = signal_token.cancelled() => {}
        }
    });

    token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_cancel_releases_listener() {
        let token = shutdown_token();
        assert!(!token.is_cancelled());
        token.cancel();
        token.cancelled().await;
        assert!(token.is_cancelled());
    }
}
