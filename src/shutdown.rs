//! Graceful Shutdown Handling
//!
//! Listens for SIGTERM/SIGINT and broadcasts a shutdown signal. The dispatch
//! loop reacts by closing its listening sockets and draining active sessions
//! within the configured timeout.

use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::Result;

/// Shutdown coordinator that fans a single signal out to listeners
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<()>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self { shutdown_tx }
    }

    /// Get a shutdown receiver for components to listen on
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Trigger shutdown without a signal (tests, fatal errors)
    pub fn trigger(&self) {
        if self.shutdown_tx.send(()).is_err() {
            warn!("Shutdown triggered with no listeners");
        }
    }

    /// Block until SIGTERM/SIGINT arrives, then broadcast shutdown
    pub async fn listen_for_signals(&self) -> Result<()> {
        #[cfg(unix)]
        {
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
            let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, initiating graceful shutdown");
                }
            }
        }

        #[cfg(windows)]
        {
            signal::ctrl_c().await?;
            info!("Received Ctrl+C, initiating graceful shutdown");
        }

        self.trigger();
        Ok(())
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_reaches_subscribers() {
        let coordinator = ShutdownCoordinator::new();
        let mut rx = coordinator.subscribe();

        coordinator.trigger();
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_trigger() {
        let coordinator = ShutdownCoordinator::new();
        let mut early = coordinator.subscribe();
        coordinator.trigger();
        early.recv().await.unwrap();

        let mut late = coordinator.subscribe();
        coordinator.trigger();
        assert!(late.recv().await.is_ok());
    }
}
