//! Graceful shutdown handling
//!
//! - Signal handling (SIGTERM, SIGINT)
//! - A cloneable stop signal handed to the poll loop
//! - Bounded waiting for an in-flight audit cycle

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Shutdown signal that can be cloned and shared
#[derive(Clone)]
pub struct ShutdownSignal {
    shutdown: Arc<AtomicBool>,
    watch_rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Check if shutdown has been initiated
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Wait for shutdown to be initiated
    pub async fn wait(&self) {
        let mut rx = self.watch_rx.clone();
        // A dropped coordinator also ends the wait.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

/// Owns the shutdown state and hands out [`ShutdownSignal`]s
pub struct ShutdownCoordinator {
    shutdown: Arc<AtomicBool>,
    watch_tx: watch::Sender<bool>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (watch_tx, _) = watch::channel(false);
        Self {
            shutdown: Arc::new(AtomicBool::new(false)),
            watch_tx,
        }
    }

    /// Get a shutdown signal that can be cloned
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            shutdown: self.shutdown.clone(),
            watch_rx: self.watch_tx.subscribe(),
        }
    }

    /// Initiate shutdown. Idempotent.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Initiating graceful shutdown...");
        self.watch_tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Completes when the process receives Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}

/// Poll `is_busy` until it reports idle or `timeout` elapses.
///
/// Returns `true` when drained.
pub async fn wait_for_drain<F>(is_busy: F, timeout: Duration) -> bool
where
    F: Fn() -> bool,
{
    let start = Instant::now();

    while is_busy() {
        if start.elapsed() > timeout {
            warn!(
                timeout_secs = timeout.as_secs(),
                "Timeout waiting for in-flight audit cycle"
            );
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    info!("No audit cycle in flight");
    true
}
