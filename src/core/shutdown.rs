//! Shutdown Coordination
//!
//! Signal handling plus a cloneable [`ShutdownSignal`] that in-flight work can
//! await to abort promptly when the process is asked to stop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Coordinates graceful shutdown across the application
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<()>,
    shutdown_requested: Arc<AtomicBool>,
}

/// Read side of the coordinator, cheap to clone into every scan context
#[derive(Clone, Debug)]
pub struct ShutdownSignal {
    shutdown_tx: broadcast::Sender<()>,
    shutdown_requested: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(8);
        Self {
            shutdown_tx,
            shutdown_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Hand out a signal that resolves once shutdown is triggered
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            shutdown_tx: self.shutdown_tx.clone(),
            shutdown_requested: self.shutdown_requested.clone(),
        }
    }

    pub fn trigger_shutdown(&self) {
        // Release pairs with the Acquire load in is_shutdown_requested
        self.shutdown_requested.store(true, Ordering::Release);
        let _ = self.shutdown_tx.send(());
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Acquire)
    }

    /// Install SIGINT/SIGTERM/SIGHUP/SIGQUIT handlers (ctrl-c elsewhere)
    ///
    /// The first signal triggers a graceful shutdown; a second one exits
    /// immediately with status 130. Must be called inside a tokio runtime.
    pub fn install_signal_handlers(&self) {
        setup_signal_handlers(self.shutdown_tx.clone(), self.shutdown_requested.clone());
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    /// A signal that never fires, for contexts without a coordinator
    pub fn never() -> Self {
        ShutdownCoordinator::new().signal()
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Acquire)
    }

    /// Resolve once shutdown has been requested
    pub async fn cancelled(&self) {
        // Subscribe before checking the flag so a trigger in between is not missed
        let mut rx = self.shutdown_tx.subscribe();
        if self.is_shutdown_requested() {
            return;
        }
        loop {
            match rx.recv().await {
                Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => return,
                Err(broadcast::error::RecvError::Closed) => {
                    // Coordinator gone without triggering: never resolves
                    std::future::pending::<()>().await;
                }
            }
        }
    }
}

fn setup_signal_handlers(shutdown_tx: broadcast::Sender<()>, shutdown_requested: Arc<AtomicBool>) {
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }

        use std::sync::atomic::AtomicUsize;
        use tokio::signal::unix::{signal, SignalKind};
        let signal_count = Arc::new(AtomicUsize::new(0));
        let signals = [
            SignalKind::interrupt(),
            SignalKind::terminate(),
            SignalKind::hangup(),
            SignalKind::quit(),
        ];

        for kind in signals {
            let tx = shutdown_tx.clone();
            let requested = shutdown_requested.clone();
            let sig_ctr = signal_count.clone();

            tokio::spawn(async move {
                if let Ok(mut sig) = signal(kind) {
                    while sig.recv().await.is_some() {
                        let prev = sig_ctr.fetch_add(1, Ordering::AcqRel);
                        requested.store(true, Ordering::Release);
                        let _ = tx.send(());
                        if prev >= 1 {
                            log::warn!("Second shutdown signal received; exiting");
                            std::process::exit(130);
                        }
                        log::warn!("Shutdown requested; remaining images will be marked failed");
                    }
                }
            });
        }
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown_requested.store(true, Ordering::Release);
                let _ = shutdown_tx.send(());
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_shutdown_coordinator_creation() {
        let coordinator = ShutdownCoordinator::new();
        assert!(!coordinator.is_shutdown_requested());
        assert!(!coordinator.signal().is_shutdown_requested());
    }

    #[tokio::test]
    async fn test_signal_resolves_after_trigger() {
        let coordinator = ShutdownCoordinator::new();
        let signal = coordinator.signal();

        let waiter = tokio::spawn(async move { signal.cancelled().await });
        tokio::task::yield_now().await;
        coordinator.trigger_shutdown();

        let result = timeout(Duration::from_millis(500), waiter).await;
        assert!(result.is_ok(), "cancelled() should resolve after trigger");
        assert!(coordinator.is_shutdown_requested());
    }

    #[tokio::test]
    async fn test_signal_resolves_immediately_when_already_triggered() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.trigger_shutdown();

        let signal = coordinator.signal();
        let result = timeout(Duration::from_millis(100), signal.cancelled()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_never_signal_stays_pending() {
        let signal = ShutdownSignal::never();
        let result = timeout(Duration::from_millis(20), signal.cancelled()).await;
        assert!(result.is_err(), "never() must not resolve");
        assert!(!signal.is_shutdown_requested());
    }
}
