//! Maps OS termination signals to an orderly close of the database
//! connection, then terminates the process.
//!
//! ## Signals
//! **Unix platforms:**
//! - `SIGINT` (Ctrl-C in terminal)
//! - `SIGTERM` (default kill signal, used by systemd/Kubernetes)
//! - `SIGUSR2` (restart signal used by process supervisors; handled as a
//!   plain shutdown, the supervisor respawns the process)
//!
//! **Windows platforms:**
//! - `Ctrl-C` via [`tokio::signal::ctrl_c`]

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::database::ConnectionManager;

const ARMED: u8 = 0;
const SHUTTING_DOWN: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
    Restart,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
            Self::Restart => "SIGUSR2",
        };
        f.write_str(s)
    }
}

/// Serializes signal-triggered teardown: the first signal flips the
/// coordinator from armed to shutting-down and runs `close()` exactly once;
/// any signal delivered during teardown is ignored, so overlapping signals
/// can never race a double close.
pub struct ShutdownCoordinator {
    manager: Arc<ConnectionManager>,
    state: AtomicU8,
}

impl ShutdownCoordinator {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self {
            manager,
            state: AtomicU8::new(ARMED),
        }
    }

    /// Waits for termination signals and exits the process with code `0` on
    /// a clean close or `1` when teardown failed.
    pub async fn listen(self: Arc<Self>) {
        loop {
            let signal = match wait_for_signal().await {
                Ok(signal) => signal,
                Err(e) => {
                    error!("failed to register signal handlers: {}", e);
                    return;
                }
            };

            if let Some(code) = self.shutdown(signal).await {
                std::process::exit(code);
            }
        }
    }

    /// Runs the single-flight shutdown. Returns the process exit code, or
    /// `None` when another shutdown is already in progress and this signal
    /// is ignored.
    pub async fn shutdown(&self, signal: ShutdownSignal) -> Option<i32> {
        if self
            .state
            .compare_exchange(ARMED, SHUTTING_DOWN, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("ignoring {}: shutdown already in progress", signal);
            return None;
        }

        info!("Received {}. Closing MongoDB connection...", signal);
        match self.manager.close().await {
            Ok(()) => {
                info!("MongoDB connection closed gracefully");
                Some(0)
            }
            Err(e) => {
                error!("Error during shutdown: {}", e);
                Some(1)
            }
        }
    }
}

/// Waits for the next termination signal.
///
/// Each call creates independent signal listeners.
#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<ShutdownSignal> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigusr2 = signal(SignalKind::user_defined2())?;

    let received = tokio::select! {
        _ = sigint.recv() => ShutdownSignal::Interrupt,
        _ = sigterm.recv() => ShutdownSignal::Terminate,
        _ = sigusr2.recv() => ShutdownSignal::Restart,
    };
    Ok(received)
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<ShutdownSignal> {
    tokio::signal::ctrl_c().await?;
    Ok(ShutdownSignal::Interrupt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::database::ConnectionState;

    fn manager() -> Arc<ConnectionManager> {
        Arc::new(ConnectionManager::new(DatabaseConfig {
            uri: "mongodb://localhost:27017/test".to_string(),
            connect_timeout_ms: 100,
            max_pool_size: 10,
        }))
    }

    #[tokio::test]
    async fn first_signal_closes_and_resolves_exit_code_zero() {
        let manager = manager();
        let coordinator = ShutdownCoordinator::new(manager.clone());

        let code = coordinator.shutdown(ShutdownSignal::Terminate).await;

        assert_eq!(code, Some(0));
        assert_eq!(manager.current_state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn second_signal_is_ignored_while_shutting_down() {
        let coordinator = ShutdownCoordinator::new(manager());

        assert_eq!(coordinator.shutdown(ShutdownSignal::Interrupt).await, Some(0));
        assert_eq!(coordinator.shutdown(ShutdownSignal::Terminate).await, None);
        assert_eq!(coordinator.shutdown(ShutdownSignal::Restart).await, None);
    }

    #[tokio::test]
    async fn restart_signal_takes_the_same_shutdown_path() {
        let manager = manager();
        let coordinator = ShutdownCoordinator::new(manager.clone());

        let code = coordinator.shutdown(ShutdownSignal::Restart).await;

        assert_eq!(code, Some(0));
        assert_eq!(manager.current_state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn concurrent_signals_run_exactly_one_close() {
        let coordinator = Arc::new(ShutdownCoordinator::new(manager()));

        let a = {
            let c = coordinator.clone();
            tokio::spawn(async move { c.shutdown(ShutdownSignal::Interrupt).await })
        };
        let b = {
            let c = coordinator.clone();
            tokio::spawn(async move { c.shutdown(ShutdownSignal::Terminate).await })
        };

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        // Exactly one winner resolves an exit code.
        assert!(matches!((a, b), (Some(0), None) | (None, Some(0))));
    }
}
