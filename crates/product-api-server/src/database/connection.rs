use mongodb::bson::doc;
use mongodb::options::{ClientOptions, ServerAddress};
use mongodb::{Client, Database};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::events::{ConnectionEvent, ConnectionObserver, ObserverSet};

use super::error::{classify, ConnectError, FailureCause, ShutdownError};

/// Database name assumed when the connection string carries no default,
/// matching driver convention.
const FALLBACK_DATABASE: &str = "test";

/// Upper bound on pool teardown so shutdown can never hang.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle of the single logical connection.
///
/// Transitions are monotonic along
/// `Disconnected -> Connecting -> {Connected | Failed} -> Closing -> Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
    Closing,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed => "failed",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Capability handle over the live connection, handed to the host
/// application for issuing queries. Valid while the manager is `Connected`.
#[derive(Clone)]
pub struct ConnectionHandle {
    client: Client,
    host: String,
    database: String,
    pool_size: u32,
}

impl ConnectionHandle {
    /// Resolved host the handshake was negotiated with.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn database_name(&self) -> &str {
        &self.database
    }

    /// Effective maximum pool size delegated to the driver.
    pub fn pool_size(&self) -> u32 {
        self.pool_size
    }

    pub fn database(&self) -> Database {
        self.client.database(&self.database)
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("host", &self.host)
            .field("database", &self.database)
            .field("pool_size", &self.pool_size)
            .finish_non_exhaustive()
    }
}

/// Owns the connection state machine. `connect()` and `close()` are the only
/// mutators; there is no ambient global connection object.
pub struct ConnectionManager {
    config: DatabaseConfig,
    state: RwLock<ConnectionState>,
    client: Mutex<Option<Client>>,
    observers: ObserverSet,
}

impl ConnectionManager {
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            state: RwLock::new(ConnectionState::Disconnected),
            client: Mutex::new(None),
            observers: ObserverSet::new(),
        }
    }

    /// Registers an observer. Must be called before the manager is shared.
    pub fn with_observer(mut self, observer: std::sync::Arc<dyn ConnectionObserver>) -> Self {
        self.observers.register(observer);
        self
    }

    pub fn current_state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Establishes the pooled connection, bounded by
    /// `connect_timeout_ms`. The timeout is enforced here rather than
    /// delegated: if it elapses before the handshake completes, the manager
    /// transitions to `Failed` and returns promptly.
    ///
    /// Legal only from `Disconnected`; calling it again while `Connected` is
    /// a programming error.
    pub async fn connect(&self) -> Result<ConnectionHandle, ConnectError> {
        {
            let mut state = self.state.write();
            if *state != ConnectionState::Disconnected {
                return Err(ConnectError::InvalidState { state: *state });
            }
            *state = ConnectionState::Connecting;
        }
        self.observers.emit(&ConnectionEvent::Connecting);

        match self.establish().await {
            Ok(handle) => {
                {
                    let mut state = self.state.write();
                    if *state != ConnectionState::Connecting {
                        // close() raced the handshake; the fresh client is
                        // dropped without ever entering service.
                        return Err(ConnectError::InvalidState { state: *state });
                    }
                    *self.client.lock() = Some(handle.client.clone());
                    *state = ConnectionState::Connected;
                }
                self.observers.emit(&ConnectionEvent::Connected {
                    host: handle.host.clone(),
                    database: handle.database.clone(),
                    pool_size: handle.pool_size,
                });
                Ok(handle)
            }
            Err((cause, message)) => {
                let still_connecting = {
                    let mut state = self.state.write();
                    if *state == ConnectionState::Connecting {
                        *state = ConnectionState::Failed;
                        true
                    } else {
                        // close() raced the attempt; leave its transition be.
                        false
                    }
                };
                if still_connecting {
                    self.observers.emit(&ConnectionEvent::Failed {
                        cause,
                        message: message.clone(),
                    });
                }
                Err(ConnectError::Failed { cause, message })
            }
        }
    }

    /// Releases pooled resources. Idempotent: invoking it while already
    /// `Closing` or `Closed` is a no-op, never an error. Teardown is bounded
    /// by [`CLOSE_TIMEOUT`]; even on failure the state ends at `Closed` so
    /// the process can terminate.
    pub async fn close(&self) -> Result<(), ShutdownError> {
        {
            let mut state = self.state.write();
            match *state {
                ConnectionState::Closing | ConnectionState::Closed => return Ok(()),
                _ => *state = ConnectionState::Closing,
            }
        }
        self.observers.emit(&ConnectionEvent::Closing);

        let client = self.client.lock().take();
        let result = match client {
            Some(client) => tokio::time::timeout(CLOSE_TIMEOUT, client.shutdown())
                .await
                .map_err(|_| ShutdownError::new("timed out releasing connection pool")),
            None => Ok(()),
        };

        *self.state.write() = ConnectionState::Closed;
        self.observers.emit(&ConnectionEvent::Closed);
        result
    }

    async fn establish(&self) -> Result<ConnectionHandle, (FailureCause, String)> {
        let timeout = Duration::from_millis(self.config.connect_timeout_ms);

        // Option parsing performs DNS resolution for SRV connection
        // strings, so it falls under the same deadline as the handshake.
        let mut options =
            match tokio::time::timeout(timeout, ClientOptions::parse(&self.config.uri)).await {
                Err(_) => {
                    return Err((
                        FailureCause::Timeout,
                        format!("resolving connection string exceeded {}ms", timeout.as_millis()),
                    ))
                }
                Ok(Err(e)) => return Err((classify(&e), e.to_string())),
                Ok(Ok(options)) => options,
            };

        options.max_pool_size = Some(self.config.max_pool_size);
        options.server_selection_timeout = Some(timeout);
        options.connect_timeout = Some(timeout);

        let database = options
            .default_database
            .clone()
            .unwrap_or_else(|| FALLBACK_DATABASE.to_string());
        let host = options
            .hosts
            .first()
            .map(|address| match address {
                ServerAddress::Tcp { host, .. } => host.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default();

        let client = Client::with_options(options).map_err(|e| (classify(&e), e.to_string()))?;

        // The driver connects lazily; a ping forces the handshake so failure
        // is observed here, under our own deadline.
        let db = client.database(&database);
        let ping = db.run_command(doc! { "ping": 1 });
        match tokio::time::timeout(timeout, ping).await {
            Err(_) => Err((
                FailureCause::Timeout,
                format!("handshake did not complete within {}ms", timeout.as_millis()),
            )),
            Ok(Err(e)) => Err((classify(&e), e.to_string())),
            Ok(Ok(_)) => Ok(ConnectionHandle {
                client,
                host,
                database,
                pool_size: self.config.max_pool_size,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ConnectionObserver;
    use std::sync::Arc;
    use std::time::Instant;

    fn config(uri: &str, timeout_ms: u64) -> DatabaseConfig {
        DatabaseConfig {
            uri: uri.to_string(),
            connect_timeout_ms: timeout_ms,
            max_pool_size: 10,
        }
    }

    struct Recorder {
        seen: parking_lot::Mutex<Vec<&'static str>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: parking_lot::Mutex::new(Vec::new()),
            })
        }

        fn kinds(&self) -> Vec<&'static str> {
            self.seen.lock().clone()
        }
    }

    impl ConnectionObserver for Recorder {
        fn on_event(&self, event: &ConnectionEvent) {
            self.seen.lock().push(event.kind());
        }
    }

    #[tokio::test]
    async fn unreachable_host_fails_within_the_configured_timeout() {
        // 192.0.2.0/24 is reserved for documentation and never routes.
        let manager = ConnectionManager::new(config("mongodb://192.0.2.1:27017/test", 150));

        let started = Instant::now();
        let err = manager.connect().await.expect_err("host must be unreachable");
        let elapsed = started.elapsed();

        assert!(
            elapsed < Duration::from_millis(1000),
            "connect() hung for {:?} past its 150ms budget",
            elapsed
        );
        assert!(matches!(
            err.cause(),
            Some(FailureCause::Timeout) | Some(FailureCause::Unreachable)
        ));
        assert_eq!(manager.current_state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn failed_connect_emits_connecting_then_failed() {
        let recorder = Recorder::new();
        let manager = ConnectionManager::new(config("mongodb://192.0.2.1:27017/test", 100))
            .with_observer(recorder.clone());

        let _ = manager.connect().await;

        assert_eq!(recorder.kinds(), vec!["connecting", "failed"]);
    }

    #[tokio::test]
    async fn connect_is_rejected_once_the_machine_has_left_disconnected() {
        let manager = ConnectionManager::new(config("mongodb://192.0.2.1:27017/test", 100));

        let _ = manager.connect().await;
        assert_eq!(manager.current_state(), ConnectionState::Failed);

        match manager.connect().await {
            Err(ConnectError::InvalidState { state }) => {
                assert_eq!(state, ConnectionState::Failed);
            }
            other => panic!("expected InvalidState, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let recorder = Recorder::new();
        let manager = ConnectionManager::new(config("mongodb://192.0.2.1:27017/test", 100))
            .with_observer(recorder.clone());

        let _ = manager.connect().await;

        manager.close().await.expect("first close succeeds");
        assert_eq!(manager.current_state(), ConnectionState::Closed);

        manager.close().await.expect("second close is a no-op");
        assert_eq!(manager.current_state(), ConnectionState::Closed);

        // The closing transition is observed exactly once.
        assert_eq!(
            recorder.kinds(),
            vec!["connecting", "failed", "closing", "closed"]
        );
    }

    #[tokio::test]
    async fn close_without_a_connection_still_reaches_closed_through_closing() {
        let recorder = Recorder::new();
        let manager =
            ConnectionManager::new(config("mongodb://localhost:27017/test", 5000))
                .with_observer(recorder.clone());

        manager.close().await.expect("nothing to release");

        assert_eq!(manager.current_state(), ConnectionState::Closed);
        assert_eq!(recorder.kinds(), vec!["closing", "closed"]);
    }

    #[tokio::test]
    async fn panicking_observer_does_not_derail_a_transition() {
        struct Panicker;
        impl ConnectionObserver for Panicker {
            fn on_event(&self, _event: &ConnectionEvent) {
                panic!("observer bug");
            }
        }

        let manager = ConnectionManager::new(config("mongodb://192.0.2.1:27017/test", 100))
            .with_observer(Arc::new(Panicker));

        let _ = manager.connect().await;
        assert_eq!(manager.current_state(), ConnectionState::Failed);

        manager.close().await.expect("close survives observer panic");
        assert_eq!(manager.current_state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn handle_reports_negotiated_settings_against_a_live_instance() {
        // Requires a local MongoDB; mirrors the startup scenario end to end.
        let manager =
            ConnectionManager::new(config("mongodb://localhost:27017/test", 5000));

        let handle = match manager.connect().await {
            Ok(handle) => handle,
            // No local instance in this environment; covered above via the
            // unreachable-host paths.
            Err(ConnectError::Failed { .. }) => return,
            Err(other) => panic!("unexpected error: {other}"),
        };

        assert_eq!(handle.host(), "localhost");
        assert_eq!(handle.database_name(), "test");
        assert_eq!(handle.pool_size(), 10);
        assert_eq!(manager.current_state(), ConnectionState::Connected);

        manager.close().await.expect("close succeeds");
        assert_eq!(manager.current_state(), ConnectionState::Closed);
    }
}
