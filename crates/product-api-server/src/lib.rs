//! Product store web service.
//!
//! Bootstraps a MongoDB-backed product API: configuration is loaded from the
//! environment, a pooled database connection is established under a bounded
//! timeout, HTTP routes are mounted, and OS termination signals tear the
//! connection down cleanly before the process exits.
//!
//! The core is the connection lifecycle in [`database::ConnectionManager`]:
//! an owned state machine (`Disconnected -> Connecting -> {Connected |
//! Failed} -> Closing -> Closed`) whose transitions are reported through
//! [`events::ConnectionObserver`] callbacks and whose teardown is driven by
//! [`shutdown::ShutdownCoordinator`].

pub mod config;
pub mod database;
pub mod events;
pub mod handlers;
pub mod logging;
pub mod shutdown;
pub mod utils;
