pub mod connection;
pub mod error;
pub mod models;

pub use connection::{ConnectionHandle, ConnectionManager, ConnectionState};
pub use error::{ConnectError, FailureCause, ShutdownError};
pub use models::Product;
