use tracing::{error, info};

use super::event::ConnectionEvent;
use super::observer::ConnectionObserver;

/// Built-in observer implementing the diagnostic output contract: resolved
/// endpoint details on success, cause classification plus likely root causes
/// on failure, and the close lifecycle.
pub struct LogObserver;

impl ConnectionObserver for LogObserver {
    fn on_event(&self, event: &ConnectionEvent) {
        match event {
            ConnectionEvent::Connecting => {
                info!("Connecting to MongoDB...");
            }
            ConnectionEvent::Connected {
                host,
                database,
                pool_size,
            } => {
                info!("MongoDB Connected: {}", host);
                info!("Database Name: {}", database);
                info!("Connection Pool Size: {}", pool_size);
            }
            ConnectionEvent::Failed { cause, message } => {
                error!("MongoDB Connection Failed ({}): {}", cause, message);
                let hints = cause.likely_causes();
                if !hints.is_empty() {
                    error!("This typically indicates:");
                    for hint in hints {
                        error!("- {}", hint);
                    }
                }
            }
            ConnectionEvent::Closing => {
                info!("Closing MongoDB connection...");
            }
            ConnectionEvent::Closed => {
                info!("MongoDB connection closed");
            }
        }
    }
}
