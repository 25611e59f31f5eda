use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

use super::event::ConnectionEvent;

/// Callback invoked synchronously on each connection state transition.
///
/// Implementations must not block; a panicking observer is caught and logged
/// so it can never destabilize the connection state machine.
#[cfg_attr(test, mockall::automock)]
pub trait ConnectionObserver: Send + Sync {
    fn on_event(&self, event: &ConnectionEvent);
}

/// Fans a transition out to every registered observer.
#[derive(Default)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn ConnectionObserver>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, observer: Arc<dyn ConnectionObserver>) {
        self.observers.push(observer);
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Dispatches on the caller's thread of control, preserving transition
    /// order. Observer panics are contained here.
    pub fn emit(&self, event: &ConnectionEvent) {
        for observer in &self.observers {
            let result = catch_unwind(AssertUnwindSafe(|| observer.on_event(event)));
            if result.is_err() {
                warn!(event = event.kind(), "connection observer panicked, ignoring");
            }
        }
    }
}
