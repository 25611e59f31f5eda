mod event;
mod log;
mod observer;

pub use event::ConnectionEvent;
pub use log::LogObserver;
pub use observer::{ConnectionObserver, ObserverSet};

#[cfg(test)]
pub use observer::MockConnectionObserver;
