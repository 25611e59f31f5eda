use std::fmt;
use thiserror::Error;

use super::connection::ConnectionState;

/// Classification of why a connection attempt failed. Drives the diagnostic
/// hints emitted on startup failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCause {
    Timeout,
    Unreachable,
    Unauthorized,
    Unknown,
}

impl FailureCause {
    /// Likely root causes to surface alongside the failure.
    pub fn likely_causes(&self) -> &'static [&'static str] {
        match self {
            Self::Timeout | Self::Unreachable => &[
                "network connectivity issues",
                "incorrect connection string",
                "MongoDB service not running",
                "firewall blocking connection",
            ],
            Self::Unauthorized => &[
                "invalid credentials",
                "user not defined on the authentication database",
            ],
            Self::Unknown => &[],
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Timeout => "timeout",
            Self::Unreachable => "unreachable",
            Self::Unauthorized => "unauthorized",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum ConnectError {
    /// The connection attempt itself failed. Fatal for startup; the cause
    /// classification is surfaced for diagnostics.
    #[error("MongoDB connection failed ({cause}): {message}")]
    Failed { cause: FailureCause, message: String },

    /// `connect()` was invoked in a state that forbids it. A defect in the
    /// caller, not a runtime condition to recover from.
    #[error("connect() is not allowed while connection is {state}")]
    InvalidState { state: ConnectionState },
}

impl ConnectError {
    pub fn cause(&self) -> Option<FailureCause> {
        match self {
            Self::Failed { cause, .. } => Some(*cause),
            Self::InvalidState { .. } => None,
        }
    }
}

/// Failure while releasing pooled resources during `close()`. Reported and
/// mapped to a non-zero exit code, but never prevents process termination.
#[derive(Debug, Error)]
#[error("shutdown failed: {message}")]
pub struct ShutdownError {
    message: String,
}

impl ShutdownError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Maps a driver error onto the failure taxonomy.
pub(crate) fn classify(err: &mongodb::error::Error) -> FailureCause {
    use mongodb::error::ErrorKind;

    match err.kind.as_ref() {
        ErrorKind::Authentication { .. } => FailureCause::Unauthorized,
        ErrorKind::ServerSelection { message, .. } => {
            if message.contains("timed out") || message.contains("timeout") {
                FailureCause::Timeout
            } else {
                FailureCause::Unreachable
            }
        }
        ErrorKind::DnsResolve { .. } | ErrorKind::Io(_) => FailureCause::Unreachable,
        ErrorKind::Command(command) if command.code_name == "AuthenticationFailed" => {
            FailureCause::Unauthorized
        }
        _ => FailureCause::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_and_unreachable_share_the_diagnostic_hint_list() {
        assert_eq!(
            FailureCause::Timeout.likely_causes(),
            FailureCause::Unreachable.likely_causes()
        );
        assert!(FailureCause::Timeout
            .likely_causes()
            .contains(&"MongoDB service not running"));
    }

    #[test]
    fn unknown_cause_has_no_hints() {
        assert!(FailureCause::Unknown.likely_causes().is_empty());
    }

    #[test]
    fn connect_error_exposes_its_cause() {
        let err = ConnectError::Failed {
            cause: FailureCause::Timeout,
            message: "server selection timed out".to_string(),
        };
        assert_eq!(err.cause(), Some(FailureCause::Timeout));

        let err = ConnectError::InvalidState {
            state: ConnectionState::Connected,
        };
        assert_eq!(err.cause(), None);
    }

    #[test]
    fn display_includes_cause_classification() {
        let err = ConnectError::Failed {
            cause: FailureCause::Unreachable,
            message: "connection refused".to_string(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("unreachable"));
        assert!(rendered.contains("connection refused"));
    }
}
