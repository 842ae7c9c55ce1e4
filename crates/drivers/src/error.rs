use core::time::Duration;

use derive_more::{Display, Error};
use stmtprobe_core::{ConnectionFailure, ErrorKind};

/// Phase of a backend call, used to classify client library errors.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Phase {
    Connect,
    Prepare,
    Execute,
}

/// Errors from a backend driver.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
#[display("{kind}: {message}")]
pub struct DriverError {
    pub kind: ErrorKind,
    pub message: String,
}

impl DriverError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn connection(failure: ConnectionFailure, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection(failure), message)
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Execution, message)
    }

    #[must_use]
    pub fn timeout(operation: &str, after: Duration) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!("{operation} did not finish within {}ms", after.as_millis()),
        )
    }

    /// The backend has no surface for `operation`.
    #[must_use]
    pub fn unsupported(operation: &str, backend: impl core::fmt::Display) -> Self {
        Self::execution(format!("{operation} is not supported on {backend}"))
    }

    /// Classify a client library error raised during `phase`.
    #[must_use]
    pub fn from_sqlx(phase: Phase, error: &sqlx::Error) -> Self {
        let kind = match (phase, error) {
            (_, sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut) => {
                ErrorKind::Connection(ConnectionFailure::Unreachable)
            }
            (Phase::Connect, sqlx::Error::Tls(_)) => {
                ErrorKind::Connection(ConnectionFailure::Unreachable)
            }
            (Phase::Connect, sqlx::Error::Configuration(_)) => {
                ErrorKind::Connection(ConnectionFailure::UnsupportedTarget)
            }
            (Phase::Connect, sqlx::Error::Database(db)) => match db.code().as_deref() {
                // invalid_password, invalid_authorization_specification
                Some("28P01" | "28000") => ErrorKind::Connection(ConnectionFailure::AuthFailed),
                _ => ErrorKind::Connection(ConnectionFailure::UnsupportedTarget),
            },
            (Phase::Connect, _) => ErrorKind::Connection(ConnectionFailure::Unreachable),
            (Phase::Prepare, _) => ErrorKind::Prepare,
            (Phase::Execute, _) => ErrorKind::Execution,
        };
        Self::new(kind, error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn io_errors_are_unreachable_in_every_phase() {
        for phase in [Phase::Connect, Phase::Prepare, Phase::Execute] {
            let error = sqlx::Error::Io(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
            assert_eq!(
                DriverError::from_sqlx(phase, &error).kind,
                ErrorKind::Connection(ConnectionFailure::Unreachable)
            );
        }
    }

    #[test]
    fn statement_errors_follow_the_phase() {
        let error = sqlx::Error::Protocol("bad message".to_owned());
        assert_eq!(
            DriverError::from_sqlx(Phase::Prepare, &error).kind,
            ErrorKind::Prepare
        );
        assert_eq!(
            DriverError::from_sqlx(Phase::Execute, &error).kind,
            ErrorKind::Execution
        );
        assert_eq!(
            DriverError::from_sqlx(Phase::Connect, &error).kind,
            ErrorKind::Connection(ConnectionFailure::Unreachable)
        );
    }

    #[test]
    fn timeout_names_the_operation() {
        let error = DriverError::timeout("prepare", Duration::from_millis(250));
        assert_eq!(error.kind, ErrorKind::Timeout);
        assert_eq!(error.to_string(), "timeout: prepare did not finish within 250ms");
    }
}
