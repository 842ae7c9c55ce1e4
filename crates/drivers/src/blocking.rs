//! Blocking wrappers around the async client library.

use core::future::Future;
use core::time::Duration;

use stmtprobe_core::ConnectionFailure;
use tokio::runtime::{Builder, Runtime};

use crate::error::{DriverError, Phase};

/// A single-threaded runtime owned by one connection.
pub struct Blocking {
    runtime: Runtime,
    timeout: Duration,
}

impl Blocking {
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be started.
    pub fn new(timeout: Duration) -> Result<Self, DriverError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                DriverError::connection(
                    ConnectionFailure::Unreachable,
                    format!("cannot start runtime: {e}"),
                )
            })?;
        Ok(Self { runtime, timeout })
    }

    /// Run `future` to completion, failing with a timeout error after the
    /// configured per-call limit.
    ///
    /// # Errors
    ///
    /// Returns the classified client error or a timeout.
    pub fn call<T, F>(&self, operation: &str, phase: Phase, future: F) -> Result<T, DriverError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        tracing::debug!(operation, ?phase, "backend call");
        match self
            .runtime
            .block_on(tokio::time::timeout(self.timeout, future))
        {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => {
                tracing::debug!(operation, %error, "backend call failed");
                Err(DriverError::from_sqlx(phase, &error))
            }
            Err(_elapsed) => Err(DriverError::timeout(operation, self.timeout)),
        }
    }
}
