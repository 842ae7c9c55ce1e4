//! Backend connectors and the scenario runner.
//!
//! Each backend family implements [`DbDriver`]: a blocking, single-session
//! view over one `sqlx` connection with autocommit forced on at connect
//! time. The [`runner`] drives a [`Scenario`](stmtprobe_core::Scenario)
//! through any [`DbDriver`] and records a
//! [`RunResult`](stmtprobe_core::RunResult).

use core::time::Duration;

use stmtprobe_core::{
    BackendKind, BackendTarget, BatchCount, ListedStatement, ParamType, Row, TransactionMode, Value,
};

pub mod any;
pub mod blocking;
pub mod codec;
pub mod error;
pub mod mysql;
pub mod postgres;
pub mod runner;
pub mod statements;

pub use any::AnyDriver;
pub use error::{DriverError, Phase};
pub use runner::{run, run_against};
pub use statements::StatementId;

/// One open session to a backend.
///
/// Scenario SQL uses `?` placeholders; drivers adapt it to their backend.
/// Every call is bounded by the per-call timeout given to
/// [`connect`](Self::connect).
pub trait DbDriver {
    /// Open a session to `target` and force autocommit on.
    ///
    /// # Errors
    ///
    /// Returns a connection error if the backend is unreachable, rejects the
    /// credentials, or the target is not one this driver serves.
    fn connect(target: &BackendTarget, timeout: Duration) -> Result<Self, DriverError>
    where
        Self: Sized;

    fn kind(&self) -> BackendKind;

    /// Run fixture SQL over the simple protocol.
    ///
    /// # Errors
    ///
    /// Returns an execution error if the backend rejects the statement.
    fn setup(&mut self, sql: &str) -> Result<(), DriverError>;

    /// Prepare a server-side statement.
    ///
    /// # Errors
    ///
    /// Returns a prepare error if the backend rejects the text or arity.
    fn prepare(&mut self, sql: &str, params: &[ParamType]) -> Result<StatementId, DriverError>;

    /// Statement text as sent to the backend.
    fn statement_sql(&self, statement: StatementId) -> Option<&str>;

    /// Execute a prepared query and drain every row.
    ///
    /// # Errors
    ///
    /// Returns an execution error if the backend fails the statement.
    fn query(&mut self, statement: StatementId, values: &[Value]) -> Result<Vec<Row>, DriverError>;

    /// Execute a prepared update and return the affected-row count.
    ///
    /// # Errors
    ///
    /// Returns an execution error if the backend fails the statement.
    fn update(&mut self, statement: StatementId, values: &[Value]) -> Result<u64, DriverError>;

    /// Execute queued bindings as one batch, returning one count per row.
    ///
    /// # Errors
    ///
    /// Returns an execution error if any row fails.
    fn execute_batch(
        &mut self,
        statement: StatementId,
        rows: &[Vec<Value>],
    ) -> Result<Vec<BatchCount>, DriverError>;

    /// Switch transaction mode, returning the statements sent to do so.
    ///
    /// # Errors
    ///
    /// Returns an execution error if a boundary statement fails.
    fn set_transaction_mode(&mut self, mode: TransactionMode) -> Result<Vec<String>, DriverError>;

    /// # Errors
    ///
    /// Returns an execution error if the commit fails.
    fn commit(&mut self) -> Result<Vec<String>, DriverError>;

    /// # Errors
    ///
    /// Returns an execution error if the rollback fails.
    fn rollback(&mut self) -> Result<Vec<String>, DriverError>;

    /// Live prepared statements in the order the backend returns them.
    ///
    /// # Errors
    ///
    /// Returns an execution error if the backend has no listing surface.
    fn list_prepared(&mut self) -> Result<Vec<ListedStatement>, DriverError>;

    /// Send `DEALLOCATE <identifier>`, or `DEALLOCATE ALL` for `None`.
    ///
    /// # Errors
    ///
    /// Returns an execution error if the backend rejects the identifier.
    fn deallocate(&mut self, identifier: Option<&str>) -> Result<(), DriverError>;

    /// Server version and transaction isolation level.
    ///
    /// # Errors
    ///
    /// Returns an execution error if the session query fails.
    fn session_info(&mut self) -> Result<Vec<(String, String)>, DriverError>;

    /// Statements the client layer issued on its own since the last call.
    fn drain_implicit(&mut self) -> Vec<String>;

    /// # Errors
    ///
    /// Returns an error if the session does not close cleanly.
    fn close(self) -> Result<(), DriverError>
    where
        Self: Sized;
}
