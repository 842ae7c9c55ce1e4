//! Dispatch from a [`BackendTarget`] to the driver serving its kind.

use core::time::Duration;

use stmtprobe_core::{
    BackendKind, BackendTarget, BatchCount, ListedStatement, ParamType, Row, TransactionMode, Value,
};

use crate::error::DriverError;
use crate::mysql::MySqlDriver;
use crate::postgres::PostgresDriver;
use crate::statements::StatementId;
use crate::DbDriver;

/// The driver serving a target's backend kind, chosen at connect time.
pub enum AnyDriver {
    Postgres(PostgresDriver),
    MySql(MySqlDriver),
}

macro_rules! dispatch {
    ($self:expr, $driver:ident => $call:expr) => {
        match $self {
            AnyDriver::Postgres($driver) => $call,
            AnyDriver::MySql($driver) => $call,
        }
    };
}

impl DbDriver for AnyDriver {
    fn connect(target: &BackendTarget, timeout: Duration) -> Result<Self, DriverError> {
        match target.kind {
            BackendKind::Postgres => PostgresDriver::connect(target, timeout).map(Self::Postgres),
            BackendKind::MySql | BackendKind::MariaDb => {
                MySqlDriver::connect(target, timeout).map(Self::MySql)
            }
        }
    }

    fn kind(&self) -> BackendKind {
        dispatch!(self, d => d.kind())
    }

    fn setup(&mut self, sql: &str) -> Result<(), DriverError> {
        dispatch!(self, d => d.setup(sql))
    }

    fn prepare(&mut self, sql: &str, params: &[ParamType]) -> Result<StatementId, DriverError> {
        dispatch!(self, d => d.prepare(sql, params))
    }

    fn statement_sql(&self, statement: StatementId) -> Option<&str> {
        dispatch!(self, d => d.statement_sql(statement))
    }

    fn query(&mut self, statement: StatementId, values: &[Value]) -> Result<Vec<Row>, DriverError> {
        dispatch!(self, d => d.query(statement, values))
    }

    fn update(&mut self, statement: StatementId, values: &[Value]) -> Result<u64, DriverError> {
        dispatch!(self, d => d.update(statement, values))
    }

    fn execute_batch(
        &mut self,
        statement: StatementId,
        rows: &[Vec<Value>],
    ) -> Result<Vec<BatchCount>, DriverError> {
        dispatch!(self, d => d.execute_batch(statement, rows))
    }

    fn set_transaction_mode(&mut self, mode: TransactionMode) -> Result<Vec<String>, DriverError> {
        dispatch!(self, d => d.set_transaction_mode(mode))
    }

    fn commit(&mut self) -> Result<Vec<String>, DriverError> {
        dispatch!(self, d => d.commit())
    }

    fn rollback(&mut self) -> Result<Vec<String>, DriverError> {
        dispatch!(self, d => d.rollback())
    }

    fn list_prepared(&mut self) -> Result<Vec<ListedStatement>, DriverError> {
        dispatch!(self, d => d.list_prepared())
    }

    fn deallocate(&mut self, identifier: Option<&str>) -> Result<(), DriverError> {
        dispatch!(self, d => d.deallocate(identifier))
    }

    fn session_info(&mut self) -> Result<Vec<(String, String)>, DriverError> {
        dispatch!(self, d => d.session_info())
    }

    fn drain_implicit(&mut self) -> Vec<String> {
        dispatch!(self, d => d.drain_implicit())
    }

    fn close(self) -> Result<(), DriverError> {
        dispatch!(self, d => d.close())
    }
}
