//! MySQL and MariaDB driver.
//!
//! Statements are always prepared server-side; there is no client-side
//! emulation to fall back to. Transaction mode changes are sent as session
//! statements, so nothing is ever issued implicitly. Batches always execute
//! row by row: the batched-insert rewrite is a Postgres-wire option.

use core::time::Duration;

use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlSslMode};
use sqlx::{Connection, Executor};
use stmtprobe_core::{
    BackendKind, BackendTarget, BatchCount, ConnectionFailure, ListedStatement,
    ParamType, Row, TransactionMode, Value,
};

use crate::blocking::Blocking;
use crate::codec;
use crate::error::{DriverError, Phase};
use crate::statements::{StatementId, Statements};
use crate::DbDriver;

const fn session_query(kind: BackendKind) -> &'static str {
    match kind {
        BackendKind::MariaDb => "SELECT version(), @@tx_isolation",
        BackendKind::MySql | BackendKind::Postgres => "SELECT version(), @@transaction_isolation",
    }
}

/// Session autocommit as last set by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Autocommit(bool);

impl Autocommit {
    /// The statement switching the session to `mode`, if it needs one.
    fn switch(&mut self, mode: TransactionMode) -> Option<&'static str> {
        match mode {
            TransactionMode::None if self.0 => None,
            TransactionMode::None => {
                self.0 = true;
                Some("SET autocommit = 1")
            }
            TransactionMode::ExplicitBegin => Some("START TRANSACTION"),
            TransactionMode::AutocommitOffWithExplicitCommit => {
                self.0 = false;
                Some("SET autocommit = 0")
            }
        }
    }
}

pub struct MySqlDriver {
    conn: MySqlConnection,
    blocking: Blocking,
    kind: BackendKind,
    statements: Statements,
    autocommit: Autocommit,
}

impl MySqlDriver {
    fn simple(&mut self, operation: &str, sql: &str) -> Result<(), DriverError> {
        self.blocking
            .call(operation, Phase::Execute, sqlx::raw_sql(sql).execute(&mut self.conn))
            .map(|_| ())
    }

    fn issue(&mut self, statement: &str) -> Result<Vec<String>, DriverError> {
        self.simple(statement, statement)?;
        Ok(vec![statement.to_owned()])
    }
}

impl DbDriver for MySqlDriver {
    fn connect(target: &BackendTarget, timeout: Duration) -> Result<Self, DriverError> {
        if target.kind == BackendKind::Postgres {
            return Err(DriverError::connection(
                ConnectionFailure::UnsupportedTarget,
                format!("{} is not a mysql-family target", target.label()),
            ));
        }
        if !target.options.server_side_prepare {
            return Err(DriverError::connection(
                ConnectionFailure::UnsupportedTarget,
                "client-side statement emulation is not available",
            ));
        }
        let blocking = Blocking::new(timeout)?;
        let ssl_mode = if target.options.tls {
            MySqlSslMode::Preferred
        } else {
            MySqlSslMode::Disabled
        };
        let connect_options = MySqlConnectOptions::new()
            .host(&target.host)
            .port(target.port)
            .username(&target.username)
            .password(&target.password)
            .database(&target.database)
            .ssl_mode(ssl_mode)
            .statement_cache_capacity(target.options.statement_cache_capacity);
        let conn = blocking.call(
            "connect",
            Phase::Connect,
            MySqlConnection::connect_with(&connect_options),
        )?;
        let mut driver = Self {
            conn,
            blocking,
            kind: target.kind,
            statements: Statements::default(),
            autocommit: Autocommit(true),
        };
        // the server default can be changed by init_connect
        driver.simple("autocommit", "SET autocommit = 1")?;
        tracing::info!(backend = %target.label(), "connected");
        Ok(driver)
    }

    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn setup(&mut self, sql: &str) -> Result<(), DriverError> {
        self.simple("setup", sql)
    }

    fn prepare(&mut self, sql: &str, params: &[ParamType]) -> Result<StatementId, DriverError> {
        self.blocking
            .call("prepare", Phase::Prepare, self.conn.prepare(sql))?;
        Ok(self.statements.register(sql, sql.to_owned(), params))
    }

    fn statement_sql(&self, statement: StatementId) -> Option<&str> {
        self.statements.sql(statement)
    }

    fn query(&mut self, statement: StatementId, values: &[Value]) -> Result<Vec<Row>, DriverError> {
        let prepared = self.statements.get(statement)?;
        let query = codec::bind(sqlx::query(&prepared.sql), &prepared.params, values)?;
        let rows = self
            .blocking
            .call("query", Phase::Execute, query.fetch_all(&mut self.conn))?;
        rows.iter().map(codec::decode_row).collect()
    }

    fn update(&mut self, statement: StatementId, values: &[Value]) -> Result<u64, DriverError> {
        let prepared = self.statements.get(statement)?;
        let query = codec::bind(sqlx::query(&prepared.sql), &prepared.params, values)?;
        let result = self
            .blocking
            .call("update", Phase::Execute, query.execute(&mut self.conn))?;
        Ok(result.rows_affected())
    }

    fn execute_batch(
        &mut self,
        statement: StatementId,
        rows: &[Vec<Value>],
    ) -> Result<Vec<BatchCount>, DriverError> {
        let prepared = self.statements.get(statement)?;
        let mut counts = Vec::with_capacity(rows.len());
        for values in rows {
            let query = codec::bind(sqlx::query(&prepared.sql), &prepared.params, values)?;
            let result = self
                .blocking
                .call("batch", Phase::Execute, query.execute(&mut self.conn))?;
            counts.push(BatchCount::Rows(result.rows_affected()));
        }
        Ok(counts)
    }

    fn set_transaction_mode(&mut self, mode: TransactionMode) -> Result<Vec<String>, DriverError> {
        match self.autocommit.switch(mode) {
            Some(statement) => self.issue(statement),
            None => Ok(Vec::new()),
        }
    }

    fn commit(&mut self) -> Result<Vec<String>, DriverError> {
        self.issue("COMMIT")
    }

    fn rollback(&mut self) -> Result<Vec<String>, DriverError> {
        self.issue("ROLLBACK")
    }

    fn list_prepared(&mut self) -> Result<Vec<ListedStatement>, DriverError> {
        Err(DriverError::unsupported("prepared-statement listing", self.kind))
    }

    fn deallocate(&mut self, _identifier: Option<&str>) -> Result<(), DriverError> {
        Err(DriverError::unsupported("DEALLOCATE of protocol-level statements", self.kind))
    }

    fn session_info(&mut self) -> Result<Vec<(String, String)>, DriverError> {
        let rows = self.blocking.call(
            "session info",
            Phase::Execute,
            sqlx::raw_sql(session_query(self.kind)).fetch_all(&mut self.conn),
        )?;
        let cells = match rows.first() {
            Some(row) => codec::decode_row(row)?,
            None => return Err(DriverError::execution("session query returned no rows")),
        };
        Ok(vec![
            (
                "server_version".to_owned(),
                cells.first().map(codec::text).unwrap_or_default(),
            ),
            (
                "transaction_isolation".to_owned(),
                cells.get(1).map(codec::text).unwrap_or_default(),
            ),
        ])
    }

    fn drain_implicit(&mut self) -> Vec<String> {
        Vec::new()
    }

    fn close(self) -> Result<(), DriverError> {
        let Self { conn, blocking, .. } = self;
        blocking.call("close", Phase::Execute, conn.close())
    }
}

#[cfg(test)]
mod tests {
    use stmtprobe_core::ErrorKind;

    use super::*;

    fn target(kind: BackendKind) -> BackendTarget {
        BackendTarget::new(kind, "127.0.0.1", 3306, "noria", "root", "noria").unwrap()
    }

    #[test]
    fn mariadb_reads_the_legacy_isolation_variable() {
        assert!(session_query(BackendKind::MariaDb).contains("@@tx_isolation"));
        assert!(session_query(BackendKind::MySql).contains("@@transaction_isolation"));
    }

    #[test]
    fn mode_none_only_restores_autocommit_after_turning_it_off() {
        let mut autocommit = Autocommit(true);
        assert_eq!(autocommit.switch(TransactionMode::None), None);
        assert_eq!(
            autocommit.switch(TransactionMode::ExplicitBegin),
            Some("START TRANSACTION")
        );
        assert_eq!(autocommit.switch(TransactionMode::None), None);
        assert_eq!(
            autocommit.switch(TransactionMode::AutocommitOffWithExplicitCommit),
            Some("SET autocommit = 0")
        );
        assert_eq!(
            autocommit.switch(TransactionMode::None),
            Some("SET autocommit = 1")
        );
        assert_eq!(autocommit.switch(TransactionMode::None), None);
        assert_eq!(autocommit, Autocommit(true));
    }

    #[test]
    fn client_side_emulation_is_rejected_before_connecting() {
        let mut target = target(BackendKind::MySql);
        target.options.server_side_prepare = false;
        let error = MySqlDriver::connect(&target, Duration::from_millis(10))
            .err()
            .unwrap();
        assert_eq!(
            error.kind,
            ErrorKind::Connection(ConnectionFailure::UnsupportedTarget)
        );
    }

    #[test]
    fn postgres_targets_are_rejected() {
        let mut target = target(BackendKind::Postgres);
        target.port = 5432;
        assert!(MySqlDriver::connect(&target, Duration::from_millis(10)).is_err());
    }
}
