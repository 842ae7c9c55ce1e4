//! Postgres-wire driver, for native Postgres and Postgres-compatible caches.
//!
//! Turning autocommit off does not send anything by itself: like common
//! client libraries, the driver starts a transaction with `BEGIN` right
//! before the next statement executes, and again after each commit while
//! autocommit stays off. Those statements are reported through
//! [`DbDriver::drain_implicit`].

use core::mem;
use core::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgConnection, PgSslMode, PgTypeInfo};
use sqlx::{Connection, Executor};
use stmtprobe_core::sql::{number_placeholders, rewrite_batched_insert};
use stmtprobe_core::{
    BackendKind, BackendTarget, BatchCount, ConnectionFailure, DriverOptions, ListedStatement,
    ParamType, Row, TransactionMode, Value,
};

use crate::blocking::Blocking;
use crate::codec;
use crate::error::{DriverError, Phase};
use crate::statements::{StatementId, Statements};
use crate::DbDriver;

const LISTING_QUERY: &str = "SELECT name, statement FROM pg_prepared_statements";
const SESSION_QUERY: &str = "SELECT version(), current_setting('transaction_isolation')";

const fn type_info(ty: ParamType) -> PgTypeInfo {
    match ty {
        ParamType::Integer => PgTypeInfo::with_name("INT4"),
        ParamType::BigInt => PgTypeInfo::with_name("INT8"),
        ParamType::Text => PgTypeInfo::with_name("TEXT"),
        ParamType::Timestamp => PgTypeInfo::with_name("TIMESTAMP"),
    }
}

/// Whether a listed statement belongs to the harness or the backend rather
/// than to the scenario.
fn is_internal(statement: &str) -> bool {
    statement.contains("pg_prepared_statements")
}

/// Client-side transaction state of a Postgres session.
///
/// Each transition returns the statement to send, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Transaction {
    autocommit: bool,
    open: bool,
}

impl Default for Transaction {
    /// A fresh Postgres session is in autocommit.
    fn default() -> Self {
        Self {
            autocommit: true,
            open: false,
        }
    }
}

impl Transaction {
    /// The implicit `BEGIN` owed before the next statement of a
    /// non-autocommit session.
    fn before_statement(&mut self) -> Option<&'static str> {
        if self.autocommit || self.open {
            return None;
        }
        self.open = true;
        Some("BEGIN")
    }

    /// The session is outside a transaction afterwards even if `statement`
    /// fails.
    fn end(&mut self, statement: &'static str) -> Option<&'static str> {
        if !self.open {
            return None;
        }
        self.open = false;
        Some(statement)
    }

    fn set_mode(&mut self, mode: TransactionMode) -> Option<&'static str> {
        match mode {
            TransactionMode::None => {
                self.autocommit = true;
                // re-enabling autocommit commits the open transaction
                self.end("COMMIT")
            }
            TransactionMode::ExplicitBegin => {
                self.open = true;
                Some("START TRANSACTION")
            }
            TransactionMode::AutocommitOffWithExplicitCommit => {
                self.autocommit = false;
                None
            }
        }
    }
}

pub struct PostgresDriver {
    conn: PgConnection,
    blocking: Blocking,
    options: DriverOptions,
    statements: Statements,
    transaction: Transaction,
    implicit: Vec<String>,
}

impl PostgresDriver {
    fn simple(&mut self, operation: &str, sql: &str) -> Result<(), DriverError> {
        self.blocking
            .call(operation, Phase::Execute, sqlx::raw_sql(sql).execute(&mut self.conn))
            .map(|_| ())
    }

    /// Emulate the implicit `BEGIN` of a non-autocommit session.
    fn begin_if_needed(&mut self) -> Result<(), DriverError> {
        if let Some(begin) = self.transaction.before_statement() {
            self.simple("begin", begin)?;
            tracing::debug!("implicit BEGIN");
            self.implicit.push(begin.to_owned());
        }
        Ok(())
    }

    fn send(&mut self, statement: Option<&'static str>) -> Result<Vec<String>, DriverError> {
        match statement {
            Some(statement) => {
                self.simple(statement, statement)?;
                Ok(vec![statement.to_owned()])
            }
            None => Ok(Vec::new()),
        }
    }
}

impl DbDriver for PostgresDriver {
    fn connect(target: &BackendTarget, timeout: Duration) -> Result<Self, DriverError> {
        if target.kind != BackendKind::Postgres {
            return Err(DriverError::connection(
                ConnectionFailure::UnsupportedTarget,
                format!("{} is not a postgres target", target.label()),
            ));
        }
        let blocking = Blocking::new(timeout)?;
        let ssl_mode = if target.options.tls {
            PgSslMode::Prefer
        } else {
            PgSslMode::Disable
        };
        let connect_options = PgConnectOptions::new()
            .host(&target.host)
            .port(target.port)
            .username(&target.username)
            .password(&target.password)
            .database(&target.database)
            .ssl_mode(ssl_mode)
            .statement_cache_capacity(target.options.statement_cache_capacity)
            .application_name("stmtprobe");
        let conn = blocking.call(
            "connect",
            Phase::Connect,
            PgConnection::connect_with(&connect_options),
        )?;
        tracing::info!(backend = %target.label(), "connected");
        Ok(Self {
            conn,
            blocking,
            options: target.options.clone(),
            statements: Statements::default(),
            transaction: Transaction::default(),
            implicit: Vec::new(),
        })
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Postgres
    }

    fn setup(&mut self, sql: &str) -> Result<(), DriverError> {
        self.simple("setup", sql)
    }

    fn prepare(&mut self, sql: &str, params: &[ParamType]) -> Result<StatementId, DriverError> {
        let numbered = number_placeholders(sql);
        let types: Vec<PgTypeInfo> = params.iter().copied().map(type_info).collect();
        self.blocking.call(
            "prepare",
            Phase::Prepare,
            self.conn.prepare_with(&numbered, &types),
        )?;
        Ok(self.statements.register(sql, numbered, params))
    }

    fn statement_sql(&self, statement: StatementId) -> Option<&str> {
        self.statements.sql(statement)
    }

    fn query(&mut self, statement: StatementId, values: &[Value]) -> Result<Vec<Row>, DriverError> {
        self.begin_if_needed()?;
        let prepared = self.statements.get(statement)?;
        let query = codec::bind(
            sqlx::query(&prepared.sql).persistent(self.options.server_side_prepare),
            &prepared.params,
            values,
        )?;
        let rows = self
            .blocking
            .call("query", Phase::Execute, query.fetch_all(&mut self.conn))?;
        rows.iter().map(codec::decode_row).collect()
    }

    fn update(&mut self, statement: StatementId, values: &[Value]) -> Result<u64, DriverError> {
        self.begin_if_needed()?;
        let prepared = self.statements.get(statement)?;
        let query = codec::bind(
            sqlx::query(&prepared.sql).persistent(self.options.server_side_prepare),
            &prepared.params,
            values,
        )?;
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
        self.begin_if_needed()?;
        let prepared = self.statements.get(statement)?;
        let rewritten = if self.options.rewrite_batched_inserts {
            rewrite_batched_insert(&prepared.source, rows.len())
        } else {
            None
        };
        if let Some(rewritten) = rewritten {
            let sql = number_placeholders(&rewritten);
            let params = prepared.params.repeat(rows.len());
            let values = rows.concat();
            tracing::debug!(rows = rows.len(), %sql, "rewritten batch");
            let query = codec::bind(sqlx::query(&sql).persistent(false), &params, &values)?;
            self.blocking
                .call("batch", Phase::Execute, query.execute(&mut self.conn))?;
            return Ok(vec![BatchCount::CountUnknown; rows.len()]);
        }

        let mut counts = Vec::with_capacity(rows.len());
        for values in rows {
            let query = codec::bind(
                sqlx::query(&prepared.sql).persistent(self.options.server_side_prepare),
                &prepared.params,
                values,
            )?;
            let result = self
                .blocking
                .call("batch", Phase::Execute, query.execute(&mut self.conn))?;
            counts.push(BatchCount::Rows(result.rows_affected()));
        }
        Ok(counts)
    }

    fn set_transaction_mode(&mut self, mode: TransactionMode) -> Result<Vec<String>, DriverError> {
        let statement = self.transaction.set_mode(mode);
        self.send(statement)
    }

    fn commit(&mut self) -> Result<Vec<String>, DriverError> {
        let statement = self.transaction.end("COMMIT");
        self.send(statement)
    }

    fn rollback(&mut self) -> Result<Vec<String>, DriverError> {
        let statement = self.transaction.end("ROLLBACK");
        self.send(statement)
    }

    fn list_prepared(&mut self) -> Result<Vec<ListedStatement>, DriverError> {
        self.begin_if_needed()?;
        let rows = self.blocking.call(
            "list prepared statements",
            Phase::Execute,
            sqlx::raw_sql(LISTING_QUERY).fetch_all(&mut self.conn),
        )?;
        rows.iter()
            .map(|row| {
                let cells = codec::decode_row(row)?;
                let name = cells.first().map(codec::text).unwrap_or_default();
                let statement = cells.get(1).map(codec::text).unwrap_or_default();
                Ok(ListedStatement {
                    internal: is_internal(&statement),
                    name,
                    statement,
                })
            })
            .collect()
    }

    fn deallocate(&mut self, identifier: Option<&str>) -> Result<(), DriverError> {
        self.begin_if_needed()?;
        match identifier {
            Some(identifier) => self.simple("deallocate", &format!("DEALLOCATE {identifier}")),
            None => {
                self.simple("deallocate", "DEALLOCATE ALL")?;
                // the client cache still names the dropped statements
                self.blocking.call(
                    "clear statement cache",
                    Phase::Execute,
                    self.conn.clear_cached_statements(),
                )
            }
        }
    }

    fn session_info(&mut self) -> Result<Vec<(String, String)>, DriverError> {
        let rows = self.blocking.call(
            "session info",
            Phase::Execute,
            sqlx::raw_sql(SESSION_QUERY).fetch_all(&mut self.conn),
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
        mem::take(&mut self.implicit)
    }

    fn close(self) -> Result<(), DriverError> {
        let Self { conn, blocking, .. } = self;
        blocking.call("close", Phase::Execute, conn.close())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_query_is_internal() {
        assert!(is_internal(LISTING_QUERY));
        assert!(!is_internal("select name from dogs where id = $1"));
    }

    #[test]
    fn autocommit_sessions_never_begin_implicitly() {
        let mut transaction = Transaction::default();
        assert_eq!(transaction.before_statement(), None);
        assert_eq!(transaction.set_mode(TransactionMode::None), None);
        assert_eq!(transaction.before_statement(), None);
        assert_eq!(transaction.end("COMMIT"), None);
        assert_eq!(transaction.end("ROLLBACK"), None);
    }

    #[test]
    fn autocommit_off_begins_before_each_transaction() {
        let mut transaction = Transaction::default();
        assert_eq!(
            transaction.set_mode(TransactionMode::AutocommitOffWithExplicitCommit),
            None
        );
        assert_eq!(transaction.before_statement(), Some("BEGIN"));
        assert_eq!(transaction.before_statement(), None);
        assert_eq!(transaction.end("COMMIT"), Some("COMMIT"));
        // autocommit stays off: the next statement opens a new transaction
        assert_eq!(transaction.before_statement(), Some("BEGIN"));
        assert_eq!(transaction.end("ROLLBACK"), Some("ROLLBACK"));
        assert_eq!(transaction.end("ROLLBACK"), None);
    }

    #[test]
    fn leaving_autocommit_off_commits_the_open_transaction() {
        let mut transaction = Transaction::default();
        transaction.set_mode(TransactionMode::AutocommitOffWithExplicitCommit);
        assert_eq!(transaction.before_statement(), Some("BEGIN"));
        assert_eq!(transaction.set_mode(TransactionMode::None), Some("COMMIT"));
        assert_eq!(transaction.before_statement(), None);
        assert_eq!(transaction, Transaction::default());
    }

    #[test]
    fn explicit_begin_is_closed_by_commit_or_mode_none() {
        let mut transaction = Transaction::default();
        assert_eq!(
            transaction.set_mode(TransactionMode::ExplicitBegin),
            Some("START TRANSACTION")
        );
        assert_eq!(transaction.before_statement(), None);
        assert_eq!(transaction.end("COMMIT"), Some("COMMIT"));
        assert_eq!(transaction.before_statement(), None);

        transaction.set_mode(TransactionMode::ExplicitBegin);
        assert_eq!(transaction.set_mode(TransactionMode::None), Some("COMMIT"));
        assert_eq!(transaction.end("COMMIT"), None);
    }

    #[test]
    fn rejects_other_backends() {
        let target = BackendTarget::new(BackendKind::MySql, "127.0.0.1", 3306, "noria", "root", "noria")
            .unwrap();
        let error = PostgresDriver::connect(&target, Duration::from_millis(10))
            .err()
            .unwrap();
        assert_eq!(
            error.kind,
            stmtprobe_core::ErrorKind::Connection(ConnectionFailure::UnsupportedTarget)
        );
    }
}
