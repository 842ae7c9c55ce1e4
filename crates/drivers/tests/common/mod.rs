//! An in-memory `DbDriver` understanding the statements the built-in
//! scenarios use against the `dogs` table.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use stmtprobe_core::{
    BackendKind, BackendTarget, BatchCount, Cell, ConnectionFailure, ErrorKind, ListedStatement,
    ParamType, Row, TransactionMode, Value,
};
use stmtprobe_drivers::{DbDriver, DriverError, StatementId};

/// Everything the driver was asked to do, shared with the test.
#[derive(Debug, Default)]
pub struct Journal {
    pub calls: Vec<String>,
    pub closed: bool,
}

/// How the in-memory backend behaves.
#[derive(Debug, Clone)]
pub struct Behavior {
    pub kind: BackendKind,
    /// Start a transaction before the first statement after autocommit is
    /// turned off.
    pub implicit_begin: bool,
    /// Rewritten batches report no per-row counts.
    pub rewrite_batches: bool,
    /// `DEALLOCATE` matches identifiers case-insensitively.
    pub fold_case: bool,
    /// Executions whose SQL contains this text fail.
    pub fail_on: Option<String>,
    /// Executions whose SQL contains this text time out.
    pub hang_on: Option<String>,
    pub fail_rollback: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            kind: BackendKind::Postgres,
            implicit_begin: true,
            rewrite_batches: false,
            fold_case: true,
            fail_on: None,
            hang_on: None,
            fail_rollback: false,
        }
    }
}

pub struct MemoryDriver {
    pub behavior: Behavior,
    journal: Rc<RefCell<Journal>>,
    dogs: BTreeMap<i64, String>,
    snapshot: Option<BTreeMap<i64, String>>,
    statements: Vec<(String, Vec<ParamType>)>,
    live: Vec<ListedStatement>,
    autocommit: bool,
    implicit: Vec<String>,
}

impl MemoryDriver {
    pub fn new(behavior: Behavior) -> (Self, Rc<RefCell<Journal>>) {
        let journal = Rc::new(RefCell::new(Journal::default()));
        let driver = Self {
            behavior,
            journal: Rc::clone(&journal),
            dogs: BTreeMap::new(),
            snapshot: None,
            statements: Vec::new(),
            live: Vec::new(),
            autocommit: true,
            implicit: Vec::new(),
        };
        (driver, journal)
    }

    fn log(&self, call: impl Into<String>) {
        self.journal.borrow_mut().calls.push(call.into());
    }

    fn begin_if_needed(&mut self) {
        if !self.autocommit && self.snapshot.is_none() && self.behavior.implicit_begin {
            self.implicit.push("BEGIN".to_owned());
            self.snapshot = Some(self.dogs.clone());
        }
    }

    fn check(&self, sql: &str) -> Result<(), DriverError> {
        if self.behavior.fail_on.as_deref().is_some_and(|f| sql.contains(f)) {
            return Err(DriverError::execution(format!("rejected: {sql}")));
        }
        if self.behavior.hang_on.as_deref().is_some_and(|f| sql.contains(f)) {
            return Err(DriverError::timeout("execute", Duration::from_millis(10)));
        }
        Ok(())
    }

    fn statement(&self, id: StatementId) -> Result<(String, Vec<ParamType>), DriverError> {
        self.statements
            .get(id.0)
            .cloned()
            .ok_or_else(|| DriverError::execution("unknown statement"))
    }

    fn int(value: &Value) -> i64 {
        match value {
            Value::Int(v) => *v,
            _ => panic!("expected an integer, got {value}"),
        }
    }

    fn text(value: &Value) -> String {
        match value {
            Value::Text(v) => v.clone(),
            _ => panic!("expected text, got {value}"),
        }
    }

    fn write(&mut self, sql: &str, values: &[Value]) -> Result<u64, DriverError> {
        if sql.starts_with("insert into dogs") {
            let id = Self::int(&values[0]);
            let name = values.get(1).map_or_else(|| "rando".to_owned(), Self::text);
            self.dogs.insert(id, name);
            Ok(1)
        } else if sql.starts_with("delete from dogs") {
            Ok(u64::from(self.dogs.remove(&Self::int(&values[0])).is_some()))
        } else if sql.starts_with("update dogs set name") {
            let id = Self::int(values.last().unwrap());
            match self.dogs.get_mut(&id) {
                Some(name) => {
                    *name = Self::text(&values[0]);
                    Ok(1)
                }
                None => Ok(0),
            }
        } else {
            Err(DriverError::execution(format!("cannot update with {sql}")))
        }
    }
}

impl DbDriver for MemoryDriver {
    fn connect(target: &BackendTarget, _timeout: Duration) -> Result<Self, DriverError> {
        if target.host == "unreachable" {
            return Err(DriverError::connection(
                ConnectionFailure::Unreachable,
                "connection refused",
            ));
        }
        let behavior = Behavior {
            kind: target.kind,
            rewrite_batches: target.options.rewrite_batched_inserts,
            ..Behavior::default()
        };
        Ok(Self::new(behavior).0)
    }

    fn kind(&self) -> BackendKind {
        self.behavior.kind
    }

    fn setup(&mut self, sql: &str) -> Result<(), DriverError> {
        self.log(format!("setup {sql}"));
        self.check(sql)?;
        if sql.starts_with("create table dogs") {
            self.dogs.clear();
        } else if sql.starts_with("insert into dogs values(1") {
            self.dogs.insert(1, "kidnap".to_owned());
        }
        Ok(())
    }

    fn prepare(&mut self, sql: &str, params: &[ParamType]) -> Result<StatementId, DriverError> {
        self.log(format!("prepare {sql}"));
        if sql.contains("no_such_table") {
            return Err(DriverError::new(ErrorKind::Prepare, "relation does not exist"));
        }
        self.statements.push((sql.to_owned(), params.to_vec()));
        let name = format!("s_{}", self.statements.len());
        if !self.live.iter().any(|s| s.statement == sql) {
            self.live.push(ListedStatement {
                name,
                statement: sql.to_owned(),
                internal: false,
            });
        }
        Ok(StatementId(self.statements.len() - 1))
    }

    fn statement_sql(&self, statement: StatementId) -> Option<&str> {
        self.statements.get(statement.0).map(|(sql, _)| sql.as_str())
    }

    fn query(&mut self, statement: StatementId, values: &[Value]) -> Result<Vec<Row>, DriverError> {
        let (sql, _) = self.statement(statement)?;
        self.log(format!("query {sql}"));
        self.begin_if_needed();
        self.check(&sql)?;
        if sql.starts_with("select name from dogs where id = ?") {
            let id = Self::int(&values[0]);
            Ok(self
                .dogs
                .get(&id)
                .map(|name| vec![Cell::Text(name.clone())])
                .into_iter()
                .collect())
        } else if sql.starts_with("select id, name from dogs where id >= ?") {
            let (low, high) = (Self::int(&values[0]), Self::int(&values[1]));
            Ok(self
                .dogs
                .range(low..high)
                .map(|(id, name)| vec![Cell::Int(*id), Cell::Text(name.clone())])
                .collect())
        } else if sql.starts_with("select id, name from dogs where id = ?") {
            let id = Self::int(&values[0]);
            Ok(self
                .dogs
                .get(&id)
                .map(|name| vec![Cell::Int(id), Cell::Text(name.clone())])
                .into_iter()
                .collect())
        } else {
            Err(DriverError::execution(format!("cannot query with {sql}")))
        }
    }

    fn update(&mut self, statement: StatementId, values: &[Value]) -> Result<u64, DriverError> {
        let (sql, _) = self.statement(statement)?;
        self.log(format!("update {sql}"));
        self.begin_if_needed();
        self.check(&sql)?;
        self.write(&sql, values)
    }

    fn execute_batch(
        &mut self,
        statement: StatementId,
        rows: &[Vec<Value>],
    ) -> Result<Vec<BatchCount>, DriverError> {
        let (sql, _) = self.statement(statement)?;
        self.log(format!("batch {} x {sql}", rows.len()));
        self.begin_if_needed();
        self.check(&sql)?;
        let mut counts = Vec::with_capacity(rows.len());
        for values in rows {
            let count = self.write(&sql, values)?;
            counts.push(if self.behavior.rewrite_batches {
                BatchCount::CountUnknown
            } else {
                BatchCount::Rows(count)
            });
        }
        Ok(counts)
    }

    fn set_transaction_mode(&mut self, mode: TransactionMode) -> Result<Vec<String>, DriverError> {
        self.log(format!("mode {mode}"));
        match mode {
            TransactionMode::None => {
                self.autocommit = true;
                Ok(Vec::new())
            }
            TransactionMode::ExplicitBegin => {
                self.snapshot = Some(self.dogs.clone());
                Ok(vec!["START TRANSACTION".to_owned()])
            }
            TransactionMode::AutocommitOffWithExplicitCommit => {
                self.autocommit = false;
                if self.behavior.implicit_begin {
                    Ok(Vec::new())
                } else {
                    Ok(vec!["SET autocommit = 0".to_owned()])
                }
            }
        }
    }

    fn commit(&mut self) -> Result<Vec<String>, DriverError> {
        self.log("commit");
        Ok(self
            .snapshot
            .take()
            .map(|_| vec!["COMMIT".to_owned()])
            .unwrap_or_default())
    }

    fn rollback(&mut self) -> Result<Vec<String>, DriverError> {
        self.log("rollback");
        if self.behavior.fail_rollback {
            return Err(DriverError::execution("connection is closed"));
        }
        Ok(match self.snapshot.take() {
            Some(snapshot) => {
                self.dogs = snapshot;
                vec!["ROLLBACK".to_owned()]
            }
            None => Vec::new(),
        })
    }

    fn list_prepared(&mut self) -> Result<Vec<ListedStatement>, DriverError> {
        self.log("list");
        if self.behavior.kind != BackendKind::Postgres {
            return Err(DriverError::unsupported("listing", self.behavior.kind));
        }
        let mut listing = self.live.clone();
        listing.push(ListedStatement {
            name: String::new(),
            statement: "SELECT name, statement FROM pg_prepared_statements".to_owned(),
            internal: true,
        });
        Ok(listing)
    }

    fn deallocate(&mut self, identifier: Option<&str>) -> Result<(), DriverError> {
        self.log(format!("deallocate {identifier:?}"));
        let Some(identifier) = identifier else {
            self.live.clear();
            return Ok(());
        };
        let fold_case = self.behavior.fold_case;
        let position = self.live.iter().position(|s| {
            if fold_case {
                s.name.eq_ignore_ascii_case(identifier)
            } else {
                s.name == identifier
            }
        });
        match position {
            Some(position) => {
                self.live.remove(position);
                Ok(())
            }
            None => Err(DriverError::execution(format!(
                "prepared statement \"{identifier}\" does not exist"
            ))),
        }
    }

    fn session_info(&mut self) -> Result<Vec<(String, String)>, DriverError> {
        Ok(vec![
            ("server_version".to_owned(), "16.2".to_owned()),
            ("transaction_isolation".to_owned(), "read committed".to_owned()),
        ])
    }

    fn drain_implicit(&mut self) -> Vec<String> {
        std::mem::take(&mut self.implicit)
    }

    fn close(self) -> Result<(), DriverError> {
        self.journal.borrow_mut().closed = true;
        Ok(())
    }
}

pub fn target(kind: BackendKind, host: &str) -> BackendTarget {
    BackendTarget::new(kind, host, 5432, "noria", kind.default_user(), "noria").unwrap()
}
