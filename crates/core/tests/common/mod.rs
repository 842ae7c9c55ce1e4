//! Builders for hand-written runs.

#![allow(dead_code)]

use std::time::Duration;

use stmtprobe_core::{BackendKind, Cell, Observation, Origin, Outcome, RunResult, RunStatus};

/// Build an `Outcome::Rows` from bracketed rows of integers and strings.
///
/// ```ignore
/// rows![[1, "kidnap"], [2, "fido"]]
/// ```
#[macro_export]
macro_rules! rows {
    ($([$($cell:expr),* $(,)?]),* $(,)?) => {
        stmtprobe_core::Outcome::Rows {
            rows: vec![$(vec![$($crate::common::IntoCell::into_cell($cell)),*]),*],
        }
    };
}

pub trait IntoCell {
    fn into_cell(self) -> Cell;
}

impl IntoCell for i32 {
    fn into_cell(self) -> Cell {
        Cell::Int(self.into())
    }
}

impl IntoCell for i64 {
    fn into_cell(self) -> Cell {
        Cell::Int(self)
    }
}

impl IntoCell for &str {
    fn into_cell(self) -> Cell {
        Cell::Text(self.to_owned())
    }
}

/// Observations appended in order; every `step` call closes one step.
pub struct RunBuilder {
    result: RunResult,
    step: usize,
    /// Durations vary per step so equal outcomes never hide behind equal timing.
    micros: u64,
}

impl RunBuilder {
    pub fn new(backend: BackendKind, target: &str) -> Self {
        Self {
            result: RunResult {
                scenario: "lookup".to_owned(),
                backend,
                target: target.to_owned(),
                status: RunStatus::Completed,
                observations: Vec::new(),
            },
            step: 0,
            micros: 100,
        }
    }

    pub fn postgres() -> Self {
        Self::new(BackendKind::Postgres, "postgres@127.0.0.1:5432")
    }

    pub fn mysql() -> Self {
        Self::new(BackendKind::MySql, "mysql@127.0.0.1:3306")
    }

    fn push(&mut self, origin: Origin, label: &str, outcome: Outcome) {
        self.micros += 37;
        self.result.observations.push(Observation {
            step: self.step,
            origin,
            label: label.to_owned(),
            outcome,
            duration: Duration::from_micros(self.micros),
        });
    }

    /// A statement the client issued on its own ahead of the next step.
    pub fn implicit(mut self, statement: &str) -> Self {
        self.push(
            Origin::Implicit,
            statement,
            Outcome::Issued {
                statements: vec![statement.to_owned()],
            },
        );
        self
    }

    pub fn step(mut self, outcome: Outcome) -> Self {
        let label = format!("step {}", self.step);
        self.push(Origin::Step, &label, outcome);
        self.step += 1;
        self
    }

    /// A rollback attached to the last step.
    pub fn rollback(mut self, statements: &[&str]) -> Self {
        self.step -= 1;
        self.push(
            Origin::Rollback,
            "rollback",
            Outcome::Issued {
                statements: statements.iter().map(|s| (*s).to_owned()).collect(),
            },
        );
        self.step += 1;
        self
    }

    pub fn status(mut self, status: RunStatus) -> Self {
        self.result.status = status;
        self
    }

    pub fn build(self) -> RunResult {
        self.result
    }
}
