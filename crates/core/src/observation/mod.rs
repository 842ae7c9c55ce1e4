//! What the harness saw while running a scenario.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::{Display, Formatter, Result as FmtResult};
use core::time::Duration;

use chrono::NaiveDateTime;
use derive_more::Display;

use crate::target::{BackendKind, Capability};

pub mod display;

/// A single column value read back from a result set.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Cell {
    Null,
    Int(i64),
    Text(String),
    Timestamp(NaiveDateTime),
    Bool(bool),
    /// A column type the harness does not decode, kept by type name.
    Opaque(String),
}

impl Display for Cell {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
            Self::Timestamp(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Opaque(type_name) => write!(f, "<{type_name}>"),
        }
    }
}

pub type Row = Vec<Cell>;

/// Per-row result code of a flushed batch.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BatchCount {
    Rows(u64),
    /// The statement succeeded but the backend reported no per-row count.
    CountUnknown,
}

impl Display for BatchCount {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Rows(n) => write!(f, "{n}"),
            Self::CountUnknown => f.write_str("?"),
        }
    }
}

/// One live prepared statement as reported by the backend.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListedStatement {
    pub name: String,
    pub statement: String,
    /// The listing query itself or another backend bookkeeping entry.
    pub internal: bool,
}

#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Display)]
pub enum ConnectionFailure {
    #[display("unreachable")]
    Unreachable,
    #[display("auth-failed")]
    AuthFailed,
    #[display("unsupported-target")]
    UnsupportedTarget,
}

/// Failure taxonomy recorded in observations.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Display)]
pub enum ErrorKind {
    #[display("connection({_0})")]
    Connection(ConnectionFailure),
    #[display("prepare")]
    Prepare,
    #[display("execution")]
    Execution,
    #[display("timeout")]
    Timeout,
}

impl ErrorKind {
    /// Infrastructure failures, as opposed to a backend rejecting a statement.
    #[must_use]
    pub const fn is_infrastructure(self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout)
    }
}

/// Recorded outcome of one step or harness-issued statement.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "outcome", rename_all = "kebab-case"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Prepared {
        params: usize,
    },
    /// Fully drained result set, rows in backend order.
    Rows {
        rows: Vec<Row>,
    },
    Updated {
        count: u64,
    },
    /// A binding was queued; `pending` is the batch size so far.
    Queued {
        pending: usize,
    },
    Batch {
        counts: Vec<BatchCount>,
    },
    /// Statements sent to change transaction state; empty when none were needed.
    Issued {
        statements: Vec<String>,
    },
    Deallocated {
        /// Identifier as sent in `DEALLOCATE`, `None` for `DEALLOCATE ALL`.
        sent: Option<String>,
        /// Name the backend listed for the statement before deallocation.
        listed_as: Option<String>,
        /// The backend accepted an identifier differing only in case.
        case_folded: bool,
    },
    /// Prepared-statement listing in the order the backend returned it.
    Listing {
        statements: Vec<ListedStatement>,
    },
    Session {
        settings: Vec<(String, String)>,
    },
    Failed {
        kind: ErrorKind,
        message: String,
    },
}

impl Outcome {
    #[must_use]
    pub const fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Who caused an observation.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Display)]
pub enum Origin {
    /// Fixture statements sent before step 0.
    #[display("setup")]
    Setup,
    #[display("step")]
    Step,
    /// Issued by the client library on its own ahead of the step.
    #[display("implicit")]
    Implicit,
    /// Best-effort rollback after a failed step.
    #[display("rollback")]
    Rollback,
}

#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    /// Index of the scenario step this observation belongs to.
    pub step: usize,
    pub origin: Origin,
    pub label: String,
    pub outcome: Outcome,
    pub duration: Duration,
}

/// How a run ended.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "status", rename_all = "kebab-case"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    /// A step failed; remaining steps were not attempted.
    Aborted { step: usize, kind: ErrorKind },
    /// The backend lacks capabilities the scenario requires.
    Skipped { missing: Vec<Capability> },
    /// No connection could be opened.
    ConnectFailed { kind: ErrorKind, message: String },
}

impl RunStatus {
    /// Whether the scenario's steps ran at all, to completion or not.
    #[must_use]
    pub const fn executed(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted { .. })
    }
}

/// The finished, ordered observations of one scenario against one backend.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub scenario: String,
    pub backend: BackendKind,
    /// Target label, e.g. `postgres@127.0.0.1:5432`.
    pub target: String,
    pub status: RunStatus,
    pub observations: Vec<Observation>,
}

impl RunResult {
    /// Whether the run hit a connection or timeout failure.
    #[must_use]
    pub fn infrastructure_failure(&self) -> bool {
        matches!(self.status, RunStatus::ConnectFailed { .. })
            || self
                .observations
                .iter()
                .filter_map(|o| o.outcome.error_kind())
                .any(ErrorKind::is_infrastructure)
    }

    /// Observations produced directly by scenario steps, in order.
    pub fn step_observations(&self) -> impl Iterator<Item = &Observation> {
        self.observations
            .iter()
            .filter(|o| o.origin == Origin::Step)
    }

    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.observations.iter().map(|o| o.duration).sum()
    }
}
