//! Scenario definitions: pure data describing a sequence of prepared-statement
//! operations and transaction-boundary directives.

use alloc::borrow::ToOwned;
use alloc::collections::{BTreeMap, BTreeSet};
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::{Display, Formatter, Result as FmtResult};

use chrono::NaiveDateTime;

use self::error::Error;
use crate::sql::count_placeholders;
use crate::target::{Capability, OptionOverrides};

pub mod error;

/// Declared semantic type of a positional parameter.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
#[cfg_attr(feature = "schemars", derive(::schemars::JsonSchema))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ParamType {
    /// 32-bit integer (`int`).
    Integer,
    /// 64-bit integer (`bigint`).
    BigInt,
    Text,
    /// Timestamp without time zone.
    Timestamp,
}

impl Display for ParamType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(match self {
            Self::Integer => "integer",
            Self::BigInt => "bigint",
            Self::Text => "text",
            Self::Timestamp => "timestamp",
        })
    }
}

/// A parameter value bound to a prepared statement.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
#[cfg_attr(feature = "schemars", derive(::schemars::JsonSchema))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Null,
    Int(i64),
    Text(String),
    Timestamp(NaiveDateTime),
    /// Resolved to the driver's wall clock at bind time.
    CurrentTimestamp,
}

impl Value {
    /// Whether this value can be bound to a parameter declared as `ty`.
    #[must_use]
    pub const fn fits(&self, ty: ParamType) -> bool {
        match self {
            Self::Null => true,
            Self::Int(v) => match ty {
                ParamType::Integer => *v >= i32::MIN as i64 && *v <= i32::MAX as i64,
                ParamType::BigInt => true,
                ParamType::Text | ParamType::Timestamp => false,
            },
            Self::Text(_) => matches!(ty, ParamType::Text),
            Self::Timestamp(_) | Self::CurrentTimestamp => matches!(ty, ParamType::Timestamp),
        }
    }

    #[must_use]
    pub fn text(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::text(value)
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
            Self::Timestamp(v) => write!(f, "{v}"),
            Self::CurrentTimestamp => f.write_str("now()"),
        }
    }
}

/// How a `bind-and-execute` step consumes its result.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
#[cfg_attr(feature = "schemars", derive(::schemars::JsonSchema))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ExecKind {
    /// Drain every produced row.
    Query,
    /// Record the affected-row count.
    Update,
    /// Queue the binding until the handle's batch is flushed.
    Batch,
}

/// Transaction-boundary directive.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
#[cfg_attr(feature = "schemars", derive(::schemars::JsonSchema))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TransactionMode {
    /// Autocommit on, no explicit boundary.
    None,
    /// `START TRANSACTION` now, `COMMIT` at the next commit step.
    ExplicitBegin,
    /// Autocommit off; the client library decides when a transaction starts.
    AutocommitOffWithExplicitCommit,
}

impl Display for TransactionMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(match self {
            Self::None => "none",
            Self::ExplicitBegin => "explicit-begin",
            Self::AutocommitOffWithExplicitCommit => "autocommit-off-with-explicit-commit",
        })
    }
}

/// How a statement-handle identifier is spelled in `DEALLOCATE`.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
#[cfg_attr(feature = "schemars", derive(::schemars::JsonSchema))]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum IdentSpelling {
    #[default]
    AsListed,
    UpperCase,
}

impl IdentSpelling {
    #[must_use]
    pub fn apply(self, identifier: &str) -> String {
        match self {
            Self::AsListed => identifier.to_owned(),
            Self::UpperCase => identifier.to_ascii_uppercase(),
        }
    }
}

#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
#[cfg_attr(feature = "schemars", derive(::schemars::JsonSchema))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeallocTarget {
    /// Every prepared statement known to the backend session.
    All,
    Handle {
        handle: String,
        #[cfg_attr(feature = "serde", serde(default))]
        spelling: IdentSpelling,
    },
}

/// One operation of a scenario.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "op", rename_all = "kebab-case"))]
#[cfg_attr(feature = "schemars", derive(::schemars::JsonSchema))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Step {
    /// Register a parameterized statement under `handle`.
    Prepare {
        handle: String,
        sql: String,
        params: Vec<ParamType>,
    },
    BindExecute {
        handle: String,
        values: Vec<Value>,
        kind: ExecKind,
    },
    /// Execute every binding queued on `handle` as one batch.
    FlushBatch { handle: String },
    SetTransactionMode { mode: TransactionMode },
    Commit,
    Deallocate { target: DeallocTarget },
    InspectPreparedStatements,
    InspectSession,
}

impl Step {
    #[must_use]
    pub fn prepare(handle: &str, sql: &str, params: &[ParamType]) -> Self {
        Self::Prepare {
            handle: handle.to_owned(),
            sql: sql.to_owned(),
            params: params.to_vec(),
        }
    }

    #[must_use]
    pub fn execute(handle: &str, values: Vec<Value>, kind: ExecKind) -> Self {
        Self::BindExecute {
            handle: handle.to_owned(),
            values,
            kind,
        }
    }

    #[must_use]
    pub fn query(handle: &str, values: Vec<Value>) -> Self {
        Self::execute(handle, values, ExecKind::Query)
    }

    #[must_use]
    pub fn update(handle: &str, values: Vec<Value>) -> Self {
        Self::execute(handle, values, ExecKind::Update)
    }

    #[must_use]
    pub fn add_batch(handle: &str, values: Vec<Value>) -> Self {
        Self::execute(handle, values, ExecKind::Batch)
    }

    #[must_use]
    pub fn flush_batch(handle: &str) -> Self {
        Self::FlushBatch {
            handle: handle.to_owned(),
        }
    }

    #[must_use]
    pub const fn transaction(mode: TransactionMode) -> Self {
        Self::SetTransactionMode { mode }
    }

    #[must_use]
    pub fn deallocate(handle: &str, spelling: IdentSpelling) -> Self {
        Self::Deallocate {
            target: DeallocTarget::Handle {
                handle: handle.to_owned(),
                spelling,
            },
        }
    }

    #[must_use]
    pub const fn deallocate_all() -> Self {
        Self::Deallocate {
            target: DeallocTarget::All,
        }
    }

    /// Backend capability this step depends on, if any.
    #[must_use]
    pub const fn required_capability(&self) -> Option<Capability> {
        match self {
            Self::Deallocate { .. } => Some(Capability::SqlDeallocate),
            Self::InspectPreparedStatements => Some(Capability::PreparedStatementListing),
            Self::InspectSession => Some(Capability::SessionInspection),
            _ => None,
        }
    }

    /// Short label used in reports.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Prepare { handle, .. } => alloc::format!("prepare {handle}"),
            Self::BindExecute { handle, kind, .. } => {
                let kind = match kind {
                    ExecKind::Query => "query",
                    ExecKind::Update => "update",
                    ExecKind::Batch => "add-batch",
                };
                alloc::format!("{kind} {handle}")
            }
            Self::FlushBatch { handle } => alloc::format!("flush-batch {handle}"),
            Self::SetTransactionMode { mode } => alloc::format!("transaction {mode}"),
            Self::Commit => "commit".to_owned(),
            Self::Deallocate {
                target: DeallocTarget::All,
            } => "deallocate all".to_owned(),
            Self::Deallocate {
                target: DeallocTarget::Handle { handle, .. },
            } => alloc::format!("deallocate {handle}"),
            Self::InspectPreparedStatements => "inspect-prepared-statements".to_owned(),
            Self::InspectSession => "inspect-session".to_owned(),
        }
    }
}

/// A named, independent sequence of steps.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "schemars", derive(::schemars::JsonSchema))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub description: String,
    /// Capabilities the backend must offer for this scenario to run.
    #[cfg_attr(feature = "serde", serde(default))]
    pub requires: Vec<Capability>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub overrides: OptionOverrides,
    /// Fixture SQL sent over the simple protocol before step 0.
    #[cfg_attr(feature = "serde", serde(default))]
    pub setup: Vec<String>,
    pub steps: Vec<Step>,
}

impl Scenario {
    #[must_use]
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_owned(),
            description: description.to_owned(),
            requires: Vec::new(),
            overrides: OptionOverrides::default(),
            setup: Vec::new(),
            steps: Vec::new(),
        }
    }

    #[must_use]
    pub fn requires(mut self, capability: Capability) -> Self {
        if !self.requires.contains(&capability) {
            self.requires.push(capability);
        }
        self
    }

    #[must_use]
    pub fn setup<I, S>(mut self, statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.setup.extend(statements.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub const fn overrides(mut self, overrides: OptionOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    #[must_use]
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    #[must_use]
    pub fn steps<I: IntoIterator<Item = Step>>(mut self, steps: I) -> Self {
        self.steps.extend(steps);
        self
    }

    /// Capabilities from `requires` that `available` lacks.
    #[must_use]
    pub fn missing_capabilities(&self, available: &[Capability]) -> Vec<Capability> {
        self.requires
            .iter()
            .filter(|c| !available.contains(c))
            .copied()
            .collect()
    }

    /// Check that the scenario is internally consistent.
    ///
    /// Handles must be prepared before use, bound values must match the
    /// declared parameter schema, every batch must be flushed, any
    /// non-`none` transaction mode must be followed by a commit, and
    /// backend-specific steps must be declared in `requires`.
    ///
    /// # Errors
    ///
    /// Returns the first inconsistency found, in step order.
    pub fn validate(&self) -> Result<(), Error> {
        if self.name.trim().is_empty() {
            return Err(Error::EmptyName);
        }

        let mut prepared: BTreeMap<&str, &[ParamType]> = BTreeMap::new();
        let mut pending_batches: BTreeSet<&str> = BTreeSet::new();
        let mut open_boundary: Option<usize> = None;

        for (index, step) in self.steps.iter().enumerate() {
            if let Some(capability) = step.required_capability() {
                if !self.requires.contains(&capability) {
                    return Err(Error::UndeclaredCapability { step: index, capability });
                }
            }
            match step {
                Step::Prepare {
                    handle,
                    sql,
                    params,
                } => {
                    let placeholders = count_placeholders(sql);
                    if placeholders != params.len() {
                        return Err(Error::ArityMismatch {
                            step: index,
                            expected: params.len(),
                            found: placeholders,
                        });
                    }
                    prepared.insert(handle.as_str(), params.as_slice());
                }
                Step::BindExecute {
                    handle,
                    values,
                    kind,
                } => {
                    let params = prepared
                        .get(handle.as_str())
                        .ok_or_else(|| Error::UnknownHandle {
                            step: index,
                            handle: handle.clone(),
                        })?;
                    if values.len() != params.len() {
                        return Err(Error::ArityMismatch {
                            step: index,
                            expected: params.len(),
                            found: values.len(),
                        });
                    }
                    if let Some(position) = values
                        .iter()
                        .zip(params.iter())
                        .position(|(value, ty)| !value.fits(*ty))
                    {
                        return Err(Error::TypeMismatch {
                            step: index,
                            position,
                            expected: params[position],
                        });
                    }
                    if *kind == ExecKind::Batch {
                        pending_batches.insert(handle.as_str());
                    }
                }
                Step::FlushBatch { handle } => {
                    if !pending_batches.remove(handle.as_str()) {
                        return Err(Error::EmptyBatch {
                            step: index,
                            handle: handle.clone(),
                        });
                    }
                }
                Step::SetTransactionMode { mode } => match mode {
                    TransactionMode::None => {
                        if let Some(opened) = open_boundary {
                            return Err(Error::MissingCommit { step: opened });
                        }
                    }
                    TransactionMode::ExplicitBegin
                    | TransactionMode::AutocommitOffWithExplicitCommit => {
                        open_boundary.get_or_insert(index);
                    }
                },
                Step::Commit => open_boundary = None,
                Step::Deallocate {
                    target: DeallocTarget::Handle { handle, .. },
                } => {
                    if !prepared.contains_key(handle.as_str()) {
                        return Err(Error::UnknownHandle {
                            step: index,
                            handle: handle.clone(),
                        });
                    }
                }
                Step::Deallocate {
                    target: DeallocTarget::All,
                }
                | Step::InspectPreparedStatements
                | Step::InspectSession => {}
            }
        }

        if let Some(handle) = pending_batches.into_iter().next() {
            return Err(Error::UnflushedBatch {
                handle: handle.to_owned(),
            });
        }
        if let Some(opened) = open_boundary {
            return Err(Error::MissingCommit { step: opened });
        }
        Ok(())
    }
}
