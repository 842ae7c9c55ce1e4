use alloc::string::String;

use derive_more::{Display, Error};

use super::ParamType;
use crate::target::Capability;

/// A scenario that cannot be run as written.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum Error {
    #[display("scenario has no name")]
    EmptyName,
    /// A step refers to a handle no earlier step prepared.
    #[display("step {step}: handle `{handle}` was never prepared")]
    UnknownHandle { step: usize, handle: String },
    /// Placeholder count, declared parameters and bound values disagree.
    #[display("step {step}: expected {expected} parameters, found {found}")]
    ArityMismatch {
        step: usize,
        expected: usize,
        found: usize,
    },
    #[display("step {step}: value {position} does not fit declared type {expected}")]
    TypeMismatch {
        step: usize,
        position: usize,
        expected: ParamType,
    },
    #[display("step {step}: batch on `{handle}` is empty")]
    EmptyBatch { step: usize, handle: String },
    #[display("batch on `{handle}` is never flushed")]
    UnflushedBatch { handle: String },
    /// A transaction boundary opened at `step` is never committed.
    #[display("step {step}: transaction boundary is never committed")]
    MissingCommit { step: usize },
    #[display("step {step}: needs `{capability}` but the scenario does not declare it")]
    UndeclaredCapability { step: usize, capability: Capability },
}
