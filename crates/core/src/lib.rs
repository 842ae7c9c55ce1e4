//! Data model for probing SQL backends with prepared statements.
//!
//! `stmtprobe_core` describes *what* to run and *what was seen*, without
//! talking to any database:
//!
//! - [`target`] -- backend identity ([`BackendKind`], [`BackendTarget`]) and
//!   the driver options needed for feature parity across client libraries.
//! - [`scenario`] -- [`Scenario`]s as pure data: ordered [`Step`]s that
//!   prepare, bind and execute statements, change transaction mode,
//!   deallocate handles and inspect the backend's prepared-statement list.
//! - [`observation`] -- the [`RunResult`] a runner produces: one
//!   [`Observation`] per step (plus statements the client library issued on
//!   its own), in emission order.
//! - [`diff`] -- positional comparison of two runs into [`Divergence`]s.
//!
//! Scenario SQL uses `?` placeholders; [`sql`] holds the helpers drivers use
//! to adapt it to their backend.
//!
//! ```rust,ignore
//! use stmtprobe_core::{diff, render};
//!
//! print!("{}", render(&postgres_run));
//! for divergence in diff(&postgres_run, &mysql_run) {
//!     println!("{divergence}");
//! }
//! ```
//!
//! # Crate features
//!
//! - **`serde`** -- `Serialize`/`Deserialize` on every data model type.
//! - **`schemars`** -- `JsonSchema` on the scenario file types.
//!
//! This crate is `no_std` compatible (requires `alloc`).

#![cfg_attr(not(any(test, feature = "schemars")), no_std)]
extern crate alloc;

pub mod diff;
pub mod observation;
pub mod scenario;
pub mod sql;
pub mod target;

pub use diff::{comparable, diff, render_divergences, Divergence, DivergenceKind};
pub use observation::display::render;
pub use observation::{
    BatchCount, Cell, ConnectionFailure, ErrorKind, ListedStatement, Observation, Origin, Outcome,
    Row, RunResult, RunStatus,
};
pub use scenario::{
    DeallocTarget, ExecKind, IdentSpelling, ParamType, Scenario, Step, TransactionMode, Value,
};
pub use target::{BackendKind, BackendTarget, Capability, DriverOptions, OptionOverrides};
