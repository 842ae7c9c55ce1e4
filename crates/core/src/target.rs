use alloc::borrow::ToOwned;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::{Display, Formatter, Result as FmtResult};
use core::str::FromStr;

use derive_more::{Display, Error};

/// Backend family a target belongs to.
///
/// The family decides which client library is used and which optional
/// harness capabilities (introspection, SQL-level deallocation) exist.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BackendKind {
    /// Native Postgres, or anything speaking the Postgres wire protocol.
    Postgres,
    MySql,
    MariaDb,
}

impl BackendKind {
    /// Capabilities the harness can exercise against this family.
    #[must_use]
    pub fn capabilities(self) -> Vec<Capability> {
        match self {
            Self::Postgres => alloc::vec![
                Capability::PreparedStatementListing,
                Capability::SqlDeallocate,
                Capability::SessionInspection,
            ],
            Self::MySql | Self::MariaDb => alloc::vec![
                Capability::SessionInspection,
                Capability::BacktickIdentifiers,
            ],
        }
    }

    #[must_use]
    pub fn supports(self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Default credentials used when none are configured.
    #[must_use]
    pub const fn default_user(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySql | Self::MariaDb => "root",
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::MariaDb => "maria",
        }
    }
}

impl Display for BackendKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "mysql" => Ok(Self::MySql),
            "maria" | "mariadb" => Ok(Self::MariaDb),
            _ => Err(TargetError::UnknownBackend(s.to_owned())),
        }
    }
}

/// Harness features that only some backends expose.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
#[cfg_attr(feature = "schemars", derive(::schemars::JsonSchema))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub enum Capability {
    /// The backend exposes live prepared statements through a queryable view.
    #[display("prepared-statement-listing")]
    PreparedStatementListing,
    /// `DEALLOCATE <name>` / `DEALLOCATE ALL` over plain SQL.
    #[display("sql-deallocate")]
    SqlDeallocate,
    /// Server version and isolation level can be queried.
    #[display("session-inspection")]
    SessionInspection,
    /// Identifiers may be quoted with backticks.
    #[display("backtick-identifiers")]
    BacktickIdentifiers,
}

/// Driver options applied when a connection is opened.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverOptions {
    pub tls: bool,
    /// Number of server-side prepared statements the client library keeps.
    pub statement_cache_capacity: usize,
    /// Collapse a queued insert batch into a single multi-row statement.
    /// Postgres-wire only; MySQL-family targets always batch row by row.
    pub rewrite_batched_inserts: bool,
    /// Prepare on the server instead of emulating placeholders client-side.
    pub server_side_prepare: bool,
}

impl DriverOptions {
    /// Option set needed to reach feature parity on the given family.
    #[must_use]
    pub const fn for_kind(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Postgres => Self {
                tls: false,
                statement_cache_capacity: 5,
                rewrite_batched_inserts: false,
                server_side_prepare: true,
            },
            BackendKind::MySql | BackendKind::MariaDb => Self {
                tls: false,
                statement_cache_capacity: 100,
                rewrite_batched_inserts: false,
                server_side_prepare: true,
            },
        }
    }

    #[must_use]
    pub fn with_overrides(&self, overrides: &OptionOverrides) -> Self {
        Self {
            rewrite_batched_inserts: overrides
                .rewrite_batched_inserts
                .unwrap_or(self.rewrite_batched_inserts),
            ..self.clone()
        }
    }
}

/// Per-scenario tweaks layered over a target's [`DriverOptions`].
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[cfg_attr(feature = "schemars", derive(::schemars::JsonSchema))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionOverrides {
    pub rewrite_batched_inserts: Option<bool>,
}

/// A fully-populated backend to run scenarios against.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Clone, PartialEq, Eq)]
pub struct BackendTarget {
    pub kind: BackendKind,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    #[cfg_attr(feature = "serde", serde(skip_serializing))]
    pub password: String,
    pub options: DriverOptions,
}

impl BackendTarget {
    /// Build a target, rejecting empty identity fields.
    ///
    /// # Errors
    ///
    /// Returns [`TargetError::Missing`] if the host, database or username is
    /// empty.
    pub fn new(
        kind: BackendKind,
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, TargetError> {
        let target = Self {
            kind,
            host: host.into(),
            port,
            database: database.into(),
            username: username.into(),
            password: password.into(),
            options: DriverOptions::for_kind(kind),
        };
        for (field, value) in [
            ("host", &target.host),
            ("database", &target.database),
            ("username", &target.username),
        ] {
            if value.trim().is_empty() {
                return Err(TargetError::Missing(field));
            }
        }
        if port == 0 {
            return Err(TargetError::Missing("port"));
        }
        Ok(target)
    }

    /// Replace the driver options. The batched-insert rewrite is dropped
    /// for MySQL-family targets.
    #[must_use]
    pub fn with_options(mut self, options: DriverOptions) -> Self {
        self.options = DriverOptions {
            rewrite_batched_inserts: options.rewrite_batched_inserts
                && self.kind == BackendKind::Postgres,
            ..options
        };
        self
    }

    /// Short label used in reports, e.g. `postgres@127.0.0.1:5432`.
    #[must_use]
    pub fn label(&self) -> String {
        alloc::format!("{}@{}:{}", self.kind, self.host, self.port)
    }
}

impl core::fmt::Debug for BackendTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("BackendTarget")
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Configuration problem detected before any connection is attempted.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum TargetError {
    #[display("unknown backend id `{_0}` (expected postgres, mysql or maria)")]
    UnknownBackend(#[error(not(source))] String),
    #[display("missing {_0} in target configuration")]
    Missing(#[error(not(source))] &'static str),
}
