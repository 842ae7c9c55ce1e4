//! stmtprobe CLI -- run prepared-statement scenarios and compare backends.

use std::iter;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use derive_more::{Display, Error, From};
use rayon::prelude::*;
use serde::Serialize;
use stmtprobe_core::target::TargetError;
use stmtprobe_core::{comparable, diff, BackendKind, BackendTarget, Divergence, DriverOptions, RunResult, Scenario};
use stmtprobe_drivers::{run_against, AnyDriver};
use stmtprobe_scenarios::{catalog, load_scenarios, select, CatalogParams, LoadError};

/// All runs finished; findings are not failures.
pub const EXIT_OK: i32 = 0;
/// Configuration error or an infrastructure failure during a run.
pub const EXIT_FAILURE: i32 = 1;
/// `--fail-on-divergence` was given and a comparison diverged.
pub const EXIT_DIVERGENCE: i32 = 2;

#[derive(Debug, Parser)]
#[command(
    name = "stmtprobe",
    about = "Exercise prepared-statement and transaction semantics of SQL backends"
)]
pub struct App {
    /// Log every backend call (overridden by RUST_LOG)
    #[arg(long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run scenarios against one backend
    Run(RunArgs),
    /// Run scenarios against two backends and diff the observations
    Compare(CompareArgs),
    /// List the available scenarios
    List(ListArgs),
    /// Print the JSON Schema for scenario files to stdout
    Schema,
}

#[derive(Debug, Args)]
pub struct TargetArgs {
    /// Backend family: postgres, mysql or maria
    #[arg(long, env = "DB")]
    pub db: String,
    /// Backend port [default: 5432 for postgres, 3306 otherwise]
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,
    #[arg(long, env = "DB_HOST", default_value = "127.0.0.1")]
    pub host: String,
    #[arg(long, env = "DB_NAME", default_value = "noria")]
    pub database: String,
    /// [default: postgres for postgres, root otherwise]
    #[arg(long, env = "DB_USER")]
    pub user: Option<String>,
    #[arg(long, env = "DB_PASSWORD", default_value = "noria", hide_env_values = true)]
    pub password: String,
    /// Client statement cache capacity
    #[arg(long)]
    pub statement_cache: Option<usize>,
    /// Rewrite batched single-row inserts into one multi-row insert
    #[arg(long)]
    pub rewrite_batched_inserts: bool,
    /// Negotiate TLS instead of connecting in plain text
    #[arg(long)]
    pub tls: bool,
}

/// The second backend of a comparison; unset values are taken from the first.
#[derive(Debug, Args)]
pub struct OtherTargetArgs {
    /// Backend family of target B
    #[arg(long, env = "DB_B")]
    pub db_b: String,
    #[arg(long, env = "PORT_B")]
    pub port_b: Option<u16>,
    #[arg(long, env = "DB_HOST_B")]
    pub host_b: Option<String>,
    #[arg(long, env = "DB_NAME_B")]
    pub database_b: Option<String>,
    #[arg(long, env = "DB_USER_B")]
    pub user_b: Option<String>,
    #[arg(long, env = "DB_PASSWORD_B", hide_env_values = true)]
    pub password_b: Option<String>,
}

#[derive(Debug, Args)]
pub struct ScenarioArgs {
    /// Scenario to run, repeatable [default: all]
    #[arg(long = "scenario", value_name = "NAME")]
    pub scenarios: Vec<String>,
    /// JSON file with additional scenarios
    #[arg(long)]
    pub scenario_file: Option<PathBuf>,
    /// Per-call timeout in milliseconds
    #[arg(long, default_value_t = 10_000)]
    pub timeout_ms: u64,
    /// Executions of each statement in the lifecycle scenario
    #[arg(long)]
    pub lifecycle_rounds: Option<usize>,
    /// Rows queued in the batched-insert scenarios
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Stop scheduling scenarios after an infrastructure failure
    #[arg(long)]
    pub fail_fast: bool,
    /// Output results as JSON (one object per line)
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct RunArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    #[command(flatten)]
    pub scenarios: ScenarioArgs,
}

#[derive(Debug, Parser)]
pub struct CompareArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    #[command(flatten)]
    pub other: OtherTargetArgs,
    #[command(flatten)]
    pub scenarios: ScenarioArgs,
    /// Run both backends at the same time
    #[arg(long)]
    pub parallel: bool,
    /// Exit with status 2 if any comparison diverges
    #[arg(long)]
    pub fail_on_divergence: bool,
}

#[derive(Debug, Parser)]
pub struct ListArgs {
    /// JSON file with additional scenarios
    #[arg(long)]
    pub scenario_file: Option<PathBuf>,
    /// Print the full scenario definitions as JSON
    #[arg(long)]
    pub json: bool,
}

/// Errors detected before any connection is opened.
#[derive(Debug, Display, Error, From)]
pub enum ConfigError {
    #[display("{_0}")]
    Target(TargetError),
    #[display("{_0}")]
    Load(LoadError),
    #[display("unknown scenario `{_0}`")]
    #[from(ignore)]
    UnknownScenario(#[error(not(source))] String),
    #[display("scenario `{_0}` is already built in")]
    #[from(ignore)]
    DuplicateScenario(#[error(not(source))] String),
}

const fn default_port(kind: BackendKind) -> u16 {
    match kind {
        BackendKind::Postgres => 5432,
        BackendKind::MySql | BackendKind::MariaDb => 3306,
    }
}

impl TargetArgs {
    /// # Errors
    ///
    /// Returns an error for an unknown backend id or missing connection field.
    pub fn target(&self) -> Result<BackendTarget, ConfigError> {
        let kind: BackendKind = self.db.parse()?;
        let target = BackendTarget::new(
            kind,
            self.host.as_str(),
            self.port.unwrap_or_else(|| default_port(kind)),
            self.database.as_str(),
            self.user.as_deref().unwrap_or_else(|| kind.default_user()),
            self.password.as_str(),
        )?;
        let defaults = DriverOptions::for_kind(kind);
        let options = DriverOptions {
            tls: self.tls,
            statement_cache_capacity: self
                .statement_cache
                .unwrap_or(defaults.statement_cache_capacity),
            rewrite_batched_inserts: self.rewrite_batched_inserts,
            ..defaults
        };
        Ok(target.with_options(options))
    }
}

impl OtherTargetArgs {
    /// Target B, inheriting unset fields from target A.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown backend id or missing connection field.
    pub fn target(&self, first: &TargetArgs) -> Result<BackendTarget, ConfigError> {
        let kind: BackendKind = self.db_b.parse()?;
        let target = BackendTarget::new(
            kind,
            self.host_b.as_deref().unwrap_or(&first.host),
            self.port_b.unwrap_or_else(|| default_port(kind)),
            self.database_b.as_deref().unwrap_or(&first.database),
            self.user_b.as_deref().unwrap_or_else(|| kind.default_user()),
            self.password_b.as_deref().unwrap_or(&first.password),
        )?;
        let defaults = DriverOptions::for_kind(kind);
        let options = DriverOptions {
            tls: first.tls,
            statement_cache_capacity: first
                .statement_cache
                .unwrap_or(defaults.statement_cache_capacity),
            rewrite_batched_inserts: first.rewrite_batched_inserts,
            ..defaults
        };
        Ok(target.with_options(options))
    }
}

/// Built-in scenarios followed by those of `file`, if any.
///
/// # Errors
///
/// Returns an error if the file cannot be loaded or redefines a built-in.
pub fn available_scenarios(
    params: &CatalogParams,
    file: Option<&PathBuf>,
) -> Result<Vec<Scenario>, ConfigError> {
    let mut scenarios = catalog::all(params);
    if let Some(path) = file {
        for scenario in load_scenarios(path)? {
            if scenarios.iter().any(|s| s.name == scenario.name) {
                return Err(ConfigError::DuplicateScenario(scenario.name));
            }
            scenarios.push(scenario);
        }
    }
    Ok(scenarios)
}

impl ScenarioArgs {
    #[must_use]
    pub fn params(&self) -> CatalogParams {
        let defaults = CatalogParams::default();
        CatalogParams {
            lifecycle_rounds: self.lifecycle_rounds.unwrap_or(defaults.lifecycle_rounds),
            batch_size: self.batch_size.unwrap_or(defaults.batch_size),
            ..defaults
        }
    }

    /// The scenarios to run, in the order requested.
    ///
    /// # Errors
    ///
    /// Returns an error for an unloadable scenario file or an unknown name.
    pub fn scenarios(&self) -> Result<Vec<Scenario>, ConfigError> {
        let available = available_scenarios(&self.params(), self.scenario_file.as_ref())?;
        let selected = select(&available, &self.scenarios)
            .map_err(|name| ConfigError::UnknownScenario(name.to_owned()))?;
        Ok(selected.into_iter().cloned().collect())
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Run `scenarios` one after another against `target`.
///
/// With `fail_fast`, no further scenario is scheduled once one hits an
/// infrastructure failure.
#[must_use]
pub fn run_all(
    target: &BackendTarget,
    scenarios: &[Scenario],
    timeout: Duration,
    fail_fast: bool,
) -> Vec<RunResult> {
    let mut results = Vec::with_capacity(scenarios.len());
    for scenario in scenarios {
        let result = run_against::<AnyDriver>(scenario, target, timeout);
        let stop = fail_fast && result.infrastructure_failure();
        results.push(result);
        if stop {
            tracing::warn!(
                backend = %target.label(),
                "infrastructure failure, not scheduling further scenarios"
            );
            break;
        }
    }
    results
}

/// Runs of both targets, branch by branch.
///
/// In parallel mode each branch owns its connections and results; the two
/// result lists are only joined after both branches finish.
#[must_use]
pub fn run_branches(
    targets: [&BackendTarget; 2],
    scenarios: &[Scenario],
    timeout: Duration,
    fail_fast: bool,
    parallel: bool,
) -> [Vec<RunResult>; 2] {
    let [a, b] = targets;
    if parallel {
        let mut branches: Vec<Vec<RunResult>> = targets
            .as_slice()
            .par_iter()
            .map(|target| run_all(target, scenarios, timeout, fail_fast))
            .collect();
        let right = branches.pop().unwrap_or_default();
        let left = branches.pop().unwrap_or_default();
        [left, right]
    } else {
        [
            run_all(a, scenarios, timeout, fail_fast),
            run_all(b, scenarios, timeout, fail_fast),
        ]
    }
}

/// Two runs of one scenario and how they differ.
///
/// A side is `None` when its branch stopped before reaching the scenario.
#[derive(Debug, Serialize)]
pub struct Comparison {
    pub scenario: String,
    pub left: Option<RunResult>,
    pub right: Option<RunResult>,
    pub divergences: Vec<Divergence>,
}

impl Comparison {
    fn pair(left: Option<RunResult>, right: Option<RunResult>) -> Option<Self> {
        let scenario = left.as_ref().or(right.as_ref())?.scenario.clone();
        let divergences = match (&left, &right) {
            (Some(left), Some(right)) => diff(left, right),
            _ => Vec::new(),
        };
        Some(Self {
            scenario,
            left,
            right,
            divergences,
        })
    }

    /// Whether both runs executed their steps and were diffed.
    #[must_use]
    pub fn compared(&self) -> bool {
        match (&self.left, &self.right) {
            (Some(left), Some(right)) => comparable(left, right),
            _ => false,
        }
    }

    /// The runs present on either side.
    pub fn runs(&self) -> impl Iterator<Item = &RunResult> {
        self.left.iter().chain(self.right.iter())
    }
}

/// Pair the runs of both branches by position and diff each pair.
///
/// Runs past the end of the shorter branch are kept unpaired.
#[must_use]
pub fn compare_runs(left: Vec<RunResult>, right: Vec<RunResult>) -> Vec<Comparison> {
    let mut left = left.into_iter();
    let mut right = right.into_iter();
    iter::from_fn(|| Comparison::pair(left.next(), right.next())).collect()
}

/// Process exit status for a finished invocation.
#[must_use]
pub fn exit_code<'a>(
    results: impl IntoIterator<Item = &'a RunResult>,
    divergences: usize,
    fail_on_divergence: bool,
) -> i32 {
    if results.into_iter().any(RunResult::infrastructure_failure) {
        EXIT_FAILURE
    } else if fail_on_divergence && divergences > 0 {
        EXIT_DIVERGENCE
    } else {
        EXIT_OK
    }
}
