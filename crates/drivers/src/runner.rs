//! Drive a scenario through one backend session.
//!
//! Steps run strictly in order. The first failing step is recorded, a
//! best-effort rollback follows, and the remaining steps are skipped.
//! Nothing is retried and no step failure escapes as an error: everything
//! ends up in the returned [`RunResult`].

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use stmtprobe_core::{
    BackendTarget, DeallocTarget, ExecKind, IdentSpelling, Observation, Origin, Outcome, RunResult,
    RunStatus, Scenario, Step, Value,
};

use crate::error::DriverError;
use crate::statements::StatementId;
use crate::DbDriver;

struct Runner<'s, D> {
    scenario: &'s Scenario,
    driver: D,
    handles: BTreeMap<&'s str, StatementId>,
    batches: BTreeMap<&'s str, Vec<Vec<Value>>>,
    observations: Vec<Observation>,
}

impl<'s, D: DbDriver> Runner<'s, D> {
    fn new(scenario: &'s Scenario, driver: D) -> Self {
        Self {
            scenario,
            driver,
            handles: BTreeMap::new(),
            batches: BTreeMap::new(),
            observations: Vec::new(),
        }
    }

    fn record(
        &mut self,
        step: usize,
        origin: Origin,
        label: String,
        outcome: Outcome,
        duration: Duration,
    ) {
        self.observations.push(Observation {
            step,
            origin,
            label,
            outcome,
            duration,
        });
    }

    fn record_implicit(&mut self, step: usize) {
        for statement in self.driver.drain_implicit() {
            tracing::debug!(step, %statement, "implicit statement");
            self.record(
                step,
                Origin::Implicit,
                statement.clone(),
                Outcome::Issued {
                    statements: vec![statement],
                },
                Duration::ZERO,
            );
        }
    }

    fn record_failure(
        &mut self,
        step: usize,
        origin: Origin,
        label: String,
        error: DriverError,
        duration: Duration,
    ) {
        tracing::debug!(step, %label, %error, "step failed");
        self.record(
            step,
            origin,
            label,
            Outcome::Failed {
                kind: error.kind,
                message: error.message,
            },
            duration,
        );
    }

    fn rollback(&mut self, step: usize) {
        let started = Instant::now();
        let result = self.driver.rollback();
        let duration = started.elapsed();
        match result {
            Ok(statements) => self.record(
                step,
                Origin::Rollback,
                "rollback".to_owned(),
                Outcome::Issued { statements },
                duration,
            ),
            Err(error) => {
                tracing::warn!(scenario = %self.scenario.name, %error, "rollback failed");
                self.record_failure(step, Origin::Rollback, "rollback".to_owned(), error, duration);
            }
        }
    }

    fn handle(&self, handle: &str) -> Result<StatementId, DriverError> {
        self.handles
            .get(handle)
            .copied()
            .ok_or_else(|| DriverError::execution(format!("handle `{handle}` was never prepared")))
    }

    fn deallocate_handle(
        &mut self,
        handle: &str,
        spelling: IdentSpelling,
    ) -> Result<Outcome, DriverError> {
        let id = self.handle(handle)?;
        let sql = self
            .driver
            .statement_sql(id)
            .map(str::to_owned)
            .ok_or_else(|| {
                DriverError::execution(format!("handle `{handle}` has no statement text"))
            })?;
        let listed = self
            .driver
            .list_prepared()?
            .into_iter()
            .find(|entry| !entry.internal && entry.statement == sql)
            .ok_or_else(|| {
                DriverError::execution(format!("handle `{handle}` has no live server-side statement"))
            })?;
        let sent = spelling.apply(&listed.name);
        self.driver.deallocate(Some(&sent))?;
        Ok(Outcome::Deallocated {
            case_folded: sent != listed.name,
            sent: Some(sent),
            listed_as: Some(listed.name),
        })
    }

    fn apply(&mut self, step: &'s Step) -> Result<Outcome, DriverError> {
        match step {
            Step::Prepare { handle, sql, params } => {
                let id = self.driver.prepare(sql, params)?;
                self.handles.insert(handle.as_str(), id);
                Ok(Outcome::Prepared {
                    params: params.len(),
                })
            }
            Step::BindExecute {
                handle,
                values,
                kind,
            } => {
                let id = self.handle(handle)?;
                match kind {
                    ExecKind::Query => Ok(Outcome::Rows {
                        rows: self.driver.query(id, values)?,
                    }),
                    ExecKind::Update => Ok(Outcome::Updated {
                        count: self.driver.update(id, values)?,
                    }),
                    ExecKind::Batch => {
                        let pending = self.batches.entry(handle.as_str()).or_default();
                        pending.push(values.clone());
                        Ok(Outcome::Queued {
                            pending: pending.len(),
                        })
                    }
                }
            }
            Step::FlushBatch { handle } => {
                let id = self.handle(handle)?;
                let rows = self.batches.remove(handle.as_str()).unwrap_or_default();
                Ok(Outcome::Batch {
                    counts: self.driver.execute_batch(id, &rows)?,
                })
            }
            Step::SetTransactionMode { mode } => Ok(Outcome::Issued {
                statements: self.driver.set_transaction_mode(*mode)?,
            }),
            Step::Commit => Ok(Outcome::Issued {
                statements: self.driver.commit()?,
            }),
            Step::Deallocate {
                target: DeallocTarget::All,
            } => {
                self.driver.deallocate(None)?;
                Ok(Outcome::Deallocated {
                    sent: None,
                    listed_as: None,
                    case_folded: false,
                })
            }
            Step::Deallocate {
                target: DeallocTarget::Handle { handle, spelling },
            } => self.deallocate_handle(handle, *spelling),
            Step::InspectPreparedStatements => Ok(Outcome::Listing {
                statements: self.driver.list_prepared()?,
            }),
            Step::InspectSession => Ok(Outcome::Session {
                settings: self.driver.session_info()?,
            }),
        }
    }

    fn run_setup(&mut self) -> Result<(), DriverError> {
        let scenario = self.scenario;
        for sql in &scenario.setup {
            let started = Instant::now();
            if let Err(error) = self.driver.setup(sql) {
                let duration = started.elapsed();
                self.record_failure(0, Origin::Setup, "setup".to_owned(), error.clone(), duration);
                return Err(error);
            }
        }
        Ok(())
    }

    fn run_steps(&mut self) -> RunStatus {
        if let Err(error) = self.run_setup() {
            self.rollback(0);
            return RunStatus::Aborted {
                step: 0,
                kind: error.kind,
            };
        }
        let scenario = self.scenario;
        for (index, step) in scenario.steps.iter().enumerate() {
            let label = step.label();
            tracing::debug!(step = index, %label, "applying");
            let started = Instant::now();
            let result = self.apply(step);
            let duration = started.elapsed();
            self.record_implicit(index);
            match result {
                Ok(outcome) => self.record(index, Origin::Step, label, outcome, duration),
                Err(error) => {
                    let kind = error.kind;
                    self.record_failure(index, Origin::Step, label, error, duration);
                    self.rollback(index);
                    return RunStatus::Aborted { step: index, kind };
                }
            }
        }
        if !self.batches.is_empty() {
            tracing::warn!(
                scenario = %scenario.name,
                handles = ?self.batches.keys().collect::<Vec<_>>(),
                "discarding unflushed batches"
            );
        }
        RunStatus::Completed
    }

    fn finish(self, target: &str, status: RunStatus) -> RunResult {
        let Self {
            scenario,
            driver,
            observations,
            ..
        } = self;
        let backend = driver.kind();
        if let Err(error) = driver.close() {
            tracing::warn!(scenario = %scenario.name, %error, "closing session failed");
        }
        RunResult {
            scenario: scenario.name.clone(),
            backend,
            target: target.to_owned(),
            status,
            observations,
        }
    }
}

/// Run `scenario` on an open session, closing it afterwards.
///
/// `target` is the label recorded in the result.
pub fn run<D: DbDriver>(scenario: &Scenario, target: &str, driver: D) -> RunResult {
    tracing::info!(scenario = %scenario.name, backend = %target, "running scenario");
    let mut runner = Runner::new(scenario, driver);
    let status = runner.run_steps();
    tracing::info!(scenario = %scenario.name, backend = %target, %status, "scenario finished");
    runner.finish(target, status)
}

/// Connect to `target` and run `scenario` there.
///
/// Scenarios requiring a capability the backend lacks are skipped without
/// connecting; a failed connection is reported in the result's status.
pub fn run_against<D: DbDriver>(
    scenario: &Scenario,
    target: &BackendTarget,
    timeout: Duration,
) -> RunResult {
    let label = target.label();
    let missing = scenario.missing_capabilities(&target.kind.capabilities());
    let status = if missing.is_empty() {
        let options = target.options.with_overrides(&scenario.overrides);
        let target = target.clone().with_options(options);
        match D::connect(&target, timeout) {
            Ok(driver) => return run(scenario, &label, driver),
            Err(error) => {
                tracing::warn!(scenario = %scenario.name, backend = %label, %error, "connect failed");
                RunStatus::ConnectFailed {
                    kind: error.kind,
                    message: error.message,
                }
            }
        }
    } else {
        tracing::info!(scenario = %scenario.name, backend = %label, ?missing, "skipping scenario");
        RunStatus::Skipped { missing }
    };
    RunResult {
        scenario: scenario.name.clone(),
        backend: target.kind,
        target: label,
        status,
        observations: Vec::new(),
    }
}
