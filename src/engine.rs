use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use crate::config::EngineConfig;
use crate::dialect::Dialect;
use crate::error::{ExecutionError, FailureCause, MigrationError};
use crate::executor::{Executor, ExecutorError};
use crate::ledger::{Ledger, LedgerEntry};
use crate::migration::{compare_ids, MigrationRegistry};
use crate::operation::Operation;
use crate::plan::{Direction, DownTarget, Plan, PlanStep, UpTarget};
use crate::resolver::Resolver;

/// Lifecycle of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Planning,
    Applying,
    Committed,
    RollingBack,
    RolledBack,
    PlanRejected,
    Cancelled,
    PartiallyApplied,
}

/// Cooperative cancellation shared with other threads.
///
/// Planning stops before anything is applied. While applying, the unit in
/// flight finishes and the remaining units are not started.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, AtomicOrdering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(AtomicOrdering::SeqCst)
    }

    fn clear(&self) {
        self.0.store(false, AtomicOrdering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedOperation {
    pub migration: String,
    pub operation_index: usize,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub direction: Direction,
    /// Batch shared by every unit of an up run; `None` when nothing was
    /// applied or the run went down.
    pub batch: Option<i64>,
    /// Units applied or reverted, in execution order.
    pub migrations: Vec<String>,
    /// Operations whose change was already present.
    pub skipped: Vec<SkippedOperation>,
    pub state: RunState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub applied: Vec<LedgerEntry>,
    pub pending: Vec<String>,
    /// Applied units whose definition changed since.
    pub drifted: Vec<String>,
    /// Applied units that are no longer registered.
    pub unknown: Vec<String>,
}

pub struct Engine<'a, L: Ledger, E: Executor> {
    registry: &'a MigrationRegistry,
    dialect: &'a dyn Dialect,
    ledger: L,
    executor: E,
    config: EngineConfig,
    state: RunState,
    cancel: CancelToken,
}

impl<'a, L: Ledger, E: Executor> Engine<'a, L, E> {
    pub fn new(
        registry: &'a MigrationRegistry,
        dialect: &'a dyn Dialect,
        ledger: L,
        executor: E,
    ) -> Self {
        Self {
            registry,
            dialect,
            ledger,
            executor,
            config: EngineConfig::default(),
            state: RunState::Idle,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A cancellation requested before or during a run applies to that run
    /// and is cleared when it ends.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn into_parts(self) -> (L, E) {
        (self.ledger, self.executor)
    }

    /// Resolve the up plan without taking the lock or running anything.
    pub fn plan_up(&mut self, target: &UpTarget) -> Result<Plan<'a>, MigrationError> {
        let entries = self.ledger.entries()?;
        Resolver::new(self.registry, self.dialect).plan_up(&entries, target, &mut self.executor)
    }

    /// Resolve the down plan without taking the lock or running anything.
    pub fn plan_down(&mut self, target: &DownTarget) -> Result<Plan<'a>, MigrationError> {
        let entries = self.ledger.entries()?;
        Resolver::new(self.registry, self.dialect).plan_down(&entries, target)
    }

    #[instrument(skip(self))]
    pub fn run_up(&mut self, target: UpTarget) -> Result<RunReport, MigrationError> {
        self.begin_run()?;
        let result = match self.plan_up(&target) {
            Ok(plan) => self.apply(plan),
            Err(e) => Err(self.reject(e)),
        };
        self.end_run();
        result
    }

    #[instrument(skip(self))]
    pub fn run_down(&mut self, target: DownTarget) -> Result<RunReport, MigrationError> {
        self.begin_run()?;
        let result = match self.plan_down(&target) {
            Ok(plan) => self.apply(plan),
            Err(e) => Err(self.reject(e)),
        };
        self.end_run();
        result
    }

    pub fn status(&mut self) -> Result<Status, MigrationError> {
        let mut applied = self.ledger.entries()?;
        applied.sort_by(|a, b| compare_ids(&a.id, &b.id));

        let mut drifted = Vec::new();
        let mut unknown = Vec::new();
        for entry in &applied {
            match self.registry.get(&entry.id) {
                Some(migration) if migration.checksum() != entry.checksum => {
                    drifted.push(entry.id.clone())
                }
                Some(_) => {}
                None => {
                    warn!(migration = %entry.id, "Applied migration is not registered");
                    unknown.push(entry.id.clone());
                }
            }
        }

        let pending = self
            .registry
            .sorted()
            .into_iter()
            .filter(|m| !applied.iter().any(|e| e.id == m.id))
            .map(|m| m.id.to_string())
            .collect();

        Ok(Status {
            applied,
            pending,
            drifted,
            unknown,
        })
    }

    fn begin_run(&mut self) -> Result<(), MigrationError> {
        self.state = RunState::Idle;
        let owner = self.config.owner.clone();

        self.hold_lock(&owner)?;

        debug!(owner = %owner, "Migration lock acquired");
        self.state = RunState::Planning;
        Ok(())
    }

    /// Take or extend the lease. Fails with the current holder when another
    /// owner has it.
    fn hold_lock(&mut self, owner: &str) -> Result<(), MigrationError> {
        if self.ledger.acquire_lock(owner, self.config.lock_lease)? {
            return Ok(());
        }
        let holder = self
            .ledger
            .lock_holder()?
            .unwrap_or_else(|| "unknown".to_string());
        warn!(owner = %owner, holder = %holder, "Migration lock is held by another run");
        Err(MigrationError::LockContention { owner: holder })
    }

    fn end_run(&mut self) {
        if let Err(e) = self.ledger.release_lock(&self.config.owner) {
            warn!(owner = %self.config.owner, error = %e, "Failed to release migration lock");
        }
        self.cancel.clear();
    }

    fn reject(&mut self, err: MigrationError) -> MigrationError {
        warn!(error = %err, "Plan rejected");
        self.state = RunState::PlanRejected;
        err
    }

    fn cancelled(&mut self, mut report: RunReport) -> RunReport {
        info!(
            completed = report.migrations.len(),
            "Run cancelled, remaining migrations not started"
        );
        self.state = RunState::Cancelled;
        report.state = RunState::Cancelled;
        if report.migrations.is_empty() {
            report.batch = None;
        }
        report
    }

    fn apply(&mut self, plan: Plan<'a>) -> Result<RunReport, MigrationError> {
        let direction = plan.direction();
        let mut report = RunReport {
            direction,
            batch: None,
            migrations: Vec::new(),
            skipped: Vec::new(),
            state: RunState::Planning,
        };

        if self.cancel.is_cancelled() {
            return Ok(self.cancelled(report));
        }

        if plan.is_empty() {
            info!(direction = ?direction, "No migrations to run");
            self.state = RunState::Committed;
            report.state = RunState::Committed;
            return Ok(report);
        }

        let batch = match direction {
            Direction::Up => self.ledger.latest_batch()?.unwrap_or(0) + 1,
            Direction::Down => 0,
        };
        if direction == Direction::Up {
            report.batch = Some(batch);
        }

        self.state = RunState::Applying;
        self.executor
            .set_timeout(self.config.operation_timeout)
            .map_err(MigrationError::Inspect)?;

        let owner = self.config.owner.clone();
        for step in plan.steps() {
            if self.cancel.is_cancelled() {
                return Ok(self.cancelled(report));
            }

            // The lease may have lapsed during a long unit.
            if let Err(e) = self.hold_lock(&owner) {
                warn!(
                    completed = report.migrations.len(),
                    "Migration lock lost, remaining migrations not started"
                );
                self.state = RunState::Cancelled;
                return Err(e);
            }

            self.apply_step(step, &report.migrations, &mut report.skipped)?;

            let recorded = match direction {
                Direction::Up => self.ledger.record_applied(step.migration, batch),
                Direction::Down => self.ledger.record_reverted(step.id()),
            };
            if let Err(e) = recorded {
                warn!(
                    migration = step.id(),
                    error = %e,
                    "Migration ran but the ledger could not be updated"
                );
                self.state = RunState::PartiallyApplied;
                return Err(e.into());
            }

            match direction {
                Direction::Up => info!(migration = step.id(), batch, "Migration applied"),
                Direction::Down => info!(migration = step.id(), "Migration reverted"),
            }
            report.migrations.push(step.id().to_string());
        }

        info!(
            direction = ?direction,
            migrations = report.migrations.len(),
            skipped = report.skipped.len(),
            "Run committed"
        );
        self.state = RunState::Committed;
        report.state = RunState::Committed;
        Ok(report)
    }

    fn apply_step(
        &mut self,
        step: &PlanStep<'a>,
        completed: &[String],
        skipped: &mut Vec<SkippedOperation>,
    ) -> Result<(), MigrationError> {
        let transactional = self.dialect.supports_transactional_ddl() && step.migration.is_atomic();

        if transactional {
            if let Err(e) = self.executor.begin() {
                self.state = RunState::RolledBack;
                return Err(ExecutionError::Failed {
                    migration: step.id().to_string(),
                    operation_index: 0,
                    cause: FailureCause::Begin(e.to_string()),
                    rolled_back: false,
                    completed: completed.to_vec(),
                }
                .into());
            }
        }

        let mut statements_run = 0;
        let mut applied_operations = Vec::new();

        for (index, op) in step.operations.iter().enumerate() {
            match self.apply_operation(step, index, op, &mut statements_run) {
                Ok(true) => applied_operations.push(index),
                Ok(false) => skipped.push(SkippedOperation {
                    migration: step.id().to_string(),
                    operation_index: index,
                    description: op.describe(),
                }),
                Err(cause) => {
                    return Err(self.fail_step(
                        step,
                        index,
                        cause,
                        transactional,
                        statements_run,
                        applied_operations,
                        completed,
                    ))
                }
            }
        }

        if transactional {
            if let Err(e) = self.executor.commit() {
                let rolled_back = self.roll_back(step);
                return Err(ExecutionError::Failed {
                    migration: step.id().to_string(),
                    operation_index: step.operations.len().saturating_sub(1),
                    cause: FailureCause::Commit(e.to_string()),
                    rolled_back,
                    completed: completed.to_vec(),
                }
                .into());
            }
        }

        Ok(())
    }

    /// Returns `Ok(false)` when the guard reports the change already present.
    fn apply_operation(
        &mut self,
        step: &PlanStep<'a>,
        index: usize,
        op: &Operation,
        statements_run: &mut usize,
    ) -> Result<bool, FailureCause> {
        if self.config.guard_operations {
            if let Some(guard) = op.guard() {
                let holds = guard
                    .holds(&mut self.executor)
                    .map_err(|e| self.cause(e))?;
                if !holds {
                    debug!(
                        migration = step.id(),
                        operation = index,
                        description = %op.describe(),
                        "Skipping operation, change already present"
                    );
                    return Ok(false);
                }
            }
        }

        let statements = self
            .dialect
            .translate(op)
            .map_err(|e| FailureCause::Rejected(e.to_string()))?;

        let started = Instant::now();
        for sql in &statements {
            debug!(migration = step.id(), operation = index, sql = %sql, "Executing statement");
            self.executor.execute(sql).map_err(|e| self.cause(e))?;
            *statements_run += 1;
        }

        if let Some(limit) = self.config.operation_timeout {
            if started.elapsed() > limit {
                return Err(FailureCause::Timeout { limit: Some(limit) });
            }
        }

        Ok(true)
    }

    fn cause(&self, err: ExecutorError) -> FailureCause {
        match err {
            ExecutorError::Rejected(message) => FailureCause::Rejected(message),
            ExecutorError::Timeout => FailureCause::Timeout {
                limit: self.config.operation_timeout,
            },
        }
    }

    fn roll_back(&mut self, step: &PlanStep<'a>) -> bool {
        self.state = RunState::RollingBack;
        let rolled_back = match self.executor.rollback() {
            Ok(()) => true,
            Err(e) => {
                warn!(migration = step.id(), error = %e, "Rollback failed");
                false
            }
        };
        self.state = RunState::RolledBack;
        rolled_back
    }

    #[allow(clippy::too_many_arguments)]
    fn fail_step(
        &mut self,
        step: &PlanStep<'a>,
        operation_index: usize,
        cause: FailureCause,
        transactional: bool,
        statements_run: usize,
        applied_operations: Vec<usize>,
        completed: &[String],
    ) -> MigrationError {
        warn!(
            migration = step.id(),
            operation = operation_index,
            cause = %cause,
            "Migration failed"
        );

        let migration = step.id().to_string();
        let completed = completed.to_vec();

        if transactional {
            let rolled_back = self.roll_back(step);
            return ExecutionError::Failed {
                migration,
                operation_index,
                cause,
                rolled_back,
                completed,
            }
            .into();
        }

        if statements_run > 0 {
            self.state = RunState::PartiallyApplied;
            return ExecutionError::PartialApply {
                migration,
                operation_index,
                cause,
                applied_operations,
                completed,
            }
            .into();
        }

        self.state = RunState::RolledBack;
        ExecutionError::Failed {
            migration,
            operation_index,
            cause,
            rolled_back: false,
            completed,
        }
        .into()
    }
}
