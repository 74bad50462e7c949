use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::dialect::Dialect;
use crate::error::{MigrationError, ValidationError};
use crate::executor::SchemaInspector;
use crate::ledger::LedgerEntry;
use crate::migration::{compare_ids, Migration, MigrationRegistry};
use crate::operation::Operation;
use crate::plan::{Direction, DownTarget, Plan, PlanStep, UpTarget};

/// Builds validated plans from the registry and a snapshot of the ledger.
pub struct Resolver<'a> {
    registry: &'a MigrationRegistry,
    dialect: &'a dyn Dialect,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a MigrationRegistry, dialect: &'a dyn Dialect) -> Self {
        Self { registry, dialect }
    }

    pub fn plan_up(
        &self,
        entries: &[LedgerEntry],
        target: &UpTarget,
        inspector: &mut dyn SchemaInspector,
    ) -> Result<Plan<'a>, MigrationError> {
        self.registry.validate()?;
        if let UpTarget::To(id) = target {
            self.check_target(id)?;
        }
        self.check_drift(entries)?;

        let applied: HashSet<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        let newest_applied = entries
            .iter()
            .map(|e| e.id.as_str())
            .max_by(|a, b| compare_ids(a, b));

        let mut steps = Vec::new();
        for migration in self.registry.sorted() {
            if applied.contains(migration.id) {
                continue;
            }
            if let UpTarget::To(id) = target {
                if compare_ids(migration.id, id) == Ordering::Greater {
                    break;
                }
            }
            if let Some(newest) = newest_applied {
                if compare_ids(migration.id, newest) == Ordering::Less {
                    warn!(
                        migration = migration.id,
                        newest_applied = newest,
                        "Planning migration older than the newest applied one"
                    );
                }
            }
            steps.push(PlanStep {
                migration,
                operations: migration.operations().to_vec(),
            });
        }

        self.check_translation(&steps)?;
        self.check_dependencies(&steps, &applied)?;
        self.check_tables(entries, &steps, inspector)?;

        debug!(units = steps.len(), "Up plan resolved");
        Ok(Plan::new(Direction::Up, steps)?)
    }

    pub fn plan_down(
        &self,
        entries: &[LedgerEntry],
        target: &DownTarget,
    ) -> Result<Plan<'a>, MigrationError> {
        self.registry.validate()?;
        if let DownTarget::To(id) = target {
            self.check_target(id)?;
        }
        self.check_drift(entries)?;

        let mut newest_first: Vec<&LedgerEntry> = entries.iter().collect();
        newest_first.sort_by(|a, b| compare_ids(&b.id, &a.id));

        let selected: Vec<&LedgerEntry> = match target {
            DownTarget::LastBatch => {
                let latest = entries.iter().map(|e| e.batch).max();
                newest_first
                    .into_iter()
                    .filter(|e| Some(e.batch) == latest)
                    .collect()
            }
            DownTarget::Steps(n) => newest_first.into_iter().take(*n).collect(),
            DownTarget::To(id) => newest_first
                .into_iter()
                .filter(|e| compare_ids(&e.id, id) == Ordering::Greater)
                .collect(),
            DownTarget::All => newest_first,
        };

        let mut steps = Vec::with_capacity(selected.len());
        for entry in selected {
            let migration = self
                .registry
                .get(&entry.id)
                .ok_or_else(|| ValidationError::MissingDefinition(entry.id.clone()))?;
            let operations =
                migration
                    .down_operations()
                    .map_err(|(operation_index, reason)| ValidationError::Irreversible {
                        migration: migration.id.to_string(),
                        operation_index,
                        reason,
                    })?;
            steps.push(PlanStep {
                migration,
                operations,
            });
        }

        self.check_translation(&steps)?;

        debug!(units = steps.len(), "Down plan resolved");
        Ok(Plan::new(Direction::Down, steps)?)
    }

    fn check_target(&self, id: &str) -> Result<(), ValidationError> {
        if self.registry.contains(id) {
            Ok(())
        } else {
            Err(ValidationError::UnknownTarget(id.to_string()))
        }
    }

    /// Applied units must still hash to what the ledger recorded.
    fn check_drift(&self, entries: &[LedgerEntry]) -> Result<(), ValidationError> {
        let mut sorted: Vec<&LedgerEntry> = entries.iter().collect();
        sorted.sort_by(|a, b| compare_ids(&a.id, &b.id));

        for entry in sorted {
            if let Some(migration) = self.registry.get(&entry.id) {
                let current = migration.checksum();
                if current != entry.checksum {
                    return Err(ValidationError::ChecksumMismatch {
                        migration: entry.id.clone(),
                        recorded: entry.checksum.clone(),
                        current,
                    });
                }
            }
        }
        Ok(())
    }

    fn check_translation(&self, steps: &[PlanStep<'_>]) -> Result<(), ValidationError> {
        for step in steps {
            for (operation_index, op) in step.operations.iter().enumerate() {
                self.dialect
                    .translate(op)
                    .map_err(|e| ValidationError::Unsupported {
                        migration: step.id().to_string(),
                        operation_index,
                        reason: e.to_string(),
                    })?;
            }
        }
        Ok(())
    }

    /// Declared dependencies must be registered, sort earlier and be applied
    /// or planned ahead of the dependent unit.
    fn check_dependencies(
        &self,
        steps: &[PlanStep<'_>],
        applied: &HashSet<&str>,
    ) -> Result<(), ValidationError> {
        let mut planned: HashSet<&str> = HashSet::new();

        for step in steps {
            for dependency in step.migration.dependencies {
                let missing = |reason: &str| ValidationError::MissingDependency {
                    migration: step.id().to_string(),
                    dependency: dependency.to_string(),
                    reason: reason.to_string(),
                };

                if !self.registry.contains(dependency) {
                    return Err(missing("not registered"));
                }
                if compare_ids(dependency, step.id()) != Ordering::Less {
                    return Err(missing("a dependency must have a smaller id"));
                }
                if !applied.contains(dependency) && !planned.contains(dependency) {
                    return Err(missing("neither applied nor planned before it"));
                }
            }
            planned.insert(step.id());
        }
        Ok(())
    }

    /// Replays table creation and removal over the applied history and then
    /// the plan; every table an operation needs must be live at its position.
    fn check_tables(
        &self,
        entries: &[LedgerEntry],
        steps: &[PlanStep<'_>],
        inspector: &mut dyn SchemaInspector,
    ) -> Result<(), MigrationError> {
        let mut history: HashMap<String, bool> = HashMap::new();

        let mut applied: Vec<&Migration> = entries
            .iter()
            .filter_map(|e| self.registry.get(&e.id))
            .collect();
        applied.sort_by(|a, b| compare_ids(a.id, b.id));
        for migration in applied {
            for op in migration.operations() {
                record_lifecycle(&mut history, op);
            }
        }

        for step in steps {
            for (operation_index, op) in step.operations.iter().enumerate() {
                for table in op.required_tables() {
                    let live = match history.get(table) {
                        Some(&live) => live,
                        None => {
                            let exists = inspector
                                .table_exists(table)
                                .map_err(MigrationError::Inspect)?;
                            if exists {
                                history.insert(table.to_string(), true);
                            }
                            exists
                        }
                    };
                    if !live {
                        return Err(ValidationError::UnresolvedDependency {
                            migration: step.id().to_string(),
                            operation_index,
                            table: table.to_string(),
                        }
                        .into());
                    }
                }
                record_lifecycle(&mut history, op);
            }
        }
        Ok(())
    }
}

fn record_lifecycle(history: &mut HashMap<String, bool>, op: &Operation) {
    if let Some(table) = op.created_table() {
        history.insert(table.to_string(), true);
    }
    if let Some(table) = op.dropped_table() {
        history.insert(table.to_string(), false);
    }
}
