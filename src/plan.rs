use std::collections::HashSet;

use crate::dialect::{Dialect, TranslateError};
use crate::error::ValidationError;
use crate::migration::Migration;
use crate::operation::Operation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// How far an up run goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpTarget {
    /// Every pending migration.
    Head,
    /// Pending migrations up to and including this id.
    To(String),
}

/// How far a down run goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownTarget {
    /// Every migration recorded in the most recent batch.
    LastBatch,
    /// The n most recently applied migrations by id.
    Steps(usize),
    /// Everything applied after this id; the id itself stays applied.
    To(String),
    All,
}

#[derive(Debug, Clone)]
pub struct PlanStep<'a> {
    pub migration: &'a Migration,
    /// Forward operations on the way up, undo operations on the way down.
    pub operations: Vec<Operation>,
}

impl PlanStep<'_> {
    pub fn id(&self) -> &'static str {
        self.migration.id
    }
}

/// Ordered migrations for one run, validated before anything executes.
#[derive(Debug, Clone)]
pub struct Plan<'a> {
    direction: Direction,
    steps: Vec<PlanStep<'a>>,
}

impl<'a> Plan<'a> {
    pub fn new(direction: Direction, steps: Vec<PlanStep<'a>>) -> Result<Self, ValidationError> {
        let mut seen = HashSet::new();
        for step in &steps {
            if !seen.insert(step.id()) {
                return Err(ValidationError::DuplicateId(step.id().to_string()));
            }
        }
        Ok(Self { direction, steps })
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn steps(&self) -> &[PlanStep<'a>] {
        &self.steps
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// DDL each step would run, without executing anything.
    pub fn sql(&self, dialect: &dyn Dialect) -> Result<Vec<(String, Vec<String>)>, TranslateError> {
        let mut result = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let mut statements = Vec::new();
            for op in &step.operations {
                statements.extend(dialect.translate(op)?);
            }
            result.push((step.id().to_string(), statements));
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{Column, ColumnType};
    use crate::dialect::{Postgres, Sqlite};
    use crate::operation::{AddColumn, AlterColumnType, CreateTable};

    fn step(migration: &Migration) -> PlanStep<'_> {
        PlanStep {
            migration,
            operations: migration.operations().to_vec(),
        }
    }

    #[test]
    fn rejects_repeated_unit() {
        let m = Migration::new("1_A").operation(CreateTable::new("a").column("id", ColumnType::Integer));
        let err = Plan::new(Direction::Up, vec![step(&m), step(&m)]).unwrap_err();
        assert_eq!(err, ValidationError::DuplicateId("1_A".to_string()));
    }

    #[test]
    fn previews_sql_per_unit() {
        let a = Migration::new("1_CreateUsers")
            .operation(CreateTable::new("users").column("id", ColumnType::Integer));
        let b = Migration::new("2_AddEmail")
            .operation(AddColumn::new("users", Column::new("email", ColumnType::Text)));
        let plan = Plan::new(Direction::Up, vec![step(&a), step(&b)]).unwrap();

        assert_eq!(plan.ids(), vec!["1_CreateUsers", "2_AddEmail"]);
        assert_eq!(plan.direction(), Direction::Up);

        let sql = plan.sql(&Sqlite).unwrap();
        assert_eq!(sql.len(), 2);
        assert_eq!(sql[0].0, "1_CreateUsers");
        assert!(sql[0].1[0].contains("CREATE TABLE \"users\""));
        assert!(sql[1].1[0].contains("ADD COLUMN \"email\""));
    }

    #[test]
    fn preview_surfaces_translation_errors() {
        let m = Migration::new("1_Widen")
            .operation(AlterColumnType::new("users", "name", ColumnType::Text));
        let plan = Plan::new(Direction::Up, vec![step(&m)]).unwrap();

        assert!(plan.sql(&Sqlite).is_err());
        assert!(plan.sql(&Postgres).is_ok());
    }

    #[test]
    fn empty_plan() {
        let plan = Plan::new(Direction::Down, Vec::new()).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.len(), 0);
    }
}
