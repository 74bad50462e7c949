pub mod column;
pub mod config;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod migration;
pub mod operation;
pub mod plan;
pub mod resolver;

pub mod prelude {
    pub use crate::column::{Column, ColumnReference, ColumnType, ReferentialAction};
    pub use crate::config::EngineConfig;
    pub use crate::dialect::{Dialect, MySql, Postgres, Sqlite, TranslateError};
    pub use crate::engine::{CancelToken, Engine, RunReport, RunState, SkippedOperation, Status};
    pub use crate::error::{ExecutionError, FailureCause, MigrationError, ValidationError};
    pub use crate::executor::{Executor, ExecutorError, MemoryExecutor, SchemaInspector};
    pub use crate::ledger::{InMemoryLedger, Ledger, LedgerEntry, LedgerError};
    pub use crate::migration::{Migration, MigrationRegistry};
    pub use crate::operation::{
        AddColumn, AddForeignKey, AddKey, AlterColumnType, CreateTable, DropColumn,
        DropForeignKey, DropKey, DropTable, DropTrigger, DropView, ForeignKey, Key, Operation,
        RunSql,
    };
    pub use crate::plan::{Direction, DownTarget, Plan, PlanStep, UpTarget};

    #[cfg(feature = "sqlite")]
    pub use crate::executor::SqliteExecutor;
    #[cfg(feature = "sqlite")]
    pub use crate::ledger::SqliteLedger;

    #[cfg(feature = "postgres")]
    pub use crate::executor::PostgresExecutor;
    #[cfg(feature = "postgres")]
    pub use crate::ledger::PostgresLedger;

    #[cfg(feature = "mysql")]
    pub use crate::executor::MySqlExecutor;
    #[cfg(feature = "mysql")]
    pub use crate::ledger::MySqlLedger;
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    fn licensing_registry() -> MigrationRegistry {
        let mut registry = MigrationRegistry::new();

        registry.register(
            Migration::new("20240102_AddPractitionerLicenseFK")
                .depends_on(&["20231201_CreatePractitioners", "20240101_CreateLicenses"])
                .operation(
                    AddForeignKey::new("licenses", "practitioner_id", "practitioners", "id")
                        .on_delete(ReferentialAction::Cascade),
                ),
        );

        registry.register(
            Migration::new("20240101_CreateLicenses").operation(
                CreateTable::new("licenses")
                    .add_column(Column::new("id", ColumnType::Serial).primary_key())
                    .add_column(Column::new("practitioner_id", ColumnType::Integer).not_null())
                    .add_column(Column::new("number", ColumnType::VarChar(40)).not_null())
                    .add_column(Column::new("issued_on", ColumnType::Date)),
            ),
        );

        registry.register(
            Migration::new("20231201_CreatePractitioners").operation(
                CreateTable::new("practitioners")
                    .add_column(Column::new("id", ColumnType::Serial).primary_key())
                    .add_column(Column::new("name", ColumnType::Text).not_null()),
            ),
        );

        registry
    }

    #[test]
    fn full_migration_workflow() {
        let registry = licensing_registry();
        let mut engine = Engine::new(
            &registry,
            &Postgres,
            InMemoryLedger::new(),
            MemoryExecutor::new(),
        );

        let plan = engine.plan_up(&UpTarget::Head).unwrap();
        assert_eq!(
            plan.ids(),
            vec![
                "20231201_CreatePractitioners",
                "20240101_CreateLicenses",
                "20240102_AddPractitionerLicenseFK"
            ]
        );

        let report = engine.run_up(UpTarget::Head).unwrap();
        assert_eq!(report.state, RunState::Committed);
        assert_eq!(report.migrations.len(), 3);

        let executed = engine.executor().executed();
        assert!(executed[0].contains("CREATE TABLE \"practitioners\""));
        assert!(executed[1].contains("CREATE TABLE \"licenses\""));
        assert!(executed[2].contains("ON DELETE CASCADE"));

        let status = engine.status().unwrap();
        assert!(status.pending.is_empty());
        assert!(status.drifted.is_empty());
        assert_eq!(status.applied.len(), 3);
    }

    #[test]
    fn partial_target_then_head() {
        let registry = licensing_registry();
        let mut engine = Engine::new(
            &registry,
            &Postgres,
            InMemoryLedger::new(),
            MemoryExecutor::new(),
        );

        let first = engine
            .run_up(UpTarget::To("20240101_CreateLicenses".to_string()))
            .unwrap();
        assert_eq!(first.batch, Some(1));
        assert_eq!(first.migrations.len(), 2);

        let second = engine.run_up(UpTarget::Head).unwrap();
        assert_eq!(second.batch, Some(2));
        assert_eq!(second.migrations, vec!["20240102_AddPractitionerLicenseFK"]);
    }

    #[test]
    fn down_to_target_keeps_the_target_applied() {
        let registry = licensing_registry();
        let mut engine = Engine::new(
            &registry,
            &Sqlite,
            InMemoryLedger::new(),
            MemoryExecutor::new(),
        );

        // SQLite cannot add a foreign key to an existing table.
        let rejected = engine.run_up(UpTarget::Head).unwrap_err();
        assert!(matches!(
            rejected,
            MigrationError::Validation(ValidationError::Unsupported { .. })
        ));

        let plan = engine
            .plan_up(&UpTarget::To("20240101_CreateLicenses".to_string()))
            .unwrap();
        assert_eq!(plan.len(), 2);
        engine
            .run_up(UpTarget::To("20240101_CreateLicenses".to_string()))
            .unwrap();

        let report = engine
            .run_down(DownTarget::To("20231201_CreatePractitioners".to_string()))
            .unwrap();
        assert_eq!(report.migrations, vec!["20240101_CreateLicenses"]);

        let applied: Vec<&str> = engine
            .ledger()
            .snapshot()
            .iter()
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(applied, vec!["20231201_CreatePractitioners"]);
        assert!(engine
            .executor()
            .executed()
            .last()
            .is_some_and(|sql| sql.contains("DROP TABLE \"licenses\"")));
    }

    #[test]
    fn irreversible_unit_blocks_the_down_plan() {
        let mut registry = licensing_registry();
        registry.register(
            Migration::new("20240201_BackfillNumbers")
                .operation(RunSql::new("UPDATE licenses SET number = upper(number)")),
        );
        let mut engine = Engine::new(
            &registry,
            &Postgres,
            InMemoryLedger::new(),
            MemoryExecutor::new(),
        );
        engine.run_up(UpTarget::Head).unwrap();
        let executed = engine.executor().executed().len();

        let err = engine.run_down(DownTarget::Steps(2)).unwrap_err();

        assert!(matches!(
            err,
            MigrationError::Validation(ValidationError::Irreversible { ref migration, .. })
                if migration == "20240201_BackfillNumbers"
        ));
        assert_eq!(engine.state(), RunState::PlanRejected);
        assert_eq!(engine.executor().executed().len(), executed);
        assert_eq!(engine.ledger().snapshot().len(), 4);
    }

    #[test]
    fn explicit_backward_operations_replace_inversion() {
        let mut registry = licensing_registry();
        registry.register(
            Migration::new("20240201_BackfillNumbers")
                .operation(RunSql::new("UPDATE licenses SET number = upper(number)"))
                .backward_ops(vec![RunSql::new("UPDATE licenses SET number = lower(number)").into()]),
        );
        let mut engine = Engine::new(
            &registry,
            &Postgres,
            InMemoryLedger::new(),
            MemoryExecutor::new(),
        );
        engine.run_up(UpTarget::Head).unwrap();

        let report = engine.run_down(DownTarget::Steps(1)).unwrap();

        assert_eq!(report.migrations, vec!["20240201_BackfillNumbers"]);
        assert!(engine
            .executor()
            .executed()
            .last()
            .is_some_and(|sql| sql.contains("lower(number)")));
    }

    #[test]
    fn declared_dependency_must_be_applied_or_planned() {
        let mut registry = MigrationRegistry::new();
        registry.register(
            Migration::new("20240301_AddRenewals")
                .depends_on(&["20240101_CreateLicenses"])
                .operation(CreateTable::new("renewals").column("id", ColumnType::Serial)),
        );
        let mut engine = Engine::new(
            &registry,
            &Postgres,
            InMemoryLedger::new(),
            MemoryExecutor::new(),
        );

        let err = engine.run_up(UpTarget::Head).unwrap_err();

        assert!(matches!(
            err,
            MigrationError::Validation(ValidationError::MissingDependency { ref dependency, .. })
                if dependency == "20240101_CreateLicenses"
        ));
        assert!(engine.ledger().snapshot().is_empty());
    }
}
