mod column;
mod foreign_key;
mod key;
mod sql;
mod table;

pub use column::{AddColumn, AlterColumnType, DropColumn, TypeSnapshot};
pub use foreign_key::{AddForeignKey, DropForeignKey, ForeignKey};
pub use key::{AddKey, DropKey, Key};
pub use sql::RunSql;
pub use table::{CreateTable, DropTable, DropTrigger, DropView};

use serde::{Deserialize, Serialize};

use crate::column::Column;
use crate::dialect::{Dialect, TranslateError};
use crate::executor::{ExecutorError, SchemaInspector};

/// Behaviour shared by every concrete schema change.
pub trait SchemaChange {
    fn reverse(&self) -> Reversal;

    fn describe(&self) -> String;

    fn guard(&self) -> Option<Guard> {
        None
    }
}

/// One atomic schema change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    CreateTable(CreateTable),
    DropTable(DropTable),
    AddColumn(AddColumn),
    DropColumn(DropColumn),
    AlterColumnType(AlterColumnType),
    AddKey(AddKey),
    DropKey(DropKey),
    AddForeignKey(AddForeignKey),
    DropForeignKey(DropForeignKey),
    DropTrigger(DropTrigger),
    DropView(DropView),
    RunSql(RunSql),
}

/// Outcome of asking an operation for its inverse.
///
/// `Irreversible` is not an error: it tells the author that the down
/// migration has to be written by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reversal {
    Operation(Operation),
    Irreversible { reason: String },
}

impl Reversal {
    pub(crate) fn irreversible(reason: impl Into<String>) -> Self {
        Reversal::Irreversible {
            reason: reason.into(),
        }
    }

    pub fn is_irreversible(&self) -> bool {
        matches!(self, Reversal::Irreversible { .. })
    }

    pub fn into_operation(self) -> Option<Operation> {
        match self {
            Reversal::Operation(op) => Some(op),
            Reversal::Irreversible { .. } => None,
        }
    }
}

/// Existence precondition under which an operation still has work to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    TableMissing { table: String },
    TableExists { table: String },
    ColumnMissing { table: String, column: String },
    ColumnExists { table: String, column: String },
}

impl Guard {
    /// Returns `true` when the guarded operation should run.
    pub fn holds(&self, inspector: &mut dyn SchemaInspector) -> Result<bool, ExecutorError> {
        match self {
            Guard::TableMissing { table } => Ok(!inspector.table_exists(table)?),
            Guard::TableExists { table } => inspector.table_exists(table),
            Guard::ColumnMissing { table, column } => {
                Ok(!inspector.column_exists(table, column)?)
            }
            Guard::ColumnExists { table, column } => inspector.column_exists(table, column),
        }
    }
}

impl Operation {
    fn as_change(&self) -> &dyn SchemaChange {
        match self {
            Operation::CreateTable(op) => op,
            Operation::DropTable(op) => op,
            Operation::AddColumn(op) => op,
            Operation::DropColumn(op) => op,
            Operation::AlterColumnType(op) => op,
            Operation::AddKey(op) => op,
            Operation::DropKey(op) => op,
            Operation::AddForeignKey(op) => op,
            Operation::DropForeignKey(op) => op,
            Operation::DropTrigger(op) => op,
            Operation::DropView(op) => op,
            Operation::RunSql(op) => op,
        }
    }

    pub fn reverse(&self) -> Reversal {
        self.as_change().reverse()
    }

    pub fn is_reversible(&self) -> bool {
        !self.reverse().is_irreversible()
    }

    pub fn describe(&self) -> String {
        self.as_change().describe()
    }

    pub fn guard(&self) -> Option<Guard> {
        self.as_change().guard()
    }

    /// Render this operation as DDL for the given dialect.
    pub fn to_sql(&self, dialect: &dyn Dialect) -> Result<Vec<String>, TranslateError> {
        dialect.translate(self)
    }

    /// Tables that must already exist for this operation to succeed.
    pub fn required_tables(&self) -> Vec<&str> {
        match self {
            Operation::AddForeignKey(op) => vec![op.foreign_key.ref_table.as_str()],
            Operation::AddKey(op) => vec![op.table.as_str()],
            Operation::AddColumn(op) => op.column.referenced_table().into_iter().collect(),
            Operation::CreateTable(op) => op
                .columns
                .iter()
                .filter_map(Column::referenced_table)
                .filter(|t| *t != op.name)
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn created_table(&self) -> Option<&str> {
        match self {
            Operation::CreateTable(op) => Some(&op.name),
            _ => None,
        }
    }

    pub fn dropped_table(&self) -> Option<&str> {
        match self {
            Operation::DropTable(op) => Some(&op.name),
            _ => None,
        }
    }
}

macro_rules! impl_from_change {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Operation {
                fn from(op: $variant) -> Self {
                    Operation::$variant(op)
                }
            }
        )*
    };
}

impl_from_change!(
    CreateTable,
    DropTable,
    AddColumn,
    DropColumn,
    AlterColumnType,
    AddKey,
    DropKey,
    AddForeignKey,
    DropForeignKey,
    DropTrigger,
    DropView,
    RunSql,
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{Column, ColumnType};
    use crate::executor::MemoryExecutor;

    fn representable() -> Vec<Operation> {
        vec![
            CreateTable::new("licenses")
                .add_column(Column::new("id", ColumnType::Serial).primary_key())
                .into(),
            DropTable::new("renewals")
                .with_snapshot(vec![Column::new("id", ColumnType::Serial).primary_key()])
                .into(),
            AddColumn::new("invoices", Column::new("due_on", ColumnType::Date)).into(),
            DropColumn::new("payments", "legacy_ref")
                .with_snapshot(Column::new("legacy_ref", ColumnType::VarChar(64)))
                .into(),
            AlterColumnType::new("licenses", "number", ColumnType::VarChar(50))
                .collate("utf8mb4_unicode_ci")
                .with_previous(ColumnType::VarChar(30), None)
                .into(),
            AddKey::new("licenses", Key::new("uq_licenses_number").column("number").unique())
                .into(),
            DropKey::new("invoices", "idx_invoices_status")
                .with_snapshot(Key::new("idx_invoices_status").column("status"))
                .into(),
            AddForeignKey::new("licenses", "practitioner_id", "practitioners", "id").into(),
            DropForeignKey::new("payments", "fk_payments_invoice_id")
                .with_snapshot(ForeignKey::new(
                    "payments",
                    "invoice_id",
                    "invoices",
                    "id",
                ))
                .into(),
            RunSql::reversible("UPDATE a SET b = 1", "UPDATE a SET b = 0").into(),
        ]
    }

    #[test]
    fn double_reverse_is_identity() {
        for op in representable() {
            let once = op.reverse().into_operation().unwrap();
            let twice = once.reverse().into_operation().unwrap();
            assert_eq!(twice, op, "{}", op.describe());
        }
    }

    #[test]
    fn snapshot_free_drops_are_irreversible() {
        let ops: Vec<Operation> = vec![
            DropTable::new("cpd_attendance").into(),
            DropColumn::new("practitioners", "fax").into(),
            DropKey::new("invoices", "idx_old").into(),
            DropForeignKey::new("payments", "fk_old").into(),
            DropTrigger::new("trg_invoice_total").into(),
            DropView::new("v_active_licenses").into(),
            AlterColumnType::new("licenses", "number", ColumnType::Text).into(),
            RunSql::new("DELETE FROM renewals").into(),
        ];

        for op in ops {
            assert!(op.reverse().is_irreversible(), "{}", op.describe());
            assert!(!op.is_reversible());
        }
    }

    #[test]
    fn required_tables_for_foreign_keys_and_keys() {
        let fk: Operation =
            AddForeignKey::new("licenses", "practitioner_id", "practitioners", "id").into();
        assert_eq!(fk.required_tables(), vec!["practitioners"]);

        let key: Operation = AddKey::new("invoices", Key::new("idx").column("status")).into();
        assert_eq!(key.required_tables(), vec!["invoices"]);
    }

    #[test]
    fn create_table_requires_referenced_tables_but_not_itself() {
        let op: Operation = CreateTable::new("practitioners")
            .add_column(Column::new("id", ColumnType::Serial).primary_key())
            .add_column(
                Column::new("supervisor_id", ColumnType::Integer).references("practitioners", "id"),
            )
            .add_column(Column::new("board_id", ColumnType::Integer).references("boards", "id"))
            .into();

        assert_eq!(op.required_tables(), vec!["boards"]);
        assert_eq!(op.created_table(), Some("practitioners"));
        assert_eq!(op.dropped_table(), None);
    }

    #[test]
    fn guards_follow_existence() {
        let mut inspector = MemoryExecutor::new()
            .with_table("invoices")
            .with_field("invoices", "total");

        let add: Operation =
            AddColumn::new("invoices", Column::new("total", ColumnType::Integer)).into();
        assert!(!add.guard().unwrap().holds(&mut inspector).unwrap());

        let drop: Operation = DropColumn::new("invoices", "total").into();
        assert!(drop.guard().unwrap().holds(&mut inspector).unwrap());

        let create: Operation = CreateTable::new("invoices").into();
        assert!(!create.guard().unwrap().holds(&mut inspector).unwrap());

        let drop_table: Operation = DropTable::new("ghosts").if_exists().into();
        assert!(!drop_table.guard().unwrap().holds(&mut inspector).unwrap());

        let plain_drop: Operation = DropTable::new("ghosts").into();
        assert!(plain_drop.guard().is_none());
    }
}
