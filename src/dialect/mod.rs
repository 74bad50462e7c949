mod mysql;
mod postgres;
mod sqlite;

pub use mysql::MySql;
pub use postgres::Postgres;
pub use sqlite::Sqlite;

use sea_query::{
    Alias, ColumnDef, ForeignKey as SeaForeignKey, ForeignKeyAction, ForeignKeyCreateStatement,
    ForeignKeyDropStatement, Index as SeaIndex, IndexCreateStatement, IndexDropStatement, Table,
    TableAlterStatement, TableCreateStatement, TableDropStatement,
};
use thiserror::Error;

use crate::column::{Column, ColumnReference, ColumnType, ReferentialAction};
use crate::operation::{
    AlterColumnType, CreateTable, DropTable, DropTrigger, DropView, ForeignKey, Key, Operation,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateError {
    #[error("{dialect} cannot {action}")]
    Unsupported {
        dialect: &'static str,
        action: String,
    },

    #[error("{dialect} needs {missing} to {action}")]
    Incomplete {
        dialect: &'static str,
        action: String,
        missing: String,
    },
}

/// Translates operations into DDL for one database engine.
pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;
    fn supports_transactional_ddl(&self) -> bool;

    fn build_table_create(&self, stmt: TableCreateStatement) -> String;
    fn build_table_drop(&self, stmt: TableDropStatement) -> String;
    fn build_table_alter(&self, stmt: TableAlterStatement) -> String;
    fn build_index_create(&self, stmt: IndexCreateStatement) -> String;
    fn build_index_drop(&self, stmt: IndexDropStatement) -> String;

    fn quote_identifier(&self, name: &str) -> String;

    fn add_foreign_key_sql(&self, table: &str, fk: &ForeignKey) -> Result<String, TranslateError>;
    fn drop_foreign_key_sql(&self, table: &str, name: &str) -> Result<String, TranslateError>;
    fn alter_column_type_sql(&self, op: &AlterColumnType) -> Result<String, TranslateError>;
    fn drop_trigger_sql(&self, op: &DropTrigger) -> Result<String, TranslateError>;

    /// Render one operation as the statements that carry it out, in order.
    fn translate(&self, op: &Operation) -> Result<Vec<String>, TranslateError> {
        let statements = match op {
            Operation::CreateTable(op) => vec![self.create_table_sql(op)],
            Operation::DropTable(op) => vec![self.drop_table_sql(op)],
            Operation::AddColumn(op) => self.add_column_sql(&op.table, &op.column)?,
            Operation::DropColumn(op) => vec![self.drop_column_sql(&op.table, &op.column)],
            Operation::AlterColumnType(op) => vec![self.alter_column_type_sql(op)?],
            Operation::AddKey(op) => vec![self.add_key_sql(&op.table, &op.key)],
            Operation::DropKey(op) => vec![self.drop_key_sql(&op.table, &op.name)],
            Operation::AddForeignKey(op) => {
                vec![self.add_foreign_key_sql(&op.table, &op.foreign_key)?]
            }
            Operation::DropForeignKey(op) => vec![self.drop_foreign_key_sql(&op.table, &op.name)?],
            Operation::DropTrigger(op) => vec![self.drop_trigger_sql(op)?],
            Operation::DropView(op) => vec![self.drop_view_sql(op)],
            Operation::RunSql(op) if op.applies_to(self.name()) => op.forward.clone(),
            Operation::RunSql(_) => Vec::new(),
        };
        Ok(statements)
    }

    fn create_table_sql(&self, op: &CreateTable) -> String {
        let mut stmt = Table::create();
        stmt.table(Alias::new(&op.name));

        if op.if_not_exists {
            stmt.if_not_exists();
        }

        for column in &op.columns {
            stmt.col(column_to_def(column));
        }

        for column in &op.columns {
            if let Some(ref reference) = column.references {
                stmt.foreign_key(
                    SeaForeignKey::create()
                        .from_col(Alias::new(&column.name))
                        .to_tbl(Alias::new(&reference.table))
                        .to_col(Alias::new(&reference.column))
                        .on_delete(referential_action_to_sea(&reference.on_delete))
                        .on_update(referential_action_to_sea(&reference.on_update)),
                );
            }
        }

        self.build_table_create(stmt)
    }

    fn drop_table_sql(&self, op: &DropTable) -> String {
        let mut stmt = Table::drop();
        stmt.table(Alias::new(&op.name));
        if op.if_exists {
            stmt.if_exists();
        }
        self.build_table_drop(stmt)
    }

    /// Adds the column, then its foreign key as a separate constraint.
    fn add_column_sql(&self, table: &str, column: &Column) -> Result<Vec<String>, TranslateError> {
        let stmt = Table::alter()
            .table(Alias::new(table))
            .add_column(column_to_def(column))
            .to_owned();
        let mut statements = vec![self.build_table_alter(stmt)];

        if let Some(ref reference) = column.references {
            let fk = reference_to_foreign_key(table, &column.name, reference);
            statements.push(self.add_foreign_key_sql(table, &fk)?);
        }

        Ok(statements)
    }

    fn drop_column_sql(&self, table: &str, column: &str) -> String {
        let stmt = Table::alter()
            .table(Alias::new(table))
            .drop_column(Alias::new(column))
            .to_owned();
        self.build_table_alter(stmt)
    }

    fn add_key_sql(&self, table: &str, key: &Key) -> String {
        let mut stmt = SeaIndex::create();
        stmt.name(&key.name).table(Alias::new(table));

        if key.unique {
            stmt.unique();
        }

        for column in &key.columns {
            stmt.col(Alias::new(column));
        }

        self.build_index_create(stmt)
    }

    fn drop_key_sql(&self, table: &str, name: &str) -> String {
        let stmt = SeaIndex::drop()
            .name(name)
            .table(Alias::new(table))
            .to_owned();
        self.build_index_drop(stmt)
    }

    fn drop_view_sql(&self, op: &DropView) -> String {
        // sea-query has no view statements
        format!(
            "DROP VIEW {}{}",
            if op.if_exists { "IF EXISTS " } else { "" },
            self.quote_identifier(&op.name)
        )
    }
}

pub(crate) fn foreign_key_create_statement(table: &str, fk: &ForeignKey) -> ForeignKeyCreateStatement {
    SeaForeignKey::create()
        .name(&fk.name)
        .from(Alias::new(table), Alias::new(&fk.column))
        .to(Alias::new(&fk.ref_table), Alias::new(&fk.ref_column))
        .on_delete(referential_action_to_sea(&fk.on_delete))
        .on_update(referential_action_to_sea(&fk.on_update))
        .to_owned()
}

pub(crate) fn foreign_key_drop_statement(table: &str, name: &str) -> ForeignKeyDropStatement {
    SeaForeignKey::drop()
        .name(name)
        .table(Alias::new(table))
        .to_owned()
}

pub(crate) fn reference_to_foreign_key(
    table: &str,
    column: &str,
    reference: &ColumnReference,
) -> ForeignKey {
    ForeignKey::new(table, column, &reference.table, &reference.column)
        .on_delete(reference.on_delete)
        .on_update(reference.on_update)
}

pub(crate) fn column_to_def(column: &Column) -> ColumnDef {
    let mut col = ColumnDef::new(Alias::new(&column.name));

    apply_column_type(&mut col, &column.column_type);

    if column.primary_key {
        col.primary_key();
    }
    if column.is_auto_increment() {
        col.auto_increment();
    }

    if !column.nullable && !column.primary_key {
        col.not_null();
    }

    if column.unique && !column.primary_key {
        col.unique_key();
    }

    if let Some(ref default) = column.default {
        col.default(sea_query::Expr::cust(default));
    }

    col
}

fn apply_column_type(col: &mut ColumnDef, column_type: &ColumnType) {
    match column_type {
        ColumnType::Serial | ColumnType::Integer => {
            col.integer();
        }
        ColumnType::BigSerial | ColumnType::BigInt => {
            col.big_integer();
        }
        ColumnType::SmallInt => {
            col.small_integer();
        }
        ColumnType::Text => {
            col.text();
        }
        ColumnType::VarChar(len) => {
            col.string_len(*len);
        }
        ColumnType::Char(len) => {
            col.char_len(*len);
        }
        ColumnType::Boolean => {
            col.boolean();
        }
        ColumnType::Timestamp => {
            col.timestamp();
        }
        ColumnType::TimestampTz => {
            col.timestamp_with_time_zone();
        }
        ColumnType::Date => {
            col.date();
        }
        ColumnType::Time => {
            col.time();
        }
        ColumnType::Uuid => {
            col.uuid();
        }
        ColumnType::Json => {
            col.json();
        }
        ColumnType::Binary => {
            col.binary();
        }
        ColumnType::Real => {
            col.float();
        }
        ColumnType::DoublePrecision => {
            col.double();
        }
        ColumnType::Decimal { precision, scale } => {
            col.decimal_len(*precision as u32, *scale as u32);
        }
    }
}

fn referential_action_to_sea(action: &ReferentialAction) -> ForeignKeyAction {
    match action {
        ReferentialAction::NoAction => ForeignKeyAction::NoAction,
        ReferentialAction::Restrict => ForeignKeyAction::Restrict,
        ReferentialAction::Cascade => ForeignKeyAction::Cascade,
        ReferentialAction::SetNull => ForeignKeyAction::SetNull,
        ReferentialAction::SetDefault => ForeignKeyAction::SetDefault,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{AddColumn, AddKey, DropColumn, DropKey, RunSql};

    #[test]
    fn translate_dispatches_every_variant_on_postgres() {
        let ops: Vec<Operation> = vec![
            CreateTable::new("licenses")
                .add_column(Column::new("id", ColumnType::Serial).primary_key())
                .into(),
            DropTable::new("legacy").if_exists().into(),
            AddColumn::new("licenses", Column::new("expires_on", ColumnType::Date)).into(),
            DropColumn::new("licenses", "fax").into(),
            AlterColumnType::new("licenses", "number", ColumnType::VarChar(50)).into(),
            AddKey::new("licenses", Key::new("idx_number").column("number")).into(),
            DropKey::new("licenses", "idx_number").into(),
            crate::operation::AddForeignKey::new("licenses", "practitioner_id", "practitioners", "id")
                .into(),
            crate::operation::DropForeignKey::new("licenses", "fk_x").into(),
            DropTrigger::new("trg").on_table("licenses").into(),
            DropView::new("v_licenses").into(),
            RunSql::new("SELECT 1").into(),
        ];

        for op in &ops {
            let statements = Postgres.translate(op).unwrap();
            assert_eq!(statements.len(), 1, "{}", op.describe());
        }
    }

    #[test]
    fn run_sql_restricted_to_other_dialect_is_empty() {
        let op: Operation = RunSql::new("PRAGMA optimize").only_for(&["sqlite"]).into();
        assert!(Postgres.translate(&op).unwrap().is_empty());
        assert_eq!(Sqlite.translate(&op).unwrap(), vec!["PRAGMA optimize"]);
    }

    #[test]
    fn drop_view_sql() {
        assert_eq!(
            Postgres.drop_view_sql(&DropView::new("v_active").if_exists()),
            "DROP VIEW IF EXISTS \"v_active\""
        );
        assert_eq!(
            MySql.drop_view_sql(&DropView::new("v_active")),
            "DROP VIEW `v_active`"
        );
    }

    #[test]
    fn add_column_with_reference_emits_constraint() {
        let column = Column::new("invoice_id", ColumnType::Integer)
            .references("invoices", "id")
            .on_delete(ReferentialAction::Cascade);
        let statements = Postgres.add_column_sql("payments", &column).unwrap();

        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("ADD COLUMN \"invoice_id\""));
        assert!(statements[1].contains("FOREIGN KEY"));
        assert!(statements[1].contains("\"fk_payments_invoice_id\""));
        assert!(statements[1].contains("ON DELETE CASCADE"));
    }

    #[test]
    fn translate_error_display() {
        let err = TranslateError::Unsupported {
            dialect: "sqlite",
            action: "drop foreign key fk_x".to_string(),
        };
        assert_eq!(err.to_string(), "sqlite cannot drop foreign key fk_x");
    }
}
