use sea_query::{
    Alias, IndexCreateStatement, IndexDropStatement, SqliteQueryBuilder, Table,
    TableAlterStatement, TableCreateStatement, TableDropStatement,
};

use crate::column::Column;
use crate::dialect::{column_to_def, Dialect, TranslateError};
use crate::operation::{AlterColumnType, DropTrigger, ForeignKey};

#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

impl Sqlite {
    fn unsupported(&self, action: String) -> TranslateError {
        TranslateError::Unsupported {
            dialect: self.name(),
            action,
        }
    }
}

impl Dialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    fn build_table_create(&self, stmt: TableCreateStatement) -> String {
        stmt.to_string(SqliteQueryBuilder)
    }

    fn build_table_drop(&self, stmt: TableDropStatement) -> String {
        stmt.to_string(SqliteQueryBuilder)
    }

    fn build_table_alter(&self, stmt: TableAlterStatement) -> String {
        stmt.to_string(SqliteQueryBuilder)
    }

    fn build_index_create(&self, stmt: IndexCreateStatement) -> String {
        stmt.to_string(SqliteQueryBuilder)
    }

    fn build_index_drop(&self, stmt: IndexDropStatement) -> String {
        stmt.to_string(SqliteQueryBuilder)
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn add_foreign_key_sql(&self, table: &str, fk: &ForeignKey) -> Result<String, TranslateError> {
        Err(self.unsupported(format!(
            "add foreign key {} to existing table {}",
            fk.name, table
        )))
    }

    fn drop_foreign_key_sql(&self, table: &str, name: &str) -> Result<String, TranslateError> {
        Err(self.unsupported(format!(
            "drop foreign key {} from existing table {}",
            name, table
        )))
    }

    fn alter_column_type_sql(&self, op: &AlterColumnType) -> Result<String, TranslateError> {
        Err(self.unsupported(format!(
            "alter type of column {}.{}",
            op.table, op.column
        )))
    }

    fn drop_trigger_sql(&self, op: &DropTrigger) -> Result<String, TranslateError> {
        Ok(format!(
            "DROP TRIGGER {}{}",
            if op.if_exists { "IF EXISTS " } else { "" },
            self.quote_identifier(&op.name)
        ))
    }

    /// `ALTER TABLE .. ADD COLUMN .. REFERENCES` is the only way SQLite
    /// attaches a foreign key to an existing table.
    fn add_column_sql(&self, table: &str, column: &Column) -> Result<Vec<String>, TranslateError> {
        let mut stmt = Table::alter();
        let mut def = column_to_def(column);

        if let Some(ref reference) = column.references {
            def.extra(format!(
                "REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
                self.quote_identifier(&reference.table),
                self.quote_identifier(&reference.column),
                reference.on_delete.as_sql(),
                reference.on_update.as_sql()
            ));
        }

        stmt.table(Alias::new(table)).add_column(def);
        Ok(vec![self.build_table_alter(stmt)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{ColumnType, ReferentialAction};
    use crate::operation::{
        AddForeignKey, AddKey, CreateTable, DropColumn, DropForeignKey, DropKey, DropTable, Key,
        Operation,
    };

    #[test]
    fn sqlite_dialect_name() {
        assert_eq!(Sqlite.name(), "sqlite");
        assert!(Sqlite.supports_transactional_ddl());
    }

    #[test]
    fn sqlite_creates_table_with_foreign_key() {
        let op = CreateTable::new("posts")
            .add_column(Column::new("id", ColumnType::Serial).primary_key())
            .add_column(
                Column::new("user_id", ColumnType::Integer)
                    .not_null()
                    .references("users", "id")
                    .on_delete(ReferentialAction::Cascade),
            );

        let sql = Sqlite.create_table_sql(&op);
        assert!(sql.contains("CREATE TABLE \"posts\""));
        assert!(sql.contains("PRIMARY KEY"));
        assert!(sql.contains("FOREIGN KEY"));
        assert!(sql.contains("REFERENCES \"users\""));
        assert!(sql.contains("ON DELETE CASCADE"));
    }

    #[test]
    fn sqlite_create_table_if_not_exists() {
        let op = CreateTable::new("users")
            .column("id", ColumnType::Integer)
            .if_not_exists();
        assert!(Sqlite
            .create_table_sql(&op)
            .contains("CREATE TABLE IF NOT EXISTS"));
    }

    #[test]
    fn sqlite_drop_table() {
        let sql = Sqlite.drop_table_sql(&DropTable::new("users").if_exists());
        assert!(sql.contains("DROP TABLE IF EXISTS \"users\""));
    }

    #[test]
    fn sqlite_add_column_inlines_reference() {
        let column = Column::new("practitioner_id", ColumnType::Integer)
            .references("practitioners", "id")
            .on_delete(ReferentialAction::SetNull);

        let sql = Sqlite.add_column_sql("licenses", &column).unwrap();
        assert_eq!(sql.len(), 1);
        assert!(sql[0].contains("ADD COLUMN \"practitioner_id\""));
        assert!(sql[0].contains("REFERENCES \"practitioners\" (\"id\")"));
        assert!(sql[0].contains("ON DELETE SET NULL"));
    }

    #[test]
    fn sqlite_drop_column() {
        let op: Operation = DropColumn::new("users", "email").into();
        let sql = Sqlite.translate(&op).unwrap();
        assert!(sql[0].contains("ALTER TABLE \"users\""));
        assert!(sql[0].contains("DROP COLUMN \"email\""));
    }

    #[test]
    fn sqlite_unique_key_is_unique_index() {
        let op: Operation =
            AddKey::new("users", Key::new("uq_users_email").column("email").unique()).into();
        let sql = Sqlite.translate(&op).unwrap();
        assert!(sql[0].contains("CREATE UNIQUE INDEX \"uq_users_email\""));
        assert!(sql[0].contains("\"users\""));

        let sql = Sqlite
            .translate(&DropKey::new("users", "uq_users_email").into())
            .unwrap();
        assert!(sql[0].contains("DROP INDEX \"uq_users_email\""));
    }

    #[test]
    fn sqlite_rejects_foreign_key_changes() {
        let add: Operation = AddForeignKey::new("licenses", "practitioner_id", "practitioners", "id").into();
        let drop: Operation = DropForeignKey::new("licenses", "fk_licenses_practitioner_id").into();

        assert!(matches!(
            Sqlite.translate(&add),
            Err(TranslateError::Unsupported { dialect: "sqlite", .. })
        ));
        assert!(matches!(
            Sqlite.translate(&drop),
            Err(TranslateError::Unsupported { .. })
        ));
    }

    #[test]
    fn sqlite_rejects_alter_column_type() {
        let op: Operation = AlterColumnType::new("users", "name", ColumnType::VarChar(80)).into();
        let err = Sqlite.translate(&op).unwrap_err();
        assert_eq!(err.to_string(), "sqlite cannot alter type of column users.name");
    }

    #[test]
    fn sqlite_drop_trigger() {
        let op = DropTrigger::new("audit_users").if_exists();
        assert_eq!(
            Sqlite.drop_trigger_sql(&op).unwrap(),
            "DROP TRIGGER IF EXISTS \"audit_users\""
        );
    }

    #[test]
    fn sqlite_quote_identifier() {
        assert_eq!(Sqlite.quote_identifier("users"), "\"users\"");
        assert_eq!(Sqlite.quote_identifier("user\"name"), "\"user\"\"name\"");
    }
}
