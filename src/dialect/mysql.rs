use sea_query::{
    IndexCreateStatement, IndexDropStatement, MysqlQueryBuilder, TableAlterStatement,
    TableCreateStatement, TableDropStatement,
};

use crate::column::ColumnType;
use crate::dialect::{foreign_key_create_statement, foreign_key_drop_statement, Dialect, TranslateError};
use crate::operation::{AlterColumnType, DropTrigger, ForeignKey};

#[derive(Debug, Clone, Copy, Default)]
pub struct MySql;

impl Dialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn supports_transactional_ddl(&self) -> bool {
        // MySQL issues implicit commits for DDL statements
        false
    }

    fn build_table_create(&self, stmt: TableCreateStatement) -> String {
        stmt.to_string(MysqlQueryBuilder)
    }

    fn build_table_drop(&self, stmt: TableDropStatement) -> String {
        stmt.to_string(MysqlQueryBuilder)
    }

    fn build_table_alter(&self, stmt: TableAlterStatement) -> String {
        stmt.to_string(MysqlQueryBuilder)
    }

    fn build_index_create(&self, stmt: IndexCreateStatement) -> String {
        stmt.to_string(MysqlQueryBuilder)
    }

    fn build_index_drop(&self, stmt: IndexDropStatement) -> String {
        stmt.to_string(MysqlQueryBuilder)
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn add_foreign_key_sql(&self, table: &str, fk: &ForeignKey) -> Result<String, TranslateError> {
        Ok(foreign_key_create_statement(table, fk).to_string(MysqlQueryBuilder))
    }

    fn drop_foreign_key_sql(&self, table: &str, name: &str) -> Result<String, TranslateError> {
        Ok(foreign_key_drop_statement(table, name).to_string(MysqlQueryBuilder))
    }

    /// `MODIFY COLUMN` restates the whole column, so nullability and defaults
    /// not repeated here are reset.
    fn alter_column_type_sql(&self, op: &AlterColumnType) -> Result<String, TranslateError> {
        let mut sql = format!(
            "ALTER TABLE {} MODIFY COLUMN {} {}",
            self.quote_identifier(&op.table),
            self.quote_identifier(&op.column),
            type_name(&op.new_type)
        );
        if let Some(ref collation) = op.collation {
            sql.push_str(&format!(" COLLATE {}", collation));
        }
        Ok(sql)
    }

    fn drop_trigger_sql(&self, op: &DropTrigger) -> Result<String, TranslateError> {
        Ok(format!(
            "DROP TRIGGER {}{}",
            if op.if_exists { "IF EXISTS " } else { "" },
            self.quote_identifier(&op.name)
        ))
    }
}

fn type_name(column_type: &ColumnType) -> String {
    match column_type {
        ColumnType::Serial | ColumnType::Integer => "int".to_string(),
        ColumnType::BigSerial | ColumnType::BigInt => "bigint".to_string(),
        ColumnType::SmallInt => "smallint".to_string(),
        ColumnType::Text => "text".to_string(),
        ColumnType::VarChar(len) => format!("varchar({})", len),
        ColumnType::Char(len) => format!("char({})", len),
        ColumnType::Boolean => "bool".to_string(),
        ColumnType::Timestamp => "datetime".to_string(),
        ColumnType::TimestampTz => "timestamp".to_string(),
        ColumnType::Date => "date".to_string(),
        ColumnType::Time => "time".to_string(),
        ColumnType::Uuid => "binary(16)".to_string(),
        ColumnType::Json => "json".to_string(),
        ColumnType::Binary => "blob".to_string(),
        ColumnType::Real => "float".to_string(),
        ColumnType::DoublePrecision => "double".to_string(),
        ColumnType::Decimal { precision, scale } => format!("decimal({}, {})", precision, scale),
    }
}
