use std::time::Duration;

use rusqlite::{Connection, ErrorCode, OptionalExtension};

use crate::executor::{Executor, ExecutorError, SchemaInspector};

pub struct SqliteExecutor<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteExecutor<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

fn map_error(err: rusqlite::Error) -> ExecutorError {
    match err.sqlite_error_code() {
        Some(ErrorCode::OperationInterrupted) | Some(ErrorCode::DatabaseBusy) => {
            ExecutorError::Timeout
        }
        _ => ExecutorError::Rejected(err.to_string()),
    }
}

impl SchemaInspector for SqliteExecutor<'_> {
    fn table_exists(&mut self, table: &str) -> Result<bool, ExecutorError> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_error)?;
        Ok(found.is_some())
    }

    fn column_exists(&mut self, table: &str, column: &str) -> Result<bool, ExecutorError> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM pragma_table_info(?1) WHERE name = ?2",
                [table, column],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_error)?;
        Ok(found.is_some())
    }
}

impl Executor for SqliteExecutor<'_> {
    fn execute(&mut self, sql: &str) -> Result<(), ExecutorError> {
        self.conn.execute_batch(sql).map_err(map_error)
    }

    fn begin(&mut self) -> Result<(), ExecutorError> {
        self.conn.execute_batch("BEGIN").map_err(map_error)
    }

    fn commit(&mut self) -> Result<(), ExecutorError> {
        self.conn.execute_batch("COMMIT").map_err(map_error)
    }

    fn rollback(&mut self) -> Result<(), ExecutorError> {
        self.conn.execute_batch("ROLLBACK").map_err(map_error)
    }

    /// SQLite has no statement timeout; the limit bounds how long a statement
    /// waits on a locked database. Without a limit the connection keeps its
    /// own busy handler.
    fn set_timeout(&mut self, limit: Option<Duration>) -> Result<(), ExecutorError> {
        match limit {
            Some(limit) => self.conn.busy_timeout(limit).map_err(map_error),
            None => Ok(()),
        }
    }
}
