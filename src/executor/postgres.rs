use std::time::Duration;

use postgres::error::SqlState;
use postgres::Client;

use crate::executor::{Executor, ExecutorError, SchemaInspector};

pub struct PostgresExecutor<'a> {
    client: &'a mut Client,
}

impl<'a> PostgresExecutor<'a> {
    pub fn new(client: &'a mut Client) -> Self {
        Self { client }
    }
}

fn map_error(err: postgres::Error) -> ExecutorError {
    match err.code() {
        Some(code) if *code == SqlState::QUERY_CANCELED => ExecutorError::Timeout,
        Some(code) if *code == SqlState::LOCK_NOT_AVAILABLE => ExecutorError::Timeout,
        _ => ExecutorError::Rejected(err.to_string()),
    }
}

impl SchemaInspector for PostgresExecutor<'_> {
    fn table_exists(&mut self, table: &str) -> Result<bool, ExecutorError> {
        let row = self
            .client
            .query_one(
                "SELECT EXISTS (
                    SELECT 1 FROM information_schema.tables
                    WHERE table_schema = current_schema() AND table_name = $1
                )",
                &[&table],
            )
            .map_err(map_error)?;
        Ok(row.get(0))
    }

    fn column_exists(&mut self, table: &str, column: &str) -> Result<bool, ExecutorError> {
        let row = self
            .client
            .query_one(
                "SELECT EXISTS (
                    SELECT 1 FROM information_schema.columns
                    WHERE table_schema = current_schema()
                      AND table_name = $1 AND column_name = $2
                )",
                &[&table, &column],
            )
            .map_err(map_error)?;
        Ok(row.get(0))
    }
}

impl Executor for PostgresExecutor<'_> {
    fn execute(&mut self, sql: &str) -> Result<(), ExecutorError> {
        self.client.batch_execute(sql).map_err(map_error)
    }

    fn begin(&mut self) -> Result<(), ExecutorError> {
        self.client.batch_execute("BEGIN").map_err(map_error)
    }

    fn commit(&mut self) -> Result<(), ExecutorError> {
        self.client.batch_execute("COMMIT").map_err(map_error)
    }

    fn rollback(&mut self) -> Result<(), ExecutorError> {
        self.client.batch_execute("ROLLBACK").map_err(map_error)
    }

    fn set_timeout(&mut self, limit: Option<Duration>) -> Result<(), ExecutorError> {
        let millis = limit.map(|d| d.as_millis()).unwrap_or(0);
        self.client
            .batch_execute(&format!("SET statement_timeout = {}", millis))
            .map_err(map_error)
    }
}
