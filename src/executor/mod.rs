#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "postgres")]
mod postgres;

#[cfg(feature = "mysql")]
mod mysql;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteExecutor;

#[cfg(feature = "postgres")]
pub use self::postgres::PostgresExecutor;

#[cfg(feature = "mysql")]
pub use self::mysql::MySqlExecutor;

use std::collections::BTreeSet;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    #[error("statement rejected: {0}")]
    Rejected(String),

    #[error("statement cancelled by the database time limit")]
    Timeout,
}

/// Read-only view of the live schema, used to evaluate operation guards.
pub trait SchemaInspector {
    fn table_exists(&mut self, table: &str) -> Result<bool, ExecutorError>;
    fn column_exists(&mut self, table: &str, column: &str) -> Result<bool, ExecutorError>;
}

/// Runs DDL against a database connection.
pub trait Executor: SchemaInspector {
    fn execute(&mut self, sql: &str) -> Result<(), ExecutorError>;
    fn begin(&mut self) -> Result<(), ExecutorError>;
    fn commit(&mut self) -> Result<(), ExecutorError>;
    fn rollback(&mut self) -> Result<(), ExecutorError>;

    /// Ask the database to cancel statements running longer than `limit`.
    /// Executors without server-side limits keep the default no-op; the
    /// engine still measures each statement against the limit.
    fn set_timeout(&mut self, _limit: Option<Duration>) -> Result<(), ExecutorError> {
        Ok(())
    }
}

/// Executor that records statements instead of running them.
///
/// The schema it reports is whatever was declared with [`with_table`] and
/// [`with_field`]; executed DDL does not change it. Statements can be made
/// to fail by substring with [`fail_on`] and [`time_out_on`].
///
/// [`with_table`]: MemoryExecutor::with_table
/// [`with_field`]: MemoryExecutor::with_field
/// [`fail_on`]: MemoryExecutor::fail_on
/// [`time_out_on`]: MemoryExecutor::time_out_on
#[derive(Debug, Default)]
pub struct MemoryExecutor {
    tables: BTreeSet<String>,
    fields: BTreeSet<(String, String)>,
    failures: Vec<(String, ExecutorError)>,
    executed: Vec<String>,
    rolled_back: Vec<String>,
    transaction_start: Option<usize>,
    begins: usize,
    commits: usize,
    rollbacks: usize,
    timeout: Option<Duration>,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.tables.insert(table.into());
        self
    }

    /// Declares a column; its table is declared too.
    pub fn with_field(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        let table = table.into();
        self.tables.insert(table.clone());
        self.fields.insert((table, column.into()));
        self
    }

    pub fn fail_on(mut self, fragment: impl Into<String>) -> Self {
        let fragment = fragment.into();
        let message = format!("scripted failure on `{}`", fragment);
        self.failures
            .push((fragment, ExecutorError::Rejected(message)));
        self
    }

    pub fn time_out_on(mut self, fragment: impl Into<String>) -> Self {
        self.failures.push((fragment.into(), ExecutorError::Timeout));
        self
    }

    /// Statements that ran and were not rolled back, in order.
    pub fn executed(&self) -> &[String] {
        &self.executed
    }

    /// Statements discarded by a rollback.
    pub fn rolled_back(&self) -> &[String] {
        &self.rolled_back
    }

    pub fn begins(&self) -> usize {
        self.begins
    }

    pub fn commits(&self) -> usize {
        self.commits
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl SchemaInspector for MemoryExecutor {
    fn table_exists(&mut self, table: &str) -> Result<bool, ExecutorError> {
        Ok(self.tables.contains(table))
    }

    fn column_exists(&mut self, table: &str, column: &str) -> Result<bool, ExecutorError> {
        Ok(self
            .fields
            .contains(&(table.to_string(), column.to_string())))
    }
}

impl Executor for MemoryExecutor {
    fn execute(&mut self, sql: &str) -> Result<(), ExecutorError> {
        if let Some((_, err)) = self
            .failures
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
        {
            return Err(err.clone());
        }
        self.executed.push(sql.to_string());
        Ok(())
    }

    fn begin(&mut self) -> Result<(), ExecutorError> {
        if self.transaction_start.is_some() {
            return Err(ExecutorError::Rejected(
                "transaction already open".to_string(),
            ));
        }
        self.begins += 1;
        self.transaction_start = Some(self.executed.len());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), ExecutorError> {
        match self.transaction_start.take() {
            Some(_) => {
                self.commits += 1;
                Ok(())
            }
            None => Err(ExecutorError::Rejected("no transaction open".to_string())),
        }
    }

    fn rollback(&mut self) -> Result<(), ExecutorError> {
        match self.transaction_start.take() {
            Some(start) => {
                self.rollbacks += 1;
                let discarded = self.executed.split_off(start);
                self.rolled_back.extend(discarded);
                Ok(())
            }
            None => Err(ExecutorError::Rejected("no transaction open".to_string())),
        }
    }

    fn set_timeout(&mut self, limit: Option<Duration>) -> Result<(), ExecutorError> {
        self.timeout = limit;
        Ok(())
    }
}
