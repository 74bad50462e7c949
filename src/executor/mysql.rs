use std::time::Duration;

use mysql::prelude::*;
use mysql::PooledConn;

use crate::executor::{Executor, ExecutorError, SchemaInspector};

const ER_LOCK_WAIT_TIMEOUT: u16 = 1205;
const ER_QUERY_TIMEOUT: u16 = 3024;
const DEFAULT_LOCK_WAIT_SECS: u64 = 31_536_000;

pub struct MySqlExecutor<'a> {
    conn: &'a mut PooledConn,
}

impl<'a> MySqlExecutor<'a> {
    pub fn new(conn: &'a mut PooledConn) -> Self {
        Self { conn }
    }
}

fn map_error(err: mysql::Error) -> ExecutorError {
    match err {
        mysql::Error::MySqlError(ref e)
            if e.code == ER_LOCK_WAIT_TIMEOUT || e.code == ER_QUERY_TIMEOUT =>
        {
            ExecutorError::Timeout
        }
        other => ExecutorError::Rejected(other.to_string()),
    }
}

impl SchemaInspector for MySqlExecutor<'_> {
    fn table_exists(&mut self, table: &str) -> Result<bool, ExecutorError> {
        let found: Option<u8> = self
            .conn
            .exec_first(
                "SELECT 1 FROM information_schema.tables
                 WHERE table_schema = DATABASE() AND table_name = ?",
                (table,),
            )
            .map_err(map_error)?;
        Ok(found.is_some())
    }

    fn column_exists(&mut self, table: &str, column: &str) -> Result<bool, ExecutorError> {
        let found: Option<u8> = self
            .conn
            .exec_first(
                "SELECT 1 FROM information_schema.columns
                 WHERE table_schema = DATABASE() AND table_name = ? AND column_name = ?",
                (table, column),
            )
            .map_err(map_error)?;
        Ok(found.is_some())
    }
}

impl Executor for MySqlExecutor<'_> {
    fn execute(&mut self, sql: &str) -> Result<(), ExecutorError> {
        self.conn.query_drop(sql).map_err(map_error)
    }

    fn begin(&mut self) -> Result<(), ExecutorError> {
        self.conn.query_drop("START TRANSACTION").map_err(map_error)
    }

    fn commit(&mut self) -> Result<(), ExecutorError> {
        self.conn.query_drop("COMMIT").map_err(map_error)
    }

    fn rollback(&mut self) -> Result<(), ExecutorError> {
        self.conn.query_drop("ROLLBACK").map_err(map_error)
    }

    /// DDL waits on metadata locks; `lock_wait_timeout` is whole seconds.
    fn set_timeout(&mut self, limit: Option<Duration>) -> Result<(), ExecutorError> {
        let secs = match limit {
            Some(limit) => limit.as_secs().max(1),
            None => DEFAULT_LOCK_WAIT_SECS,
        };
        self.conn
            .query_drop(format!("SET SESSION lock_wait_timeout = {}", secs))
            .map_err(map_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mysql::Pool;
    use std::env;

    fn get_test_conn() -> Option<PooledConn> {
        let host = env::var("MYSQL_HOST").unwrap_or_else(|_| "localhost".to_string());
        let user = env::var("MYSQL_USER").unwrap_or_else(|_| "root".to_string());
        let password = env::var("MYSQL_PASSWORD").ok();
        let dbname = env::var("MYSQL_DB").unwrap_or_else(|_| "tidemark_test".to_string());

        let url = if let Some(pw) = password {
            format!("mysql://{}:{}@{}/{}", user, pw, host, dbname)
        } else {
            format!("mysql://{}@{}/{}", user, host, dbname)
        };

        Pool::new(url.as_str()).ok()?.get_conn().ok()
    }

    #[test]
    #[ignore = "requires mysql connection"]
    fn inspects_tables_and_columns() {
        let Some(mut conn) = get_test_conn() else {
            return;
        };
        let mut executor = MySqlExecutor::new(&mut conn);
        executor.execute("DROP TABLE IF EXISTS tidemark_schema_check").unwrap();
        executor
            .execute("CREATE TABLE tidemark_schema_check (id int, email text)")
            .unwrap();

        assert!(executor.table_exists("tidemark_schema_check").unwrap());
        assert!(executor.column_exists("tidemark_schema_check", "email").unwrap());
        assert!(!executor.column_exists("tidemark_schema_check", "name").unwrap());

        executor.execute("DROP TABLE tidemark_schema_check").unwrap();
    }

    #[test]
    #[ignore = "requires mysql connection"]
    fn rejected_statement_carries_message() {
        let Some(mut conn) = get_test_conn() else {
            return;
        };
        let mut executor = MySqlExecutor::new(&mut conn);
        let err = executor
            .execute("ALTER TABLE tidemark_missing ADD COLUMN x int")
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Rejected(ref msg) if msg.contains("tidemark_missing")));
    }
}
