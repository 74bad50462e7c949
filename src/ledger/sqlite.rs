use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::ledger::{
    lease_expiry, now_millis, Ledger, LedgerEntry, LedgerError, DEFAULT_TABLE_NAME,
};
use crate::migration::Migration;

pub struct SqliteLedger<'a> {
    conn: &'a Connection,
    table_name: String,
}

fn store_error(err: rusqlite::Error) -> LedgerError {
    LedgerError::Store(err.to_string())
}

impl<'a> SqliteLedger<'a> {
    pub fn new(conn: &'a Connection) -> Result<Self, LedgerError> {
        Self::with_table_name(conn, DEFAULT_TABLE_NAME)
    }

    pub fn with_table_name(conn: &'a Connection, table_name: &str) -> Result<Self, LedgerError> {
        let ledger = Self {
            conn,
            table_name: table_name.to_string(),
        };
        ledger.ensure_tables()?;
        Ok(ledger)
    }

    fn ensure_tables(&self) -> Result<(), LedgerError> {
        self.conn
            .execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id TEXT PRIMARY KEY,
                    applied_at TEXT NOT NULL,
                    checksum TEXT NOT NULL,
                    batch INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS {table}_lock (
                    id INTEGER PRIMARY KEY CHECK (id = 1),
                    owner TEXT NOT NULL,
                    expires_at INTEGER NOT NULL
                );",
                table = self.table_name
            ))
            .map_err(store_error)
    }
}

impl Ledger for SqliteLedger<'_> {
    fn entries(&mut self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT id, applied_at, checksum, batch FROM {} ORDER BY batch, id",
                self.table_name
            ))
            .map_err(store_error)?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })
            .map_err(store_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_error)?;

        rows.into_iter()
            .map(|(id, applied_at, checksum, batch)| {
                let applied_at = DateTime::parse_from_rfc3339(&applied_at)
                    .map_err(|e| LedgerError::Corrupt(format!("{}: applied_at: {}", id, e)))?
                    .with_timezone(&Utc);
                Ok(LedgerEntry {
                    id,
                    applied_at,
                    checksum,
                    batch,
                })
            })
            .collect()
    }

    fn record_applied(&mut self, migration: &Migration, batch: i64) -> Result<(), LedgerError> {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO {} (id, applied_at, checksum, batch) VALUES (?1, ?2, ?3, ?4)",
                    self.table_name
                ),
                params![
                    migration.id,
                    Utc::now().to_rfc3339(),
                    migration.checksum(),
                    batch
                ],
            )
            .map_err(store_error)?;
        Ok(())
    }

    fn record_reverted(&mut self, id: &str) -> Result<(), LedgerError> {
        let removed = self
            .conn
            .execute(
                &format!("DELETE FROM {} WHERE id = ?1", self.table_name),
                [id],
            )
            .map_err(store_error)?;
        if removed == 0 {
            return Err(LedgerError::Store(format!("{} is not recorded", id)));
        }
        Ok(())
    }

    fn acquire_lock(&mut self, owner: &str, lease: Duration) -> Result<bool, LedgerError> {
        let now = now_millis();
        let changed = self
            .conn
            .execute(
                &format!(
                    "INSERT INTO {table}_lock (id, owner, expires_at) VALUES (1, ?1, ?2)
                     ON CONFLICT(id) DO UPDATE
                     SET owner = excluded.owner, expires_at = excluded.expires_at
                     WHERE {table}_lock.expires_at < ?3 OR {table}_lock.owner = excluded.owner",
                    table = self.table_name
                ),
                params![owner, lease_expiry(now, lease), now],
            )
            .map_err(store_error)?;
        Ok(changed == 1)
    }

    fn release_lock(&mut self, owner: &str) -> Result<(), LedgerError> {
        self.conn
            .execute(
                &format!(
                    "DELETE FROM {}_lock WHERE id = 1 AND owner = ?1",
                    self.table_name
                ),
                [owner],
            )
            .map_err(store_error)?;
        Ok(())
    }

    fn lock_holder(&mut self) -> Result<Option<String>, LedgerError> {
        self.conn
            .query_row(
                &format!(
                    "SELECT owner FROM {}_lock WHERE id = 1 AND expires_at >= ?1",
                    self.table_name
                ),
                [now_millis()],
                |row| row.get(0),
            )
            .optional()
            .map_err(store_error)
    }
}
