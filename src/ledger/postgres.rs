use std::time::Duration;

use chrono::{DateTime, Utc};
use postgres::Client;

use crate::ledger::{
    lease_expiry, now_millis, Ledger, LedgerEntry, LedgerError, DEFAULT_TABLE_NAME,
};
use crate::migration::Migration;

pub struct PostgresLedger<'a> {
    client: &'a mut Client,
    table_name: String,
}

fn store_error(err: postgres::Error) -> LedgerError {
    LedgerError::Store(err.to_string())
}

impl<'a> PostgresLedger<'a> {
    pub fn new(client: &'a mut Client) -> Result<Self, LedgerError> {
        Self::with_table_name(client, DEFAULT_TABLE_NAME)
    }

    pub fn with_table_name(client: &'a mut Client, table_name: &str) -> Result<Self, LedgerError> {
        let mut ledger = Self {
            client,
            table_name: table_name.to_string(),
        };
        ledger.ensure_tables()?;
        Ok(ledger)
    }

    fn ensure_tables(&mut self) -> Result<(), LedgerError> {
        self.client
            .batch_execute(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id TEXT PRIMARY KEY,
                    applied_at TIMESTAMPTZ NOT NULL,
                    checksum TEXT NOT NULL,
                    batch BIGINT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS {table}_lock (
                    id INTEGER PRIMARY KEY CHECK (id = 1),
                    owner TEXT NOT NULL,
                    expires_at BIGINT NOT NULL
                );",
                table = self.table_name
            ))
            .map_err(store_error)
    }
}

impl Ledger for PostgresLedger<'_> {
    fn entries(&mut self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let rows = self
            .client
            .query(
                &format!(
                    "SELECT id, applied_at, checksum, batch FROM {} ORDER BY batch, id",
                    self.table_name
                ),
                &[],
            )
            .map_err(store_error)?;

        rows.iter()
            .map(|row| {
                let id: String = row.try_get(0).map_err(store_error)?;
                let applied_at: DateTime<Utc> = row
                    .try_get(1)
                    .map_err(|e| LedgerError::Corrupt(format!("{}: applied_at: {}", id, e)))?;
                Ok(LedgerEntry {
                    checksum: row.try_get(2).map_err(store_error)?,
                    batch: row.try_get(3).map_err(store_error)?,
                    id,
                    applied_at,
                })
            })
            .collect()
    }

    fn record_applied(&mut self, migration: &Migration, batch: i64) -> Result<(), LedgerError> {
        self.client
            .execute(
                &format!(
                    "INSERT INTO {} (id, applied_at, checksum, batch) VALUES ($1, $2, $3, $4)",
                    self.table_name
                ),
                &[&migration.id, &Utc::now(), &migration.checksum(), &batch],
            )
            .map_err(store_error)?;
        Ok(())
    }

    fn record_reverted(&mut self, id: &str) -> Result<(), LedgerError> {
        let removed = self
            .client
            .execute(
                &format!("DELETE FROM {} WHERE id = $1", self.table_name),
                &[&id],
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
            .client
            .execute(
                &format!(
                    "INSERT INTO {table}_lock (id, owner, expires_at) VALUES (1, $1, $2)
                     ON CONFLICT (id) DO UPDATE
                     SET owner = EXCLUDED.owner, expires_at = EXCLUDED.expires_at
                     WHERE {table}_lock.expires_at < $3 OR {table}_lock.owner = EXCLUDED.owner",
                    table = self.table_name
                ),
                &[&owner, &lease_expiry(now, lease), &now],
            )
            .map_err(store_error)?;
        Ok(changed == 1)
    }

    fn release_lock(&mut self, owner: &str) -> Result<(), LedgerError> {
        self.client
            .execute(
                &format!(
                    "DELETE FROM {}_lock WHERE id = 1 AND owner = $1",
                    self.table_name
                ),
                &[&owner],
            )
            .map_err(store_error)?;
        Ok(())
    }

    fn lock_holder(&mut self) -> Result<Option<String>, LedgerError> {
        let row = self
            .client
            .query_opt(
                &format!(
                    "SELECT owner FROM {}_lock WHERE id = 1 AND expires_at >= $1",
                    self.table_name
                ),
                &[&now_millis()],
            )
            .map_err(store_error)?;
        row.map(|row| row.try_get(0).map_err(store_error))
            .transpose()
    }
}
