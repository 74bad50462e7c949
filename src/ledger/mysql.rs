use std::time::Duration;

use chrono::{DateTime, Utc};
use mysql::prelude::*;
use mysql::PooledConn;

use crate::ledger::{
    lease_expiry, now_millis, Ledger, LedgerEntry, LedgerError, DEFAULT_TABLE_NAME,
};
use crate::migration::Migration;

pub struct MySqlLedger<'a> {
    conn: &'a mut PooledConn,
    table_name: String,
}

fn store_error(err: mysql::Error) -> LedgerError {
    LedgerError::Store(err.to_string())
}

impl<'a> MySqlLedger<'a> {
    pub fn new(conn: &'a mut PooledConn) -> Result<Self, LedgerError> {
        Self::with_table_name(conn, DEFAULT_TABLE_NAME)
    }

    pub fn with_table_name(conn: &'a mut PooledConn, table_name: &str) -> Result<Self, LedgerError> {
        let mut ledger = Self {
            conn,
            table_name: table_name.to_string(),
        };
        ledger.ensure_tables()?;
        Ok(ledger)
    }

    fn ensure_tables(&mut self) -> Result<(), LedgerError> {
        // applied_at is stored as RFC 3339 text to keep the driver free of
        // date features.
        self.conn
            .query_drop(format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id VARCHAR(255) PRIMARY KEY,
                    applied_at VARCHAR(64) NOT NULL,
                    checksum CHAR(64) NOT NULL,
                    batch BIGINT NOT NULL
                )",
                self.table_name
            ))
            .map_err(store_error)?;
        self.conn
            .query_drop(format!(
                "CREATE TABLE IF NOT EXISTS {}_lock (
                    id INT PRIMARY KEY,
                    owner VARCHAR(255) NOT NULL,
                    expires_at BIGINT NOT NULL
                )",
                self.table_name
            ))
            .map_err(store_error)?;
        Ok(())
    }
}

impl Ledger for MySqlLedger<'_> {
    fn entries(&mut self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let rows: Vec<(String, String, String, i64)> = self
            .conn
            .query(format!(
                "SELECT id, applied_at, checksum, batch FROM {} ORDER BY batch, id",
                self.table_name
            ))
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
            .exec_drop(
                format!(
                    "INSERT INTO {} (id, applied_at, checksum, batch) VALUES (?, ?, ?, ?)",
                    self.table_name
                ),
                (
                    migration.id,
                    Utc::now().to_rfc3339(),
                    migration.checksum(),
                    batch,
                ),
            )
            .map_err(store_error)
    }

    fn record_reverted(&mut self, id: &str) -> Result<(), LedgerError> {
        self.conn
            .exec_drop(
                format!("DELETE FROM {} WHERE id = ?", self.table_name),
                (id,),
            )
            .map_err(store_error)?;
        if self.conn.affected_rows() == 0 {
            return Err(LedgerError::Store(format!("{} is not recorded", id)));
        }
        Ok(())
    }

    fn acquire_lock(&mut self, owner: &str, lease: Duration) -> Result<bool, LedgerError> {
        let now = now_millis();
        // Assignments apply left to right, so expires_at sees the new owner.
        self.conn
            .exec_drop(
                format!(
                    "INSERT INTO {}_lock (id, owner, expires_at) VALUES (1, ?, ?)
                     ON DUPLICATE KEY UPDATE
                     owner = IF(expires_at < ? OR owner = VALUES(owner), VALUES(owner), owner),
                     expires_at = IF(owner = VALUES(owner), VALUES(expires_at), expires_at)",
                    self.table_name
                ),
                (owner, lease_expiry(now, lease), now),
            )
            .map_err(store_error)?;

        let holder: Option<String> = self
            .conn
            .query_first(format!(
                "SELECT owner FROM {}_lock WHERE id = 1",
                self.table_name
            ))
            .map_err(store_error)?;
        Ok(holder.as_deref() == Some(owner))
    }

    fn release_lock(&mut self, owner: &str) -> Result<(), LedgerError> {
        self.conn
            .exec_drop(
                format!(
                    "DELETE FROM {}_lock WHERE id = 1 AND owner = ?",
                    self.table_name
                ),
                (owner,),
            )
            .map_err(store_error)
    }

    fn lock_holder(&mut self) -> Result<Option<String>, LedgerError> {
        self.conn
            .exec_first(
                format!(
                    "SELECT owner FROM {}_lock WHERE id = 1 AND expires_at >= ?",
                    self.table_name
                ),
                (now_millis(),),
            )
            .map_err(store_error)
    }
}
