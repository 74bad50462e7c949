#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "postgres")]
mod postgres;

#[cfg(feature = "mysql")]
mod mysql;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteLedger;

#[cfg(feature = "postgres")]
pub use self::postgres::PostgresLedger;

#[cfg(feature = "mysql")]
pub use self::mysql::MySqlLedger;

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::migration::{compare_ids, Migration};

#[cfg(any(feature = "sqlite", feature = "postgres", feature = "mysql"))]
pub(crate) const DEFAULT_TABLE_NAME: &str = "tidemark_migrations";

/// One applied migration as recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub id: String,
    pub applied_at: DateTime<Utc>,
    pub checksum: String,
    pub batch: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("ledger store: {0}")]
    Store(String),

    #[error("corrupt ledger entry: {0}")]
    Corrupt(String),
}

/// Persistent record of applied migrations plus the advisory run lock.
pub trait Ledger {
    fn entries(&mut self) -> Result<Vec<LedgerEntry>, LedgerError>;
    fn record_applied(&mut self, migration: &Migration, batch: i64) -> Result<(), LedgerError>;
    fn record_reverted(&mut self, id: &str) -> Result<(), LedgerError>;

    /// Take or refresh the run lock for `owner`. Returns `false` while another
    /// owner holds an unexpired lease.
    fn acquire_lock(&mut self, owner: &str, lease: Duration) -> Result<bool, LedgerError>;
    fn release_lock(&mut self, owner: &str) -> Result<(), LedgerError>;

    /// Owner of the current unexpired lease, if any.
    fn lock_holder(&mut self) -> Result<Option<String>, LedgerError>;

    /// Applied ids in id order.
    fn list_applied(&mut self) -> Result<Vec<String>, LedgerError> {
        let mut ids: Vec<String> = self.entries()?.into_iter().map(|e| e.id).collect();
        ids.sort_by(|a, b| compare_ids(a, b));
        Ok(ids)
    }

    /// Highest recorded batch, `None` when nothing is applied.
    fn latest_batch(&mut self) -> Result<Option<i64>, LedgerError> {
        Ok(self.entries()?.iter().map(|e| e.batch).max())
    }
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub(crate) fn lease_expiry(now: i64, lease: Duration) -> i64 {
    let lease = i64::try_from(lease.as_millis()).unwrap_or(i64::MAX);
    now.saturating_add(lease)
}

#[derive(Debug, Clone)]
struct Lease {
    owner: String,
    expires_at: i64,
}

/// Ledger kept in memory, for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    entries: Vec<LedgerEntry>,
    lease: Option<Lease>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<LedgerEntry>) -> Self {
        Self {
            entries,
            lease: None,
        }
    }

    pub fn snapshot(&self) -> &[LedgerEntry] {
        &self.entries
    }
}

impl Ledger for InMemoryLedger {
    fn entries(&mut self) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self.entries.clone())
    }

    fn record_applied(&mut self, migration: &Migration, batch: i64) -> Result<(), LedgerError> {
        if self.entries.iter().any(|e| e.id == migration.id) {
            return Err(LedgerError::Store(format!(
                "{} is already recorded",
                migration.id
            )));
        }
        self.entries.push(LedgerEntry {
            id: migration.id.to_string(),
            applied_at: Utc::now(),
            checksum: migration.checksum(),
            batch,
        });
        Ok(())
    }

    fn record_reverted(&mut self, id: &str) -> Result<(), LedgerError> {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        if self.entries.len() == before {
            return Err(LedgerError::Store(format!("{} is not recorded", id)));
        }
        Ok(())
    }

    fn acquire_lock(&mut self, owner: &str, lease: Duration) -> Result<bool, LedgerError> {
        let now = now_millis();
        if let Some(ref held) = self.lease {
            if held.owner != owner && held.expires_at >= now {
                return Ok(false);
            }
        }
        self.lease = Some(Lease {
            owner: owner.to_string(),
            expires_at: lease_expiry(now, lease),
        });
        Ok(true)
    }

    fn release_lock(&mut self, owner: &str) -> Result<(), LedgerError> {
        if self.lease.as_ref().is_some_and(|l| l.owner == owner) {
            self.lease = None;
        }
        Ok(())
    }

    fn lock_holder(&mut self) -> Result<Option<String>, LedgerError> {
        let now = now_millis();
        Ok(self
            .lease
            .as_ref()
            .filter(|l| l.expires_at >= now)
            .map(|l| l.owner.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::RunSql;

    fn unit(id: &'static str) -> Migration {
        Migration::new(id).operation(RunSql::new("SELECT 1"))
    }

    #[test]
    fn records_and_reverts_entries() {
        let mut ledger = InMemoryLedger::new();
        let first = unit("20240101_First");

        ledger.record_applied(&first, 1).unwrap();
        let entries = ledger.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "20240101_First");
        assert_eq!(entries[0].checksum, first.checksum());
        assert_eq!(entries[0].batch, 1);

        ledger.record_reverted("20240101_First").unwrap();
        assert!(ledger.entries().unwrap().is_empty());
    }

    #[test]
    fn rejects_double_record_and_unknown_revert() {
        let mut ledger = InMemoryLedger::new();
        ledger.record_applied(&unit("1_A"), 1).unwrap();

        assert!(ledger.record_applied(&unit("1_A"), 2).is_err());
        assert!(ledger.record_reverted("2_B").is_err());
    }

    #[test]
    fn list_applied_is_in_id_order() {
        let mut ledger = InMemoryLedger::new();
        ledger.record_applied(&unit("10_Later"), 1).unwrap();
        ledger.record_applied(&unit("9_Earlier"), 1).unwrap();

        assert_eq!(ledger.list_applied().unwrap(), vec!["9_Earlier", "10_Later"]);
    }

    #[test]
    fn latest_batch_is_none_until_something_is_applied() {
        let mut ledger = InMemoryLedger::new();
        assert_eq!(ledger.latest_batch().unwrap(), None);

        ledger.record_applied(&unit("1_A"), 1).unwrap();
        ledger.record_applied(&unit("2_B"), 3).unwrap();
        assert_eq!(ledger.latest_batch().unwrap(), Some(3));
    }

    #[test]
    fn lock_excludes_other_owners_until_released() {
        let mut ledger = InMemoryLedger::new();
        let lease = Duration::from_secs(60);

        assert!(ledger.acquire_lock("a", lease).unwrap());
        assert!(ledger.acquire_lock("a", lease).unwrap());
        assert!(!ledger.acquire_lock("b", lease).unwrap());
        assert_eq!(ledger.lock_holder().unwrap().as_deref(), Some("a"));

        ledger.release_lock("b").unwrap();
        assert!(!ledger.acquire_lock("b", lease).unwrap());

        ledger.release_lock("a").unwrap();
        assert_eq!(ledger.lock_holder().unwrap(), None);
        assert!(ledger.acquire_lock("b", lease).unwrap());
    }

    #[test]
    fn expired_lease_can_be_taken_over() {
        let mut ledger = InMemoryLedger::new();
        assert!(ledger.acquire_lock("crashed", Duration::ZERO).unwrap());
        std::thread::sleep(Duration::from_millis(5));

        assert!(ledger.acquire_lock("next", Duration::from_secs(60)).unwrap());
        assert_eq!(ledger.lock_holder().unwrap().as_deref(), Some("next"));
    }

    #[test]
    fn lease_expiry_saturates() {
        assert_eq!(lease_expiry(i64::MAX - 1, Duration::from_secs(10)), i64::MAX);
        assert_eq!(lease_expiry(1_000, Duration::from_millis(500)), 1_500);
    }
}
