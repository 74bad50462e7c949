use std::time::Duration;

use thiserror::Error;

use crate::executor::ExecutorError;
use crate::ledger::LedgerError;

/// Configuration or plan problems, always raised before any DDL runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("migration {0} is registered more than once")]
    DuplicateId(String),

    #[error("migration {0} has no operations")]
    EmptyOperations(String),

    #[error("invalid migration id {id:?}: {reason}")]
    InvalidId { id: String, reason: String },

    #[error("migration {migration} changed after it was applied (recorded {recorded}, now {current})")]
    ChecksumMismatch {
        migration: String,
        recorded: String,
        current: String,
    },

    #[error("migration {migration} operation {operation_index} needs table {table}, which does not exist at that point")]
    UnresolvedDependency {
        migration: String,
        operation_index: usize,
        table: String,
    },

    #[error("migration {migration} depends on {dependency}: {reason}")]
    MissingDependency {
        migration: String,
        dependency: String,
        reason: String,
    },

    #[error("target migration {0} is not registered")]
    UnknownTarget(String),

    #[error("migration {migration} operation {operation_index} cannot be reversed: {reason}")]
    Irreversible {
        migration: String,
        operation_index: usize,
        reason: String,
    },

    #[error("migration {migration} operation {operation_index}: {reason}")]
    Unsupported {
        migration: String,
        operation_index: usize,
        reason: String,
    },

    #[error("migration {0} is applied but no longer registered")]
    MissingDefinition(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureCause {
    #[error("{0}")]
    Rejected(String),

    #[error("exceeded the {limit:?} operation timeout")]
    Timeout { limit: Option<Duration> },

    #[error("begin transaction: {0}")]
    Begin(String),

    #[error("commit transaction: {0}")]
    Commit(String),
}

/// A unit failed while its DDL ran.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("migration {migration} failed at operation {operation_index}: {cause}")]
    Failed {
        migration: String,
        operation_index: usize,
        cause: FailureCause,
        rolled_back: bool,
        completed: Vec<String>,
    },

    /// A unit outside a transaction stopped after some of its statements ran.
    #[error("migration {migration} partially applied, failed at operation {operation_index}: {cause}")]
    PartialApply {
        migration: String,
        operation_index: usize,
        cause: FailureCause,
        applied_operations: Vec<usize>,
        completed: Vec<String>,
    },
}

impl ExecutionError {
    pub fn migration(&self) -> &str {
        match self {
            ExecutionError::Failed { migration, .. }
            | ExecutionError::PartialApply { migration, .. } => migration,
        }
    }

    pub fn operation_index(&self) -> usize {
        match self {
            ExecutionError::Failed {
                operation_index, ..
            }
            | ExecutionError::PartialApply {
                operation_index, ..
            } => *operation_index,
        }
    }

    /// Units committed earlier in the same run.
    pub fn completed(&self) -> &[String] {
        match self {
            ExecutionError::Failed { completed, .. }
            | ExecutionError::PartialApply { completed, .. } => completed,
        }
    }
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("migration lock is held by {owner}")]
    LockContention { owner: String },

    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("schema inspection failed: {0}")]
    Inspect(ExecutorError),
}

impl MigrationError {
    /// Only lock contention is worth retrying unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MigrationError::LockContention { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_lock_contention_is_retryable() {
        let contention = MigrationError::LockContention {
            owner: "deploy-1".to_string(),
        };
        assert!(contention.is_retryable());

        let drift: MigrationError = ValidationError::ChecksumMismatch {
            migration: "20240101_CreateLicenses".to_string(),
            recorded: "aa".to_string(),
            current: "bb".to_string(),
        }
        .into();
        assert!(!drift.is_retryable());

        let failed: MigrationError = ExecutionError::Failed {
            migration: "20240101_CreateLicenses".to_string(),
            operation_index: 0,
            cause: FailureCause::Timeout {
                limit: Some(Duration::from_secs(1)),
            },
            rolled_back: true,
            completed: vec![],
        }
        .into();
        assert!(!failed.is_retryable());
    }

    #[test]
    fn execution_error_accessors() {
        let err = ExecutionError::PartialApply {
            migration: "20240102_AddIndexes".to_string(),
            operation_index: 2,
            cause: FailureCause::Rejected("duplicate key".to_string()),
            applied_operations: vec![0, 1],
            completed: vec!["20240101_CreateLicenses".to_string()],
        };

        assert_eq!(err.migration(), "20240102_AddIndexes");
        assert_eq!(err.operation_index(), 2);
        assert_eq!(err.completed(), &["20240101_CreateLicenses"]);
    }

    #[test]
    fn display_names_migration_and_operation() {
        let err = ValidationError::UnresolvedDependency {
            migration: "20240102_AddFK".to_string(),
            operation_index: 0,
            table: "practitioners".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "migration 20240102_AddFK operation 0 needs table practitioners, which does not exist at that point"
        );
    }
}
