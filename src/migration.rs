use std::cmp::Ordering;
use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::error::ValidationError;
use crate::operation::{Operation, Reversal};

/// Longest timestamp prefix that always fits in a `u64`.
const MAX_TIMESTAMP_DIGITS: usize = 19;

/// Split `<digits>_<name>` into its numeric timestamp and name.
pub fn parse_id(id: &str) -> Result<(u64, &str), ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidId {
        id: id.to_string(),
        reason: reason.to_string(),
    };

    let (timestamp, name) = id
        .split_once('_')
        .ok_or_else(|| invalid("expected <timestamp>_<name>"))?;

    if timestamp.is_empty() || !timestamp.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("timestamp prefix must be ASCII digits"));
    }
    if timestamp.len() > MAX_TIMESTAMP_DIGITS {
        return Err(invalid("timestamp prefix is too long"));
    }
    if name.is_empty() {
        return Err(invalid("name after the timestamp is empty"));
    }

    let timestamp = timestamp
        .parse::<u64>()
        .map_err(|e| invalid(&e.to_string()))?;
    Ok((timestamp, name))
}

/// Orders ids by numeric timestamp, then name. Malformed ids fall back to
/// plain string order; validation rejects them before they reach a plan.
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    match (parse_id(a), parse_id(b)) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

#[derive(Debug, Clone)]
pub struct Migration {
    pub id: &'static str,
    pub dependencies: &'static [&'static str],
    forward: Vec<Operation>,
    backward: Option<Vec<Operation>>,
    atomic: bool,
}

impl Migration {
    pub fn new(id: &'static str) -> Self {
        Self {
            id,
            dependencies: &[],
            forward: Vec::new(),
            backward: None,
            atomic: true,
        }
    }

    /// Declare units that must be applied first. They are checked, not used
    /// for ordering: each must be registered with a smaller id.
    pub fn depends_on(mut self, dependencies: &'static [&'static str]) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Set whether this migration should run inside a transaction.
    /// Defaults to `true`. Set to `false` for operations that cannot
    /// run in transactions (e.g., `CREATE INDEX CONCURRENTLY` in PostgreSQL).
    pub fn atomic(mut self, atomic: bool) -> Self {
        self.atomic = atomic;
        self
    }

    pub fn is_atomic(&self) -> bool {
        self.atomic
    }

    /// Add an operation whose reverse is derived automatically.
    pub fn operation(mut self, op: impl Into<Operation>) -> Self {
        self.forward.push(op.into());
        self
    }

    /// Set forward operations (replaces any existing).
    pub fn forward_ops(mut self, ops: Vec<Operation>) -> Self {
        self.forward = ops;
        self
    }

    /// Set explicit backward operations (replaces automatic derivation).
    /// When set, these operations run in order (not reversed) during rollback.
    pub fn backward_ops(mut self, ops: Vec<Operation>) -> Self {
        self.backward = Some(ops);
        self
    }

    pub fn operations(&self) -> &[Operation] {
        &self.forward
    }

    pub fn backward_operations(&self) -> Option<&[Operation]> {
        self.backward.as_deref()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        parse_id(self.id)?;
        if self.forward.is_empty() {
            return Err(ValidationError::EmptyOperations(self.id.to_string()));
        }
        Ok(())
    }

    /// SHA-256 over the JSON encoding of the forward operations, followed by
    /// the explicit backward operations when present.
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(&self.forward).unwrap_or_default());
        if let Some(ref backward) = self.backward {
            hasher.update([0x00]);
            hasher.update(serde_json::to_vec(backward).unwrap_or_default());
        }
        format!("{:x}", hasher.finalize())
    }

    pub fn is_reversible(&self) -> bool {
        self.down_operations().is_ok()
    }

    /// Operations that undo this unit, in execution order.
    ///
    /// On failure returns the index of the first forward operation that has
    /// no reverse, with the reason.
    pub fn down_operations(&self) -> Result<Vec<Operation>, (usize, String)> {
        if let Some(ref backward) = self.backward {
            return Ok(backward.clone());
        }

        let mut down = Vec::with_capacity(self.forward.len());
        for (index, op) in self.forward.iter().enumerate().rev() {
            match op.reverse() {
                Reversal::Operation(reverse) => down.push(reverse),
                Reversal::Irreversible { reason } => return Err((index, reason)),
            }
        }
        Ok(down)
    }
}

#[derive(Debug, Default)]
pub struct MigrationRegistry {
    migrations: Vec<Migration>,
    index: HashMap<&'static str, usize>,
    duplicates: Vec<&'static str>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A second registration under an existing id is kept aside and reported
    /// by [`MigrationRegistry::validate`]; the first definition stays.
    pub fn register(&mut self, migration: Migration) {
        let id = migration.id;
        if self.index.contains_key(id) {
            self.duplicates.push(id);
            return;
        }
        self.index.insert(id, self.migrations.len());
        self.migrations.push(migration);
    }

    pub fn get(&self, id: &str) -> Option<&Migration> {
        self.index.get(id).map(|&i| &self.migrations[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Migrations in registration order.
    pub fn all(&self) -> impl Iterator<Item = &Migration> {
        self.migrations.iter()
    }

    /// Migrations in id order.
    pub fn sorted(&self) -> Vec<&Migration> {
        let mut sorted: Vec<&Migration> = self.migrations.iter().collect();
        sorted.sort_by(|a, b| compare_ids(a.id, b.id));
        sorted
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(id) = self.duplicates.first() {
            return Err(ValidationError::DuplicateId(id.to_string()));
        }
        for migration in &self.migrations {
            migration.validate()?;
        }

        // Distinct strings such as `10_X` and `010_X` parse to the same key
        // and would otherwise tie in id order.
        let mut seen: HashMap<(u64, &str), &'static str> = HashMap::new();
        for migration in &self.migrations {
            let key = parse_id(migration.id)?;
            if let Some(first) = seen.insert(key, migration.id) {
                return Err(ValidationError::DuplicateId(format!(
                    "{} (same ordering key as {})",
                    migration.id, first
                )));
            }
        }
        Ok(())
    }
}
