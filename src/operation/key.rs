use serde::{Deserialize, Serialize};

use crate::operation::{Operation, Reversal, SchemaChange};

/// A named (optionally unique) index over one or more columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

impl Key {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            unique: false,
        }
    }

    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.columns.push(name.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddKey {
    pub table: String,
    pub key: Key,
}

impl AddKey {
    pub fn new(table: impl Into<String>, key: Key) -> Self {
        Self {
            table: table.into(),
            key,
        }
    }
}

impl SchemaChange for AddKey {
    fn reverse(&self) -> Reversal {
        Reversal::Operation(Operation::DropKey(DropKey {
            table: self.table.clone(),
            name: self.key.name.clone(),
            snapshot: Some(self.key.clone()),
        }))
    }

    fn describe(&self) -> String {
        format!("Add key {} on {}", self.key.name, self.table)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropKey {
    pub table: String,
    pub name: String,
    pub snapshot: Option<Key>,
}

impl DropKey {
    pub fn new(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            name: name.into(),
            snapshot: None,
        }
    }

    pub fn with_snapshot(mut self, key: Key) -> Self {
        self.snapshot = Some(key);
        self
    }
}

impl SchemaChange for DropKey {
    fn reverse(&self) -> Reversal {
        match self.snapshot {
            Some(ref key) => Reversal::Operation(Operation::AddKey(AddKey {
                table: self.table.clone(),
                key: key.clone(),
            })),
            None => Reversal::irreversible(format!(
                "key {} on {} is dropped without a snapshot",
                self.name, self.table
            )),
        }
    }

    fn describe(&self) -> String {
        format!("Drop key {} from {}", self.name, self.table)
    }
}
