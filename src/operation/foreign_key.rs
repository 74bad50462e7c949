use serde::{Deserialize, Serialize};

use crate::column::ReferentialAction;
use crate::operation::{Operation, Reversal, SchemaChange};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub name: String,
    pub column: String,
    pub ref_table: String,
    pub ref_column: String,
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
}

impl ForeignKey {
    /// Named `fk_<table>_<column>` unless renamed with [`ForeignKey::named`].
    pub fn new(
        table: &str,
        column: impl Into<String>,
        ref_table: impl Into<String>,
        ref_column: impl Into<String>,
    ) -> Self {
        let column = column.into();
        Self {
            name: format!("fk_{}_{}", table, column),
            column,
            ref_table: ref_table.into(),
            ref_column: ref_column.into(),
            on_delete: ReferentialAction::default(),
            on_update: ReferentialAction::default(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = action;
        self
    }

    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = action;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddForeignKey {
    pub table: String,
    pub foreign_key: ForeignKey,
}

impl AddForeignKey {
    pub fn new(
        table: impl Into<String>,
        column: impl Into<String>,
        ref_table: impl Into<String>,
        ref_column: impl Into<String>,
    ) -> Self {
        let table = table.into();
        let foreign_key = ForeignKey::new(&table, column, ref_table, ref_column);
        Self { table, foreign_key }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.foreign_key = self.foreign_key.named(name);
        self
    }

    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.foreign_key = self.foreign_key.on_delete(action);
        self
    }

    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        self.foreign_key = self.foreign_key.on_update(action);
        self
    }
}

impl SchemaChange for AddForeignKey {
    fn reverse(&self) -> Reversal {
        Reversal::Operation(Operation::DropForeignKey(DropForeignKey {
            table: self.table.clone(),
            name: self.foreign_key.name.clone(),
            snapshot: Some(self.foreign_key.clone()),
        }))
    }

    fn describe(&self) -> String {
        format!(
            "Add foreign key {} on {}.{} referencing {}.{}",
            self.foreign_key.name,
            self.table,
            self.foreign_key.column,
            self.foreign_key.ref_table,
            self.foreign_key.ref_column
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropForeignKey {
    pub table: String,
    pub name: String,
    pub snapshot: Option<ForeignKey>,
}

impl DropForeignKey {
    pub fn new(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            name: name.into(),
            snapshot: None,
        }
    }

    pub fn with_snapshot(mut self, foreign_key: ForeignKey) -> Self {
        self.snapshot = Some(foreign_key);
        self
    }
}

impl SchemaChange for DropForeignKey {
    fn reverse(&self) -> Reversal {
        match self.snapshot {
            Some(ref foreign_key) => Reversal::Operation(Operation::AddForeignKey(AddForeignKey {
                table: self.table.clone(),
                foreign_key: foreign_key.clone(),
            })),
            None => Reversal::irreversible(format!(
                "foreign key {} on {} is dropped without a snapshot",
                self.name, self.table
            )),
        }
    }

    fn describe(&self) -> String {
        format!("Drop foreign key {} from {}", self.name, self.table)
    }
}
