use serde::{Deserialize, Serialize};

use crate::column::{Column, ColumnType};
use crate::operation::{Guard, Operation, Reversal, SchemaChange};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddColumn {
    pub table: String,
    pub column: Column,
}

impl AddColumn {
    pub fn new(table: impl Into<String>, column: Column) -> Self {
        Self {
            table: table.into(),
            column,
        }
    }
}

impl SchemaChange for AddColumn {
    fn reverse(&self) -> Reversal {
        // The definition travels with the drop so that it can be re-added.
        Reversal::Operation(Operation::DropColumn(DropColumn {
            table: self.table.clone(),
            column: self.column.name.clone(),
            snapshot: Some(self.column.clone()),
        }))
    }

    fn describe(&self) -> String {
        format!("Add column {} to {}", self.column.name, self.table)
    }

    fn guard(&self) -> Option<Guard> {
        Some(Guard::ColumnMissing {
            table: self.table.clone(),
            column: self.column.name.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropColumn {
    pub table: String,
    pub column: String,
    pub snapshot: Option<Column>,
}

impl DropColumn {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            snapshot: None,
        }
    }

    /// Record the column definition being dropped so the drop can be undone.
    pub fn with_snapshot(mut self, column: Column) -> Self {
        self.snapshot = Some(column);
        self
    }
}

impl SchemaChange for DropColumn {
    fn reverse(&self) -> Reversal {
        match self.snapshot {
            Some(ref column) => Reversal::Operation(Operation::AddColumn(AddColumn {
                table: self.table.clone(),
                column: column.clone(),
            })),
            None => Reversal::irreversible(format!(
                "column {}.{} is dropped without a snapshot of its definition",
                self.table, self.column
            )),
        }
    }

    fn describe(&self) -> String {
        format!("Drop column {} from {}", self.column, self.table)
    }

    fn guard(&self) -> Option<Guard> {
        Some(Guard::ColumnExists {
            table: self.table.clone(),
            column: self.column.clone(),
        })
    }
}

/// Type and collation of a column before it was altered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeSnapshot {
    pub column_type: ColumnType,
    pub collation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlterColumnType {
    pub table: String,
    pub column: String,
    pub new_type: ColumnType,
    pub collation: Option<String>,
    pub previous: Option<TypeSnapshot>,
}

impl AlterColumnType {
    pub fn new(table: impl Into<String>, column: impl Into<String>, new_type: ColumnType) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            new_type,
            collation: None,
            previous: None,
        }
    }

    pub fn collate(mut self, collation: impl Into<String>) -> Self {
        self.collation = Some(collation.into());
        self
    }

    pub fn with_previous(mut self, column_type: ColumnType, collation: Option<String>) -> Self {
        self.previous = Some(TypeSnapshot {
            column_type,
            collation,
        });
        self
    }
}

impl SchemaChange for AlterColumnType {
    fn reverse(&self) -> Reversal {
        match self.previous {
            Some(ref previous) => Reversal::Operation(Operation::AlterColumnType(AlterColumnType {
                table: self.table.clone(),
                column: self.column.clone(),
                new_type: previous.column_type.clone(),
                collation: previous.collation.clone(),
                previous: Some(TypeSnapshot {
                    column_type: self.new_type.clone(),
                    collation: self.collation.clone(),
                }),
            })),
            None => Reversal::irreversible(format!(
                "previous type of {}.{} is unknown",
                self.table, self.column
            )),
        }
    }

    fn describe(&self) -> String {
        match self.collation {
            Some(ref collation) => format!(
                "Alter type of {}.{} to {:?} collate {}",
                self.table, self.column, self.new_type, collation
            ),
            None => format!(
                "Alter type of {}.{} to {:?}",
                self.table, self.column, self.new_type
            ),
        }
    }
}
