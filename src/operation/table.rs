use serde::{Deserialize, Serialize};

use crate::column::{Column, ColumnType};
use crate::operation::{Guard, Operation, Reversal, SchemaChange};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTable {
    pub name: String,
    pub columns: Vec<Column>,
    pub if_not_exists: bool,
}

impl CreateTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            if_not_exists: false,
        }
    }

    pub fn column(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.columns.push(Column::new(name, column_type));
        self
    }

    pub fn add_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }
}

impl SchemaChange for CreateTable {
    fn reverse(&self) -> Reversal {
        Reversal::Operation(Operation::DropTable(DropTable {
            name: self.name.clone(),
            if_exists: self.if_not_exists,
            snapshot: Some(self.columns.clone()),
        }))
    }

    fn describe(&self) -> String {
        format!("Create table {}", self.name)
    }

    fn guard(&self) -> Option<Guard> {
        Some(Guard::TableMissing {
            table: self.name.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropTable {
    pub name: String,
    pub if_exists: bool,
    pub snapshot: Option<Vec<Column>>,
}

impl DropTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            if_exists: false,
            snapshot: None,
        }
    }

    pub fn if_exists(mut self) -> Self {
        self.if_exists = true;
        self
    }

    /// Record the table's columns so the drop can be undone (without data).
    pub fn with_snapshot(mut self, columns: Vec<Column>) -> Self {
        self.snapshot = Some(columns);
        self
    }
}

impl SchemaChange for DropTable {
    fn reverse(&self) -> Reversal {
        match self.snapshot {
            Some(ref columns) => Reversal::Operation(Operation::CreateTable(CreateTable {
                name: self.name.clone(),
                columns: columns.clone(),
                if_not_exists: self.if_exists,
            })),
            None => Reversal::irreversible(format!(
                "table {} is dropped without a snapshot of its columns",
                self.name
            )),
        }
    }

    fn describe(&self) -> String {
        format!("Drop table {}", self.name)
    }

    fn guard(&self) -> Option<Guard> {
        self.if_exists.then(|| Guard::TableExists {
            table: self.name.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropTrigger {
    pub name: String,
    /// Owning table. PostgreSQL cannot drop a trigger without it.
    pub table: Option<String>,
    pub if_exists: bool,
}

impl DropTrigger {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            if_exists: false,
        }
    }

    pub fn on_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn if_exists(mut self) -> Self {
        self.if_exists = true;
        self
    }
}

impl SchemaChange for DropTrigger {
    fn reverse(&self) -> Reversal {
        Reversal::irreversible(format!("trigger {} has no recorded definition", self.name))
    }

    fn describe(&self) -> String {
        format!("Drop trigger {}", self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropView {
    pub name: String,
    pub if_exists: bool,
}

impl DropView {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            if_exists: false,
        }
    }

    pub fn if_exists(mut self) -> Self {
        self.if_exists = true;
        self
    }
}

impl SchemaChange for DropView {
    fn reverse(&self) -> Reversal {
        Reversal::irreversible(format!("view {} has no recorded definition", self.name))
    }

    fn describe(&self) -> String {
        format!("Drop view {}", self.name)
    }
}
