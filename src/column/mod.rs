mod types;

pub use types::ColumnType;

use serde::{Deserialize, Serialize};

/// A column as it is created or re-created by a migration.
///
/// Columns start out nullable. The full definition is what `DropColumn` and
/// `DropTable` keep as a snapshot, so everything needed to bring a dropped
/// column back has to live here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub primary_key: bool,
    pub unique: bool,
    /// Raw SQL expression, e.g. `"0"` or `"'active'"`.
    pub default: Option<String>,
    pub references: Option<ColumnReference>,
}

/// Inline `REFERENCES` clause. Unlike a named `ForeignKey` it lives and dies
/// with its column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnReference {
    pub table: String,
    pub column: String,
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReferentialAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            primary_key: false,
            unique: false,
            default: None,
            references: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Also makes the column `NOT NULL`.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Point this column at `table.column` with `NO ACTION` on both events.
    pub fn references(self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.reference(ColumnReference::new(table, column))
    }

    pub fn reference(mut self, reference: ColumnReference) -> Self {
        self.references = Some(reference);
        self
    }

    /// Applies to the reference set by [`Column::references`]; ignored on a
    /// column without one.
    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        if let Some(reference) = self.references.take() {
            self.references = Some(reference.on_delete(action));
        }
        self
    }

    /// See [`Column::on_delete`].
    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        if let Some(reference) = self.references.take() {
            self.references = Some(reference.on_update(action));
        }
        self
    }

    /// Serial primary keys are filled in by the database.
    pub fn is_auto_increment(&self) -> bool {
        self.primary_key
            && matches!(self.column_type, ColumnType::Serial | ColumnType::BigSerial)
    }

    pub fn referenced_table(&self) -> Option<&str> {
        self.references.as_ref().map(|r| r.table.as_str())
    }
}

impl ColumnReference {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            on_delete: ReferentialAction::default(),
            on_update: ReferentialAction::default(),
        }
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

impl ReferentialAction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }
}
