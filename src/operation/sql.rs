use serde::{Deserialize, Serialize};

use crate::operation::{Operation, Reversal, SchemaChange};

/// Raw SQL, for changes the typed operations cannot express.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSql {
    pub forward: Vec<String>,
    pub backward: Option<Vec<String>>,
    /// Dialect names this SQL is restricted to. Other dialects skip it.
    pub only: Option<Vec<String>>,
}

impl RunSql {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            forward: vec![sql.into()],
            backward: None,
            only: None,
        }
    }

    pub fn multiple(statements: Vec<String>) -> Self {
        Self {
            forward: statements,
            backward: None,
            only: None,
        }
    }

    pub fn reversible(forward: impl Into<String>, backward: impl Into<String>) -> Self {
        Self {
            forward: vec![forward.into()],
            backward: Some(vec![backward.into()]),
            only: None,
        }
    }

    /// Restrict this operation to the named dialects, e.g. `&["postgres"]`.
    pub fn only_for(mut self, dialects: &[&str]) -> Self {
        self.only = Some(dialects.iter().map(|d| d.to_string()).collect());
        self
    }

    pub fn applies_to(&self, dialect: &str) -> bool {
        match self.only {
            Some(ref only) => only.iter().any(|d| d == dialect),
            None => true,
        }
    }
}

impl SchemaChange for RunSql {
    fn reverse(&self) -> Reversal {
        match self.backward {
            Some(ref backward) => Reversal::Operation(Operation::RunSql(RunSql {
                forward: backward.clone(),
                backward: Some(self.forward.clone()),
                only: self.only.clone(),
            })),
            None => Reversal::irreversible("raw SQL has no backward statements"),
        }
    }

    fn describe(&self) -> String {
        format!("Run {} SQL statement(s)", self.forward.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reversible_swaps_directions() {
        let op = RunSql::reversible(
            "UPDATE invoices SET status = 'open' WHERE status IS NULL",
            "UPDATE invoices SET status = NULL WHERE status = 'open'",
        );

        let reverse = match op.reverse() {
            Reversal::Operation(Operation::RunSql(reverse)) => reverse,
            other => panic!("unexpected reversal: {:?}", other),
        };
        assert!(reverse.forward[0].contains("SET status = NULL"));
        assert!(reverse.backward.unwrap()[0].contains("SET status = 'open'"));
    }

    #[test]
    fn one_way_sql_is_irreversible() {
        assert!(RunSql::new("DELETE FROM renewals").reverse().is_irreversible());
    }

    #[test]
    fn only_for_restricts_dialects() {
        let op = RunSql::new("VACUUM").only_for(&["sqlite"]);
        assert!(op.applies_to("sqlite"));
        assert!(!op.applies_to("postgres"));
        assert!(RunSql::new("SELECT 1").applies_to("mysql"));
    }

    #[test]
    fn multiple_statements() {
        let op = RunSql::multiple(vec!["SELECT 1".to_string(), "SELECT 2".to_string()]);
        assert_eq!(op.forward.len(), 2);
        assert_eq!(op.describe(), "Run 2 SQL statement(s)");
    }
}
