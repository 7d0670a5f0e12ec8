//! Planned operations and the correction plan.
//!
//! An [`Operation`] is one planned or reported schema change: the SQL to
//! execute plus a human-readable comment. Operations never mutate after
//! construction, and `report` operations are never executed; they document
//! a divergence the engine refuses to apply automatically.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Sentinel SQL carried by `report` operations.
pub const NO_OP_SQL: &str = "-- no-op";

/// The kind of a planned operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Create a table missing from the target.
    CreateTable,
    /// Add a column missing from a common table.
    AddColumn,
    /// Create an index missing from the target.
    CreateIndex,
    /// Add a foreign key missing from the target.
    AddForeignKey,
    /// Report a divergence without applying any change.
    Report,
}

impl OperationKind {
    /// Returns the kind as its wire/display name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateTable => "create_table",
            Self::AddColumn => "add_column",
            Self::CreateIndex => "create_index",
            Self::AddForeignKey => "add_foreign_key",
            Self::Report => "report",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single planned or reported schema change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    kind: OperationKind,
    sql: String,
    comment: String,
}

impl Operation {
    /// Creates an operation.
    #[must_use]
    pub fn new(kind: OperationKind, sql: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            kind,
            sql: sql.into(),
            comment: comment.into(),
        }
    }

    /// Creates a `report` operation carrying the no-op sentinel.
    #[must_use]
    pub fn report(comment: impl Into<String>) -> Self {
        Self::new(OperationKind::Report, NO_OP_SQL, comment)
    }

    /// Returns the operation kind.
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Returns the SQL text.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Returns the human-readable description.
    #[must_use]
    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// Returns whether this operation is a report.
    #[must_use]
    pub fn is_report(&self) -> bool {
        self.kind == OperationKind::Report
    }
}

/// An ordered, immutable sequence of operations.
///
/// Insertion order is execution order: parent tables precede dependents,
/// tables precede their foreign keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Plan {
    ops: Vec<Operation>,
}

impl Plan {
    /// Returns the operations in execution order.
    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.ops
    }

    /// Returns the number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns whether the plan is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Returns how many operations are reports.
    #[must_use]
    pub fn report_count(&self) -> usize {
        self.ops.iter().filter(|op| op.is_report()).count()
    }

    /// Serializes the plan as a JSON document.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if encoding fails.
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl<'a> IntoIterator for &'a Plan {
    type Item = &'a Operation;
    type IntoIter = std::slice::Iter<'a, Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}

/// Accumulates operations from the planner's independent diff passes, in a
/// fixed documented order, then yields an immutable [`Plan`].
#[derive(Debug, Default)]
pub struct PlanBuilder {
    ops: Vec<Operation>,
}

impl PlanBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one operation.
    pub fn push(&mut self, op: Operation) {
        self.ops.push(op);
    }

    /// Appends a batch of operations, preserving their order.
    pub fn extend(&mut self, ops: impl IntoIterator<Item = Operation>) {
        self.ops.extend(ops);
    }

    /// Returns the number of operations accumulated so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns whether nothing has been accumulated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Finalizes the accumulated operations into an immutable plan.
    #[must_use]
    pub fn finish(self) -> Plan {
        Plan { ops: self.ops }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_carries_sentinel() {
        let op = Operation::report("EXTRA: table exists only in target: notes");
        assert_eq!(op.kind(), OperationKind::Report);
        assert_eq!(op.sql(), NO_OP_SQL);
        assert!(op.is_report());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(OperationKind::CreateTable.to_string(), "create_table");
        assert_eq!(OperationKind::AddForeignKey.to_string(), "add_foreign_key");
        assert_eq!(OperationKind::Report.to_string(), "report");
    }

    #[test]
    fn test_builder_preserves_order() {
        let mut builder = PlanBuilder::new();
        builder.push(Operation::new(
            OperationKind::CreateTable,
            "CREATE TABLE \"users\" (\"id\" INTEGER);",
            "Create table users",
        ));
        builder.extend(vec![
            Operation::new(
                OperationKind::AddColumn,
                "ALTER TABLE \"users\" ADD COLUMN \"age\" INTEGER;",
                "Add column users.age",
            ),
            Operation::report("RISKY: type mismatch users.id"),
        ]);

        let plan = builder.finish();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.report_count(), 1);
        let kinds: Vec<OperationKind> = plan.operations().iter().map(Operation::kind).collect();
        assert_eq!(
            kinds,
            vec![
                OperationKind::CreateTable,
                OperationKind::AddColumn,
                OperationKind::Report
            ]
        );
    }

    #[test]
    fn test_plan_json_round_trip() {
        let mut builder = PlanBuilder::new();
        builder.push(Operation::report("EXTRA: column exists only in target: users.legacy"));
        let plan = builder.finish();

        let json = plan.to_json().unwrap();
        assert!(json.contains("\"report\""));
        assert!(json.contains("-- no-op"));

        let parsed: Plan = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, plan);
    }
}
