//! Canonical schema snapshot types.
//!
//! A snapshot is a point-in-time structured read of one database's tables,
//! columns, indexes and foreign keys, reduced to a form that can be compared
//! against a snapshot of another database. Snapshots are read-only: they are
//! produced by the inspector, consumed by one `diff()` call and discarded.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Maximum length for synthesized constraint names, shared across dialects.
const MAX_CONSTRAINT_NAME_LEN: usize = 60;

/// An introspected column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Type as rendered by the owning database (e.g. `VARCHAR(255)`).
    pub sql_type: String,
    /// Whether the column allows NULL values.
    pub nullable: bool,
    /// Default expression, informational only; never compared.
    pub default: Option<String>,
}

impl ColumnInfo {
    /// Creates a nullable column with no default.
    #[must_use]
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            nullable: true,
            default: None,
        }
    }

    /// Marks the column NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Sets the default expression.
    #[must_use]
    pub fn default_sql(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }
}

/// An introspected index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    /// Index name.
    pub name: String,
    /// Ordered column names.
    pub columns: Vec<String>,
    /// Whether this is a unique index.
    pub unique: bool,
}

impl IndexInfo {
    /// Creates a non-unique index.
    #[must_use]
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            unique: false,
        }
    }

    /// Marks the index unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// The comparable identity of a foreign key.
///
/// Two foreign keys with equal signatures express the same constraint even
/// when their names differ (SQLite constraints are unnamed, and PostgreSQL
/// auto-generates names).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FkSignature {
    /// Constrained columns, in order.
    pub columns: Vec<String>,
    /// Referenced schema, defaulted to the configured schema when absent.
    pub referred_schema: Option<String>,
    /// Referenced table.
    pub referred_table: String,
    /// Referenced columns, in order.
    pub referred_columns: Vec<String>,
    /// ON DELETE action, None when the dialect default applies.
    pub on_delete: Option<String>,
    /// ON UPDATE action, None when the dialect default applies.
    pub on_update: Option<String>,
}

impl FkSignature {
    /// Returns the signature with the action clauses blanked out.
    ///
    /// Used to recognize a target constraint that matches on columns and
    /// reference but diverges in ON DELETE/ON UPDATE.
    #[must_use]
    pub fn without_actions(&self) -> Self {
        Self {
            on_delete: None,
            on_update: None,
            ..self.clone()
        }
    }
}

/// An introspected foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyInfo {
    /// Constraint name; None when the database reports none (SQLite).
    pub name: Option<String>,
    /// Constrained columns, in order.
    pub columns: Vec<String>,
    /// Referenced schema, when qualified.
    pub referred_schema: Option<String>,
    /// Referenced table.
    pub referred_table: String,
    /// Referenced columns, in order; may be empty when the database reports
    /// an implicit primary-key reference.
    pub referred_columns: Vec<String>,
    /// ON DELETE action keyword (e.g. `CASCADE`), None for the default.
    pub on_delete: Option<String>,
    /// ON UPDATE action keyword, None for the default.
    pub on_update: Option<String>,
}

impl ForeignKeyInfo {
    /// Creates an unnamed foreign key with default actions.
    #[must_use]
    pub fn new(
        columns: Vec<String>,
        referred_table: impl Into<String>,
        referred_columns: Vec<String>,
    ) -> Self {
        Self {
            name: None,
            columns,
            referred_schema: None,
            referred_table: referred_table.into(),
            referred_columns,
            on_delete: None,
            on_update: None,
        }
    }

    /// Sets the constraint name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the referenced schema.
    #[must_use]
    pub fn referred_schema(mut self, schema: impl Into<String>) -> Self {
        self.referred_schema = Some(schema.into());
        self
    }

    /// Sets the ON DELETE action keyword.
    #[must_use]
    pub fn on_delete(mut self, action: impl Into<String>) -> Self {
        self.on_delete = Some(action.into());
        self
    }

    /// Sets the ON UPDATE action keyword.
    #[must_use]
    pub fn on_update(mut self, action: impl Into<String>) -> Self {
        self.on_update = Some(action.into());
        self
    }

    /// Returns the comparable signature of this foreign key.
    ///
    /// An unqualified reference falls back to `default_schema` so that the
    /// same constraint introspected with and without qualification compares
    /// equal.
    #[must_use]
    pub fn signature(&self, default_schema: Option<&str>) -> FkSignature {
        FkSignature {
            columns: self.columns.clone(),
            referred_schema: self
                .referred_schema
                .clone()
                .or_else(|| default_schema.map(str::to_string)),
            referred_table: self.referred_table.clone(),
            referred_columns: self.referred_columns.clone(),
            on_delete: self.on_delete.clone(),
            on_update: self.on_update.clone(),
        }
    }

    /// Returns the constraint name, synthesizing a deterministic one when
    /// the source reported none.
    ///
    /// Synthesized names follow `fk_<table>_<cols>_<reftable>` and are
    /// truncated to 60 characters to satisfy identifier length limits.
    #[must_use]
    pub fn constraint_name(&self, table: &str) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        let cols = self.columns.join("_");
        let name = format!("fk_{}_{}_{}", table, cols, self.referred_table);
        name.chars().take(MAX_CONSTRAINT_NAME_LEN).collect()
    }
}

/// An introspected table: columns, primary key, indexes and foreign keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSnapshot {
    /// Table name.
    pub name: String,
    /// Columns in definition order.
    pub columns: Vec<ColumnInfo>,
    /// Primary key column(s), in order; empty when none was introspected.
    pub primary_key: Vec<String>,
    /// Indexes, excluding primary-key and other internal indexes.
    pub indexes: Vec<IndexInfo>,
    /// Foreign keys.
    pub foreign_keys: Vec<ForeignKeyInfo>,
}

impl TableSnapshot {
    /// Creates an empty table snapshot.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    /// Adds a column.
    #[must_use]
    pub fn column(mut self, column: ColumnInfo) -> Self {
        self.columns.push(column);
        self
    }

    /// Sets the primary key columns.
    #[must_use]
    pub fn primary_key(mut self, columns: Vec<String>) -> Self {
        self.primary_key = columns;
        self
    }

    /// Adds an index.
    #[must_use]
    pub fn index(mut self, index: IndexInfo) -> Self {
        self.indexes.push(index);
        self
    }

    /// Adds a foreign key.
    #[must_use]
    pub fn foreign_key(mut self, fk: ForeignKeyInfo) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    /// Gets a column by name.
    #[must_use]
    pub fn get_column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// A complete snapshot of one database's schema.
///
/// Tables are held in a sorted map so every traversal is deterministic; the
/// planner depends on that for stable plan ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    tables: BTreeMap<String, TableSnapshot>,
}

impl SchemaSnapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table (builder form).
    #[must_use]
    pub fn table(mut self, table: TableSnapshot) -> Self {
        self.insert(table);
        self
    }

    /// Inserts a table.
    pub fn insert(&mut self, table: TableSnapshot) {
        self.tables.insert(table.name.clone(), table);
    }

    /// Gets a table by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TableSnapshot> {
        self.tables.get(name)
    }

    /// Returns whether a table exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Returns table names in sorted order.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Returns the number of tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns whether the snapshot holds no tables.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
