//! Dialect-correct DDL rendering.
//!
//! Turns abstract planner decisions into executable SQL text for the target
//! dialect: identifier quoting, schema qualification, and the safety clauses
//! the planner relies on (`NOT VALID` on deferred-validation dialects, no
//! NOT NULL tightening on added columns).

use crate::dialect::{Dialect, DialectCaps};
use crate::snapshot::{ColumnInfo, ForeignKeyInfo, IndexInfo, TableSnapshot};

/// Renders DDL for one target dialect and configured schema.
#[derive(Debug, Clone)]
pub struct DdlRenderer {
    dialect: Dialect,
    caps: DialectCaps,
    schema: Option<String>,
}

impl DdlRenderer {
    /// Creates a renderer for the target dialect.
    #[must_use]
    pub fn new(dialect: Dialect, schema: Option<String>) -> Self {
        Self {
            dialect,
            caps: dialect.caps(),
            schema,
        }
    }

    fn quote(&self, name: &str) -> String {
        self.dialect.quote_identifier(name)
    }

    /// Quoted table reference, schema-qualified when a schema is configured
    /// and the dialect has schemas.
    #[must_use]
    pub fn table_ref(&self, table: &str) -> String {
        match &self.schema {
            Some(schema) if self.dialect.uses_schemas() => {
                format!("{}.{}", self.quote(schema), self.quote(table))
            }
            _ => self.quote(table),
        }
    }

    fn referred_table_ref(&self, fk: &ForeignKeyInfo) -> String {
        let schema = fk
            .referred_schema
            .as_deref()
            .or(self.schema.as_deref())
            .filter(|_| self.dialect.uses_schemas());
        match schema {
            Some(schema) => format!("{}.{}", self.quote(schema), self.quote(&fk.referred_table)),
            None => self.quote(&fk.referred_table),
        }
    }

    fn column_definition(&self, column: &ColumnInfo) -> String {
        let mut parts = vec![self.quote(&column.name), column.sql_type.clone()];
        if !column.nullable {
            parts.push("NOT NULL".to_string());
        }
        if let Some(default) = &column.default {
            parts.push(format!("DEFAULT {}", default));
        }
        parts.join(" ")
    }

    fn quoted_list(&self, names: &[String]) -> String {
        names
            .iter()
            .map(|n| self.quote(n))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn foreign_key_clause(&self, fk: &ForeignKeyInfo) -> String {
        let mut clause = String::new();
        if let Some(name) = &fk.name {
            clause.push_str("CONSTRAINT ");
            clause.push_str(&self.quote(name));
            clause.push(' ');
        }
        clause.push_str("FOREIGN KEY (");
        clause.push_str(&self.quoted_list(&fk.columns));
        clause.push_str(") REFERENCES ");
        clause.push_str(&self.referred_table_ref(fk));
        if !fk.referred_columns.is_empty() {
            clause.push_str(" (");
            clause.push_str(&self.quoted_list(&fk.referred_columns));
            clause.push(')');
        }
        if let Some(action) = &fk.on_delete {
            clause.push_str(" ON DELETE ");
            clause.push_str(action);
        }
        if let Some(action) = &fk.on_update {
            clause.push_str(" ON UPDATE ");
            clause.push_str(action);
        }
        clause
    }

    /// Renders CREATE TABLE from a reflected source table.
    ///
    /// Foreign keys are included inline only when `include_foreign_keys` is
    /// set; dialects that can add them afterwards get them as separate
    /// operations so parent ordering constraints stay soft.
    #[must_use]
    pub fn create_table(&self, table: &TableSnapshot, include_foreign_keys: bool) -> String {
        let mut items: Vec<String> = table
            .columns
            .iter()
            .map(|c| self.column_definition(c))
            .collect();

        if !table.primary_key.is_empty() {
            items.push(format!("PRIMARY KEY ({})", self.quoted_list(&table.primary_key)));
        }

        if include_foreign_keys {
            for fk in &table.foreign_keys {
                if fk.columns.is_empty() {
                    continue;
                }
                items.push(self.foreign_key_clause(fk));
            }
        }

        format!(
            "CREATE TABLE {} (\n  {}\n);",
            self.table_ref(&table.name),
            items.join(",\n  ")
        )
    }

    /// Renders CREATE [UNIQUE] INDEX.
    #[must_use]
    pub fn create_index(&self, table: &str, index: &IndexInfo) -> String {
        let unique = if index.unique { "UNIQUE " } else { "" };
        format!(
            "CREATE {}INDEX {} ON {} ({});",
            unique,
            self.quote(&index.name),
            self.table_ref(table),
            self.quoted_list(&index.columns)
        )
    }

    /// Renders ALTER TABLE … ADD COLUMN.
    ///
    /// Only the name and type are emitted: no NOT NULL, no default. A column
    /// appended to a populated table must stay nullable; tightening it is a
    /// staged operation the planner reports instead.
    #[must_use]
    pub fn add_column(&self, table: &str, column: &ColumnInfo) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {} {};",
            self.table_ref(table),
            self.quote(&column.name),
            column.sql_type
        )
    }

    /// Renders ALTER TABLE … ADD CONSTRAINT … FOREIGN KEY.
    ///
    /// Returns `None` when the introspected foreign key lacks the data for a
    /// correct statement (no constrained or referenced columns). Appends
    /// `NOT VALID` on dialects with deferred validation so existing rows are
    /// not locked and checked at creation time.
    #[must_use]
    pub fn add_foreign_key(&self, table: &str, fk: &ForeignKeyInfo) -> Option<String> {
        if fk.columns.is_empty() || fk.referred_columns.is_empty() {
            return None;
        }

        let mut sql = format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            self.table_ref(table),
            self.quote(&fk.constraint_name(table)),
            self.quoted_list(&fk.columns),
            self.referred_table_ref(fk),
            self.quoted_list(&fk.referred_columns)
        );
        if let Some(action) = &fk.on_delete {
            sql.push_str(" ON DELETE ");
            sql.push_str(action);
        }
        if let Some(action) = &fk.on_update {
            sql.push_str(" ON UPDATE ");
            sql.push_str(action);
        }
        if self.caps.deferred_fk_validation {
            sql.push_str(" NOT VALID");
        }
        sql.push(';');
        Some(sql)
    }
}
