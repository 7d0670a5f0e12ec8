//! Difference planner.
//!
//! Compares a source (reference) snapshot against a target snapshot and
//! produces the complete ordered correction plan. Only additive,
//! data-preserving operations are planned for execution; every risky
//! divergence (type mismatch, nullable tightening, anything the target
//! has that the source lacks) becomes a `report` operation instead.

use std::collections::{BTreeSet, HashSet};

use tracing::{info, warn};

use crate::dialect::{Dialect, DialectCaps};
use crate::operation::{Operation, OperationKind, Plan, PlanBuilder};
use crate::order;
use crate::render::DdlRenderer;
use crate::snapshot::{SchemaSnapshot, TableSnapshot};

/// Plans the correction of one target database toward a source schema.
#[derive(Debug)]
pub struct Planner {
    dialect: Dialect,
    caps: DialectCaps,
    schema: Option<String>,
    renderer: DdlRenderer,
}

impl Planner {
    /// Creates a planner for the target dialect and configured schema.
    #[must_use]
    pub fn new(dialect: Dialect, schema: Option<String>) -> Self {
        Self {
            dialect,
            caps: dialect.caps(),
            renderer: DdlRenderer::new(dialect, schema.clone()),
            schema,
        }
    }

    /// Builds the full ordered plan for the two snapshots.
    ///
    /// Pass order is fixed: extra-table reports, missing-table creation in
    /// dependency order (with their indexes), column corrections for common
    /// tables, index corrections for common tables, foreign keys, then
    /// risky-difference reports.
    #[must_use]
    pub fn diff(&self, source: &SchemaSnapshot, target: &SchemaSnapshot) -> Plan {
        info!("Starting schema diff...");

        let src_tables: BTreeSet<&str> = source.table_names().collect();
        let tgt_tables: BTreeSet<&str> = target.table_names().collect();

        let mut builder = PlanBuilder::new();

        for table in tgt_tables.difference(&src_tables) {
            let msg = format!("EXTRA: table exists only in target: {}", table);
            warn!("{}", msg);
            builder.push(Operation::report(msg));
        }

        let missing: Vec<String> = src_tables
            .difference(&tgt_tables)
            .map(|t| (*t).to_string())
            .collect();
        let ordered = order::sort_by_dependencies(missing, source);
        if !ordered.tables.is_empty() {
            info!("Missing tables in target: {}", ordered.tables.len());
        }

        let missing_tables: Vec<&TableSnapshot> = ordered
            .tables
            .iter()
            .filter_map(|name| source.get(name))
            .collect();
        let common: Vec<(&TableSnapshot, &TableSnapshot)> = src_tables
            .intersection(&tgt_tables)
            .filter_map(|name| source.get(name).zip(target.get(name)))
            .collect();
        info!("Common tables: {}", common.len());

        // Dialects that cannot add constraints afterwards get them inline.
        let include_fk = !self.caps.alter_add_foreign_key;
        for table in &missing_tables {
            info!("Planning create table: {}", table.name);
            builder.push(Operation::new(
                OperationKind::CreateTable,
                self.renderer.create_table(table, include_fk),
                format!("Create table {}", table.name),
            ));

            let idx_ops = self.plan_missing_indexes(table, None);
            if !idx_ops.is_empty() {
                info!(
                    "Planning add indexes for new table: table={}, count={}",
                    table.name,
                    idx_ops.len()
                );
            }
            builder.extend(idx_ops);
        }

        for (src_table, tgt_table) in &common {
            for report in self.report_extra_columns(src_table, tgt_table) {
                warn!("{}", report.comment());
                builder.push(report);
            }

            let col_ops = self.plan_missing_columns(src_table, tgt_table);
            if !col_ops.is_empty() {
                info!(
                    "Planning add columns: table={}, count={}",
                    src_table.name,
                    col_ops.len()
                );
            }
            builder.extend(col_ops);
        }

        for (src_table, tgt_table) in &common {
            let idx_ops = self.plan_missing_indexes(src_table, Some(tgt_table));
            if !idx_ops.is_empty() {
                info!(
                    "Planning add indexes: table={}, count={}",
                    src_table.name,
                    idx_ops.len()
                );
            }
            builder.extend(idx_ops);
        }

        let mut fk_ops: Vec<Operation> = Vec::new();
        if self.caps.alter_add_foreign_key {
            for table in &missing_tables {
                fk_ops.extend(self.plan_foreign_keys(table, None));
            }
        }
        for (src_table, tgt_table) in &common {
            fk_ops.extend(self.plan_common_table_foreign_keys(src_table, tgt_table));
        }
        if !fk_ops.is_empty() {
            info!("Planned foreign keys: {}", fk_ops.len());
        }
        builder.extend(fk_ops);

        let mut risky = 0;
        for (src_table, tgt_table) in &common {
            for report in self.report_risky_differences(src_table, tgt_table) {
                warn!("{}", report.comment());
                risky += 1;
                builder.push(report);
            }
        }

        let plan = builder.finish();
        info!(
            "Diff done. Planned ops={} (risky reports={})",
            plan.len(),
            risky
        );
        plan
    }

    fn report_extra_columns(
        &self,
        src_table: &TableSnapshot,
        tgt_table: &TableSnapshot,
    ) -> Vec<Operation> {
        let src_cols: BTreeSet<&str> =
            src_table.columns.iter().map(|c| c.name.as_str()).collect();
        tgt_table
            .columns
            .iter()
            .map(|c| c.name.as_str())
            .filter(|name| !src_cols.contains(name))
            .collect::<BTreeSet<&str>>()
            .into_iter()
            .map(|name| {
                Operation::report(format!(
                    "EXTRA: column exists only in target: {}.{}",
                    tgt_table.name, name
                ))
            })
            .collect()
    }

    fn plan_missing_columns(
        &self,
        src_table: &TableSnapshot,
        tgt_table: &TableSnapshot,
    ) -> Vec<Operation> {
        src_table
            .columns
            .iter()
            .filter(|col| tgt_table.get_column(&col.name).is_none())
            .map(|col| {
                Operation::new(
                    OperationKind::AddColumn,
                    self.renderer.add_column(&src_table.name, col),
                    format!("Add column {}.{}", src_table.name, col.name),
                )
            })
            .collect()
    }

    fn plan_missing_indexes(
        &self,
        src_table: &TableSnapshot,
        tgt_table: Option<&TableSnapshot>,
    ) -> Vec<Operation> {
        let tgt_names: HashSet<&str> = tgt_table
            .map(|t| t.indexes.iter().map(|i| i.name.as_str()).collect())
            .unwrap_or_default();

        src_table
            .indexes
            .iter()
            .filter(|idx| !tgt_names.contains(idx.name.as_str()))
            .map(|idx| {
                Operation::new(
                    OperationKind::CreateIndex,
                    self.renderer.create_index(&src_table.name, idx),
                    format!("Create index {}", idx.name),
                )
            })
            .collect()
    }

    /// Plans ALTER-based foreign-key additions for a table.
    ///
    /// With `tgt_table = None` (a newly created table) every source foreign
    /// key is planned; otherwise only those whose signature is absent from
    /// the target. A target constraint matching on columns and reference but
    /// diverging in ON DELETE/ON UPDATE additionally yields a conflict
    /// report so the divergence is visible before the add runs.
    fn plan_foreign_keys(
        &self,
        src_table: &TableSnapshot,
        tgt_table: Option<&TableSnapshot>,
    ) -> Vec<Operation> {
        let schema = self.schema.as_deref();
        let tgt_sigs: HashSet<_> = tgt_table
            .map(|t| {
                t.foreign_keys
                    .iter()
                    .map(|fk| fk.signature(schema))
                    .collect()
            })
            .unwrap_or_default();

        let mut ops = Vec::new();
        for fk in &src_table.foreign_keys {
            let sig = fk.signature(schema);
            if tgt_table.is_some() && tgt_sigs.contains(&sig) {
                continue;
            }
            let Some(sql) = self.renderer.add_foreign_key(&src_table.name, fk) else {
                continue;
            };
            let name = fk.constraint_name(&src_table.name);
            ops.push(Operation::new(
                OperationKind::AddForeignKey,
                sql,
                format!("Add foreign key {}.{}", src_table.name, name),
            ));

            let action_conflict = tgt_sigs
                .iter()
                .any(|t| t.without_actions() == sig.without_actions());
            if action_conflict {
                ops.push(Operation::report(format!(
                    "RISKY: foreign key {}.{} matches an existing target constraint \
                     on the same columns with different ON DELETE/ON UPDATE actions",
                    src_table.name, name
                )));
            }
        }
        ops
    }

    fn plan_common_table_foreign_keys(
        &self,
        src_table: &TableSnapshot,
        tgt_table: &TableSnapshot,
    ) -> Vec<Operation> {
        if self.caps.alter_add_foreign_key {
            return self.plan_foreign_keys(src_table, Some(tgt_table));
        }

        let schema = self.schema.as_deref();
        let src_sigs: HashSet<_> = src_table
            .foreign_keys
            .iter()
            .map(|fk| fk.signature(schema))
            .collect();
        let tgt_sigs: HashSet<_> = tgt_table
            .foreign_keys
            .iter()
            .map(|fk| fk.signature(schema))
            .collect();

        let missing = src_sigs.difference(&tgt_sigs).count();
        if missing == 0 {
            return Vec::new();
        }
        vec![Operation::report(format!(
            "RISKY: dialect '{}' cannot add FK via ALTER TABLE: table={}, missing={}",
            self.dialect.name(),
            src_table.name,
            missing
        ))]
    }

    fn report_risky_differences(
        &self,
        src_table: &TableSnapshot,
        tgt_table: &TableSnapshot,
    ) -> Vec<Operation> {
        let mut reports = Vec::new();
        for src_col in &src_table.columns {
            let Some(tgt_col) = tgt_table.get_column(&src_col.name) else {
                continue;
            };

            if src_col.sql_type != tgt_col.sql_type {
                reports.push(Operation::report(format!(
                    "RISKY: type mismatch {}.{}: source={} target={}",
                    src_table.name, src_col.name, src_col.sql_type, tgt_col.sql_type
                )));
            }

            if !src_col.nullable && tgt_col.nullable {
                reports.push(Operation::report(format!(
                    "RISKY: nullable mismatch {}.{}: source NOT NULL, target NULL \
                     (need staged backfill + ALTER)",
                    src_table.name, src_col.name
                )));
            }
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{ColumnInfo, ForeignKeyInfo, IndexInfo};

    fn source_schema() -> SchemaSnapshot {
        SchemaSnapshot::new()
            .table(
                TableSnapshot::new("users")
                    .column(ColumnInfo::new("id", "INTEGER").not_null())
                    .column(ColumnInfo::new("email", "VARCHAR(255)").not_null())
                    .column(ColumnInfo::new("age", "INTEGER"))
                    .primary_key(vec!["id".to_string()])
                    .index(IndexInfo::new("ix_users_email", vec!["email".to_string()])),
            )
            .table(
                TableSnapshot::new("orders")
                    .column(ColumnInfo::new("id", "INTEGER").not_null())
                    .column(ColumnInfo::new("user_id", "INTEGER").not_null())
                    .column(ColumnInfo::new("total", "INTEGER"))
                    .primary_key(vec!["id".to_string()])
                    .index(IndexInfo::new(
                        "ix_orders_user_id",
                        vec!["user_id".to_string()],
                    ))
                    .foreign_key(ForeignKeyInfo::new(
                        vec!["user_id".to_string()],
                        "users",
                        vec!["id".to_string()],
                    )),
            )
    }

    fn target_schema() -> SchemaSnapshot {
        SchemaSnapshot::new()
            .table(
                TableSnapshot::new("users")
                    .column(ColumnInfo::new("id", "INTEGER").not_null())
                    .column(ColumnInfo::new("email", "VARCHAR(255)"))
                    .column(ColumnInfo::new("legacy", "TEXT"))
                    .primary_key(vec!["id".to_string()]),
            )
            .table(
                TableSnapshot::new("notes")
                    .column(ColumnInfo::new("id", "INTEGER").not_null())
                    .column(ColumnInfo::new("body", "TEXT")),
            )
    }

    fn kinds(plan: &Plan) -> Vec<OperationKind> {
        plan.operations().iter().map(Operation::kind).collect()
    }

    fn comments_of_kind(plan: &Plan, kind: OperationKind) -> Vec<&str> {
        plan.operations()
            .iter()
            .filter(|op| op.kind() == kind)
            .map(Operation::comment)
            .collect()
    }

    #[test]
    fn test_example_scenario_postgres() {
        let planner = Planner::new(Dialect::Postgres, None);
        let plan = planner.diff(&source_schema(), &target_schema());

        assert_eq!(
            kinds(&plan),
            vec![
                OperationKind::Report,        // extra table notes
                OperationKind::CreateTable,   // orders
                OperationKind::CreateIndex,   // ix_orders_user_id
                OperationKind::Report,        // extra column users.legacy
                OperationKind::AddColumn,     // users.age
                OperationKind::CreateIndex,   // ix_users_email
                OperationKind::AddForeignKey, // orders.user_id -> users.id
                OperationKind::Report,        // nullable mismatch users.email
            ]
        );

        let reports = comments_of_kind(&plan, OperationKind::Report);
        assert_eq!(reports[0], "EXTRA: table exists only in target: notes");
        assert_eq!(reports[1], "EXTRA: column exists only in target: users.legacy");
        assert!(reports[2].contains("nullable mismatch users.email"));

        assert_eq!(
            comments_of_kind(&plan, OperationKind::AddColumn),
            vec!["Add column users.age"]
        );
        assert_eq!(
            comments_of_kind(&plan, OperationKind::AddForeignKey),
            vec!["Add foreign key orders.fk_orders_user_id_users"]
        );

        // The missing-table CREATE excludes the FK (added separately) and
        // the planned FK defers validation.
        let create = &plan.operations()[1];
        assert!(create.sql().contains("CREATE TABLE \"orders\""));
        assert!(!create.sql().contains("FOREIGN KEY"));
        let add_fk = &plan.operations()[6];
        assert!(add_fk.sql().contains("NOT VALID"));
    }

    #[test]
    fn test_diff_is_idempotent() {
        let planner = Planner::new(Dialect::Postgres, None);
        let first = planner.diff(&source_schema(), &target_schema());
        let second = planner.diff(&source_schema(), &target_schema());
        assert_eq!(first, second);
    }

    #[test]
    fn test_identical_schemas_yield_empty_plan() {
        let planner = Planner::new(Dialect::Postgres, None);
        let plan = planner.diff(&source_schema(), &source_schema());
        assert!(plan.is_empty());
    }

    #[test]
    fn test_no_unsafe_auto_apply() {
        let planner = Planner::new(Dialect::Postgres, None);
        let source = SchemaSnapshot::new().table(
            TableSnapshot::new("users")
                .column(ColumnInfo::new("id", "BIGINT").not_null())
                .column(ColumnInfo::new("email", "VARCHAR(255)").not_null()),
        );
        let target = SchemaSnapshot::new().table(
            TableSnapshot::new("users")
                .column(ColumnInfo::new("id", "INTEGER").not_null())
                .column(ColumnInfo::new("email", "VARCHAR(255)")),
        );

        let plan = planner.diff(&source, &target);

        // Both divergences are reported; nothing is planned for execution.
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.report_count(), 2);
        let reports = comments_of_kind(&plan, OperationKind::Report);
        assert!(reports[0].contains("type mismatch users.id"));
        assert!(reports[1].contains("nullable mismatch users.email"));
    }

    #[test]
    fn test_sqlite_fk_gating_single_report_per_table() {
        let planner = Planner::new(Dialect::Sqlite, None);
        let source = SchemaSnapshot::new()
            .table(TableSnapshot::new("users").column(ColumnInfo::new("id", "INTEGER").not_null()))
            .table(
                TableSnapshot::new("orders")
                    .column(ColumnInfo::new("id", "INTEGER").not_null())
                    .column(ColumnInfo::new("user_id", "INTEGER"))
                    .column(ColumnInfo::new("merchant_id", "INTEGER"))
                    .foreign_key(ForeignKeyInfo::new(
                        vec!["user_id".to_string()],
                        "users",
                        vec!["id".to_string()],
                    ))
                    .foreign_key(ForeignKeyInfo::new(
                        vec!["merchant_id".to_string()],
                        "users",
                        vec!["id".to_string()],
                    )),
            );
        let target = SchemaSnapshot::new()
            .table(TableSnapshot::new("users").column(ColumnInfo::new("id", "INTEGER").not_null()))
            .table(
                TableSnapshot::new("orders")
                    .column(ColumnInfo::new("id", "INTEGER").not_null())
                    .column(ColumnInfo::new("user_id", "INTEGER"))
                    .column(ColumnInfo::new("merchant_id", "INTEGER")),
            );

        let plan = planner.diff(&source, &target);

        assert_eq!(plan.len(), 1);
        let op = &plan.operations()[0];
        assert!(op.is_report());
        assert!(op.comment().contains("cannot add FK via ALTER TABLE"));
        assert!(op.comment().contains("table=orders"));
        assert!(op.comment().contains("missing=2"));
    }

    #[test]
    fn test_sqlite_missing_table_gets_inline_fks() {
        let planner = Planner::new(Dialect::Sqlite, None);
        let source = source_schema();
        let target = SchemaSnapshot::new().table(
            TableSnapshot::new("users")
                .column(ColumnInfo::new("id", "INTEGER").not_null())
                .column(ColumnInfo::new("email", "VARCHAR(255)").not_null())
                .column(ColumnInfo::new("age", "INTEGER"))
                .primary_key(vec!["id".to_string()])
                .index(IndexInfo::new("ix_users_email", vec!["email".to_string()])),
        );

        let plan = planner.diff(&source, &target);

        let create = plan
            .operations()
            .iter()
            .find(|op| op.kind() == OperationKind::CreateTable)
            .expect("orders must be created");
        assert!(create.sql().contains("FOREIGN KEY (\"user_id\") REFERENCES \"users\" (\"id\")"));
        assert!(kinds(&plan)
            .iter()
            .all(|k| *k != OperationKind::AddForeignKey));
    }

    #[test]
    fn test_fk_action_conflict_adds_and_reports() {
        let planner = Planner::new(Dialect::Postgres, None);
        let fk = ForeignKeyInfo::new(
            vec!["user_id".to_string()],
            "users",
            vec!["id".to_string()],
        );
        let source = SchemaSnapshot::new()
            .table(TableSnapshot::new("users").column(ColumnInfo::new("id", "INTEGER").not_null()))
            .table(
                TableSnapshot::new("orders")
                    .column(ColumnInfo::new("id", "INTEGER").not_null())
                    .column(ColumnInfo::new("user_id", "INTEGER"))
                    .foreign_key(fk.clone().on_delete("CASCADE")),
            );
        let target = SchemaSnapshot::new()
            .table(TableSnapshot::new("users").column(ColumnInfo::new("id", "INTEGER").not_null()))
            .table(
                TableSnapshot::new("orders")
                    .column(ColumnInfo::new("id", "INTEGER").not_null())
                    .column(ColumnInfo::new("user_id", "INTEGER"))
                    .foreign_key(fk),
            );

        let plan = planner.diff(&source, &target);

        assert_eq!(
            kinds(&plan),
            vec![OperationKind::AddForeignKey, OperationKind::Report]
        );
        assert!(plan.operations()[0].sql().contains("ON DELETE CASCADE"));
        assert!(plan.operations()[1]
            .comment()
            .contains("different ON DELETE/ON UPDATE actions"));
    }

    #[test]
    fn test_missing_tables_created_parents_first() {
        let planner = Planner::new(Dialect::Postgres, None);
        let source = SchemaSnapshot::new()
            .table(TableSnapshot::new("users").column(ColumnInfo::new("id", "INTEGER").not_null()))
            .table(
                TableSnapshot::new("orders")
                    .column(ColumnInfo::new("id", "INTEGER").not_null())
                    .column(ColumnInfo::new("user_id", "INTEGER"))
                    .foreign_key(ForeignKeyInfo::new(
                        vec!["user_id".to_string()],
                        "users",
                        vec!["id".to_string()],
                    )),
            );
        let target = SchemaSnapshot::new();

        let plan = planner.diff(&source, &target);

        let creates: Vec<&str> = comments_of_kind(&plan, OperationKind::CreateTable);
        assert_eq!(creates, vec!["Create table users", "Create table orders"]);
    }
}
