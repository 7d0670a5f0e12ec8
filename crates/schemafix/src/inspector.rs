//! Schema snapshot reader.
//!
//! Thin adapter over the database's own catalog: given a connection, an
//! optional schema name and a dialect, produces the canonical
//! [`SchemaSnapshot`] the planner consumes. Introspection of non-critical
//! features (indexes, foreign keys) degrades to an empty result instead of
//! failing the whole comparison; table and column listing failures
//! propagate.

use std::collections::BTreeMap;
use std::sync::Once;

use sqlx::AnyPool;
use sqlx::Row;
use tracing::debug;

use crate::dialect::Dialect;
use crate::error::Result;
use crate::snapshot::{ColumnInfo, ForeignKeyInfo, IndexInfo, SchemaSnapshot, TableSnapshot};

static DRIVERS: Once = Once::new();

/// Installs sqlx's URL-dispatched drivers exactly once per process.
pub(crate) fn ensure_drivers() {
    DRIVERS.call_once(sqlx::any::install_default_drivers);
}

/// Reads the complete snapshot of one database.
///
/// # Errors
///
/// Returns a database error when the table or column listing fails; index
/// and foreign-key listing failures degrade to empty results.
pub async fn read_snapshot(
    pool: &AnyPool,
    dialect: Dialect,
    schema: Option<&str>,
) -> Result<SchemaSnapshot> {
    let mut snapshot = SchemaSnapshot::new();
    match dialect {
        Dialect::Postgres => {
            let schema = schema.unwrap_or("public");
            for name in postgres_table_names(pool, schema).await? {
                let table = postgres_table(pool, schema, &name).await?;
                snapshot.insert(table);
            }
        }
        Dialect::Sqlite => {
            for name in sqlite_table_names(pool).await? {
                let table = sqlite_table(pool, &name).await?;
                snapshot.insert(table);
            }
        }
    }
    Ok(snapshot)
}

fn degraded<T>(result: Result<Vec<T>>, table: &str, feature: &str) -> Vec<T> {
    match result {
        Ok(items) => items,
        Err(err) => {
            debug!(table, feature, error = %err, "introspection degraded to empty result");
            Vec::new()
        }
    }
}

// ---------------------------------------------------------------------------
// PostgreSQL
// ---------------------------------------------------------------------------

async fn postgres_table_names(pool: &AnyPool, schema: &str) -> Result<Vec<String>> {
    let rows = sqlx::query(
        "SELECT tablename::text AS name \
         FROM pg_catalog.pg_tables \
         WHERE schemaname = $1 \
         ORDER BY tablename",
    )
    .bind(schema)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| Ok(row.try_get::<String, _>("name")?))
        .collect()
}

async fn postgres_table(pool: &AnyPool, schema: &str, table: &str) -> Result<TableSnapshot> {
    let mut snapshot = TableSnapshot::new(table);
    snapshot.columns = postgres_columns(pool, schema, table).await?;
    snapshot.primary_key = degraded(
        postgres_primary_key(pool, schema, table).await,
        table,
        "primary key",
    );
    snapshot.indexes = degraded(postgres_indexes(pool, schema, table).await, table, "indexes");
    snapshot.foreign_keys = degraded(
        postgres_foreign_keys(pool, schema, table).await,
        table,
        "foreign keys",
    );
    Ok(snapshot)
}

async fn postgres_columns(pool: &AnyPool, schema: &str, table: &str) -> Result<Vec<ColumnInfo>> {
    let rows = sqlx::query(
        "SELECT a.attname::text AS name, \
                pg_catalog.format_type(a.atttypid, a.atttypmod) AS sql_type, \
                NOT a.attnotnull AS nullable, \
                pg_catalog.pg_get_expr(d.adbin, d.adrelid) AS default_sql \
         FROM pg_catalog.pg_attribute a \
         JOIN pg_catalog.pg_class c ON c.oid = a.attrelid \
         JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
         LEFT JOIN pg_catalog.pg_attrdef d \
           ON d.adrelid = a.attrelid AND d.adnum = a.attnum \
         WHERE n.nspname = $1 AND c.relname = $2 \
           AND a.attnum > 0 AND NOT a.attisdropped \
         ORDER BY a.attnum",
    )
    .bind(schema)
    .bind(table)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(ColumnInfo {
                name: row.try_get("name")?,
                sql_type: row.try_get("sql_type")?,
                nullable: row.try_get("nullable")?,
                default: row.try_get("default_sql")?,
            })
        })
        .collect()
}

async fn postgres_primary_key(pool: &AnyPool, schema: &str, table: &str) -> Result<Vec<String>> {
    let rows = sqlx::query(
        "SELECT att.attname::text AS name \
         FROM pg_catalog.pg_index ix \
         JOIN pg_catalog.pg_class tcl ON tcl.oid = ix.indrelid \
         JOIN pg_catalog.pg_namespace ns ON ns.oid = tcl.relnamespace \
         JOIN unnest(ix.indkey) WITH ORDINALITY AS u(attnum, ord) ON true \
         JOIN pg_catalog.pg_attribute att \
           ON att.attrelid = ix.indrelid AND att.attnum = u.attnum \
         WHERE ns.nspname = $1 AND tcl.relname = $2 AND ix.indisprimary \
         ORDER BY u.ord",
    )
    .bind(schema)
    .bind(table)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| Ok(row.try_get::<String, _>("name")?))
        .collect()
}

async fn postgres_indexes(pool: &AnyPool, schema: &str, table: &str) -> Result<Vec<IndexInfo>> {
    let rows = sqlx::query(
        "SELECT icl.relname::text AS name, \
                ix.indisunique AS is_unique, \
                (SELECT string_agg(att.attname, ',' ORDER BY u.ord) \
                 FROM unnest(ix.indkey) WITH ORDINALITY AS u(attnum, ord) \
                 JOIN pg_catalog.pg_attribute att \
                   ON att.attrelid = ix.indrelid AND att.attnum = u.attnum) AS columns \
         FROM pg_catalog.pg_index ix \
         JOIN pg_catalog.pg_class icl ON icl.oid = ix.indexrelid \
         JOIN pg_catalog.pg_class tcl ON tcl.oid = ix.indrelid \
         JOIN pg_catalog.pg_namespace ns ON ns.oid = tcl.relnamespace \
         WHERE ns.nspname = $1 AND tcl.relname = $2 AND NOT ix.indisprimary \
         ORDER BY icl.relname",
    )
    .bind(schema)
    .bind(table)
    .fetch_all(pool)
    .await?;

    let mut indexes = Vec::new();
    for row in &rows {
        // Expression indexes yield no plain column list; skip them.
        let Some(columns) = row.try_get::<Option<String>, _>("columns")? else {
            continue;
        };
        indexes.push(IndexInfo {
            name: row.try_get("name")?,
            columns: columns.split(',').map(str::to_string).collect(),
            unique: row.try_get("is_unique")?,
        });
    }
    Ok(indexes)
}

fn postgres_fk_action(code: &str) -> Option<String> {
    match code {
        "r" => Some("RESTRICT".to_string()),
        "c" => Some("CASCADE".to_string()),
        "n" => Some("SET NULL".to_string()),
        "d" => Some("SET DEFAULT".to_string()),
        _ => None,
    }
}

async fn postgres_foreign_keys(
    pool: &AnyPool,
    schema: &str,
    table: &str,
) -> Result<Vec<ForeignKeyInfo>> {
    let rows = sqlx::query(
        "SELECT con.conname::text AS name, \
                refns.nspname::text AS referred_schema, \
                refcl.relname::text AS referred_table, \
                (SELECT string_agg(att.attname, ',' ORDER BY u.ord) \
                 FROM unnest(con.conkey) WITH ORDINALITY AS u(attnum, ord) \
                 JOIN pg_catalog.pg_attribute att \
                   ON att.attrelid = con.conrelid AND att.attnum = u.attnum) AS columns, \
                (SELECT string_agg(att.attname, ',' ORDER BY u.ord) \
                 FROM unnest(con.confkey) WITH ORDINALITY AS u(attnum, ord) \
                 JOIN pg_catalog.pg_attribute att \
                   ON att.attrelid = con.confrelid AND att.attnum = u.attnum) AS referred_columns, \
                con.confdeltype::text AS on_delete, \
                con.confupdtype::text AS on_update \
         FROM pg_catalog.pg_constraint con \
         JOIN pg_catalog.pg_class cl ON cl.oid = con.conrelid \
         JOIN pg_catalog.pg_namespace ns ON ns.oid = cl.relnamespace \
         JOIN pg_catalog.pg_class refcl ON refcl.oid = con.confrelid \
         JOIN pg_catalog.pg_namespace refns ON refns.oid = refcl.relnamespace \
         WHERE con.contype = 'f' AND ns.nspname = $1 AND cl.relname = $2 \
         ORDER BY con.conname",
    )
    .bind(schema)
    .bind(table)
    .fetch_all(pool)
    .await?;

    let split = |joined: Option<String>| -> Vec<String> {
        joined
            .map(|s| s.split(',').map(str::to_string).collect())
            .unwrap_or_default()
    };

    rows.iter()
        .map(|row| {
            Ok(ForeignKeyInfo {
                name: Some(row.try_get("name")?),
                columns: split(row.try_get("columns")?),
                referred_schema: Some(row.try_get("referred_schema")?),
                referred_table: row.try_get("referred_table")?,
                referred_columns: split(row.try_get("referred_columns")?),
                on_delete: postgres_fk_action(&row.try_get::<String, _>("on_delete")?),
                on_update: postgres_fk_action(&row.try_get::<String, _>("on_update")?),
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

async fn sqlite_table_names(pool: &AnyPool) -> Result<Vec<String>> {
    let rows = sqlx::query(
        "SELECT name FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
         ORDER BY name",
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| Ok(row.try_get::<String, _>("name")?))
        .collect()
}

async fn sqlite_table(pool: &AnyPool, table: &str) -> Result<TableSnapshot> {
    let mut snapshot = TableSnapshot::new(table);
    let (columns, primary_key) = sqlite_columns(pool, table).await?;
    snapshot.columns = columns;
    snapshot.primary_key = primary_key;
    snapshot.indexes = degraded(sqlite_indexes(pool, table).await, table, "indexes");
    snapshot.foreign_keys = degraded(
        sqlite_foreign_keys(pool, table).await,
        table,
        "foreign keys",
    );
    Ok(snapshot)
}

async fn sqlite_columns(
    pool: &AnyPool,
    table: &str,
) -> Result<(Vec<ColumnInfo>, Vec<String>)> {
    let sql = format!(
        "PRAGMA table_info({})",
        Dialect::Sqlite.quote_identifier(table)
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;

    let mut columns = Vec::new();
    let mut pk: Vec<(i64, String)> = Vec::new();
    for row in &rows {
        let name: String = row.try_get("name")?;
        let notnull: i64 = row.try_get("notnull")?;
        let pk_position: i64 = row.try_get("pk")?;
        if pk_position > 0 {
            pk.push((pk_position, name.clone()));
        }
        columns.push(ColumnInfo {
            name,
            sql_type: row.try_get("type")?,
            nullable: notnull == 0,
            default: row.try_get("dflt_value")?,
        });
    }
    pk.sort();
    Ok((columns, pk.into_iter().map(|(_, name)| name).collect()))
}

async fn sqlite_indexes(pool: &AnyPool, table: &str) -> Result<Vec<IndexInfo>> {
    let sql = format!(
        "PRAGMA index_list({})",
        Dialect::Sqlite.quote_identifier(table)
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;

    let mut indexes = Vec::new();
    for row in &rows {
        let name: String = row.try_get("name")?;
        let origin: String = row.try_get("origin")?;
        if origin == "pk" || name.starts_with("sqlite_autoindex") {
            continue;
        }
        let unique: i64 = row.try_get("unique")?;

        let info_sql = format!(
            "PRAGMA index_info({})",
            Dialect::Sqlite.quote_identifier(&name)
        );
        let info_rows = sqlx::query(&info_sql).fetch_all(pool).await?;
        let mut columns: Vec<(i64, Option<String>)> = info_rows
            .iter()
            .map(|r| Ok::<_, sqlx::Error>((r.try_get("seqno")?, r.try_get("name")?)))
            .collect::<std::result::Result<_, _>>()?;
        columns.sort_by_key(|(seqno, _)| *seqno);

        // Expression index members report a NULL column name; skip those
        // indexes entirely, the same degradation as an unlistable index.
        if columns.iter().any(|(_, name)| name.is_none()) {
            continue;
        }

        indexes.push(IndexInfo {
            name,
            columns: columns.into_iter().filter_map(|(_, name)| name).collect(),
            unique: unique != 0,
        });
    }
    indexes.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(indexes)
}

fn sqlite_fk_action(action: String) -> Option<String> {
    if action.is_empty() || action.eq_ignore_ascii_case("NO ACTION") {
        None
    } else {
        Some(action)
    }
}

async fn sqlite_foreign_keys(pool: &AnyPool, table: &str) -> Result<Vec<ForeignKeyInfo>> {
    let sql = format!(
        "PRAGMA foreign_key_list({})",
        Dialect::Sqlite.quote_identifier(table)
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;

    // One constraint spans several rows for composite keys; group by id.
    let mut grouped: BTreeMap<i64, ForeignKeyInfo> = BTreeMap::new();
    let mut seqs: BTreeMap<i64, Vec<(i64, String, Option<String>)>> = BTreeMap::new();
    for row in &rows {
        let id: i64 = row.try_get("id")?;
        let seq: i64 = row.try_get("seq")?;
        let from: String = row.try_get("from")?;
        let to: Option<String> = row.try_get("to")?;

        grouped.entry(id).or_insert(ForeignKeyInfo {
            name: None,
            columns: Vec::new(),
            referred_schema: None,
            referred_table: row.try_get("table")?,
            referred_columns: Vec::new(),
            on_delete: sqlite_fk_action(row.try_get("on_delete")?),
            on_update: sqlite_fk_action(row.try_get("on_update")?),
        });
        seqs.entry(id).or_default().push((seq, from, to));
    }

    let mut fks = Vec::new();
    for (id, mut members) in seqs {
        members.sort_by_key(|(seq, _, _)| *seq);
        let mut fk = grouped.remove(&id).expect("grouped alongside seqs");
        for (_, from, to) in members {
            fk.columns.push(from);
            // An implicit primary-key reference reports no target column;
            // leave referred_columns empty in that case.
            if let Some(to) = to {
                fk.referred_columns.push(to);
            }
        }
        if fk.referred_columns.len() != fk.columns.len() {
            fk.referred_columns.clear();
        }
        fks.push(fk);
    }
    Ok(fks)
}
