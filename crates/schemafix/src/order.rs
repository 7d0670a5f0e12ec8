//! Dependency ordering for missing tables.
//!
//! Tables missing from the target must be created parents-first when they
//! reference each other through foreign keys. Only edges where both ends are
//! missing matter: a missing table referencing an already-existing table can
//! be created immediately.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::warn;

use crate::snapshot::SchemaSnapshot;

/// The outcome of dependency ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableOrder {
    /// Tables in creation-safe order (or the input order after a cycle).
    pub tables: Vec<String>,
    /// Whether a dependency cycle forced the fallback to input order.
    pub had_cycle: bool,
}

/// Sorts missing tables so parents are created before dependents.
///
/// Performs a Kahn-style topological sort over foreign-key edges restricted
/// to the missing set. When the sort cannot consume every table (a cycle),
/// the partial order is discarded, the input order is returned unchanged and
/// a warning is logged. Correctness under a cycle needs manual intervention
/// either way.
#[must_use]
pub fn sort_by_dependencies(missing: Vec<String>, source: &SchemaSnapshot) -> TableOrder {
    let missing_set: BTreeSet<&str> = missing.iter().map(String::as_str).collect();

    let mut deps: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for table in &missing {
        let entry = deps.entry(table.as_str()).or_default();
        if let Some(snapshot) = source.get(table) {
            for fk in &snapshot.foreign_keys {
                let referred = fk.referred_table.as_str();
                if missing_set.contains(referred) {
                    entry.insert(referred);
                }
            }
        }
    }

    let mut ready: VecDeque<&str> = missing
        .iter()
        .map(String::as_str)
        .filter(|t| deps[t].is_empty())
        .collect();
    let mut out: Vec<String> = Vec::with_capacity(missing.len());
    let mut emitted: BTreeSet<&str> = BTreeSet::new();

    while let Some(next) = ready.pop_front() {
        out.push(next.to_string());
        emitted.insert(next);
        for table in &missing {
            let table = table.as_str();
            let entry = deps.get_mut(table).expect("all missing tables seeded");
            if entry.remove(next) && entry.is_empty() && !emitted.contains(table) {
                ready.push_back(table);
            }
        }
    }

    if out.len() != missing.len() {
        warn!("RISKY: cycle detected in FK dependencies, using fallback order");
        return TableOrder {
            tables: missing,
            had_cycle: true,
        };
    }

    TableOrder {
        tables: out,
        had_cycle: false,
    }
}
