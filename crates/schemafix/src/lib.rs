//! Safe additive schema correction for live databases.
//!
//! `schemafix` compares the schema of a reference database against a live,
//! data-bearing target database and produces a safe, ordered plan of
//! additive DDL operations that brings the target closer to the reference
//! without ever risking destructive loss of existing target data.
//!
//! Only additive, data-preserving operations are applied automatically:
//! creating missing tables (parents before foreign-key dependents), adding
//! missing columns (nullable, no tightening), creating missing indexes, and
//! adding missing foreign keys where the dialect supports it. Every other
//! divergence (type mismatches, nullable tightening, entities that exist
//! only in the target) is surfaced as a `report` operation and never
//! executed.
//!
//! # Architecture
//!
//! - **Inspector** - reads one database into a canonical [`SchemaSnapshot`]
//! - **Planner** - diffs two snapshots into an ordered [`Plan`] of typed
//!   [`Operation`]s
//! - **Orderer** - topologically sorts missing tables by FK dependencies
//! - **Renderer** - turns planner decisions into dialect-correct SQL
//! - **Executor** - applies a plan transactionally, or prints it in dry-run
//!
//! Dialect differences are expressed as a capability descriptor
//! ([`dialect::DialectCaps`]) computed once per connection: PostgreSQL gets
//! session timeouts and `NOT VALID` foreign keys, SQLite gets inline foreign
//! keys on CREATE TABLE and reports where an ALTER would be needed.
//!
//! # Example
//!
//! ```rust,ignore
//! use schemafix::prelude::*;
//!
//! let corrector = SchemaCorrector::connect(
//!     "postgres://ref-host/app",
//!     "postgres://live-host/app",
//!     CorrectorOptions::default(),
//! )
//! .await?;
//!
//! let plan = corrector.diff().await?;
//! corrector.apply(&plan, /* dry_run */ true).await?;
//! ```

pub mod corrector;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod inspector;
pub mod operation;
pub mod order;
pub mod planner;
pub mod render;
pub mod snapshot;

pub use operation::{Operation, Plan};
pub use snapshot::SchemaSnapshot;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::corrector::{CorrectorOptions, SchemaCorrector};
    pub use crate::dialect::{Dialect, DialectCaps};
    pub use crate::error::{CorrectError, Result};
    pub use crate::executor::Executor;
    pub use crate::inspector::read_snapshot;
    pub use crate::operation::{Operation, OperationKind, Plan, PlanBuilder, NO_OP_SQL};
    pub use crate::order::{sort_by_dependencies, TableOrder};
    pub use crate::planner::Planner;
    pub use crate::render::DdlRenderer;
    pub use crate::snapshot::{
        ColumnInfo, FkSignature, ForeignKeyInfo, IndexInfo, SchemaSnapshot, TableSnapshot,
    };
}
