//! Plan executor.
//!
//! Applies a finalized plan against the target database, or prints it in
//! dry-run mode. Execution is all-or-nothing: every non-report operation
//! runs inside one transaction, and any failure aborts the whole run.

use sqlx::AnyPool;
use tracing::{error, info};

use crate::dialect::DialectCaps;
use crate::error::Result;
use crate::operation::Plan;

/// Executes plans against one target database.
#[derive(Debug)]
pub struct Executor<'a> {
    pool: &'a AnyPool,
    caps: DialectCaps,
    lock_timeout_seconds: u64,
    statement_timeout_seconds: u64,
}

impl<'a> Executor<'a> {
    /// Creates an executor with the default timeouts (lock 10s, statement
    /// unlimited).
    #[must_use]
    pub fn new(pool: &'a AnyPool, caps: DialectCaps) -> Self {
        Self {
            pool,
            caps,
            lock_timeout_seconds: 10,
            statement_timeout_seconds: 0,
        }
    }

    /// Sets the lock-wait timeout in seconds (0 disables it).
    #[must_use]
    pub fn lock_timeout(mut self, seconds: u64) -> Self {
        self.lock_timeout_seconds = seconds;
        self
    }

    /// Sets the statement timeout in seconds (0 disables it).
    #[must_use]
    pub fn statement_timeout(mut self, seconds: u64) -> Self {
        self.statement_timeout_seconds = seconds;
        self
    }

    /// Applies the plan.
    ///
    /// In dry-run mode every operation (reports included) is printed and no
    /// database I/O happens. Otherwise the non-report operations execute in
    /// order inside a single transaction.
    ///
    /// # Errors
    ///
    /// Returns the first execution error; the transaction is rolled back and
    /// nothing is left partially applied.
    pub async fn apply(&self, plan: &Plan, dry_run: bool) -> Result<()> {
        info!("Apply called. dry_run={}, ops={}", dry_run, plan.len());

        if dry_run {
            for op in plan {
                println!("-- {}: {}\n{}\n", op.kind(), op.comment(), op.sql());
            }
            info!("Dry-run finished. No changes applied.");
            return Ok(());
        }

        match self.execute(plan).await {
            Ok(()) => {
                info!("Apply finished successfully.");
                Ok(())
            }
            Err(err) => {
                error!("Apply failed: {}", err);
                error!("Schema correction aborted due to error.");
                Err(err)
            }
        }
    }

    async fn execute(&self, plan: &Plan) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        if self.caps.session_timeouts {
            if self.lock_timeout_seconds > 0 {
                let sql = format!("SET lock_timeout = '{}s'", self.lock_timeout_seconds);
                sqlx::query(&sql).execute(&mut *tx).await?;
            }
            if self.statement_timeout_seconds > 0 {
                let sql = format!(
                    "SET statement_timeout = '{}s'",
                    self.statement_timeout_seconds
                );
                sqlx::query(&sql).execute(&mut *tx).await?;
            }
        }

        let total = plan.len();
        for (i, op) in plan.operations().iter().enumerate() {
            info!(
                "Executing op {}/{}: {} ({})",
                i + 1,
                total,
                op.kind(),
                op.comment()
            );
            if op.is_report() {
                info!("Skipping report op: {}", op.comment());
                continue;
            }
            sqlx::query(op.sql()).execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
