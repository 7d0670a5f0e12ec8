//! Schema corrector facade.
//!
//! Owns the two database connections and ties the pipeline together: read
//! both snapshots, plan the difference, apply (or print) the plan. One
//! `diff()`/`apply()` pair is independent of any other; nothing is cached
//! between runs, so re-running after a partial failure naturally skips the
//! additive changes that already landed.

use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use tracing::info;

use crate::dialect::Dialect;
use crate::error::Result;
use crate::executor::Executor;
use crate::inspector;
use crate::operation::Plan;
use crate::planner::Planner;

/// Correction run configuration.
#[derive(Debug, Clone)]
pub struct CorrectorOptions {
    /// Schema name (e.g. `public`); None uses the dialect default.
    pub schema: Option<String>,
    /// Lock-wait timeout in seconds, on dialects with session timeouts.
    pub lock_timeout_seconds: u64,
    /// Statement timeout in seconds (0 = unlimited), on dialects with
    /// session timeouts.
    pub statement_timeout_seconds: u64,
}

impl Default for CorrectorOptions {
    fn default() -> Self {
        Self {
            schema: None,
            lock_timeout_seconds: 10,
            statement_timeout_seconds: 0,
        }
    }
}

/// Compares a reference database against a live target and corrects the
/// target's schema with additive operations only.
pub struct SchemaCorrector {
    source: AnyPool,
    source_dialect: Dialect,
    target: AnyPool,
    target_dialect: Dialect,
    options: CorrectorOptions,
}

impl SchemaCorrector {
    /// Connects to both databases.
    ///
    /// # Errors
    ///
    /// Fails when either URL has an unsupported scheme or a connection
    /// cannot be established.
    pub async fn connect(
        source_url: &str,
        target_url: &str,
        options: CorrectorOptions,
    ) -> Result<Self> {
        inspector::ensure_drivers();

        let source_dialect = Dialect::from_url(source_url)?;
        let target_dialect = Dialect::from_url(target_url)?;

        let source = AnyPoolOptions::new()
            .max_connections(5)
            .connect(source_url)
            .await?;
        let target = AnyPoolOptions::new()
            .max_connections(5)
            .connect(target_url)
            .await?;

        info!(
            "SchemaCorrector initialized (schema={:?}, lock_timeout={}s, \
             statement_timeout={}s, target_dialect={})",
            options.schema,
            options.lock_timeout_seconds,
            options.statement_timeout_seconds,
            target_dialect.name(),
        );

        Ok(Self {
            source,
            source_dialect,
            target,
            target_dialect,
            options,
        })
    }

    /// Returns the target dialect.
    #[must_use]
    pub fn target_dialect(&self) -> Dialect {
        self.target_dialect
    }

    /// Builds the correction plan for the current state of both databases.
    ///
    /// Pure with respect to the snapshots: the same pair of schemas always
    /// yields the same plan.
    ///
    /// # Errors
    ///
    /// Fails when snapshot introspection fails on a critical query.
    pub async fn diff(&self) -> Result<Plan> {
        let schema = self.options.schema.as_deref();
        let source = inspector::read_snapshot(&self.source, self.source_dialect, schema).await?;
        let target = inspector::read_snapshot(&self.target, self.target_dialect, schema).await?;

        info!(
            "Introspected tables: source={}, target={}",
            source.len(),
            target.len()
        );

        let planner = Planner::new(self.target_dialect, self.options.schema.clone());
        Ok(planner.diff(&source, &target))
    }

    /// Applies (or, in dry-run mode, prints) the plan against the target.
    ///
    /// # Errors
    ///
    /// Fails when any non-report operation fails to execute; the whole
    /// transaction is rolled back in that case.
    pub async fn apply(&self, plan: &Plan, dry_run: bool) -> Result<()> {
        Executor::new(&self.target, self.target_dialect.caps())
            .lock_timeout(self.options.lock_timeout_seconds)
            .statement_timeout(self.options.statement_timeout_seconds)
            .apply(plan, dry_run)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OperationKind;
    use sqlx::Row;
    use tempfile::TempDir;

    async fn seed(url: &str, statements: &[&str]) {
        inspector::ensure_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
            .expect("Failed to open SQLite database");
        for sql in statements {
            sqlx::query(sql).execute(&pool).await.expect(sql);
        }
        pool.close().await;
    }

    fn db_url(dir: &TempDir, file: &str) -> String {
        format!("sqlite://{}?mode=rwc", dir.path().join(file).display())
    }

    async fn seeded_corrector(dir: &TempDir) -> SchemaCorrector {
        let source_url = db_url(dir, "source.db");
        let target_url = db_url(dir, "target.db");

        seed(
            &source_url,
            &[
                "CREATE TABLE users (\
                   id INTEGER NOT NULL, \
                   email VARCHAR(255) NOT NULL, \
                   age INTEGER, \
                   PRIMARY KEY (id))",
                "CREATE INDEX ix_users_email ON users (email)",
                "CREATE TABLE orders (\
                   id INTEGER NOT NULL, \
                   user_id INTEGER NOT NULL REFERENCES users (id), \
                   total INTEGER, \
                   PRIMARY KEY (id))",
                "CREATE INDEX ix_orders_user_id ON orders (user_id)",
            ],
        )
        .await;

        seed(
            &target_url,
            &[
                "CREATE TABLE users (\
                   id INTEGER NOT NULL, \
                   email VARCHAR(255), \
                   legacy TEXT, \
                   PRIMARY KEY (id))",
                "CREATE TABLE notes (id INTEGER NOT NULL, body TEXT, PRIMARY KEY (id))",
                "INSERT INTO users (id, email, legacy) VALUES (1, 'a@example.com', 'keep')",
                "INSERT INTO notes (id, body) VALUES (1, 'remember')",
            ],
        )
        .await;

        SchemaCorrector::connect(&source_url, &target_url, CorrectorOptions::default())
            .await
            .unwrap()
    }

    fn count_kind(plan: &Plan, kind: OperationKind) -> usize {
        plan.operations()
            .iter()
            .filter(|op| op.kind() == kind)
            .count()
    }

    #[tokio::test]
    async fn test_diff_plans_expected_corrections() {
        let dir = TempDir::new().unwrap();
        let corrector = seeded_corrector(&dir).await;

        let plan = corrector.diff().await.unwrap();

        assert_eq!(count_kind(&plan, OperationKind::CreateTable), 1);
        assert_eq!(count_kind(&plan, OperationKind::AddColumn), 1);
        assert_eq!(count_kind(&plan, OperationKind::CreateIndex), 2);
        assert_eq!(count_kind(&plan, OperationKind::AddForeignKey), 0);
        // Extra table notes, extra column users.legacy, nullable mismatch.
        assert_eq!(plan.report_count(), 3);
    }

    #[tokio::test]
    async fn test_dry_run_leaves_target_unchanged() {
        let dir = TempDir::new().unwrap();
        let corrector = seeded_corrector(&dir).await;

        let before = corrector.diff().await.unwrap();
        corrector.apply(&before, true).await.unwrap();
        let after = corrector.diff().await.unwrap();

        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_apply_converges_and_preserves_data() {
        let dir = TempDir::new().unwrap();
        let corrector = seeded_corrector(&dir).await;

        let plan = corrector.diff().await.unwrap();
        corrector.apply(&plan, false).await.unwrap();

        // A second diff plans no further additive work, only the standing
        // reports about target-only entities and the nullable mismatch.
        let converged = corrector.diff().await.unwrap();
        assert_eq!(count_kind(&converged, OperationKind::CreateTable), 0);
        assert_eq!(count_kind(&converged, OperationKind::AddColumn), 0);
        assert_eq!(count_kind(&converged, OperationKind::CreateIndex), 0);
        assert_eq!(count_kind(&converged, OperationKind::AddForeignKey), 0);
        assert_eq!(converged.report_count(), converged.len());

        // Target-only data survived untouched.
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .connect(&db_url(&dir, "target.db"))
            .await
            .unwrap();
        let row = sqlx::query("SELECT email, legacy FROM users WHERE id = 1")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.try_get::<String, _>("email").unwrap(), "a@example.com");
        assert_eq!(row.try_get::<String, _>("legacy").unwrap(), "keep");
        let row = sqlx::query("SELECT body FROM notes WHERE id = 1")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.try_get::<String, _>("body").unwrap(), "remember");

        // The newly created table is usable, FK included inline.
        sqlx::query("INSERT INTO orders (id, user_id, total) VALUES (1, 1, 5)")
            .execute(&pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_connect_rejects_unknown_scheme() {
        let result = SchemaCorrector::connect(
            "mysql://localhost/db",
            "sqlite::memory:",
            CorrectorOptions::default(),
        )
        .await;
        assert!(result.is_err());
    }
}
