//! Changeset executor.
//!
//! This module applies a resolved changeset to a database. Every statement is
//! rendered before the first one runs, and all of them run inside a single
//! transaction.

use sqlx::sqlite::SqlitePool;
use tracing::{debug, info, warn};

use crate::changeset::Changeset;
use crate::dialect::MigrationDialect;
use crate::error::{MigrateError, Result};

/// Executes changesets against a database.
pub struct MigrationExecutor<D: MigrationDialect> {
    pool: SqlitePool,
    dialect: D,
    dry_run: bool,
}

impl<D: MigrationDialect> MigrationExecutor<D> {
    /// Creates a new executor.
    #[must_use]
    pub const fn new(pool: SqlitePool, dialect: D) -> Self {
        Self {
            pool,
            dialect,
            dry_run: false,
        }
    }

    /// Enables dry-run mode (SQL is printed but not executed).
    #[must_use]
    pub const fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Returns the dialect.
    #[must_use]
    pub const fn dialect(&self) -> &D {
        &self.dialect
    }

    /// Applies a changeset, returning the number of statements executed.
    ///
    /// The changeset must already be resolved. If any operation cannot be
    /// rendered nothing is executed. If a statement fails the transaction is
    /// rolled back and the failing SQL is reported.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Unsupported`] for an operation the dialect
    /// cannot express, [`MigrateError::Statement`] for a failing statement,
    /// and [`MigrateError::Database`] when the transaction cannot be opened
    /// or committed.
    pub async fn apply(&self, changeset: &Changeset) -> Result<usize> {
        info!(
            operations = changeset.len(),
            dialect = self.dialect.name(),
            "Applying changeset"
        );

        let statements = changeset.to_sql(&self.dialect)?;

        if self.dry_run {
            for sql in &statements {
                println!("{sql};");
            }
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut executed = 0;
        for sql in statements {
            if sql.starts_with("--") {
                warn!(comment = %sql, "Skipping comment");
                continue;
            }
            debug!(sql = %sql, "Executing SQL");
            if let Err(source) = sqlx::query(&sql).execute(&mut *tx).await {
                return Err(MigrateError::Statement { sql, source });
            }
            executed += 1;
        }
        tx.commit().await?;

        info!(statements = executed, "Changeset applied successfully");
        Ok(executed)
    }

    /// Undoes a changeset previously applied with [`apply`](Self::apply).
    ///
    /// # Errors
    ///
    /// Fails like [`apply`](Self::apply) does for the reversed changeset.
    pub async fn rollback(&self, changeset: &Changeset) -> Result<usize> {
        info!(operations = changeset.len(), "Rolling back changeset");
        self.apply(&changeset.reverse()).await
    }
}
