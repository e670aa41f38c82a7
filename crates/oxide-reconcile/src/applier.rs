//! Migration applier.
//!
//! In [`MigrationMode::Auto`](crate::config::MigrationMode::Auto) operations
//! run immediately, one at a time, and a failing statement does not stop the
//! ones after it. In [`MigrationMode::File`](crate::config::MigrationMode::File)
//! operations are written to the forward artifact and replayed on the next
//! start; inverse statements go to the rollback artifact, newest first.

use std::path::Path;

use tracing::{debug, error, info, warn};

use crate::config::ReconcileConfig;
use crate::error::{ReconcileError, Result};
use crate::introspect::SqlExecutor;
use crate::operations::MigrationOperation;

/// Outcome of a best-effort run.
#[derive(Debug, Default)]
pub struct ApplyReport {
    /// Number of statements that succeeded.
    pub succeeded: usize,
    /// One [`ReconcileError::Apply`] per failed statement.
    pub failures: Vec<ReconcileError>,
}

impl ApplyReport {
    /// Number of statements that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Returns true if no statement failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Applies or persists migration operations.
#[derive(Debug)]
pub struct MigrationApplier<'a> {
    config: &'a ReconcileConfig,
}

impl<'a> MigrationApplier<'a> {
    /// Creates an applier using the artifact paths of `config`.
    #[must_use]
    pub fn new(config: &'a ReconcileConfig) -> Self {
        Self { config }
    }

    /// Executes every operation in order, best-effort.
    pub async fn apply_all<E: SqlExecutor>(
        &self,
        db: &E,
        operations: &[MigrationOperation],
    ) -> ApplyReport {
        info!(count = operations.len(), "Applying migration operations");
        let report = execute_best_effort(
            db,
            operations
                .iter()
                .map(|op| (op.table.as_str(), op.forward.as_str())),
        )
        .await;
        info!(
            succeeded = report.succeeded,
            failed = report.failed(),
            "Migration completed"
        );
        report
    }

    /// Replays a pending forward artifact, if there is one, then deletes it.
    ///
    /// Returns `None` when no artifact exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the artifact exists but cannot be read or
    /// removed. Failing statements are reported, not returned.
    pub async fn replay_pending<E: SqlExecutor>(&self, db: &E) -> Result<Option<ApplyReport>> {
        let path = &self.config.forward_artifact;
        if !tokio::fs::try_exists(path).await? {
            return Ok(None);
        }

        info!(path = %path.display(), "Migrating from file");
        let source = path.display().to_string();
        let report = match tokio::fs::read_to_string(path).await {
            Ok(contents) => Ok(execute_best_effort(
                db,
                contents
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(|line| (source.as_str(), line)),
            )
            .await),
            Err(e) => Err(e),
        };
        // The artifact is consumed whether or not it could be read.
        tokio::fs::remove_file(path).await?;
        let report = report?;
        info!(
            succeeded = report.succeeded,
            failed = report.failed(),
            "Migration from file completed"
        );
        Ok(Some(report))
    }

    /// Writes forward statements to the forward artifact and prepends their
    /// inverses, in reverse order, to the rollback artifact.
    ///
    /// Both artifacts are attempted even if the first write fails.
    /// Returns `false` without touching the filesystem when there is nothing
    /// to write.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::ArtifactWrite`] for the first artifact that
    /// cannot be written. The statements of every failed write are logged
    /// before returning.
    pub async fn write_artifacts(&self, operations: &[MigrationOperation]) -> Result<bool> {
        if operations.is_empty() {
            return Ok(false);
        }

        let forward: Vec<&str> = operations.iter().map(|op| op.forward.as_str()).collect();
        let forward_written =
            write_or_dump(&self.config.forward_artifact, &forward.join("\n"), &forward).await;
        if forward_written.is_ok() {
            info!(
                path = %self.config.forward_artifact.display(),
                count = forward.len(),
                "Migrations written; restart the application to apply them"
            );
        }

        let rollback_written = self.prepend_rollback(operations).await;
        forward_written?;
        rollback_written?;
        Ok(true)
    }

    async fn prepend_rollback(&self, operations: &[MigrationOperation]) -> Result<()> {
        let inverse: Vec<&str> = operations
            .iter()
            .rev()
            .filter_map(|op| op.inverse.as_deref())
            .collect();
        if inverse.is_empty() {
            return Ok(());
        }

        let path = &self.config.rollback_artifact;
        let mut contents = inverse.join("\n");
        match tokio::fs::read_to_string(path).await {
            Ok(previous) if !previous.trim().is_empty() => {
                contents.push('\n');
                contents.push_str(previous.trim_end());
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                dump_statements(path, &inverse);
                return Err(ReconcileError::ArtifactWrite {
                    path: path.clone(),
                    source,
                });
            }
        }
        write_or_dump(path, &contents, &inverse).await?;
        debug!(path = %path.display(), count = inverse.len(), "Rollback statements recorded");
        Ok(())
    }
}

async fn execute_best_effort<'s, E, I>(db: &E, statements: I) -> ApplyReport
where
    E: SqlExecutor,
    I: IntoIterator<Item = (&'s str, &'s str)>,
{
    let mut report = ApplyReport::default();
    for (table, sql) in statements {
        debug!(table = %table, sql = %sql, "Executing statement");
        match db.execute(sql).await {
            Ok(_) => report.succeeded += 1,
            Err(e) => {
                warn!(table = %table, sql = %sql, error = %e, "Statement failed");
                report.failures.push(ReconcileError::apply(table, sql, &e));
            }
        }
    }
    report
}

async fn write_or_dump(path: &Path, contents: &str, statements: &[&str]) -> Result<()> {
    if let Err(source) = tokio::fs::write(path, contents).await {
        dump_statements(path, statements);
        return Err(ReconcileError::ArtifactWrite {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

fn dump_statements(path: &Path, statements: &[&str]) {
    error!(
        path = %path.display(),
        count = statements.len(),
        "Failed to write migration artifact; dumping statements"
    );
    for sql in statements {
        error!(sql = %sql, "Unwritten migration statement");
    }
}
