//! Reconciliation entry point.

use std::path::PathBuf;

use futures::future::try_join_all;
use tracing::{debug, info};

use crate::applier::{ApplyReport, MigrationApplier};
use crate::config::{MigrationMode, ReconcileConfig};
use crate::diff::DiffEngine;
use crate::error::Result;
use crate::introspect::{SchemaIntrospector, SqlExecutor};
use crate::join_table::JoinTableReconciler;
use crate::operations::MigrationOperation;
use crate::orchestrator::TableOrchestrator;
use crate::registry::SchemaRegistry;
use crate::schema::TableSpec;

/// What a reconciliation run did.
#[derive(Debug, Default)]
pub struct ReconcileSummary {
    /// Tables a `CREATE TABLE` was issued for.
    pub created_tables: Vec<String>,
    /// Operations produced by diffing.
    pub operations: Vec<MigrationOperation>,
    /// Outcome of executing statements, if any were executed.
    pub applied: Option<ApplyReport>,
    /// Forward artifact written this run (file mode).
    pub artifact: Option<PathBuf>,
    /// Whether a pending forward artifact was replayed instead of diffing.
    pub replayed: bool,
}

/// Brings the live schema in line with the registry.
///
/// ```ignore
/// let registry = SchemaRegistry::builder()
///     .register(Student)
///     .register(Course)
///     .build()?;
/// let db = MySqlDatabase::new(pool);
/// Reconciler::new(&registry, &db, ReconcileConfig::default())
///     .reconcile_schema()
///     .await?;
/// ```
#[derive(Debug)]
pub struct Reconciler<'a, D> {
    registry: &'a SchemaRegistry,
    db: &'a D,
    config: ReconcileConfig,
}

impl<'a, D> Reconciler<'a, D>
where
    D: SqlExecutor + SchemaIntrospector,
{
    /// Creates a reconciler.
    #[must_use]
    pub fn new(registry: &'a SchemaRegistry, db: &'a D, config: ReconcileConfig) -> Self {
        Self {
            registry,
            db,
            config,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Runs the whole pipeline once: create missing tables, then either
    /// replay a pending artifact (file mode) or diff every migrating table
    /// and its join tables and apply or persist the result.
    ///
    /// # Errors
    ///
    /// Configuration and introspection errors abort the run, as does a
    /// failing `CREATE TABLE` or an artifact that cannot be written. Failing
    /// migration statements are reported in [`ReconcileSummary::applied`].
    pub async fn reconcile_schema(&self) -> Result<ReconcileSummary> {
        let mut summary = ReconcileSummary {
            created_tables: TableOrchestrator::new(self.registry)
                .create_tables(self.db, self.config.check_tables_exist)
                .await?,
            ..ReconcileSummary::default()
        };

        let applier = MigrationApplier::new(&self.config);

        if self.config.mode == MigrationMode::File {
            if let Some(report) = applier.replay_pending(self.db).await? {
                summary.applied = Some(report);
                summary.replayed = true;
                return Ok(summary);
            }
        }

        summary.operations = self.plan().await?;
        if summary.operations.is_empty() {
            info!("Schema is up to date");
            return Ok(summary);
        }

        match self.config.mode {
            MigrationMode::Auto => {
                summary.applied = Some(applier.apply_all(self.db, &summary.operations).await);
            }
            MigrationMode::File => {
                if applier.write_artifacts(&summary.operations).await? {
                    summary.artifact = Some(self.config.forward_artifact.clone());
                }
            }
        }

        Ok(summary)
    }

    /// Computes the operations for every migrating table and join table
    /// without executing anything.
    ///
    /// # Errors
    ///
    /// Returns an error if introspection fails, a migrating table has no
    /// columns, a join table does not have exactly two columns, or a
    /// many-to-many relation cannot be resolved.
    pub async fn plan(&self) -> Result<Vec<MigrationOperation>> {
        let migrating: Vec<&TableSpec> = TableOrchestrator::new(self.registry)
            .creation_order()
            .into_iter()
            .filter(|t| t.migration_enabled)
            .collect();

        let live_tables =
            try_join_all(migrating.iter().map(|t| self.db.live_table(&t.name))).await?;

        let engine = DiffEngine::new(self.registry);
        let mut operations = Vec::new();
        for (table, live) in migrating.iter().zip(&live_tables) {
            let table_ops = engine.reconcile(table, live)?;
            if table_ops.is_empty() {
                debug!(table = %table.name, "Table is up to date");
            } else {
                info!(
                    table = %table.name,
                    operations = table_ops.len(),
                    irreversible = table_ops.iter().filter(|op| !op.is_reversible()).count(),
                    "Table differs from declared schema"
                );
            }
            operations.extend(table_ops);
        }

        let is_migrating = |name: &str| migrating.iter().any(|t| t.name == name);
        let join_plans: Vec<_> = self
            .registry
            .join_table_plans()?
            .into_iter()
            .filter(|p| is_migrating(&p.owner_table) || is_migrating(&p.inverse_table))
            .collect();

        let live_join_columns =
            try_join_all(join_plans.iter().map(|p| self.db.columns(&p.name))).await?;

        let join_reconciler = JoinTableReconciler::new();
        for (plan, columns) in join_plans.iter().zip(&live_join_columns) {
            let join_ops = join_reconciler.reconcile(plan, columns)?;
            if !join_ops.is_empty() {
                info!(
                    table = %plan.name,
                    operations = join_ops.len(),
                    "Join table columns differ"
                );
            }
            operations.extend(join_ops);
        }

        Ok(operations)
    }
}
