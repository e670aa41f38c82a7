//! Table orchestrator.
//!
//! Creates every registered table that is missing, highest priority first,
//! then the join tables of many-to-many relations. Any failure here stops
//! startup: a half-created schema is worse than no schema.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::dialect::MySqlDialect;
use crate::error::{ReconcileError, Result};
use crate::introspect::{SchemaIntrospector, SqlExecutor};
use crate::operations::MigrationOperation;
use crate::registry::{JoinTablePlan, SchemaRegistry};
use crate::schema::TableSpec;

/// Creates missing tables and join tables.
#[derive(Debug)]
pub struct TableOrchestrator<'a> {
    registry: &'a SchemaRegistry,
    dialect: MySqlDialect,
}

impl<'a> TableOrchestrator<'a> {
    /// Creates an orchestrator over `registry`.
    #[must_use]
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self {
            registry,
            dialect: MySqlDialect::new(),
        }
    }

    /// Registered tables sorted by descending priority. Tables with equal
    /// priority keep their registration order.
    #[must_use]
    pub fn creation_order(&self) -> Vec<&'a TableSpec> {
        let mut tables: Vec<&TableSpec> = self.registry.tables().iter().collect();
        tables.sort_by(|a, b| b.priority.cmp(&a.priority));
        tables
    }

    /// Builds the `CREATE TABLE` statements for the registered tables,
    /// skipping those listed in `existing`.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Configuration`] if any table declares no
    /// columns. No statement is returned in that case.
    pub fn plan_tables(&self, existing: Option<&HashSet<String>>) -> Result<Vec<MigrationOperation>> {
        let tables = self.creation_order();
        if let Some(empty) = tables.iter().find(|t| t.columns.is_empty()) {
            return Err(ReconcileError::config(format!(
                "table '{}' has no columns",
                empty.name
            )));
        }

        Ok(tables
            .into_iter()
            .filter(|t| !existing.is_some_and(|names| names.contains(&t.name)))
            .map(|t| MigrationOperation::create_table(&self.dialect, t))
            .collect())
    }

    /// Builds the `CREATE TABLE` statements for join tables, skipping those
    /// listed in `existing`.
    #[must_use]
    pub fn plan_join_tables(
        &self,
        plans: &[JoinTablePlan],
        existing: Option<&HashSet<String>>,
    ) -> Vec<MigrationOperation> {
        plans
            .iter()
            .filter(|p| !existing.is_some_and(|names| names.contains(&p.name)))
            .map(|p| MigrationOperation::create_table(&self.dialect, &p.table_spec()))
            .collect()
    }

    /// Creates missing tables, then missing join tables.
    ///
    /// With `check_tables_exist`, the live table list is read first and
    /// existing tables are skipped; otherwise `IF NOT EXISTS` decides.
    /// Returns the names of the tables a `CREATE TABLE` was issued for.
    ///
    /// # Errors
    ///
    /// Configuration errors (empty tables, unresolvable many-to-many pairs)
    /// are raised before any statement runs. A failing statement aborts the
    /// whole sequence with [`ReconcileError::Apply`].
    pub async fn create_tables<D>(&self, db: &D, check_tables_exist: bool) -> Result<Vec<String>>
    where
        D: SqlExecutor + SchemaIntrospector,
    {
        let join_plans = self.registry.join_table_plans()?;

        let existing: Option<HashSet<String>> = if check_tables_exist {
            Some(db.table_names().await?.into_iter().collect())
        } else {
            None
        };

        let mut operations = self.plan_tables(existing.as_ref())?;
        operations.extend(self.plan_join_tables(&join_plans, existing.as_ref()));

        let mut created = Vec::with_capacity(operations.len());
        for operation in operations {
            info!(table = %operation.table, "Ensuring table exists");
            debug!(sql = %operation.forward, "Executing CREATE TABLE");
            db.execute(&operation.forward)
                .await
                .map_err(|e| ReconcileError::apply(&operation.table, &operation.forward, &e))?;
            created.push(operation.table);
        }

        Ok(created)
    }
}
