//! Join-table reconciler.
//!
//! Join tables hold nothing but pairs of keys, so the only drift repaired
//! here is column naming. Anything structurally different is refused rather
//! than guessed at.

use crate::dialect::MySqlDialect;
use crate::error::{ReconcileError, Result};
use crate::introspect::IntrospectedColumn;
use crate::operations::MigrationOperation;
use crate::registry::JoinTablePlan;

/// Repairs join-table column names.
#[derive(Debug, Clone, Default)]
pub struct JoinTableReconciler {
    dialect: MySqlDialect,
}

impl JoinTableReconciler {
    /// Creates a new reconciler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compares the live columns of a join table with the expected ones.
    ///
    /// Correctly named columns are left alone; the remaining live columns
    /// are renamed, in ordinal order, to the remaining expected names.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Introspection`] if the join table does not
    /// have exactly two columns.
    pub fn reconcile(
        &self,
        plan: &JoinTablePlan,
        live: &[IntrospectedColumn],
    ) -> Result<Vec<MigrationOperation>> {
        if live.len() != 2 {
            return Err(ReconcileError::introspection(
                &plan.name,
                format!(
                    "join table must have exactly 2 columns, found {}; refusing to rebuild it",
                    live.len()
                ),
            ));
        }

        let expected = plan.expected_columns();
        let misnamed = live
            .iter()
            .filter(|c| !expected.contains(&c.name.as_str()));
        let missing = expected
            .iter()
            .filter(|name| !live.iter().any(|c| c.name == **name));

        Ok(misnamed
            .zip(missing)
            .map(|(actual, expected)| {
                MigrationOperation::rename_join_column(
                    &self.dialect,
                    &plan.name,
                    &actual.name,
                    expected,
                )
            })
            .collect())
    }
}
