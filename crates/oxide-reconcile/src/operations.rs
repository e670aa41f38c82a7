//! Migration operations.
//!
//! Each operation pairs one forward DDL statement with the statement that
//! undoes it, when one can be derived safely.

use crate::dialect::{MigrationDialect, MySqlDialect};
use crate::introspect::{IntrospectedColumn, LiveForeignKey};
use crate::schema::{index_name, unique_name, ColumnSpec, RowFormat, TableSpec};

/// Relative order of the statements generated for one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Phase {
    /// Runs before the column is redefined (key and index removal).
    BeforeMain,
    /// The column redefinition itself.
    #[default]
    Main,
    /// Runs after the column is redefined (primary key creation).
    AfterMain,
}

/// A single schema change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationOperation {
    /// Table the statement applies to.
    pub table: String,
    /// Statement moving the schema toward the declared model.
    pub forward: String,
    /// Statement undoing `forward`, if derivable.
    pub inverse: Option<String>,
    /// Relative order tag.
    pub phase: Phase,
}

impl MigrationOperation {
    /// Creates an operation in the [`Phase::Main`] phase.
    #[must_use]
    pub fn new(table: impl Into<String>, forward: impl Into<String>, inverse: Option<String>) -> Self {
        Self {
            table: table.into(),
            forward: forward.into(),
            inverse,
            phase: Phase::Main,
        }
    }

    /// Moves the operation to the given phase.
    #[must_use]
    pub fn in_phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    /// Returns whether this operation can be undone.
    #[must_use]
    pub fn is_reversible(&self) -> bool {
        self.inverse.is_some()
    }

    /// `CREATE TABLE IF NOT EXISTS`.
    #[must_use]
    pub fn create_table(dialect: &MySqlDialect, table: &TableSpec) -> Self {
        Self::new(&table.name, dialect.create_table_sql(table), None)
    }

    /// `ADD COLUMN` for a declared column; inverse drops it.
    #[must_use]
    pub fn add_column(dialect: &MySqlDialect, table: &str, column: &ColumnSpec) -> Self {
        Self::new(
            table,
            dialect.add_column_sql(table, &dialect.column_definition(column)),
            Some(dialect.drop_column_sql(table, &column.name)),
        )
    }

    /// `DROP COLUMN`; inverse re-adds the column as it is defined now.
    #[must_use]
    pub fn drop_column(dialect: &MySqlDialect, table: &str, live: &IntrospectedColumn) -> Self {
        Self::new(
            table,
            dialect.drop_column_sql(table, &live.name),
            Some(dialect.add_column_sql(table, &dialect.live_definition(live))),
        )
    }

    /// `MODIFY COLUMN` to the declared definition; inverse restores the live
    /// definition.
    #[must_use]
    pub fn modify_column(
        dialect: &MySqlDialect,
        table: &str,
        declared: &ColumnSpec,
        live: &IntrospectedColumn,
    ) -> Self {
        Self::new(
            table,
            dialect.modify_column_sql(table, &dialect.modify_definition(declared, &live.comment)),
            Some(dialect.modify_column_sql(table, &dialect.live_definition(live))),
        )
    }

    /// `CHANGE COLUMN <old> <new> ...`, keeping the column's data.
    #[must_use]
    pub fn rename_column(
        dialect: &MySqlDialect,
        table: &str,
        declared: &ColumnSpec,
        live: &IntrospectedColumn,
    ) -> Self {
        Self::new(
            table,
            dialect.change_column_sql(
                table,
                &live.name,
                &dialect.modify_definition(declared, &live.comment),
            ),
            Some(dialect.change_column_sql(
                table,
                &declared.name,
                &dialect.live_definition(live),
            )),
        )
    }

    /// Renames a join-table column; join columns are always `INTEGER NOT NULL`.
    #[must_use]
    pub fn rename_join_column(
        dialect: &MySqlDialect,
        table: &str,
        actual: &str,
        expected: &str,
    ) -> Self {
        let definition = |name: &str| format!("{} INTEGER NOT NULL", dialect.quote_identifier(name));
        Self::new(
            table,
            dialect.change_column_sql(table, actual, &definition(expected)),
            Some(dialect.change_column_sql(table, expected, &definition(actual))),
        )
    }

    /// `ALTER COLUMN ... DROP DEFAULT`; inverse sets the live default back.
    #[must_use]
    pub fn drop_default(dialect: &MySqlDialect, table: &str, live: &IntrospectedColumn) -> Self {
        Self::new(
            table,
            dialect.drop_default_sql(table, &live.name),
            dialect
                .live_default_sql(live)
                .map(|value| dialect.set_default_sql(table, &live.name, &value)),
        )
        .in_phase(Phase::BeforeMain)
    }

    /// `DROP PRIMARY KEY`; inverse re-creates it over `restore`.
    #[must_use]
    pub fn drop_primary_key(dialect: &MySqlDialect, table: &str, restore: &[String]) -> Self {
        let inverse = if restore.is_empty() {
            None
        } else {
            Some(dialect.add_primary_key_sql(table, restore))
        };
        Self::new(table, dialect.drop_primary_key_sql(table), inverse).in_phase(Phase::BeforeMain)
    }

    /// `ADD PRIMARY KEY (<column>)`; inverse drops it.
    #[must_use]
    pub fn add_primary_key(dialect: &MySqlDialect, table: &str, column: &str) -> Self {
        Self::new(
            table,
            dialect.add_primary_key_sql(table, &[column.to_string()]),
            Some(dialect.drop_primary_key_sql(table)),
        )
        .in_phase(Phase::AfterMain)
    }

    /// `CREATE INDEX idx_<column>`.
    #[must_use]
    pub fn create_index(dialect: &MySqlDialect, table: &str, column: &ColumnSpec) -> Self {
        let name = column.index_name();
        Self::new(
            table,
            dialect.create_index_sql(table, &name, &column.name),
            Some(dialect.drop_index_sql(table, &name)),
        )
        .in_phase(Phase::BeforeMain)
    }

    /// `DROP INDEX idx_<column>`.
    #[must_use]
    pub fn drop_index(dialect: &MySqlDialect, table: &str, column: &str) -> Self {
        let name = index_name(column);
        Self::new(
            table,
            dialect.drop_index_sql(table, &name),
            Some(dialect.create_index_sql(table, &name, column)),
        )
        .in_phase(Phase::BeforeMain)
    }

    /// Adds the `unique_<column>` constraint.
    #[must_use]
    pub fn add_unique(dialect: &MySqlDialect, table: &str, column: &ColumnSpec) -> Self {
        let name = column.unique_name();
        Self::new(
            table,
            dialect.add_unique_sql(table, &name, &column.name),
            Some(dialect.drop_unique_sql(table, &name)),
        )
        .in_phase(Phase::BeforeMain)
    }

    /// Drops the `unique_<column>` constraint.
    #[must_use]
    pub fn drop_unique(dialect: &MySqlDialect, table: &str, column: &str) -> Self {
        let name = unique_name(column);
        Self::new(
            table,
            dialect.drop_unique_sql(table, &name),
            Some(dialect.add_unique_sql(table, &name, column)),
        )
        .in_phase(Phase::BeforeMain)
    }

    /// Adds the declared foreign key of `column` as `fk_<table>_<column>`.
    /// Returns `None` if the column is not a foreign key.
    #[must_use]
    pub fn add_foreign_key(dialect: &MySqlDialect, table: &str, column: &ColumnSpec) -> Option<Self> {
        let clause = dialect.declared_foreign_key_clause(table, column)?;
        Some(
            Self::new(
                table,
                dialect.add_foreign_key_sql(table, &clause),
                Some(dialect.drop_foreign_key_sql(
                    table,
                    &dialect.foreign_key_name(table, &column.name),
                )),
            )
            .in_phase(Phase::BeforeMain),
        )
    }

    /// Drops a live foreign key; inverse re-creates it with its live rules.
    #[must_use]
    pub fn drop_foreign_key(
        dialect: &MySqlDialect,
        table: &str,
        column: &str,
        live: &LiveForeignKey,
    ) -> Self {
        let clause = dialect.foreign_key_clause(
            &live.constraint_name,
            column,
            &live.referenced_table,
            &live.referenced_column,
            Some(live.on_delete),
            Some(live.on_update),
        );
        Self::new(
            table,
            dialect.drop_foreign_key_sql(table, &live.constraint_name),
            Some(dialect.add_foreign_key_sql(table, &clause)),
        )
        .in_phase(Phase::BeforeMain)
    }

    /// Changes the table comment.
    #[must_use]
    pub fn table_comment(dialect: &MySqlDialect, table: &str, declared: &str, live: &str) -> Self {
        Self::new(
            table,
            dialect.table_comment_sql(table, declared),
            Some(dialect.table_comment_sql(table, live)),
        )
    }

    /// Changes the row format.
    #[must_use]
    pub fn row_format(
        dialect: &MySqlDialect,
        table: &str,
        declared: RowFormat,
        live: Option<&str>,
    ) -> Self {
        Self::new(
            table,
            dialect.row_format_sql(table, declared.to_sql()),
            live.map(|previous| dialect.row_format_sql(table, previous)),
        )
    }

    /// Converts the table to another collation.
    #[must_use]
    pub fn convert_collation(
        dialect: &MySqlDialect,
        table: &str,
        declared: &str,
        live: Option<&str>,
    ) -> Self {
        Self::new(
            table,
            dialect.convert_collation_sql(table, declared),
            live.map(|previous| dialect.convert_collation_sql(table, previous)),
        )
    }
}
