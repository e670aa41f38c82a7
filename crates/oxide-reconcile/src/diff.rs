//! Diff engine.
//!
//! Compares one declared table against its live counterpart and produces the
//! operations that bring the live table in line, each paired with its
//! inverse.
//!
//! Per table, operations come out in this order: table attributes, dropped
//! columns, renamed columns, added columns, then the changes to columns
//! present on both sides grouped by [`Phase`]. Grouping by phase keeps every
//! key or index removal ahead of the column redefinitions that depend on it,
//! and every primary key creation after them.
//!
//! A renamed column drops the keys named after its old name and gets its
//! declared keys under the new one. An added auto-increment column is
//! emitted last, once the old key column no longer holds the flag.

use crate::dialect::{MigrationDialect, MySqlDialect};
use crate::error::{ReconcileError, Result};
use crate::introspect::{IntrospectedColumn, IntrospectedConstraints, LiveTable, TableAttributes};
use crate::operations::{MigrationOperation, Phase};
use crate::registry::{RenameSpec, SchemaRegistry};
use crate::schema::{
    canonical_function, index_name, unique_name, ColumnComment, ColumnSpec, DefaultValue, RowFormat,
    TableSpec,
};

/// Computes migration operations for declared tables.
#[derive(Debug)]
pub struct DiffEngine<'a> {
    registry: &'a SchemaRegistry,
    dialect: MySqlDialect,
}

/// Tracks statements that may only be emitted once per table.
#[derive(Debug, Default)]
struct TableState {
    primary_key_dropped: bool,
}

impl<'a> DiffEngine<'a> {
    /// Creates a diff engine reading renames from `registry`.
    #[must_use]
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self {
            registry,
            dialect: MySqlDialect::new(),
        }
    }

    /// Diffs `table` against `live`.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Introspection`] if the live table has no
    /// columns.
    pub fn reconcile(&self, table: &TableSpec, live: &LiveTable) -> Result<Vec<MigrationOperation>> {
        if live.columns.is_empty() {
            return Err(ReconcileError::introspection(
                &table.name,
                "no columns were returned for a table flagged for migration",
            ));
        }

        let name = table.name.as_str();
        let mut state = TableState::default();

        // A rename applies only while the old column exists and the new one
        // does not.
        let renames: Vec<&RenameSpec> = self
            .registry
            .renames_for(name)
            .filter(|r| live.get_column(&r.old_name).is_some() && live.get_column(&r.property).is_none())
            .collect();

        let mut operations = self.attribute_operations(table, &live.attributes);

        let mut dropped = Vec::new();
        for column in &live.columns {
            if table.get_column(&column.name).is_some()
                || renames.iter().any(|r| r.old_name == column.name)
            {
                continue;
            }
            operations.push(MigrationOperation::drop_column(&self.dialect, name, column));
            dropped.push(column.name.as_str());
        }
        // MySQL drops a key together with the last of its columns.
        let primary_key = &live.constraints.primary_key;
        if !primary_key.is_empty() && primary_key.iter().all(|c| dropped.contains(&c.as_str())) {
            state.primary_key_dropped = true;
        }

        for rename in &renames {
            if let (Some(declared), Some(old)) = (
                table.get_column(&rename.property),
                live.get_column(&rename.old_name),
            ) {
                operations.extend(self.retire_keys(name, &old.name, &live.constraints));
                operations.push(MigrationOperation::rename_column(
                    &self.dialect,
                    name,
                    declared,
                    old,
                ));
                operations.extend(self.key_operations(name, declared, &live.constraints));
            }
        }

        // An added auto-increment column waits until the matched columns
        // have released the live primary key and auto-increment flag.
        let mut deferred = Vec::new();
        for column in &table.columns {
            if live.get_column(&column.name).is_some()
                || renames.iter().any(|r| r.property == column.name)
            {
                continue;
            }
            if column.auto_increment {
                deferred.push(column);
                continue;
            }
            operations.extend(self.add_operations(name, column, &live.constraints, &mut state));
        }

        let mut matched = Vec::new();
        for column in &table.columns {
            if let Some(live_column) = live.get_column(&column.name) {
                matched.extend(self.column_operations(
                    name,
                    column,
                    live_column,
                    &live.constraints,
                    &mut state,
                ));
            }
        }
        matched.sort_by_key(|op| op.phase);
        operations.extend(matched);

        for column in deferred {
            operations.extend(self.add_operations(name, column, &live.constraints, &mut state));
        }

        Ok(operations)
    }

    fn attribute_operations(
        &self,
        table: &TableSpec,
        live: &TableAttributes,
    ) -> Vec<MigrationOperation> {
        let mut operations = Vec::new();
        let name = table.name.as_str();

        if table.comment != live.comment {
            operations.push(MigrationOperation::table_comment(
                &self.dialect,
                name,
                &table.comment,
                &live.comment,
            ));
        }

        if let Some(row_format) = table.row_format {
            let matches = row_format == RowFormat::Default
                || live
                    .row_format
                    .as_deref()
                    .is_some_and(|current| row_format.matches(current));
            if !matches {
                operations.push(MigrationOperation::row_format(
                    &self.dialect,
                    name,
                    row_format,
                    live.row_format.as_deref(),
                ));
            }
        }

        if let Some(collation) = table.collation.name() {
            let matches = live
                .collation
                .as_deref()
                .is_some_and(|current| current.eq_ignore_ascii_case(collation));
            if !matches {
                operations.push(MigrationOperation::convert_collation(
                    &self.dialect,
                    name,
                    collation,
                    live.collation.as_deref(),
                ));
            }
        }

        operations
    }

    fn add_operations(
        &self,
        table: &str,
        column: &ColumnSpec,
        constraints: &IntrospectedConstraints,
        state: &mut TableState,
    ) -> Vec<MigrationOperation> {
        let mut operations = Vec::new();

        if column.auto_increment && constraints.has_primary_key() && !state.primary_key_dropped {
            operations.push(MigrationOperation::drop_primary_key(
                &self.dialect,
                table,
                &constraints.primary_key,
            ));
            state.primary_key_dropped = true;
        }

        operations.push(MigrationOperation::add_column(&self.dialect, table, column));
        if column.indexed {
            operations.push(MigrationOperation::create_index(&self.dialect, table, column));
        }
        if column.unique {
            operations.push(MigrationOperation::add_unique(&self.dialect, table, column));
        }
        operations.extend(MigrationOperation::add_foreign_key(&self.dialect, table, column));

        operations
    }

    fn column_operations(
        &self,
        table: &str,
        declared: &ColumnSpec,
        live: &IntrospectedColumn,
        constraints: &IntrospectedConstraints,
        state: &mut TableState,
    ) -> Vec<MigrationOperation> {
        let mut operations = Vec::new();
        let mut changed = self.definition_differs(declared, live);

        if !declared.auto_increment {
            if let DefaultValue::NullMarker = declared.default {
                if live.comparable_default().is_some_and(|v| !v.is_empty()) {
                    operations.push(MigrationOperation::drop_default(&self.dialect, table, live));
                }
            } else if declared.default.comparable() != live.comparable_default() {
                changed = true;
            }
        }

        let is_primary = constraints.is_primary(&declared.name);
        if declared.auto_increment && !is_primary {
            if constraints.has_primary_key() && !state.primary_key_dropped {
                operations.push(MigrationOperation::drop_primary_key(
                    &self.dialect,
                    table,
                    &constraints.primary_key,
                ));
                state.primary_key_dropped = true;
            }
            operations.push(MigrationOperation::add_primary_key(
                &self.dialect,
                table,
                &declared.name,
            ));
        } else if !declared.auto_increment && is_primary && !state.primary_key_dropped {
            operations.push(MigrationOperation::drop_primary_key(
                &self.dialect,
                table,
                &constraints.primary_key,
            ));
            state.primary_key_dropped = true;
        }

        if changed {
            operations.push(MigrationOperation::modify_column(
                &self.dialect,
                table,
                declared,
                live,
            ));
        }

        operations.extend(self.key_operations(table, declared, constraints));
        operations
    }

    /// Compares everything a `MODIFY COLUMN` would rewrite, except the
    /// default (which has a narrower drop path).
    fn definition_differs(&self, declared: &ColumnSpec, live: &IntrospectedColumn) -> bool {
        let declared_type = self
            .dialect
            .canonical_type(&self.dialect.type_name(&declared.sql_type));
        if declared_type != self.dialect.canonical_type(&live.column_type) {
            return true;
        }

        if !declared.auto_increment && declared.not_null == live.nullable {
            return true;
        }

        if let ColumnComment::Text(comment) = &declared.comment {
            if *comment != live.comment {
                return true;
            }
        }

        if declared.on_update.comparable() != live.on_update().map(canonical_function) {
            return true;
        }

        declared.auto_increment != live.is_auto_increment()
    }

    /// Drops the managed keys still named after a column's old name.
    fn retire_keys(
        &self,
        table: &str,
        old_name: &str,
        constraints: &IntrospectedConstraints,
    ) -> Vec<MigrationOperation> {
        let mut operations = Vec::new();
        // The foreign key goes first; it may depend on either index.
        if let Some(live) = constraints.foreign_keys.get(old_name) {
            operations.push(MigrationOperation::drop_foreign_key(
                &self.dialect,
                table,
                old_name,
                live,
            ));
        }
        if constraints.indexes.contains(&index_name(old_name)) {
            operations.push(MigrationOperation::drop_index(&self.dialect, table, old_name));
        }
        if constraints.unique.contains(&unique_name(old_name)) {
            operations.push(MigrationOperation::drop_unique(&self.dialect, table, old_name));
        }
        operations
    }

    fn key_operations(
        &self,
        table: &str,
        declared: &ColumnSpec,
        constraints: &IntrospectedConstraints,
    ) -> Vec<MigrationOperation> {
        let mut operations = Vec::new();

        match (declared.indexed, constraints.indexes.contains(&declared.index_name())) {
            (true, false) => {
                operations.push(MigrationOperation::create_index(&self.dialect, table, declared));
            }
            (false, true) => {
                operations.push(MigrationOperation::drop_index(&self.dialect, table, &declared.name));
            }
            _ => {}
        }

        match (declared.unique, constraints.unique.contains(&declared.unique_name())) {
            (true, false) => {
                operations.push(MigrationOperation::add_unique(&self.dialect, table, declared));
            }
            (false, true) => {
                operations.push(MigrationOperation::drop_unique(&self.dialect, table, &declared.name));
            }
            _ => {}
        }

        let live_fk = constraints.foreign_keys.get(&declared.name);
        match (&declared.foreign_key, live_fk) {
            (Some(target), Some(live)) => {
                let same = target.table == live.referenced_table
                    && target.column == live.referenced_column
                    && declared
                        .on_delete_action
                        .unwrap_or_default()
                        .same_effect(live.on_delete)
                    && declared
                        .on_update_action
                        .unwrap_or_default()
                        .same_effect(live.on_update);
                if !same {
                    operations.push(MigrationOperation::drop_foreign_key(
                        &self.dialect,
                        table,
                        &declared.name,
                        live,
                    ));
                    operations.extend(MigrationOperation::add_foreign_key(
                        &self.dialect,
                        table,
                        declared,
                    ));
                }
            }
            (Some(_), None) => {
                operations.extend(MigrationOperation::add_foreign_key(
                    &self.dialect,
                    table,
                    declared,
                ));
            }
            (None, Some(live)) => {
                operations.push(MigrationOperation::drop_foreign_key(
                    &self.dialect,
                    table,
                    &declared.name,
                    live,
                ));
            }
            (None, None) => {}
        }

        operations
    }
}
