//! Database dialect implementations.
//!
//! A dialect owns every piece of SQL text the engine produces: identifier
//! quoting, literal escaping, type names and column definitions. No other
//! module formats a name or a value into a statement on its own.

mod mysql;

pub use mysql::MySqlDialect;

use crate::introspect::IntrospectedColumn;
use crate::schema::{is_timestamp_function, ColumnComment, ColumnSpec, DefaultValue, SqlType};

/// Trait for database-specific SQL fragments.
pub trait MigrationDialect: Send + Sync {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Quotes an identifier (table name, column name, constraint name).
    fn quote_identifier(&self, name: &str) -> String;

    /// Quotes and escapes a string literal.
    fn quote_literal(&self, value: &str) -> String;

    /// Returns the SQL type name for the given type.
    fn type_name(&self, sql_type: &SqlType) -> String;

    /// Normalizes a type descriptor so that a declared type and the type the
    /// catalog reports for it compare equal.
    fn canonical_type(&self, raw: &str) -> String;

    /// Returns the auto-increment keyword for this dialect.
    fn auto_increment_keyword(&self) -> &'static str;

    /// Renders a declared default / on-update value, or `None` when no clause
    /// should be written.
    fn value_sql(&self, value: &DefaultValue) -> Option<String> {
        match value {
            DefaultValue::Absent | DefaultValue::NullMarker => None,
            DefaultValue::Literal(v) => Some(self.quote_literal(v)),
            DefaultValue::Bool(true) => Some("TRUE".to_string()),
            DefaultValue::Bool(false) => Some("FALSE".to_string()),
            DefaultValue::SqlFunctionCall(name) => Some(name.clone()),
        }
    }

    /// Renders the default a live column currently has, so it can be
    /// restored by an inverse statement.
    fn live_default_sql(&self, column: &IntrospectedColumn) -> Option<String> {
        let raw = column.default.as_deref()?;
        if column.default_is_expression() {
            if is_timestamp_function(raw) {
                return Some(raw.trim().to_string());
            }
            let expr = raw.trim();
            if expr.starts_with('(') {
                return Some(expr.to_string());
            }
            return Some(format!("({})", expr));
        }
        column
            .comparable_default()
            .map(|value| self.quote_literal(&value))
    }

    /// Generates the column definition used by `CREATE TABLE` and
    /// `ADD COLUMN`.
    fn column_definition(&self, column: &ColumnSpec) -> String {
        let mut parts = vec![
            self.quote_identifier(&column.name),
            self.type_name(&column.sql_type),
        ];

        if column.auto_increment {
            parts.push(self.auto_increment_keyword().to_string());
            parts.push("PRIMARY KEY".to_string());
        }

        if column.not_null {
            parts.push("NOT NULL".to_string());
        }

        if let Some(default_sql) = self.value_sql(&column.default) {
            parts.push(format!("DEFAULT {}", default_sql));
        }

        if let Some(on_update_sql) = self.value_sql(&column.on_update) {
            parts.push(format!("ON UPDATE {}", on_update_sql));
        }

        if let ColumnComment::Text(comment) = &column.comment {
            if !comment.is_empty() {
                parts.push(format!("COMMENT {}", self.quote_literal(comment)));
            }
        }

        parts.join(" ")
    }

    /// Generates the full definition of a declared column for a column
    /// redefinition. The primary key is managed by separate statements, and
    /// `live_comment` is kept when comments are not managed for the column.
    fn modify_definition(&self, column: &ColumnSpec, live_comment: &str) -> String {
        let mut parts = vec![
            self.quote_identifier(&column.name),
            self.type_name(&column.sql_type),
        ];

        parts.push(if column.not_null { "NOT NULL" } else { "NULL" }.to_string());

        if !column.auto_increment {
            if let Some(default_sql) = self.value_sql(&column.default) {
                parts.push(format!("DEFAULT {}", default_sql));
            }
        }

        if let Some(on_update_sql) = self.value_sql(&column.on_update) {
            parts.push(format!("ON UPDATE {}", on_update_sql));
        }

        if column.auto_increment {
            parts.push(self.auto_increment_keyword().to_string());
        }

        let comment = match &column.comment {
            ColumnComment::Text(comment) => comment.as_str(),
            ColumnComment::Disabled => live_comment,
        };
        if !comment.is_empty() {
            parts.push(format!("COMMENT {}", self.quote_literal(comment)));
        }

        parts.join(" ")
    }

    /// Rebuilds the definition of a live column from its catalog row.
    fn live_definition(&self, column: &IntrospectedColumn) -> String {
        let mut parts = vec![
            self.quote_identifier(&column.name),
            column.column_type.clone(),
        ];

        parts.push(if column.nullable { "NULL" } else { "NOT NULL" }.to_string());

        if let Some(default_sql) = self.live_default_sql(column) {
            parts.push(format!("DEFAULT {}", default_sql));
        }

        if let Some(on_update) = column.on_update() {
            parts.push(format!("ON UPDATE {}", on_update));
        }

        if column.is_auto_increment() {
            parts.push(self.auto_increment_keyword().to_string());
        }

        if !column.comment.is_empty() {
            parts.push(format!("COMMENT {}", self.quote_literal(&column.comment)));
        }

        parts.join(" ")
    }
}
