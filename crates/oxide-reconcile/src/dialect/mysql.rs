//! MySQL dialect.
//!
//! MySQL alters columns in place (`MODIFY COLUMN`, `CHANGE COLUMN`), so every
//! change the diff engine detects maps to a single statement with a
//! single-statement inverse.

use crate::schema::{charset_of, ColumnSpec, ForeignKeyAction, SqlType, TableSpec};

use super::MigrationDialect;

/// Integer types whose display width MySQL 8 no longer reports.
const INTEGER_TYPES: [&str; 5] = ["tinyint", "smallint", "mediumint", "int", "bigint"];

/// MySQL migration dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl MySqlDialect {
    /// Creates a new MySQL dialect.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Generates `CREATE TABLE IF NOT EXISTS` for a declared table.
    ///
    /// Unique constraints, indexes and foreign keys are appended as named
    /// trailing clauses so that later runs recognise them.
    #[must_use]
    pub fn create_table_sql(&self, table: &TableSpec) -> String {
        let mut clauses: Vec<String> = table
            .columns
            .iter()
            .map(|c| self.column_definition(c))
            .collect();

        for column in &table.columns {
            if column.unique {
                clauses.push(format!(
                    "UNIQUE KEY {} ({})",
                    self.quote_identifier(&column.unique_name()),
                    self.quote_identifier(&column.name)
                ));
            }
            if column.indexed {
                clauses.push(format!(
                    "INDEX {} ({})",
                    self.quote_identifier(&column.index_name()),
                    self.quote_identifier(&column.name)
                ));
            }
            if let Some(fk) = self.declared_foreign_key_clause(&table.name, column) {
                clauses.push(fk);
            }
        }

        let mut sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.quote_identifier(&table.name),
            clauses.join(", ")
        );

        if !table.comment.is_empty() {
            sql.push_str(&format!(" COMMENT={}", self.quote_literal(&table.comment)));
        }
        if let Some(collation) = table.collation.name() {
            sql.push_str(&format!(" COLLATE={}", collation));
        }
        if let Some(row_format) = table.row_format {
            sql.push_str(&format!(" ROW_FORMAT={}", row_format.to_sql()));
        }

        sql
    }

    /// Name of the foreign key constraint on `table.column`.
    #[must_use]
    pub fn foreign_key_name(&self, table: &str, column: &str) -> String {
        format!("fk_{}_{}", table, column)
    }

    /// `CONSTRAINT ... FOREIGN KEY ... REFERENCES ...` for a declared column,
    /// or `None` if the column is not a foreign key.
    #[must_use]
    pub fn declared_foreign_key_clause(&self, table: &str, column: &ColumnSpec) -> Option<String> {
        let target = column.foreign_key.as_ref()?;
        Some(self.foreign_key_clause(
            &self.foreign_key_name(table, &column.name),
            &column.name,
            &target.table,
            &target.column,
            column.on_delete_action,
            column.on_update_action,
        ))
    }

    /// `CONSTRAINT ... FOREIGN KEY ... REFERENCES ...`.
    #[must_use]
    pub fn foreign_key_clause(
        &self,
        name: &str,
        column: &str,
        referenced_table: &str,
        referenced_column: &str,
        on_delete: Option<ForeignKeyAction>,
        on_update: Option<ForeignKeyAction>,
    ) -> String {
        let mut sql = format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            self.quote_identifier(name),
            self.quote_identifier(column),
            self.quote_identifier(referenced_table),
            self.quote_identifier(referenced_column)
        );
        if let Some(action) = on_delete {
            sql.push_str(" ON DELETE ");
            sql.push_str(action.to_sql());
        }
        if let Some(action) = on_update {
            sql.push_str(" ON UPDATE ");
            sql.push_str(action.to_sql());
        }
        sql
    }

    fn alter(&self, table: &str, body: &str) -> String {
        format!("ALTER TABLE {} {}", self.quote_identifier(table), body)
    }

    /// `ALTER TABLE ... ADD COLUMN ...` from a column definition.
    #[must_use]
    pub fn add_column_sql(&self, table: &str, definition: &str) -> String {
        self.alter(table, &format!("ADD COLUMN {}", definition))
    }

    /// `ALTER TABLE ... DROP COLUMN ...`.
    #[must_use]
    pub fn drop_column_sql(&self, table: &str, column: &str) -> String {
        self.alter(
            table,
            &format!("DROP COLUMN {}", self.quote_identifier(column)),
        )
    }

    /// `ALTER TABLE ... MODIFY COLUMN ...` from a column definition.
    #[must_use]
    pub fn modify_column_sql(&self, table: &str, definition: &str) -> String {
        self.alter(table, &format!("MODIFY COLUMN {}", definition))
    }

    /// `ALTER TABLE ... CHANGE COLUMN <old> <definition>`.
    #[must_use]
    pub fn change_column_sql(&self, table: &str, old_name: &str, definition: &str) -> String {
        self.alter(
            table,
            &format!(
                "CHANGE COLUMN {} {}",
                self.quote_identifier(old_name),
                definition
            ),
        )
    }

    /// `ALTER TABLE ... ALTER COLUMN ... DROP DEFAULT`.
    #[must_use]
    pub fn drop_default_sql(&self, table: &str, column: &str) -> String {
        self.alter(
            table,
            &format!("ALTER COLUMN {} DROP DEFAULT", self.quote_identifier(column)),
        )
    }

    /// `ALTER TABLE ... ALTER COLUMN ... SET DEFAULT ...`.
    #[must_use]
    pub fn set_default_sql(&self, table: &str, column: &str, value_sql: &str) -> String {
        self.alter(
            table,
            &format!(
                "ALTER COLUMN {} SET DEFAULT {}",
                self.quote_identifier(column),
                value_sql
            ),
        )
    }

    /// `ALTER TABLE ... DROP PRIMARY KEY`.
    #[must_use]
    pub fn drop_primary_key_sql(&self, table: &str) -> String {
        self.alter(table, "DROP PRIMARY KEY")
    }

    /// `ALTER TABLE ... ADD PRIMARY KEY (...)`.
    #[must_use]
    pub fn add_primary_key_sql(&self, table: &str, columns: &[String]) -> String {
        let quoted: Vec<String> = columns.iter().map(|c| self.quote_identifier(c)).collect();
        self.alter(table, &format!("ADD PRIMARY KEY ({})", quoted.join(", ")))
    }

    /// `CREATE INDEX ... ON ... (...)`.
    #[must_use]
    pub fn create_index_sql(&self, table: &str, name: &str, column: &str) -> String {
        format!(
            "CREATE INDEX {} ON {} ({})",
            self.quote_identifier(name),
            self.quote_identifier(table),
            self.quote_identifier(column)
        )
    }

    /// `DROP INDEX ... ON ...`.
    #[must_use]
    pub fn drop_index_sql(&self, table: &str, name: &str) -> String {
        format!(
            "DROP INDEX {} ON {}",
            self.quote_identifier(name),
            self.quote_identifier(table)
        )
    }

    /// `ALTER TABLE ... ADD CONSTRAINT ... UNIQUE (...)`.
    #[must_use]
    pub fn add_unique_sql(&self, table: &str, name: &str, column: &str) -> String {
        self.alter(
            table,
            &format!(
                "ADD CONSTRAINT {} UNIQUE ({})",
                self.quote_identifier(name),
                self.quote_identifier(column)
            ),
        )
    }

    /// `ALTER TABLE ... DROP INDEX ...` (unique constraints are indexes).
    #[must_use]
    pub fn drop_unique_sql(&self, table: &str, name: &str) -> String {
        self.alter(table, &format!("DROP INDEX {}", self.quote_identifier(name)))
    }

    /// `ALTER TABLE ... ADD <foreign key clause>`.
    #[must_use]
    pub fn add_foreign_key_sql(&self, table: &str, clause: &str) -> String {
        self.alter(table, &format!("ADD {}", clause))
    }

    /// `ALTER TABLE ... DROP FOREIGN KEY ...`.
    #[must_use]
    pub fn drop_foreign_key_sql(&self, table: &str, name: &str) -> String {
        self.alter(
            table,
            &format!("DROP FOREIGN KEY {}", self.quote_identifier(name)),
        )
    }

    /// `ALTER TABLE ... COMMENT = '...'`.
    #[must_use]
    pub fn table_comment_sql(&self, table: &str, comment: &str) -> String {
        self.alter(table, &format!("COMMENT = {}", self.quote_literal(comment)))
    }

    /// `ALTER TABLE ... ROW_FORMAT = ...`.
    #[must_use]
    pub fn row_format_sql(&self, table: &str, row_format: &str) -> String {
        self.alter(
            table,
            &format!("ROW_FORMAT = {}", row_format.trim().to_ascii_uppercase()),
        )
    }

    /// `ALTER TABLE ... CONVERT TO CHARACTER SET ... COLLATE ...`.
    #[must_use]
    pub fn convert_collation_sql(&self, table: &str, collation: &str) -> String {
        self.alter(
            table,
            &format!(
                "CONVERT TO CHARACTER SET {} COLLATE {}",
                charset_of(collation),
                collation
            ),
        )
    }

    /// `ANALYZE TABLE ...`, refreshing catalog statistics before a read.
    #[must_use]
    pub fn analyze_table_sql(&self, table: &str) -> String {
        format!("ANALYZE TABLE {}", self.quote_identifier(table))
    }
}

impl MigrationDialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn quote_literal(&self, value: &str) -> String {
        let mut quoted = String::with_capacity(value.len() + 2);
        quoted.push('\'');
        for c in value.chars() {
            match c {
                '\'' => quoted.push_str("''"),
                '\\' => quoted.push_str("\\\\"),
                '\n' => quoted.push_str("\\n"),
                '\r' => quoted.push_str("\\r"),
                '\0' => quoted.push_str("\\0"),
                _ => quoted.push(c),
            }
        }
        quoted.push('\'');
        quoted
    }

    fn type_name(&self, sql_type: &SqlType) -> String {
        sql_type.mysql_name()
    }

    fn canonical_type(&self, raw: &str) -> String {
        // Whitespace inside parentheses is insignificant: "decimal(10, 2)".
        let mut compact = String::with_capacity(raw.len());
        let mut depth = 0usize;
        for c in raw.trim().chars() {
            match c {
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                c if c.is_whitespace() && depth > 0 => continue,
                _ => {}
            }
            compact.push(c.to_ascii_lowercase());
        }

        let mut words = compact.split_whitespace();
        let head = words.next().unwrap_or_default();
        let (base, args) = match head.find('(') {
            Some(pos) => head.split_at(pos),
            None => (head, ""),
        };

        let (base, args) = match base {
            "integer" => ("int", args),
            "bool" | "boolean" => ("tinyint", "(1)"),
            "numeric" | "dec" | "fixed" => ("decimal", args),
            "real" => ("double", args),
            _ => (base, args),
        };
        let args = if INTEGER_TYPES.contains(&base) && !(base == "tinyint" && args == "(1)") {
            ""
        } else {
            args
        };

        let rest: Vec<&str> = words
            .filter(|w| !(base == "double" && *w == "precision"))
            .collect();

        let mut canonical = format!("{}{}", base, args);
        for word in rest {
            canonical.push(' ');
            canonical.push_str(word);
        }
        canonical
    }

    fn auto_increment_keyword(&self) -> &'static str {
        "AUTO_INCREMENT"
    }
}
