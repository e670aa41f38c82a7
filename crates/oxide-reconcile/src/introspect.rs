//! Live schema introspection.
//!
//! The reconciler never talks to a driver directly. It goes through
//! [`SqlExecutor`] to run DDL and [`SchemaIntrospector`] to read the catalog,
//! so every component can run against fixture data in tests.
//! [`MySqlDatabase`] implements both over a `sqlx` MySQL pool.

use std::collections::{HashMap, HashSet};
use std::future::Future;

use sqlx::mysql::{MySqlPool, MySqlRow};
use sqlx::Row;
use tracing::debug;

use crate::dialect::MySqlDialect;
use crate::error::{ReconcileError, Result};
use crate::schema::{canonical_function, is_timestamp_function, ForeignKeyAction};

/// A column as reported by `information_schema.COLUMNS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntrospectedColumn {
    /// Column name.
    pub name: String,
    /// Full type descriptor (`COLUMN_TYPE`), e.g. `varchar(32)`.
    pub column_type: String,
    /// Raw default (`COLUMN_DEFAULT`).
    pub default: Option<String>,
    /// Column comment.
    pub comment: String,
    /// Extra flags (`auto_increment`, `on update ...`, `DEFAULT_GENERATED`).
    pub extra: String,
    /// Whether the column accepts NULL.
    pub nullable: bool,
}

impl IntrospectedColumn {
    /// Returns true if the column auto-increments.
    #[must_use]
    pub fn is_auto_increment(&self) -> bool {
        self.extra.to_ascii_lowercase().contains("auto_increment")
    }

    /// Returns true if the default is an expression rather than a literal.
    #[must_use]
    pub fn default_is_expression(&self) -> bool {
        if self.extra.to_ascii_lowercase().contains("default_generated") {
            return true;
        }
        self.default.as_deref().is_some_and(is_timestamp_function)
    }

    /// Returns the default normalized for comparison with
    /// [`DefaultValue::comparable`](crate::schema::DefaultValue::comparable).
    #[must_use]
    pub fn comparable_default(&self) -> Option<String> {
        let raw = self.default.as_deref()?;
        if self.default_is_expression() {
            return Some(canonical_function(raw));
        }
        // MariaDB reports literals quoted and a missing default as NULL.
        if raw == "NULL" {
            return None;
        }
        if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
            return Some(raw[1..raw.len() - 1].replace("''", "'"));
        }
        Some(raw.to_string())
    }

    /// Returns the `ON UPDATE` expression reported in `EXTRA`, if any.
    #[must_use]
    pub fn on_update(&self) -> Option<&str> {
        let pos = self.extra.to_ascii_lowercase().find("on update ")?;
        let value = self.extra[pos + "on update ".len()..].trim();
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }
}

/// A foreign key as reported by `KEY_COLUMN_USAGE` and
/// `REFERENTIAL_CONSTRAINTS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveForeignKey {
    /// Constraint name.
    pub constraint_name: String,
    /// Referenced table.
    pub referenced_table: String,
    /// Referenced column.
    pub referenced_column: String,
    /// `ON DELETE` rule.
    pub on_delete: ForeignKeyAction,
    /// `ON UPDATE` rule.
    pub on_update: ForeignKeyAction,
}

/// Keys and indexes of a live table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntrospectedConstraints {
    /// Primary key columns, in key order. Empty if the table has none.
    pub primary_key: Vec<String>,
    /// Names of non-unique indexes.
    pub indexes: HashSet<String>,
    /// Names of unique indexes (excluding the primary key).
    pub unique: HashSet<String>,
    /// Foreign keys, by column name.
    pub foreign_keys: HashMap<String, LiveForeignKey>,
}

impl IntrospectedConstraints {
    /// Returns true if the table has a primary key.
    #[must_use]
    pub fn has_primary_key(&self) -> bool {
        !self.primary_key.is_empty()
    }

    /// Returns true if `column` is part of the primary key.
    #[must_use]
    pub fn is_primary(&self, column: &str) -> bool {
        self.primary_key.iter().any(|c| c == column)
    }
}

/// Table-level attributes from `information_schema.TABLES`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableAttributes {
    /// Table comment.
    pub comment: String,
    /// Table collation.
    pub collation: Option<String>,
    /// Row format.
    pub row_format: Option<String>,
}

/// Everything the diff engine needs to know about one live table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveTable {
    /// Table name.
    pub name: String,
    /// Columns, in ordinal order.
    pub columns: Vec<IntrospectedColumn>,
    /// Keys and indexes.
    pub constraints: IntrospectedConstraints,
    /// Table attributes.
    pub attributes: TableAttributes,
}

impl LiveTable {
    /// Gets a column by name.
    #[must_use]
    pub fn get_column(&self, name: &str) -> Option<&IntrospectedColumn> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Executes DDL statements.
pub trait SqlExecutor: Send + Sync {
    /// Executes a single statement and returns the number of affected rows.
    fn execute(&self, sql: &str) -> impl Future<Output = Result<u64>> + Send;
}

/// Reads live schema metadata.
pub trait SchemaIntrospector: Send + Sync {
    /// Lists the tables of the current database.
    fn table_names(&self) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Lists the columns of `table`, in ordinal order.
    fn columns(&self, table: &str) -> impl Future<Output = Result<Vec<IntrospectedColumn>>> + Send;

    /// Reads the primary key, indexes, unique constraints and foreign keys
    /// of `table`.
    fn constraints(&self, table: &str)
        -> impl Future<Output = Result<IntrospectedConstraints>> + Send;

    /// Reads the comment, collation and row format of `table`.
    fn table_attributes(&self, table: &str) -> impl Future<Output = Result<TableAttributes>> + Send;

    /// Reads everything about `table` at once.
    fn live_table(&self, table: &str) -> impl Future<Output = Result<LiveTable>> + Send {
        async move {
            let columns = self.columns(table).await?;
            let constraints = self.constraints(table).await?;
            let attributes = self.table_attributes(table).await?;
            Ok(LiveTable {
                name: table.to_string(),
                columns,
                constraints,
                attributes,
            })
        }
    }
}

const TABLES_QUERY: &str = "SELECT CAST(TABLE_NAME AS CHAR) AS table_name \
     FROM information_schema.TABLES \
     WHERE TABLE_SCHEMA = DATABASE()";

const COLUMNS_QUERY: &str = "SELECT CAST(COLUMN_NAME AS CHAR) AS column_name, \
     CAST(COLUMN_TYPE AS CHAR) AS column_type, \
     CAST(COLUMN_DEFAULT AS CHAR) AS column_default, \
     CAST(COLUMN_COMMENT AS CHAR) AS column_comment, \
     CAST(EXTRA AS CHAR) AS extra, \
     CAST(IS_NULLABLE AS CHAR) AS is_nullable \
     FROM information_schema.COLUMNS \
     WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
     ORDER BY ORDINAL_POSITION";

const INDEXES_QUERY: &str = "SELECT CAST(INDEX_NAME AS CHAR) AS index_name, \
     CAST(COLUMN_NAME AS CHAR) AS column_name, \
     CAST(NON_UNIQUE AS SIGNED) AS non_unique \
     FROM information_schema.STATISTICS \
     WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
     ORDER BY INDEX_NAME, SEQ_IN_INDEX";

const FOREIGN_KEYS_QUERY: &str = "SELECT CAST(k.CONSTRAINT_NAME AS CHAR) AS constraint_name, \
     CAST(k.COLUMN_NAME AS CHAR) AS column_name, \
     CAST(k.REFERENCED_TABLE_NAME AS CHAR) AS referenced_table, \
     CAST(k.REFERENCED_COLUMN_NAME AS CHAR) AS referenced_column, \
     CAST(r.DELETE_RULE AS CHAR) AS delete_rule, \
     CAST(r.UPDATE_RULE AS CHAR) AS update_rule \
     FROM information_schema.KEY_COLUMN_USAGE k \
     JOIN information_schema.REFERENTIAL_CONSTRAINTS r \
       ON r.CONSTRAINT_SCHEMA = k.CONSTRAINT_SCHEMA \
      AND r.CONSTRAINT_NAME = k.CONSTRAINT_NAME \
      AND r.TABLE_NAME = k.TABLE_NAME \
     WHERE k.TABLE_SCHEMA = DATABASE() AND k.TABLE_NAME = ? \
       AND k.REFERENCED_TABLE_NAME IS NOT NULL";

const ATTRIBUTES_QUERY: &str = "SELECT CAST(TABLE_COMMENT AS CHAR) AS table_comment, \
     CAST(TABLE_COLLATION AS CHAR) AS table_collation, \
     CAST(ROW_FORMAT AS CHAR) AS row_format \
     FROM information_schema.TABLES \
     WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?";

/// MySQL database handle implementing [`SqlExecutor`] and
/// [`SchemaIntrospector`].
#[derive(Debug, Clone)]
pub struct MySqlDatabase {
    pool: MySqlPool,
    dialect: MySqlDialect,
}

impl MySqlDatabase {
    /// Wraps an existing pool. The pool's lifecycle stays with the caller.
    #[must_use]
    pub fn new(pool: MySqlPool) -> Self {
        Self {
            pool,
            dialect: MySqlDialect::new(),
        }
    }

    /// Returns the underlying pool.
    #[must_use]
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

fn column_from_row(row: &MySqlRow) -> Result<IntrospectedColumn> {
    let is_nullable: String = row.try_get("is_nullable")?;
    Ok(IntrospectedColumn {
        name: row.try_get("column_name")?,
        column_type: row.try_get("column_type")?,
        default: row.try_get("column_default")?,
        comment: row
            .try_get::<Option<String>, _>("column_comment")?
            .unwrap_or_default(),
        extra: row.try_get::<Option<String>, _>("extra")?.unwrap_or_default(),
        nullable: is_nullable.eq_ignore_ascii_case("YES"),
    })
}

fn foreign_key_action(table: &str, rule: &str) -> Result<ForeignKeyAction> {
    ForeignKeyAction::parse(rule).ok_or_else(|| {
        ReconcileError::introspection(table, format!("unknown foreign key rule '{}'", rule))
    })
}

impl SqlExecutor for MySqlDatabase {
    async fn execute(&self, sql: &str) -> Result<u64> {
        debug!(sql = %sql, "Executing statement");
        let result = sqlx::raw_sql(sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

impl SchemaIntrospector for MySqlDatabase {
    async fn table_names(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(TABLES_QUERY).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("table_name")
                    .map_err(ReconcileError::from)
            })
            .collect()
    }

    async fn columns(&self, table: &str) -> Result<Vec<IntrospectedColumn>> {
        self.execute(&self.dialect.analyze_table_sql(table)).await?;

        let rows = sqlx::query(COLUMNS_QUERY)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;
        debug!(table = %table, columns = rows.len(), "Read column metadata");
        rows.iter().map(column_from_row).collect()
    }

    async fn constraints(&self, table: &str) -> Result<IntrospectedConstraints> {
        let mut constraints = IntrospectedConstraints::default();

        let index_rows = sqlx::query(INDEXES_QUERY)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;
        for row in &index_rows {
            let index_name: String = row.try_get("index_name")?;
            let column_name: String = row.try_get("column_name")?;
            let non_unique: i64 = row.try_get("non_unique")?;
            if index_name == "PRIMARY" {
                constraints.primary_key.push(column_name);
            } else if non_unique == 0 {
                constraints.unique.insert(index_name);
            } else {
                constraints.indexes.insert(index_name);
            }
        }

        let fk_rows = sqlx::query(FOREIGN_KEYS_QUERY)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;
        for row in &fk_rows {
            let column: String = row.try_get("column_name")?;
            let delete_rule: String = row.try_get("delete_rule")?;
            let update_rule: String = row.try_get("update_rule")?;
            constraints.foreign_keys.insert(
                column,
                LiveForeignKey {
                    constraint_name: row.try_get("constraint_name")?,
                    referenced_table: row.try_get("referenced_table")?,
                    referenced_column: row.try_get("referenced_column")?,
                    on_delete: foreign_key_action(table, &delete_rule)?,
                    on_update: foreign_key_action(table, &update_rule)?,
                },
            );
        }

        Ok(constraints)
    }

    async fn table_attributes(&self, table: &str) -> Result<TableAttributes> {
        let row = sqlx::query(ATTRIBUTES_QUERY)
            .bind(table)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ReconcileError::introspection(table, "table does not exist"))?;

        Ok(TableAttributes {
            comment: row
                .try_get::<Option<String>, _>("table_comment")?
                .unwrap_or_default(),
            collation: row.try_get("table_collation")?,
            row_format: row.try_get("row_format")?,
        })
    }
}
