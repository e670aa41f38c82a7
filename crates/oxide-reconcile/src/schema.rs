//! Declared schema types.
//!
//! These types describe the tables an application expects to exist. They are
//! built once at startup (usually from [`Entity`](crate::registry::Entity)
//! implementations), stored in the [`SchemaRegistry`](crate::registry::SchemaRegistry)
//! and never mutated afterwards.

/// SQL data types a column can be declared with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SqlType {
    /// Integer (32-bit).
    Integer,
    /// Big integer (64-bit).
    BigInt,
    /// Small integer (16-bit).
    SmallInt,
    /// Tiny integer (8-bit).
    TinyInt,
    /// Unbounded text.
    Text,
    /// Variable-length character string.
    Varchar(usize),
    /// Fixed-length character string.
    Char(usize),
    /// Boolean (stored as `tinyint(1)` by MySQL).
    Boolean,
    /// Date and time.
    DateTime,
    /// Date only.
    Date,
    /// Time only.
    Time,
    /// Timestamp.
    Timestamp,
    /// Floating point (single precision).
    Float,
    /// Floating point (double precision).
    Double,
    /// Decimal with precision and scale.
    Decimal(u8, u8),
    /// Binary large object.
    Blob,
    /// JSON document.
    Json,
    /// Any other type, written verbatim into DDL.
    Custom(String),
}

impl SqlType {
    /// Creates a type from a raw SQL type descriptor.
    #[must_use]
    pub fn raw(descriptor: impl Into<String>) -> Self {
        Self::Custom(descriptor.into())
    }

    /// Returns the SQL type name as written in MySQL DDL.
    #[must_use]
    pub fn mysql_name(&self) -> String {
        match self {
            Self::Integer => "INTEGER".to_string(),
            Self::BigInt => "BIGINT".to_string(),
            Self::SmallInt => "SMALLINT".to_string(),
            Self::TinyInt => "TINYINT".to_string(),
            Self::Text => "TEXT".to_string(),
            Self::Varchar(len) => format!("VARCHAR({})", len),
            Self::Char(len) => format!("CHAR({})", len),
            Self::Boolean => "BOOLEAN".to_string(),
            Self::DateTime => "DATETIME".to_string(),
            Self::Date => "DATE".to_string(),
            Self::Time => "TIME".to_string(),
            Self::Timestamp => "TIMESTAMP".to_string(),
            Self::Float => "FLOAT".to_string(),
            Self::Double => "DOUBLE".to_string(),
            Self::Decimal(p, s) => format!("DECIMAL({}, {})", p, s),
            Self::Blob => "BLOB".to_string(),
            Self::Json => "JSON".to_string(),
            Self::Custom(raw) => raw.clone(),
        }
    }
}

/// Default (or `ON UPDATE`) value of a column.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DefaultValue {
    /// No preference: no `DEFAULT` clause is written.
    #[default]
    Absent,
    /// Explicitly "no default". A live default is dropped with
    /// `ALTER COLUMN ... DROP DEFAULT` instead of redefining the column.
    NullMarker,
    /// A literal value, always quoted in DDL.
    Literal(String),
    /// A boolean literal (`TRUE`/`FALSE`, reported by MySQL as `1`/`0`).
    Bool(bool),
    /// A SQL function call such as `CURRENT_TIMESTAMP`, written unquoted.
    SqlFunctionCall(String),
}

impl DefaultValue {
    /// Creates a literal default from anything printable.
    #[must_use]
    pub fn literal(value: impl ToString) -> Self {
        Self::Literal(value.to_string())
    }

    /// Creates a SQL function call default.
    #[must_use]
    pub fn function(name: impl Into<String>) -> Self {
        Self::SqlFunctionCall(name.into())
    }

    /// `CURRENT_TIMESTAMP`.
    #[must_use]
    pub fn current_timestamp() -> Self {
        Self::SqlFunctionCall("CURRENT_TIMESTAMP".to_string())
    }

    /// Returns true for [`DefaultValue::Absent`] and [`DefaultValue::NullMarker`].
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::Absent | Self::NullMarker)
    }

    /// Returns the value the way MySQL reports it in the catalog, so it can
    /// be compared against `COLUMN_DEFAULT` or the `EXTRA` on-update clause.
    #[must_use]
    pub fn comparable(&self) -> Option<String> {
        match self {
            Self::Absent | Self::NullMarker => None,
            Self::Literal(value) => Some(value.clone()),
            Self::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
            Self::SqlFunctionCall(name) => Some(canonical_function(name)),
        }
    }
}

/// Normalizes a SQL function default so that equivalent spellings compare
/// equal (`NOW()`, `CURRENT_TIMESTAMP()` and `LOCALTIMESTAMP` are all
/// reported as `CURRENT_TIMESTAMP`).
#[must_use]
pub fn canonical_function(name: &str) -> String {
    let mut expr = name.trim();
    if expr.starts_with('(') && expr.ends_with(')') && expr.len() >= 2 {
        expr = expr[1..expr.len() - 1].trim();
    }
    let lowered = expr.to_ascii_lowercase();
    match lowered.as_str() {
        "now()" | "current_timestamp" | "current_timestamp()" | "localtimestamp"
        | "localtimestamp()" | "localtime" | "localtime()" => "current_timestamp".to_string(),
        _ => lowered,
    }
}

/// Returns true if `value` is one of the timestamp function spellings.
#[must_use]
pub(crate) fn is_timestamp_function(value: &str) -> bool {
    canonical_function(value) == "current_timestamp"
}

/// Foreign key action (ON DELETE, ON UPDATE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ForeignKeyAction {
    /// No action (error if referenced row is deleted/updated).
    #[default]
    NoAction,
    /// Restrict (same as NoAction in InnoDB).
    Restrict,
    /// Cascade the delete/update to referencing rows.
    Cascade,
    /// Set the foreign key column to NULL.
    SetNull,
    /// Set the foreign key column to its default value.
    SetDefault,
}

impl ForeignKeyAction {
    /// Returns the SQL representation of this action.
    #[must_use]
    pub fn to_sql(&self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }

    /// Parses a rule as reported by `REFERENTIAL_CONSTRAINTS`.
    #[must_use]
    pub fn parse(rule: &str) -> Option<Self> {
        match rule.trim().to_ascii_uppercase().as_str() {
            "NO ACTION" => Some(Self::NoAction),
            "RESTRICT" => Some(Self::Restrict),
            "CASCADE" => Some(Self::Cascade),
            "SET NULL" => Some(Self::SetNull),
            "SET DEFAULT" => Some(Self::SetDefault),
            _ => None,
        }
    }

    /// Returns true if both actions behave identically. InnoDB checks
    /// `NO ACTION` immediately, which makes it the same as `RESTRICT`.
    #[must_use]
    pub fn same_effect(self, other: Self) -> bool {
        let strict = |a: Self| matches!(a, Self::NoAction | Self::Restrict);
        self == other || (strict(self) && strict(other))
    }
}

/// Target of a foreign key column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForeignKeyRef {
    /// Referenced table.
    pub table: String,
    /// Referenced column.
    pub column: String,
}

/// Declared comment of a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnComment {
    /// The column must carry exactly this comment (empty means none).
    Text(String),
    /// Comments are not managed for this column; whatever the database has
    /// is left alone.
    Disabled,
}

impl Default for ColumnComment {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

/// Declared definition of a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Column name.
    pub name: String,
    /// SQL data type.
    pub sql_type: SqlType,
    /// Whether this column auto-increments (and is the primary key).
    pub auto_increment: bool,
    /// Whether the column rejects NULL.
    pub not_null: bool,
    /// Default value.
    pub default: DefaultValue,
    /// Whether the column carries a `unique_<column>` constraint.
    pub unique: bool,
    /// Whether the column carries an `idx_<column>` index.
    pub indexed: bool,
    /// Value assigned on every update (`ON UPDATE ...`).
    pub on_update: DefaultValue,
    /// Column comment.
    pub comment: ColumnComment,
    /// Referenced table/column, if this is a foreign key column.
    pub foreign_key: Option<ForeignKeyRef>,
    /// `ON DELETE` action of the foreign key.
    pub on_delete_action: Option<ForeignKeyAction>,
    /// `ON UPDATE` action of the foreign key.
    pub on_update_action: Option<ForeignKeyAction>,
}

impl ColumnSpec {
    /// Creates a new nullable column without default.
    #[must_use]
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            auto_increment: false,
            not_null: false,
            default: DefaultValue::Absent,
            unique: false,
            indexed: false,
            on_update: DefaultValue::Absent,
            comment: ColumnComment::default(),
            foreign_key: None,
            on_delete_action: None,
            on_update_action: None,
        }
    }

    /// `INTEGER AUTO_INCREMENT PRIMARY KEY NOT NULL`.
    #[must_use]
    pub fn auto_increment_id(name: impl Into<String>) -> Self {
        Self::new(name, SqlType::Integer).auto_increment()
    }

    /// Makes the column the auto-incrementing primary key.
    #[must_use]
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self.not_null = true;
        self
    }

    /// Sets the column as NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Sets the column as nullable.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.not_null = false;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default(mut self, value: DefaultValue) -> Self {
        self.default = value;
        self
    }

    /// Adds a unique constraint.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Adds an index.
    #[must_use]
    pub fn index(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Sets the value assigned on update.
    #[must_use]
    pub fn on_update(mut self, value: DefaultValue) -> Self {
        self.on_update = value;
        self
    }

    /// Sets the column comment.
    #[must_use]
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = ColumnComment::Text(comment.into());
        self
    }

    /// Stops managing the column comment.
    #[must_use]
    pub fn without_comment(mut self) -> Self {
        self.comment = ColumnComment::Disabled;
        self
    }

    /// Makes this column a foreign key to `table(column)`.
    #[must_use]
    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.foreign_key = Some(ForeignKeyRef {
            table: table.into(),
            column: column.into(),
        });
        self
    }

    /// Sets the foreign key `ON DELETE` action.
    #[must_use]
    pub fn on_delete_foreign(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete_action = Some(action);
        self
    }

    /// Sets the foreign key `ON UPDATE` action.
    #[must_use]
    pub fn on_update_foreign(mut self, action: ForeignKeyAction) -> Self {
        self.on_update_action = Some(action);
        self
    }

    /// Name of the index this column gets when `indexed` is set.
    #[must_use]
    pub fn index_name(&self) -> String {
        index_name(&self.name)
    }

    /// Name of the unique constraint this column gets when `unique` is set.
    #[must_use]
    pub fn unique_name(&self) -> String {
        unique_name(&self.name)
    }
}

/// Name of the managed index on `column`.
#[must_use]
pub fn index_name(column: &str) -> String {
    format!("idx_{column}")
}

/// Name of the managed unique constraint on `column`.
#[must_use]
pub fn unique_name(column: &str) -> String {
    format!("unique_{column}")
}

/// Table collation preference.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Collation {
    /// No preference; the live collation is never touched.
    #[default]
    Unspecified,
    /// A named collation such as `utf8mb4_unicode_ci`.
    Named(String),
}

impl Collation {
    /// Returns the collation name, if one was declared.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Unspecified => None,
            Self::Named(name) => Some(name),
        }
    }
}

/// Character set a collation belongs to, used by `CONVERT TO CHARACTER SET`.
#[must_use]
pub fn charset_of(collation: &str) -> &str {
    if collation == "binary" {
        return "binary";
    }
    match collation.split('_').next() {
        Some(
            charset @ ("utf8" | "utf8mb3" | "utf8mb4" | "latin1" | "ascii" | "ucs2" | "utf16"
            | "utf32" | "cp1251" | "cp1256"),
        ) => charset,
        _ => "utf8mb4",
    }
}

/// InnoDB row format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowFormat {
    /// `ROW_FORMAT=DEFAULT`.
    Default,
    /// `ROW_FORMAT=DYNAMIC`.
    Dynamic,
    /// `ROW_FORMAT=FIXED`.
    Fixed,
    /// `ROW_FORMAT=COMPRESSED`.
    Compressed,
    /// `ROW_FORMAT=REDUNDANT`.
    Redundant,
    /// `ROW_FORMAT=COMPACT`.
    Compact,
}

impl RowFormat {
    /// Returns the SQL keyword.
    #[must_use]
    pub fn to_sql(&self) -> &'static str {
        match self {
            Self::Default => "DEFAULT",
            Self::Dynamic => "DYNAMIC",
            Self::Fixed => "FIXED",
            Self::Compressed => "COMPRESSED",
            Self::Redundant => "REDUNDANT",
            Self::Compact => "COMPACT",
        }
    }

    /// Returns true if the live `ROW_FORMAT` value matches this format.
    #[must_use]
    pub fn matches(&self, live: &str) -> bool {
        self.to_sql().eq_ignore_ascii_case(live.trim())
    }
}

/// Declared definition of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    /// Table name.
    pub name: String,
    /// Creation priority; higher is created first.
    pub priority: i32,
    /// Table comment.
    pub comment: String,
    /// Collation preference.
    pub collation: Collation,
    /// Row format preference.
    pub row_format: Option<RowFormat>,
    /// Whether the table takes part in reconciliation after creation.
    pub migration_enabled: bool,
    /// Column definitions, in declaration order.
    pub columns: Vec<ColumnSpec>,
}

impl TableSpec {
    /// Creates a new table with no columns.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: 0,
            comment: String::new(),
            collation: Collation::Unspecified,
            row_format: None,
            migration_enabled: false,
            columns: Vec::new(),
        }
    }

    /// Sets the creation priority.
    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the table comment.
    #[must_use]
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Sets the collation.
    #[must_use]
    pub fn collation(mut self, collation: impl Into<String>) -> Self {
        self.collation = Collation::Named(collation.into());
        self
    }

    /// Sets the row format.
    #[must_use]
    pub fn row_format(mut self, row_format: RowFormat) -> Self {
        self.row_format = Some(row_format);
        self
    }

    /// Enables reconciliation of this table against the live schema.
    #[must_use]
    pub fn migrate(mut self) -> Self {
        self.migration_enabled = true;
        self
    }

    /// Adds a column to the table.
    #[must_use]
    pub fn column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    /// Gets a column by name.
    #[must_use]
    pub fn get_column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Returns the auto-increment (primary key) column, if any.
    #[must_use]
    pub fn auto_increment_column(&self) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.auto_increment)
    }
}
