//! Schema registry.
//!
//! Entities are registered once at startup through [`SchemaRegistryBuilder`],
//! which validates the model and produces an immutable [`SchemaRegistry`].
//! The registry is then passed by reference to every component.

use std::collections::HashSet;

use crate::error::{ReconcileError, Result};
use crate::schema::{Collation, ColumnSpec, ForeignKeyAction, SqlType, TableSpec};

/// Default collation sentinel meaning "no collation preference".
pub const DEFAULT_COLLATION_SENTINEL: &str = "unspecified";

/// An application type backed by a table.
///
/// ```ignore
/// struct Student;
///
/// impl Entity for Student {
///     const TABLE: &'static str = "students";
///
///     fn schema(table: TableSpec) -> TableSpec {
///         table
///             .migrate()
///             .column(ColumnSpec::auto_increment_id("id"))
///             .column(ColumnSpec::new("name", SqlType::Varchar(64)).not_null())
///     }
/// }
/// ```
pub trait Entity {
    /// Table name.
    const TABLE: &'static str;

    /// Declares the table, starting from an empty [`TableSpec`] named
    /// [`Self::TABLE`].
    fn schema(table: TableSpec) -> TableSpec;

    /// Declares relations to other entities.
    fn relations() -> Vec<RelationSpec> {
        Vec::new()
    }

    /// Declares columns renamed since an earlier version of the model.
    fn renames() -> Vec<RenameSpec> {
        Vec::new()
    }
}

/// Kind of relation between two entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// Many rows of the owner reference one row of the target.
    ManyToOne,
    /// One row of the owner is referenced by many rows of the target.
    OneToMany,
    /// Rows are paired through a join table.
    ManyToMany,
}

/// How related rows are loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadPolicy {
    /// Always loaded with the owner.
    Eager,
    /// Loaded on demand.
    #[default]
    Mixed,
}

/// Join table declaration of a many-to-many relation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JoinTableSpec {
    /// Explicit name; `<owner>_<inverse>` when absent.
    pub name: Option<String>,
    /// `ON DELETE` action of both join columns.
    pub on_delete: Option<ForeignKeyAction>,
}

impl JoinTableSpec {
    /// Creates a join table declaration with a derived name.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an explicit name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the `ON DELETE` action.
    #[must_use]
    pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = Some(action);
        self
    }
}

/// A relation declared on an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationSpec {
    /// Relation kind.
    pub kind: RelationKind,
    /// Owning table; filled in at registration.
    pub owner: String,
    /// Property holding the relation on the owner.
    pub property: String,
    /// Target table.
    pub target: String,
    /// Property holding the relation on the target, if any.
    pub inverse_property: Option<String>,
    /// Type the loaded rows are projected into.
    pub projection: Option<String>,
    /// Load policy.
    pub load: LoadPolicy,
    /// Join table, for the owning side of a many-to-many relation.
    pub join_table: Option<JoinTableSpec>,
}

impl RelationSpec {
    /// Creates a relation to `target`.
    #[must_use]
    pub fn new(kind: RelationKind, property: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            kind,
            owner: String::new(),
            property: property.into(),
            target: target.into(),
            inverse_property: None,
            projection: None,
            load: LoadPolicy::default(),
            join_table: None,
        }
    }

    /// Many-to-one relation to `T`.
    #[must_use]
    pub fn many_to_one<T: Entity>(property: impl Into<String>) -> Self {
        Self::new(RelationKind::ManyToOne, property, T::TABLE)
    }

    /// One-to-many relation to `T`, mirrored by `inverse` on `T`.
    #[must_use]
    pub fn one_to_many<T: Entity>(property: impl Into<String>, inverse: impl Into<String>) -> Self {
        Self::new(RelationKind::OneToMany, property, T::TABLE).inverse(inverse)
    }

    /// Many-to-many relation to `T`, mirrored by `inverse` on `T`.
    #[must_use]
    pub fn many_to_many<T: Entity>(property: impl Into<String>, inverse: impl Into<String>) -> Self {
        Self::new(RelationKind::ManyToMany, property, T::TABLE).inverse(inverse)
    }

    /// Sets the inverse property.
    #[must_use]
    pub fn inverse(mut self, property: impl Into<String>) -> Self {
        self.inverse_property = Some(property.into());
        self
    }

    /// Sets the result projection.
    #[must_use]
    pub fn projection(mut self, name: impl Into<String>) -> Self {
        self.projection = Some(name.into());
        self
    }

    /// Loads related rows eagerly.
    #[must_use]
    pub fn eager(mut self) -> Self {
        self.load = LoadPolicy::Eager;
        self
    }

    /// Declares the join table on this side.
    #[must_use]
    pub fn join_table(mut self, join_table: JoinTableSpec) -> Self {
        self.join_table = Some(join_table);
        self
    }

    fn describe(&self) -> String {
        format!("{}.{}", self.owner, self.property)
    }
}

/// A column that used to have another name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameSpec {
    /// Owning table; filled in at registration.
    pub table: String,
    /// Current column name.
    pub property: String,
    /// Previous column name in the database.
    pub old_name: String,
}

impl RenameSpec {
    /// Declares that `property` was previously called `old_name`.
    #[must_use]
    pub fn new(property: impl Into<String>, old_name: impl Into<String>) -> Self {
        Self {
            table: String::new(),
            property: property.into(),
            old_name: old_name.into(),
        }
    }
}

/// A resolved many-to-many join table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTablePlan {
    /// Join table name.
    pub name: String,
    /// Table on the side that declared the join table.
    pub owner_table: String,
    /// Join column referencing the owner.
    pub owner_column: String,
    /// Primary key column of the owner.
    pub owner_key: String,
    /// Table on the other side.
    pub inverse_table: String,
    /// Join column referencing the inverse side.
    pub inverse_column: String,
    /// Primary key column of the inverse side.
    pub inverse_key: String,
    /// `ON DELETE` action of both join columns.
    pub on_delete: Option<ForeignKeyAction>,
}

impl JoinTablePlan {
    /// Expected join column names, owner side first.
    #[must_use]
    pub fn expected_columns(&self) -> [&str; 2] {
        [&self.owner_column, &self.inverse_column]
    }

    /// The join table as a declared table: two indexed `INTEGER NOT NULL`
    /// foreign key columns.
    #[must_use]
    pub fn table_spec(&self) -> TableSpec {
        let join_column = |name: &str, table: &str, key: &str| {
            let column = ColumnSpec::new(name, SqlType::Integer)
                .not_null()
                .index()
                .references(table, key);
            match self.on_delete {
                Some(action) => column.on_delete_foreign(action),
                None => column,
            }
        };
        TableSpec::new(&self.name)
            .column(join_column(&self.owner_column, &self.owner_table, &self.owner_key))
            .column(join_column(
                &self.inverse_column,
                &self.inverse_table,
                &self.inverse_key,
            ))
    }
}

/// Builder for [`SchemaRegistry`].
#[derive(Debug)]
pub struct SchemaRegistryBuilder {
    tables: Vec<TableSpec>,
    relations: Vec<RelationSpec>,
    renames: Vec<RenameSpec>,
    collation_sentinel: String,
}

impl Default for SchemaRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRegistryBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: Vec::new(),
            relations: Vec::new(),
            renames: Vec::new(),
            collation_sentinel: DEFAULT_COLLATION_SENTINEL.to_string(),
        }
    }

    /// Registers an entity with its relations and renames.
    #[must_use]
    pub fn register<T: Entity>(self, _entity: T) -> Self {
        self.register_type::<T>()
    }

    /// Registers an entity type with its relations and renames.
    #[must_use]
    pub fn register_type<T: Entity>(mut self) -> Self {
        self.tables.push(T::schema(TableSpec::new(T::TABLE)));
        for relation in T::relations() {
            self = self.relation(T::TABLE, relation);
        }
        for rename in T::renames() {
            self = self.rename(T::TABLE, rename);
        }
        self
    }

    /// Registers a table without an entity type.
    #[must_use]
    pub fn table(mut self, table: TableSpec) -> Self {
        self.tables.push(table);
        self
    }

    /// Registers a relation owned by `owner`.
    #[must_use]
    pub fn relation(mut self, owner: &str, mut relation: RelationSpec) -> Self {
        relation.owner = owner.to_string();
        self.relations.push(relation);
        self
    }

    /// Registers a column rename on `table`.
    #[must_use]
    pub fn rename(mut self, table: &str, mut rename: RenameSpec) -> Self {
        rename.table = table.to_string();
        self.renames.push(rename);
        self
    }

    /// Sets the collation value meaning "no preference".
    #[must_use]
    pub fn collation_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.collation_sentinel = sentinel.into();
        self
    }

    /// Validates the model and freezes it.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Configuration`] for duplicate tables or
    /// columns, more than one auto-increment column in a table, relations
    /// to unregistered tables and renames of undeclared columns.
    pub fn build(mut self) -> Result<SchemaRegistry> {
        let mut table_names = HashSet::new();
        for table in &mut self.tables {
            if !table_names.insert(table.name.clone()) {
                return Err(ReconcileError::config(format!(
                    "table '{}' is registered twice",
                    table.name
                )));
            }

            let mut column_names = HashSet::new();
            for column in &table.columns {
                if !column_names.insert(column.name.as_str()) {
                    return Err(ReconcileError::config(format!(
                        "column '{}' is declared twice in table '{}'",
                        column.name, table.name
                    )));
                }
            }

            if table.columns.iter().filter(|c| c.auto_increment).count() > 1 {
                return Err(ReconcileError::config(format!(
                    "table '{}' declares more than one auto-increment column",
                    table.name
                )));
            }

            let is_sentinel = matches!(
                &table.collation,
                Collation::Named(name) if name.eq_ignore_ascii_case(&self.collation_sentinel)
            );
            if is_sentinel {
                table.collation = Collation::Unspecified;
            }
        }

        for relation in &self.relations {
            if !table_names.contains(&relation.owner) {
                return Err(ReconcileError::config(format!(
                    "relation {} belongs to an unregistered table",
                    relation.describe()
                )));
            }
            if !table_names.contains(&relation.target) {
                return Err(ReconcileError::config(format!(
                    "relation {} targets unregistered table '{}'",
                    relation.describe(),
                    relation.target
                )));
            }
        }

        for rename in &self.renames {
            let declared = self
                .tables
                .iter()
                .find(|t| t.name == rename.table)
                .and_then(|t| t.get_column(&rename.property));
            if declared.is_none() {
                return Err(ReconcileError::config(format!(
                    "rename of '{}' to '{}.{}' names an undeclared column",
                    rename.old_name, rename.table, rename.property
                )));
            }
        }

        Ok(SchemaRegistry {
            tables: self.tables,
            relations: self.relations,
            renames: self.renames,
        })
    }
}

/// Immutable store of the declared model.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    tables: Vec<TableSpec>,
    relations: Vec<RelationSpec>,
    renames: Vec<RenameSpec>,
}

impl SchemaRegistry {
    /// Starts building a registry.
    #[must_use]
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::new()
    }

    /// All tables, in registration order.
    #[must_use]
    pub fn tables(&self) -> &[TableSpec] {
        &self.tables
    }

    /// Gets a table by name.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&TableSpec> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// All relations, in registration order.
    #[must_use]
    pub fn relations(&self) -> &[RelationSpec] {
        &self.relations
    }

    /// Renames declared on `table`.
    pub fn renames_for<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a RenameSpec> + 'a {
        self.renames.iter().filter(move |r| r.table == table)
    }

    /// Finds the relation on the target side that mirrors `relation`.
    #[must_use]
    pub fn inverse_of(&self, relation: &RelationSpec) -> Option<&RelationSpec> {
        let inverse_property = relation.inverse_property.as_deref()?;
        self.relations.iter().find(|r| {
            r.kind == relation.kind
                && r.owner == relation.target
                && r.target == relation.owner
                && r.property == inverse_property
        })
    }

    /// Resolves every many-to-many pair to its join table.
    ///
    /// Each pair yields exactly one plan, built from the side that declared
    /// the join table.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Configuration`] if a relation has no
    /// inverse, if the join table is declared on both sides or on neither,
    /// or if a side has no auto-increment key to reference.
    pub fn join_table_plans(&self) -> Result<Vec<JoinTablePlan>> {
        let mut plans = Vec::new();
        for relation in self
            .relations
            .iter()
            .filter(|r| r.kind == RelationKind::ManyToMany)
        {
            let inverse = self.inverse_of(relation).ok_or_else(|| {
                ReconcileError::config(format!(
                    "many-to-many relation {} has no inverse on '{}'; many-to-many relations can't be one-sided",
                    relation.describe(),
                    relation.target
                ))
            })?;

            let join_table = match (&relation.join_table, &inverse.join_table) {
                (Some(_), Some(_)) => {
                    return Err(ReconcileError::config(format!(
                        "join table of {} and {} is declared on both sides",
                        relation.describe(),
                        inverse.describe()
                    )));
                }
                (None, None) => {
                    return Err(ReconcileError::config(format!(
                        "join table of {} and {} must be declared on exactly one side",
                        relation.describe(),
                        inverse.describe()
                    )));
                }
                (None, Some(_)) => continue,
                (Some(join_table), None) => join_table,
            };

            if relation.owner == relation.target {
                return Err(ReconcileError::config(format!(
                    "many-to-many relation {} refers to its own table",
                    relation.describe()
                )));
            }

            plans.push(JoinTablePlan {
                name: join_table
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("{}_{}", relation.owner, relation.target)),
                owner_column: format!("{}_id", relation.owner),
                owner_key: self.primary_key_of(&relation.owner)?,
                owner_table: relation.owner.clone(),
                inverse_column: format!("{}_id", relation.target),
                inverse_key: self.primary_key_of(&relation.target)?,
                inverse_table: relation.target.clone(),
                on_delete: join_table.on_delete,
            });
        }
        Ok(plans)
    }

    fn primary_key_of(&self, table: &str) -> Result<String> {
        self.table(table)
            .and_then(TableSpec::auto_increment_column)
            .map(|c| c.name.clone())
            .ok_or_else(|| {
                ReconcileError::config(format!(
                    "table '{}' needs an auto-increment primary key to take part in a many-to-many relation",
                    table
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Student;
    struct Course;

    impl Entity for Student {
        const TABLE: &'static str = "students";

        fn schema(table: TableSpec) -> TableSpec {
            table
                .migrate()
                .column(ColumnSpec::auto_increment_id("id"))
                .column(ColumnSpec::new("name", SqlType::Varchar(64)).not_null())
        }

        fn relations() -> Vec<RelationSpec> {
            vec![RelationSpec::many_to_many::<Course>("courses", "students")
                .join_table(JoinTableSpec::new().on_delete(ForeignKeyAction::Cascade))]
        }

        fn renames() -> Vec<RenameSpec> {
            vec![RenameSpec::new("name", "full_name")]
        }
    }

    impl Entity for Course {
        const TABLE: &'static str = "courses";

        fn schema(table: TableSpec) -> TableSpec {
            table.column(ColumnSpec::auto_increment_id("id"))
        }

        fn relations() -> Vec<RelationSpec> {
            vec![RelationSpec::many_to_many::<Student>("students", "courses")]
        }
    }

    #[test]
    fn test_register_entities() {
        let registry = SchemaRegistry::builder()
            .register(Student)
            .register(Course)
            .build()
            .unwrap();

        assert_eq!(registry.tables().len(), 2);
        assert_eq!(registry.tables()[0].name, "students");
        assert_eq!(registry.relations()[0].owner, "students");
        assert_eq!(registry.renames_for("students").count(), 1);
        assert_eq!(registry.renames_for("courses").count(), 0);
    }

    #[test]
    fn test_join_table_plan() {
        let registry = SchemaRegistry::builder()
            .register(Student)
            .register(Course)
            .build()
            .unwrap();

        let plans = registry.join_table_plans().unwrap();
        assert_eq!(plans.len(), 1);
        let plan = &plans[0];
        assert_eq!(plan.name, "students_courses");
        assert_eq!(plan.expected_columns(), ["students_id", "courses_id"]);
        assert_eq!(plan.owner_key, "id");
        assert_eq!(plan.on_delete, Some(ForeignKeyAction::Cascade));

        let table = plan.table_spec();
        assert_eq!(table.columns.len(), 2);
        assert!(table.columns.iter().all(|c| c.not_null && c.indexed));
    }

    #[test]
    fn test_one_sided_many_to_many_is_rejected() {
        let registry = SchemaRegistry::builder()
            .register(Student)
            .table(TableSpec::new("courses").column(ColumnSpec::auto_increment_id("id")))
            .build()
            .unwrap();

        let err = registry.join_table_plans().unwrap_err();
        assert!(matches!(err, ReconcileError::Configuration(_)));
    }

    #[test]
    fn test_join_table_on_both_sides_is_rejected() {
        let both = SchemaRegistry::builder()
            .table(TableSpec::new("a").column(ColumnSpec::auto_increment_id("id")))
            .table(TableSpec::new("b").column(ColumnSpec::auto_increment_id("id")))
            .relation(
                "a",
                RelationSpec::new(RelationKind::ManyToMany, "bs", "b")
                    .inverse("as")
                    .join_table(JoinTableSpec::new()),
            )
            .relation(
                "b",
                RelationSpec::new(RelationKind::ManyToMany, "as", "a")
                    .inverse("bs")
                    .join_table(JoinTableSpec::new()),
            )
            .build()
            .unwrap();
        let err = both.join_table_plans().unwrap_err();
        assert!(err.to_string().contains("both sides"));
    }

    #[test]
    fn test_join_table_requires_primary_key() {
        let registry = SchemaRegistry::builder()
            .table(TableSpec::new("a").column(ColumnSpec::auto_increment_id("id")))
            .table(TableSpec::new("b").column(ColumnSpec::new("code", SqlType::Char(3))))
            .relation(
                "a",
                RelationSpec::new(RelationKind::ManyToMany, "bs", "b")
                    .inverse("as")
                    .join_table(JoinTableSpec::new().name("a_to_b")),
            )
            .relation("b", RelationSpec::new(RelationKind::ManyToMany, "as", "a").inverse("bs"))
            .build()
            .unwrap();
        let err = registry.join_table_plans().unwrap_err();
        assert!(err.to_string().contains("auto-increment"));
    }

    #[test]
    fn test_duplicate_table_is_rejected() {
        let err = SchemaRegistry::builder()
            .table(TableSpec::new("a"))
            .table(TableSpec::new("a"))
            .build()
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Configuration(_)));
    }

    #[test]
    fn test_two_auto_increment_columns_are_rejected() {
        let err = SchemaRegistry::builder()
            .table(
                TableSpec::new("a")
                    .column(ColumnSpec::auto_increment_id("id"))
                    .column(ColumnSpec::auto_increment_id("other")),
            )
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("more than one auto-increment"));
    }

    #[test]
    fn test_unknown_relation_target_is_rejected() {
        let err = SchemaRegistry::builder()
            .register(Student)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("unregistered table 'courses'"));
    }

    #[test]
    fn test_collation_sentinel_means_unspecified() {
        let registry = SchemaRegistry::builder()
            .collation_sentinel("currency")
            .table(TableSpec::new("a").collation("currency"))
            .table(TableSpec::new("b").collation("utf8mb4_bin"))
            .build()
            .unwrap();
        assert_eq!(registry.tables()[0].collation, Collation::Unspecified);
        assert_eq!(
            registry.tables()[1].collation,
            Collation::Named("utf8mb4_bin".into())
        );
    }

    #[test]
    fn test_rename_of_undeclared_column_is_rejected() {
        let err = SchemaRegistry::builder()
            .table(TableSpec::new("a").column(ColumnSpec::auto_increment_id("id")))
            .rename("a", RenameSpec::new("missing", "old"))
            .build()
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Configuration(_)));
    }
}
