//! Code-first schema reconciliation for MySQL.
//!
//! `oxide-reconcile` keeps a live MySQL schema in line with tables declared
//! in Rust. On startup it:
//! - creates missing tables (and many-to-many join tables) in priority order
//! - diffs every table flagged for migration against the live catalog
//! - repairs misnamed join-table columns
//! - applies the resulting DDL immediately, or writes it to a file to be
//!   applied on the next start, together with a rollback file
//!
//! Every generated statement comes with its inverse when one can be derived.
//!
//! # Architecture
//!
//! - **Registry** - Immutable declared model built from [`registry::Entity`]
//!   registrations
//! - **Introspect** - Live catalog reads and statement execution, behind traits
//! - **Orchestrator** - `CREATE TABLE IF NOT EXISTS` in priority order
//! - **Diff** - Column, key, index and table attribute diffing
//! - **Join table** - Join-table column name repair
//! - **Applier** - Best-effort execution or artifact files
//! - **Dialect** - All quoting, escaping and DDL text
//!
//! # Example
//!
//! ```rust,ignore
//! use oxide_reconcile::prelude::*;
//!
//! struct User;
//!
//! impl Entity for User {
//!     const TABLE: &'static str = "users";
//!
//!     fn schema(table: TableSpec) -> TableSpec {
//!         table
//!             .migrate()
//!             .column(ColumnSpec::auto_increment_id("id"))
//!             .column(ColumnSpec::new("name", SqlType::Varchar(64)).not_null())
//!     }
//! }
//!
//! let registry = SchemaRegistry::builder().register(User).build()?;
//! let db = MySqlDatabase::new(pool);
//! let summary = Reconciler::new(&registry, &db, ReconcileConfig::default())
//!     .reconcile_schema()
//!     .await?;
//! ```

pub mod applier;
pub mod config;
pub mod dialect;
pub mod diff;
pub mod error;
pub mod introspect;
pub mod join_table;
pub mod operations;
pub mod orchestrator;
pub mod reconciler;
pub mod registry;
pub mod schema;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::applier::{ApplyReport, MigrationApplier};
    pub use crate::config::{MigrationMode, ReconcileConfig};
    pub use crate::dialect::{MigrationDialect, MySqlDialect};
    pub use crate::diff::DiffEngine;
    pub use crate::error::{ReconcileError, Result};
    pub use crate::introspect::{
        IntrospectedColumn, IntrospectedConstraints, LiveForeignKey, LiveTable, MySqlDatabase,
        SchemaIntrospector, SqlExecutor, TableAttributes,
    };
    pub use crate::join_table::JoinTableReconciler;
    pub use crate::operations::{MigrationOperation, Phase};
    pub use crate::orchestrator::TableOrchestrator;
    pub use crate::reconciler::{ReconcileSummary, Reconciler};
    pub use crate::registry::{
        Entity, JoinTablePlan, JoinTableSpec, LoadPolicy, RelationKind, RelationSpec, RenameSpec,
        SchemaRegistry, SchemaRegistryBuilder,
    };
    pub use crate::schema::{
        Collation, ColumnComment, ColumnSpec, DefaultValue, ForeignKeyAction, RowFormat, SqlType,
        TableSpec,
    };
}
