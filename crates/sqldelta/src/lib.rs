//! Schema diffing and migration planning for SQL databases.
//!
//! `sqldelta` compares the schema a database currently has with the schema an
//! application wants, and produces the operations that turn one into the
//! other:
//! - Renamed tables and columns are recognised by their shape instead of
//!   being dropped and recreated
//! - Foreign keys follow the renames they are affected by
//! - Operations are ordered so each one runs after everything it needs
//! - Every changeset can be reversed
//!
//! # Architecture
//!
//! - **Schema** - Tables, columns, keys and foreign keys as plain data
//! - **Autodetector** - Diffs two schemas into an unordered changeset
//! - **Changeset** - Orders operations by dependency and renders scripts
//! - **Dialect** - Database-specific SQL generation (PostgreSQL, SQLite)
//! - **Inspector** - Reads the current schema from a live database
//! - **Executor** - Applies a changeset inside one transaction
//! - **State** - Applies operations to an in-memory schema
//!
//! # Example
//!
//! ```rust
//! use sqldelta::prelude::*;
//!
//! let current = Schema::new().table(
//!     Table::new(Fqn::new("public", "users"))
//!         .column("id", Column::new("integer").not_null())
//!         .primary_key(["id"]),
//! );
//! let target = Schema::new().table(
//!     Table::new(Fqn::new("public", "accounts"))
//!         .column("id", Column::new("integer").not_null())
//!         .primary_key(["id"]),
//! );
//!
//! let changeset = Autodetector::new().diff(&current, &target).unwrap();
//! let sql = changeset.to_sql(&PostgresDialect::new()).unwrap();
//! assert_eq!(sql, vec![r#"ALTER TABLE "public"."users" RENAME TO "accounts""#]);
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Print the script turning one schema file into another
//! sqldelta diff --current current.json --target target.json --dialect postgres
//!
//! # Dump the live schema
//! sqldelta --database sqlite:app.db inspect > current.json
//!
//! # Show, then apply, what the live database needs
//! sqldelta --database sqlite:app.db plan --target target.json
//! sqldelta --database sqlite:app.db apply --target target.json
//! ```

pub mod autodetector;
pub mod changeset;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod inspect;
pub mod operations;
pub mod refmap;
pub mod schema;
pub mod signature;
pub mod state;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::autodetector::{diff, Autodetector, AutodetectorOptions};
    pub use crate::changeset::{resolve_dependencies, Changeset, DependsOn};
    pub use crate::dialect::{MigrationDialect, PostgresDialect, SqliteDialect};
    pub use crate::error::{MigrateError, Result};
    pub use crate::executor::MigrationExecutor;
    pub use crate::inspect::{Inspector, SqliteInspector};
    pub use crate::operations::Operation;
    pub use crate::refmap::{RefMap, UpdatedForeignKey};
    pub use crate::schema::{
        default_fk_name, default_pk_name, Column, ColumnReference, ForeignKey, Fqn, PrimaryKey,
        Schema, Table, UniqueConstraint,
    };
    pub use crate::signature::{
        can_rename, equal_columns, ExactTypes, Signature, TypeEquivalence,
    };
    pub use crate::state::SchemaState;
}
