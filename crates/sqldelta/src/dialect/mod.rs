//! Database dialect implementations.
//!
//! Each dialect knows how to render migration operations as SQL for one
//! database system, and which type spellings that system treats as the same
//! type.

mod postgres;
mod sqlite;

pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use crate::error::{MigrateError, Result};
use crate::operations::Operation;
use crate::schema::Column;
use crate::signature::TypeEquivalence;

/// Trait for database-specific SQL generation.
pub trait MigrationDialect: TypeEquivalence + Send + Sync {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Appends the SQL for `operation` to `buf`, without a trailing `;`.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Unsupported`] for operations the database
    /// cannot express.
    fn append_sql(&self, buf: &mut String, operation: &Operation) -> Result<()>;

    /// Renders `operation` into a new string.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Unsupported`] when [`Self::append_sql`] does.
    fn render(&self, operation: &Operation) -> Result<String> {
        let mut buf = String::new();
        self.append_sql(&mut buf, operation)?;
        Ok(buf)
    }

    /// Every statement `operation` needs, in execution order.
    ///
    /// Most operations are a single statement. Dialects override this when
    /// part of an operation must run as a statement of its own.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Unsupported`] when [`Self::append_sql`] does.
    fn statements(&self, operation: &Operation) -> Result<Vec<String>> {
        Ok(vec![self.render(operation)?])
    }

    /// Whether foreign keys of a new table are declared in its
    /// `CREATE TABLE`, making the matching [`Operation::AddForeignKey`]
    /// redundant.
    fn inline_foreign_keys(&self) -> bool {
        false
    }

    /// Quote an identifier (table name, column name, etc.).
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Returns the type as written in DDL, e.g. `varchar(255)`.
    fn type_name(&self, column: &Column) -> String {
        column.length.map_or_else(
            || column.sql_type.clone(),
            |length| format!("{}({length})", column.sql_type),
        )
    }

    /// Generates column definition SQL.
    fn column_definition(&self, name: &str, column: &Column) -> String {
        let mut parts = vec![self.quote_identifier(name), self.type_name(column)];

        if !column.nullable {
            parts.push("NOT NULL".to_string());
        }

        if let Some(ref default) = column.default {
            parts.push(format!("DEFAULT {default}"));
        }

        parts.join(" ")
    }

    /// Quoted, comma-separated column list.
    fn column_list(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Builds the error for an operation `dialect` cannot express.
pub(crate) fn unsupported<D: MigrationDialect + ?Sized>(
    dialect: &D,
    operation: &Operation,
) -> MigrateError {
    MigrateError::Unsupported {
        dialect: dialect.name(),
        operation: operation.kind(),
    }
}

/// Name given to a unique constraint without one: `{table}_{columns}_key`.
pub(crate) fn default_unique_name(table: &str, columns: &[String]) -> String {
    format!("{table}_{}_key", columns.join("_"))
}

/// Lowercases a type name and maps it through an alias table.
pub(crate) fn canonical_type(sql_type: &str, aliases: &[(&str, &'static str)]) -> String {
    let lower = sql_type.trim().to_ascii_lowercase();
    let alias = aliases
        .iter()
        .find(|(spelling, _)| *spelling == lower)
        .map(|(_, canonical)| *canonical);
    alias.map_or(lower, str::to_string)
}
