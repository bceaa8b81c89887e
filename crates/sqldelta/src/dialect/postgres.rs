//! PostgreSQL dialect for migrations.
//!
//! PostgreSQL can alter columns and constraints in place, so every operation
//! renders as a single statement.

use crate::error::Result;
use crate::operations::Operation;
use crate::schema::{default_pk_name, Column, Fqn, PrimaryKey, Table};
use crate::signature::TypeEquivalence;

use super::{canonical_type, default_unique_name, MigrationDialect};

/// Spellings PostgreSQL accepts for the same type.
const TYPE_ALIASES: &[(&str, &str)] = &[
    ("int", "integer"),
    ("int4", "integer"),
    ("int8", "bigint"),
    ("int2", "smallint"),
    ("serial4", "serial"),
    ("serial8", "bigserial"),
    ("character varying", "varchar"),
    ("character", "char"),
    ("bpchar", "char"),
    ("bool", "boolean"),
    ("float8", "double precision"),
    ("float4", "real"),
    ("decimal", "numeric"),
    ("timestamp without time zone", "timestamp"),
    ("timestamp with time zone", "timestamptz"),
    ("time without time zone", "time"),
    ("time with time zone", "timetz"),
];

/// PostgreSQL migration dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Creates a new PostgreSQL dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Schema-qualified, quoted table name.
    fn table_name(&self, fqn: &Fqn) -> String {
        if fqn.schema.is_empty() {
            self.quote_identifier(&fqn.table)
        } else {
            format!(
                "{}.{}",
                self.quote_identifier(&fqn.schema),
                self.quote_identifier(&fqn.table)
            )
        }
    }

    /// Type used when the column is created: auto-increment integers become
    /// the matching serial type.
    fn create_type_name(&self, column: &Column) -> String {
        if !column.auto_increment {
            return self.type_name(column);
        }
        match canonical_type(&column.sql_type, TYPE_ALIASES).as_str() {
            "bigint" => "bigserial".to_string(),
            "smallint" => "smallserial".to_string(),
            _ => "serial".to_string(),
        }
    }

    fn create_column(&self, name: &str, column: &Column) -> String {
        let mut parts = vec![self.quote_identifier(name), self.create_type_name(column)];
        if column.identity {
            parts.push("GENERATED BY DEFAULT AS IDENTITY".to_string());
        }
        if !column.nullable {
            parts.push("NOT NULL".to_string());
        }
        if let Some(ref default) = column.default {
            parts.push(format!("DEFAULT {default}"));
        }
        parts.join(" ")
    }

    fn primary_key_clause(&self, key: &PrimaryKey) -> String {
        let columns = self.column_list(&key.columns);
        key.name.as_ref().map_or_else(
            || format!("PRIMARY KEY ({columns})"),
            |name| format!("CONSTRAINT {} PRIMARY KEY ({columns})", self.quote_identifier(name)),
        )
    }

    /// Name of the primary key constraint.
    ///
    /// An unnamed key is assumed to carry the default name of the table it
    /// is on. The autodetector names keys of renamed tables explicitly,
    /// since the database keeps the name from before the rename.
    fn primary_key_name(fqn: &Fqn, key: &PrimaryKey) -> String {
        key.name
            .clone()
            .unwrap_or_else(|| default_pk_name(&fqn.table))
    }

    fn unique_name(fqn: &Fqn, name: &str, columns: &[String]) -> String {
        if name.is_empty() {
            default_unique_name(&fqn.table, columns)
        } else {
            name.to_string()
        }
    }

    fn create_table(&self, buf: &mut String, fqn: &Fqn, table: &Table) {
        let mut lines: Vec<String> = table
            .columns
            .iter()
            .map(|(name, column)| self.create_column(name, column))
            .collect();

        if let Some(ref key) = table.primary_key {
            lines.push(self.primary_key_clause(key));
        }

        for unique in &table.unique_constraints {
            let columns = self.column_list(&unique.columns);
            if unique.name.is_empty() {
                lines.push(format!("UNIQUE ({columns})"));
            } else {
                lines.push(format!(
                    "CONSTRAINT {} UNIQUE ({columns})",
                    self.quote_identifier(&unique.name)
                ));
            }
        }

        buf.push_str("CREATE TABLE ");
        buf.push_str(&self.table_name(fqn));
        buf.push_str(" (\n  ");
        buf.push_str(&lines.join(",\n  "));
        buf.push_str("\n)");
    }

    /// `ALTER COLUMN` actions turning `from` into `to`.
    fn alter_column_actions(&self, column: &str, from: &Column, to: &Column) -> Vec<String> {
        let target = format!("ALTER COLUMN {}", self.quote_identifier(column));
        let mut actions = Vec::new();

        if !self.equivalent(from, to) {
            actions.push(format!("{target} TYPE {}", self.type_name(to)));
        }
        if from.nullable != to.nullable {
            let verb = if to.nullable { "DROP" } else { "SET" };
            actions.push(format!("{target} {verb} NOT NULL"));
        }
        if from.default != to.default {
            actions.push(to.default.as_ref().map_or_else(
                || format!("{target} DROP DEFAULT"),
                |default| format!("{target} SET DEFAULT {default}"),
            ));
        }
        if from.identity != to.identity {
            if to.identity {
                actions.push(format!("{target} ADD GENERATED BY DEFAULT AS IDENTITY"));
            } else {
                actions.push(format!("{target} DROP IDENTITY IF EXISTS"));
            }
        }
        actions
    }
}

impl TypeEquivalence for PostgresDialect {
    fn equivalent(&self, a: &Column, b: &Column) -> bool {
        canonical_type(&a.sql_type, TYPE_ALIASES) == canonical_type(&b.sql_type, TYPE_ALIASES)
            && a.length == b.length
    }
}

impl MigrationDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn append_sql(&self, buf: &mut String, operation: &Operation) -> Result<()> {
        let alter = |fqn: &Fqn| format!("ALTER TABLE {} ", self.table_name(fqn));

        match operation {
            Operation::CreateTable { fqn, table, .. } => self.create_table(buf, fqn, table),

            Operation::DropTable { fqn } => {
                buf.push_str("DROP TABLE ");
                buf.push_str(&self.table_name(fqn));
            }

            Operation::RenameTable { fqn, new_name } => {
                buf.push_str(&alter(fqn));
                buf.push_str("RENAME TO ");
                buf.push_str(&self.quote_identifier(new_name));
            }

            Operation::AddColumn { fqn, column, def } => {
                buf.push_str(&alter(fqn));
                buf.push_str("ADD COLUMN ");
                buf.push_str(&self.create_column(column, def));
            }

            Operation::DropColumn { fqn, column, .. } => {
                buf.push_str(&alter(fqn));
                buf.push_str("DROP COLUMN ");
                buf.push_str(&self.quote_identifier(column));
            }

            Operation::RenameColumn {
                fqn,
                old_name,
                new_name,
            } => {
                buf.push_str(&alter(fqn));
                buf.push_str(&format!(
                    "RENAME COLUMN {} TO {}",
                    self.quote_identifier(old_name),
                    self.quote_identifier(new_name)
                ));
            }

            Operation::ChangeColumnType {
                fqn,
                column,
                from,
                to,
            } => {
                let actions = self.alter_column_actions(column, from, to);
                if actions.is_empty() {
                    buf.push_str(&format!("-- {}: nothing to alter", operation.description()));
                } else {
                    buf.push_str(&alter(fqn));
                    buf.push_str(&actions.join(", "));
                }
            }

            Operation::AddPrimaryKey { fqn, primary_key } => {
                buf.push_str(&alter(fqn));
                buf.push_str("ADD ");
                buf.push_str(&self.primary_key_clause(primary_key));
            }

            Operation::DropPrimaryKey { fqn, primary_key } => {
                buf.push_str(&alter(fqn));
                buf.push_str("DROP CONSTRAINT ");
                buf.push_str(&self.quote_identifier(&Self::primary_key_name(fqn, primary_key)));
            }

            Operation::ChangePrimaryKey { fqn, old, new } => {
                buf.push_str(&alter(fqn));
                buf.push_str(&format!(
                    "DROP CONSTRAINT {}, ADD {}",
                    self.quote_identifier(&Self::primary_key_name(fqn, old)),
                    self.primary_key_clause(new)
                ));
            }

            Operation::AddUniqueConstraint { fqn, unique } => {
                let name = Self::unique_name(fqn, &unique.name, &unique.columns);
                buf.push_str(&alter(fqn));
                buf.push_str(&format!(
                    "ADD CONSTRAINT {} UNIQUE ({})",
                    self.quote_identifier(&name),
                    self.column_list(&unique.columns)
                ));
            }

            Operation::DropUniqueConstraint { fqn, unique } => {
                let name = Self::unique_name(fqn, &unique.name, &unique.columns);
                buf.push_str(&alter(fqn));
                buf.push_str("DROP CONSTRAINT ");
                buf.push_str(&self.quote_identifier(&name));
            }

            Operation::AddForeignKey {
                foreign_key,
                constraint_name,
            } => {
                buf.push_str(&alter(&foreign_key.from.fqn));
                buf.push_str(&format!(
                    "ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
                    self.quote_identifier(constraint_name),
                    self.column_list(&foreign_key.from.columns),
                    self.table_name(&foreign_key.to.fqn),
                    self.column_list(&foreign_key.to.columns)
                ));
            }

            Operation::DropForeignKey {
                foreign_key,
                constraint_name,
            } => {
                buf.push_str(&alter(&foreign_key.from.fqn));
                buf.push_str("DROP CONSTRAINT ");
                buf.push_str(&self.quote_identifier(constraint_name));
            }

            Operation::RenameForeignKey {
                foreign_key,
                old_name,
                new_name,
            } => {
                buf.push_str(&alter(&foreign_key.from.fqn));
                buf.push_str(&format!(
                    "RENAME CONSTRAINT {} TO {}",
                    self.quote_identifier(old_name),
                    self.quote_identifier(new_name)
                ));
            }

            Operation::Noop { comment, .. } => {
                buf.push_str("-- ");
                buf.push_str(comment);
            }
        }
        Ok(())
    }
}
