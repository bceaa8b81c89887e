//! SQLite dialect for migrations.
//!
//! SQLite has limited ALTER TABLE support: tables and columns can be added,
//! dropped and renamed, but column types, primary keys and foreign keys are
//! fixed at creation time. Foreign keys of a new table are therefore declared
//! in its `CREATE TABLE`. Named unique constraints are unique indexes, so
//! they keep their name and can be dropped later. Everything else is
//! reported as unsupported.
//!
//! Table names are rendered without their schema, since `ALTER TABLE ...
//! RENAME TO` and `CREATE INDEX ... ON` only accept unqualified names.

use crate::error::Result;
use crate::operations::Operation;
use crate::schema::{Column, ForeignKey, Table};
use crate::signature::TypeEquivalence;

use super::{canonical_type, default_unique_name, unsupported, MigrationDialect};

/// Spellings SQLite users commonly mix for the same declared type.
const TYPE_ALIASES: &[(&str, &str)] = &[
    ("int", "integer"),
    ("bool", "boolean"),
    ("character varying", "varchar"),
    ("double precision", "double"),
    ("decimal", "numeric"),
];

/// SQLite migration dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Returns the single auto-increment primary key column, which SQLite
    /// requires to be declared inline.
    fn inline_primary_key(table: &Table) -> Option<&str> {
        let key = table.primary_key.as_ref()?;
        match key.columns.as_slice() {
            [column] if table.get_column(column).is_some_and(|c| c.auto_increment) => {
                Some(column.as_str())
            }
            _ => None,
        }
    }

    /// Generates SQL for creating a table, without its named unique
    /// constraints.
    fn create_table(&self, buf: &mut String, table: &Table, foreign_keys: &[(ForeignKey, String)]) {
        let inline_key = Self::inline_primary_key(table);

        let mut lines: Vec<String> = table
            .columns
            .iter()
            .map(|(name, column)| {
                let mut def = self.column_definition(name, column);
                if inline_key == Some(name.as_str()) {
                    def.push_str(" PRIMARY KEY AUTOINCREMENT");
                }
                def
            })
            .collect();

        if let Some(ref key) = table.primary_key {
            if inline_key.is_none() {
                lines.push(format!("PRIMARY KEY ({})", self.column_list(&key.columns)));
            }
        }

        for unique in table.unique_constraints.iter().filter(|u| u.name.is_empty()) {
            lines.push(format!("UNIQUE ({})", self.column_list(&unique.columns)));
        }

        for (fk, name) in foreign_keys {
            lines.push(format!(
                "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
                self.quote_identifier(name),
                self.column_list(&fk.from.columns),
                self.quote_identifier(&fk.to.fqn.table),
                self.column_list(&fk.to.columns)
            ));
        }

        buf.push_str("CREATE TABLE ");
        buf.push_str(&self.quote_identifier(&table.fqn.table));
        buf.push_str(" (\n  ");
        buf.push_str(&lines.join(",\n  "));
        buf.push_str("\n)");
    }
}

impl TypeEquivalence for SqliteDialect {
    fn equivalent(&self, a: &Column, b: &Column) -> bool {
        canonical_type(&a.sql_type, TYPE_ALIASES) == canonical_type(&b.sql_type, TYPE_ALIASES)
            && a.length == b.length
    }
}

impl MigrationDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn inline_foreign_keys(&self) -> bool {
        true
    }

    /// A new table is followed by one `CREATE UNIQUE INDEX` per named unique
    /// constraint.
    fn statements(&self, operation: &Operation) -> Result<Vec<String>> {
        let mut statements = vec![self.render(operation)?];
        if let Operation::CreateTable { fqn, table, .. } = operation {
            for unique in table.unique_constraints.iter().filter(|u| !u.name.is_empty()) {
                statements.push(self.render(&Operation::AddUniqueConstraint {
                    fqn: fqn.clone(),
                    unique: unique.clone(),
                })?);
            }
        }
        Ok(statements)
    }

    fn append_sql(&self, buf: &mut String, operation: &Operation) -> Result<()> {
        match operation {
            Operation::CreateTable {
                table,
                foreign_keys,
                ..
            } => self.create_table(buf, table, foreign_keys),

            Operation::DropTable { fqn } => {
                buf.push_str("DROP TABLE ");
                buf.push_str(&self.quote_identifier(&fqn.table));
            }

            Operation::RenameTable { fqn, new_name } => {
                buf.push_str(&format!(
                    "ALTER TABLE {} RENAME TO {}",
                    self.quote_identifier(&fqn.table),
                    self.quote_identifier(new_name)
                ));
            }

            // SQLite 3.35.0+ for DROP COLUMN, 3.25.0+ for RENAME COLUMN.
            Operation::AddColumn { fqn, column, def } => {
                buf.push_str(&format!(
                    "ALTER TABLE {} ADD COLUMN {}",
                    self.quote_identifier(&fqn.table),
                    self.column_definition(column, def)
                ));
            }

            Operation::DropColumn { fqn, column, .. } => {
                buf.push_str(&format!(
                    "ALTER TABLE {} DROP COLUMN {}",
                    self.quote_identifier(&fqn.table),
                    self.quote_identifier(column)
                ));
            }

            Operation::RenameColumn {
                fqn,
                old_name,
                new_name,
            } => {
                buf.push_str(&format!(
                    "ALTER TABLE {} RENAME COLUMN {} TO {}",
                    self.quote_identifier(&fqn.table),
                    self.quote_identifier(old_name),
                    self.quote_identifier(new_name)
                ));
            }

            Operation::AddUniqueConstraint { fqn, unique } => {
                let name = if unique.name.is_empty() {
                    default_unique_name(&fqn.table, &unique.columns)
                } else {
                    unique.name.clone()
                };
                buf.push_str(&format!(
                    "CREATE UNIQUE INDEX {} ON {} ({})",
                    self.quote_identifier(&name),
                    self.quote_identifier(&fqn.table),
                    self.column_list(&unique.columns)
                ));
            }

            // Constraints declared in CREATE TABLE are backed by internal
            // indexes that cannot be dropped.
            Operation::DropUniqueConstraint { unique, .. } if !unique.name.is_empty() => {
                buf.push_str("DROP INDEX ");
                buf.push_str(&self.quote_identifier(&unique.name));
            }

            Operation::Noop { comment, .. } => {
                buf.push_str("-- ");
                buf.push_str(comment);
            }

            _ => return Err(unsupported(self, operation)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MigrateError;
    use crate::schema::{ColumnReference, Fqn, PrimaryKey, UniqueConstraint};

    fn users() -> Fqn {
        Fqn::new("main", "users")
    }

    fn render(op: &Operation) -> Result<String> {
        SqliteDialect::new().render(op)
    }

    #[test]
    fn test_create_table_inline_autoincrement() {
        let table = Table::new(users())
            .column("id", Column::new("integer").not_null().auto_increment())
            .column("email", Column::new("varchar").length(255).not_null())
            .primary_key(["id"])
            .unique_constraint(UniqueConstraint::new("", ["email"]));

        let sql = render(&Operation::CreateTable {
            fqn: users(),
            table,
            foreign_keys: Vec::new(),
        })
        .unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE \"users\" (\n  \
             \"email\" varchar(255) NOT NULL,\n  \
             \"id\" integer NOT NULL PRIMARY KEY AUTOINCREMENT,\n  \
             UNIQUE (\"email\")\n)"
        );
    }

    #[test]
    fn test_create_table_composite_key() {
        let table = Table::new(users())
            .column("org_id", Column::new("integer").not_null())
            .column("user_id", Column::new("integer").not_null())
            .primary_key(["org_id", "user_id"]);

        let sql = render(&Operation::CreateTable {
            fqn: users(),
            table,
            foreign_keys: Vec::new(),
        })
        .unwrap();
        assert!(sql.ends_with("PRIMARY KEY (\"org_id\", \"user_id\")\n)"));
    }

    #[test]
    fn test_create_table_declares_keys_by_name() {
        let posts = Fqn::new("main", "posts");
        let table = Table::new(posts.clone())
            .column("id", Column::new("integer").not_null())
            .column("author_id", Column::new("integer"))
            .column("slug", Column::new("text"))
            .primary_key(["id"])
            .unique_constraint(UniqueConstraint::new("posts_slug_key", ["slug"]));
        let fk = ForeignKey::new(
            ColumnReference::new(posts.clone(), ["author_id"]),
            ColumnReference::new(users(), ["id"]),
        );

        let statements = SqliteDialect::new()
            .statements(&Operation::CreateTable {
                fqn: posts,
                table,
                foreign_keys: vec![(fk, "posts_author_id_fkey".to_string())],
            })
            .unwrap();
        assert_eq!(
            statements,
            vec![
                "CREATE TABLE \"posts\" (\n  \
                 \"author_id\" integer,\n  \
                 \"id\" integer NOT NULL,\n  \
                 \"slug\" text,\n  \
                 PRIMARY KEY (\"id\"),\n  \
                 CONSTRAINT \"posts_author_id_fkey\" FOREIGN KEY (\"author_id\") \
                 REFERENCES \"users\" (\"id\")\n)",
                "CREATE UNIQUE INDEX \"posts_slug_key\" ON \"posts\" (\"slug\")",
            ]
        );
    }

    #[test]
    fn test_column_operations() {
        let add = render(&Operation::AddColumn {
            fqn: users(),
            column: "bio".to_string(),
            def: Column::new("text").default("''"),
        })
        .unwrap();
        let rename = render(&Operation::RenameColumn {
            fqn: users(),
            old_name: "bio".to_string(),
            new_name: "about".to_string(),
        })
        .unwrap();

        assert_eq!(add, "ALTER TABLE \"users\" ADD COLUMN \"bio\" text DEFAULT ''");
        assert_eq!(
            rename,
            "ALTER TABLE \"users\" RENAME COLUMN \"bio\" TO \"about\""
        );
    }

    #[test]
    fn test_unique_constraints_are_indexes() {
        let add = render(&Operation::AddUniqueConstraint {
            fqn: users(),
            unique: UniqueConstraint::new("", ["email"]),
        })
        .unwrap();
        let drop = render(&Operation::DropUniqueConstraint {
            fqn: users(),
            unique: UniqueConstraint::new("users_email_key", ["email"]),
        })
        .unwrap();

        assert_eq!(
            add,
            "CREATE UNIQUE INDEX \"users_email_key\" ON \"users\" (\"email\")"
        );
        assert_eq!(drop, "DROP INDEX \"users_email_key\"");
        assert!(render(&Operation::DropUniqueConstraint {
            fqn: users(),
            unique: UniqueConstraint::new("", ["email"]),
        })
        .is_err());
    }

    #[test]
    fn test_unsupported_operations() {
        let op = Operation::AddPrimaryKey {
            fqn: users(),
            primary_key: PrimaryKey::new(["id"]),
        };

        match render(&op) {
            Err(MigrateError::Unsupported { dialect, operation }) => {
                assert_eq!(dialect, "sqlite");
                assert_eq!(operation, "AddPrimaryKey");
            }
            _ => panic!("Expected Unsupported"),
        }
    }

    #[test]
    fn test_type_aliases_are_equivalent() {
        let dialect = SqliteDialect::new();

        assert!(dialect.equivalent(&Column::new("INT"), &Column::new("integer")));
        assert!(!dialect.equivalent(&Column::new("integer"), &Column::new("text")));
    }
}
