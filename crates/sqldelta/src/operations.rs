//! Migration operations.
//!
//! This module defines every structural change the autodetector can emit,
//! along with the table each one applies to, its inverse and the ordering
//! constraints between operations.

use serde::{Deserialize, Serialize};

use crate::schema::{Column, ForeignKey, Fqn, PrimaryKey, Table, UniqueConstraint};

/// A single migration operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Create a new table.
    CreateTable {
        /// Table name.
        fqn: Fqn,
        /// Full table definition.
        table: Table,
        /// Foreign keys going out of the new table, with their constraint
        /// names. Dialects that cannot add a foreign key later declare these
        /// inline; the matching [`Operation::AddForeignKey`] is still emitted.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        foreign_keys: Vec<(ForeignKey, String)>,
    },

    /// Drop a table.
    DropTable {
        /// Table name.
        fqn: Fqn,
    },

    /// Rename a table within its database schema.
    RenameTable {
        /// Name of the table before the rename.
        fqn: Fqn,
        /// New table name.
        new_name: String,
    },

    /// Add a column to a table.
    AddColumn {
        /// Table name.
        fqn: Fqn,
        /// Column name.
        column: String,
        /// Column definition.
        def: Column,
    },

    /// Drop a column from a table.
    DropColumn {
        /// Table name.
        fqn: Fqn,
        /// Column name.
        column: String,
        /// Definition of the dropped column (kept for reversal).
        def: Column,
    },

    /// Rename a column.
    RenameColumn {
        /// Table name.
        fqn: Fqn,
        /// Old column name.
        old_name: String,
        /// New column name.
        new_name: String,
    },

    /// Change a column's type or attributes.
    ChangeColumnType {
        /// Table name.
        fqn: Fqn,
        /// Column name.
        column: String,
        /// Definition before the change.
        from: Column,
        /// Definition after the change.
        to: Column,
    },

    /// Add a primary key to a table that has none.
    AddPrimaryKey {
        /// Table name.
        fqn: Fqn,
        /// The new key.
        primary_key: PrimaryKey,
    },

    /// Drop a table's primary key.
    DropPrimaryKey {
        /// Table name.
        fqn: Fqn,
        /// The dropped key.
        primary_key: PrimaryKey,
    },

    /// Replace a table's primary key.
    ChangePrimaryKey {
        /// Table name.
        fqn: Fqn,
        /// Key before the change.
        old: PrimaryKey,
        /// Key after the change.
        new: PrimaryKey,
    },

    /// Add a unique constraint.
    AddUniqueConstraint {
        /// Table name.
        fqn: Fqn,
        /// The constraint.
        unique: UniqueConstraint,
    },

    /// Drop a unique constraint.
    DropUniqueConstraint {
        /// Table name.
        fqn: Fqn,
        /// The constraint.
        unique: UniqueConstraint,
    },

    /// Add a foreign key constraint.
    AddForeignKey {
        /// The foreign key.
        foreign_key: ForeignKey,
        /// Constraint name.
        constraint_name: String,
    },

    /// Drop a foreign key constraint.
    DropForeignKey {
        /// The foreign key.
        foreign_key: ForeignKey,
        /// Constraint name.
        constraint_name: String,
    },

    /// Rename a foreign key constraint whose tables or columns were renamed.
    RenameForeignKey {
        /// The foreign key, with post-rename table and column names.
        foreign_key: ForeignKey,
        /// Current constraint name.
        old_name: String,
        /// New constraint name.
        new_name: String,
    },

    /// Explicitly does nothing. Rendered as a comment.
    Noop {
        /// Table the placeholder is about.
        fqn: Fqn,
        /// Why nothing happens.
        comment: String,
    },
}

/// Returns true if `op` renames a table so that it becomes `fqn`.
fn renames_into(op: &Operation, fqn: &Fqn) -> bool {
    match op {
        Operation::RenameTable { fqn: old, new_name } => {
            old.schema == fqn.schema && *new_name == fqn.table
        }
        _ => false,
    }
}

/// Returns true if `op` makes `fqn.column` exist, by adding or renaming it.
fn produces_column(op: &Operation, fqn: &Fqn, column: &str) -> bool {
    match op {
        Operation::AddColumn {
            fqn: table,
            column: name,
            ..
        } => table == fqn && name == column,
        Operation::RenameColumn {
            fqn: table,
            new_name,
            ..
        } => table == fqn && new_name == column,
        _ => false,
    }
}

impl Operation {
    /// Returns the table this operation applies to.
    ///
    /// Foreign key operations apply to the referencing table. For
    /// [`Operation::RenameTable`] this is the table being renamed.
    #[must_use]
    pub fn fqn(&self) -> &Fqn {
        match self {
            Self::CreateTable { fqn, .. }
            | Self::DropTable { fqn }
            | Self::RenameTable { fqn, .. }
            | Self::AddColumn { fqn, .. }
            | Self::DropColumn { fqn, .. }
            | Self::RenameColumn { fqn, .. }
            | Self::ChangeColumnType { fqn, .. }
            | Self::AddPrimaryKey { fqn, .. }
            | Self::DropPrimaryKey { fqn, .. }
            | Self::ChangePrimaryKey { fqn, .. }
            | Self::AddUniqueConstraint { fqn, .. }
            | Self::DropUniqueConstraint { fqn, .. }
            | Self::Noop { fqn, .. } => fqn,
            Self::AddForeignKey { foreign_key, .. }
            | Self::DropForeignKey { foreign_key, .. }
            | Self::RenameForeignKey { foreign_key, .. } => &foreign_key.from.fqn,
        }
    }

    /// Variant name, used in error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateTable { .. } => "CreateTable",
            Self::DropTable { .. } => "DropTable",
            Self::RenameTable { .. } => "RenameTable",
            Self::AddColumn { .. } => "AddColumn",
            Self::DropColumn { .. } => "DropColumn",
            Self::RenameColumn { .. } => "RenameColumn",
            Self::ChangeColumnType { .. } => "ChangeColumnType",
            Self::AddPrimaryKey { .. } => "AddPrimaryKey",
            Self::DropPrimaryKey { .. } => "DropPrimaryKey",
            Self::ChangePrimaryKey { .. } => "ChangePrimaryKey",
            Self::AddUniqueConstraint { .. } => "AddUniqueConstraint",
            Self::DropUniqueConstraint { .. } => "DropUniqueConstraint",
            Self::AddForeignKey { .. } => "AddForeignKey",
            Self::DropForeignKey { .. } => "DropForeignKey",
            Self::RenameForeignKey { .. } => "RenameForeignKey",
            Self::Noop { .. } => "Noop",
        }
    }

    /// Returns the operation that undoes this one.
    ///
    /// A dropped table cannot be recreated from the operation alone, so
    /// [`Operation::DropTable`] reverses to [`Operation::Noop`].
    #[must_use]
    pub fn reverse(&self) -> Self {
        match self {
            Self::CreateTable { fqn, .. } => Self::DropTable { fqn: fqn.clone() },

            Self::DropTable { fqn } => Self::Noop {
                fqn: fqn.clone(),
                comment: format!("table '{fqn}' was dropped and cannot be restored"),
            },

            Self::RenameTable { fqn, new_name } => Self::RenameTable {
                fqn: fqn.with_table(new_name.clone()),
                new_name: fqn.table.clone(),
            },

            Self::AddColumn { fqn, column, def } => Self::DropColumn {
                fqn: fqn.clone(),
                column: column.clone(),
                def: def.clone(),
            },

            Self::DropColumn { fqn, column, def } => Self::AddColumn {
                fqn: fqn.clone(),
                column: column.clone(),
                def: def.clone(),
            },

            Self::RenameColumn {
                fqn,
                old_name,
                new_name,
            } => Self::RenameColumn {
                fqn: fqn.clone(),
                old_name: new_name.clone(),
                new_name: old_name.clone(),
            },

            Self::ChangeColumnType {
                fqn,
                column,
                from,
                to,
            } => Self::ChangeColumnType {
                fqn: fqn.clone(),
                column: column.clone(),
                from: to.clone(),
                to: from.clone(),
            },

            Self::AddPrimaryKey { fqn, primary_key } => Self::DropPrimaryKey {
                fqn: fqn.clone(),
                primary_key: primary_key.clone(),
            },

            Self::DropPrimaryKey { fqn, primary_key } => Self::AddPrimaryKey {
                fqn: fqn.clone(),
                primary_key: primary_key.clone(),
            },

            Self::ChangePrimaryKey { fqn, old, new } => Self::ChangePrimaryKey {
                fqn: fqn.clone(),
                old: new.clone(),
                new: old.clone(),
            },

            Self::AddUniqueConstraint { fqn, unique } => Self::DropUniqueConstraint {
                fqn: fqn.clone(),
                unique: unique.clone(),
            },

            Self::DropUniqueConstraint { fqn, unique } => Self::AddUniqueConstraint {
                fqn: fqn.clone(),
                unique: unique.clone(),
            },

            Self::AddForeignKey {
                foreign_key,
                constraint_name,
            } => Self::DropForeignKey {
                foreign_key: foreign_key.clone(),
                constraint_name: constraint_name.clone(),
            },

            Self::DropForeignKey {
                foreign_key,
                constraint_name,
            } => Self::AddForeignKey {
                foreign_key: foreign_key.clone(),
                constraint_name: constraint_name.clone(),
            },

            Self::RenameForeignKey {
                foreign_key,
                old_name,
                new_name,
            } => Self::RenameForeignKey {
                foreign_key: foreign_key.clone(),
                old_name: new_name.clone(),
                new_name: old_name.clone(),
            },

            Self::Noop { .. } => self.clone(),
        }
    }

    /// Returns true if this operation must run after `other`.
    #[must_use]
    #[allow(clippy::too_many_lines)]
    pub fn depends_on(&self, other: &Self) -> bool {
        let per_table = !matches!(
            self,
            Self::CreateTable { .. } | Self::RenameTable { .. } | Self::DropTable { .. }
        );
        if per_table && renames_into(other, self.fqn()) {
            return true;
        }

        match self {
            Self::AddForeignKey { foreign_key, .. } => match other {
                Self::CreateTable { fqn, .. } => foreign_key.depends_on_table(fqn),
                Self::RenameTable { .. } => {
                    renames_into(other, &foreign_key.from.fqn)
                        || renames_into(other, &foreign_key.to.fqn)
                }
                Self::AddColumn { fqn, column, .. }
                | Self::ChangeColumnType { fqn, column, .. }
                | Self::RenameColumn {
                    fqn,
                    new_name: column,
                    ..
                } => foreign_key.depends_on_column(fqn, column),
                Self::AddPrimaryKey { fqn, .. }
                | Self::ChangePrimaryKey { fqn, .. }
                | Self::AddUniqueConstraint { fqn, .. } => *fqn == foreign_key.to.fqn,
                _ => false,
            },

            Self::RenameForeignKey { foreign_key, .. } => match other {
                Self::RenameTable { .. } => {
                    renames_into(other, &foreign_key.from.fqn)
                        || renames_into(other, &foreign_key.to.fqn)
                }
                Self::RenameColumn { fqn, new_name, .. } => {
                    foreign_key.depends_on_column(fqn, new_name)
                }
                _ => false,
            },

            Self::DropTable { fqn } => match other {
                Self::DropForeignKey { foreign_key, .. } => foreign_key.depends_on_table(fqn),
                _ => false,
            },

            Self::DropColumn { fqn, column, .. } => match other {
                Self::DropForeignKey { foreign_key, .. } => {
                    foreign_key.depends_on_column(fqn, column)
                }
                Self::DropUniqueConstraint { fqn: table, unique } => {
                    table == fqn && unique.contains(column)
                }
                Self::DropPrimaryKey {
                    fqn: table,
                    primary_key: key,
                }
                | Self::ChangePrimaryKey {
                    fqn: table,
                    old: key,
                    ..
                } => table == fqn && key.columns.contains(column),
                _ => false,
            },

            Self::ChangeColumnType { fqn, column, .. } => match other {
                Self::DropForeignKey { foreign_key, .. } => {
                    foreign_key.depends_on_column(fqn, column)
                }
                _ => false,
            },

            Self::AddUniqueConstraint { fqn, unique } => match other {
                Self::DropUniqueConstraint {
                    fqn: table,
                    unique: dropped,
                } => table == fqn && dropped.same_columns(unique),
                _ => unique.columns.iter().any(|c| produces_column(other, fqn, c)),
            },

            Self::AddPrimaryKey {
                fqn,
                primary_key: key,
            }
            | Self::ChangePrimaryKey { fqn, new: key, .. } => {
                key.columns.iter().any(|c| produces_column(other, fqn, c))
            }

            _ => false,
        }
    }

    /// Returns a human-readable description of this operation.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::CreateTable { fqn, .. } => format!("Create table '{fqn}'"),
            Self::DropTable { fqn } => format!("Drop table '{fqn}'"),
            Self::RenameTable { fqn, new_name } => {
                format!("Rename table '{fqn}' to '{new_name}'")
            }
            Self::AddColumn { fqn, column, .. } => {
                format!("Add column '{column}' to table '{fqn}'")
            }
            Self::DropColumn { fqn, column, .. } => {
                format!("Drop column '{column}' from table '{fqn}'")
            }
            Self::RenameColumn {
                fqn,
                old_name,
                new_name,
            } => format!("Rename column '{old_name}' to '{new_name}' in table '{fqn}'"),
            Self::ChangeColumnType { fqn, column, .. } => {
                format!("Change column '{column}' in table '{fqn}'")
            }
            Self::AddPrimaryKey { fqn, primary_key } => format!(
                "Add primary key ({}) to table '{fqn}'",
                primary_key.columns.join(", ")
            ),
            Self::DropPrimaryKey { fqn, .. } => format!("Drop primary key from table '{fqn}'"),
            Self::ChangePrimaryKey { fqn, new, .. } => format!(
                "Change primary key of table '{fqn}' to ({})",
                new.columns.join(", ")
            ),
            Self::AddUniqueConstraint { fqn, unique } => format!(
                "Add unique constraint '{}' ({}) to table '{fqn}'",
                unique.name,
                unique.columns.join(", ")
            ),
            Self::DropUniqueConstraint { fqn, unique } => format!(
                "Drop unique constraint '{}' from table '{fqn}'",
                unique.name
            ),
            Self::AddForeignKey {
                foreign_key,
                constraint_name,
            } => format!(
                "Add foreign key '{constraint_name}' from '{}' to '{}'",
                foreign_key.from.fqn, foreign_key.to.fqn
            ),
            Self::DropForeignKey {
                foreign_key,
                constraint_name,
            } => format!(
                "Drop foreign key '{constraint_name}' from table '{}'",
                foreign_key.from.fqn
            ),
            Self::RenameForeignKey {
                foreign_key,
                old_name,
                new_name,
            } => format!(
                "Rename foreign key '{old_name}' to '{new_name}' in table '{}'",
                foreign_key.from.fqn
            ),
            Self::Noop { comment, .. } => format!("Nothing to do: {comment}"),
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnReference;

    fn users() -> Fqn {
        Fqn::new("public", "users")
    }

    fn posts() -> Fqn {
        Fqn::new("public", "posts")
    }

    fn posts_author_fk() -> ForeignKey {
        ForeignKey::new(
            ColumnReference::new(posts(), ["author_id"]),
            ColumnReference::new(users(), ["id"]),
        )
    }

    #[test]
    fn test_create_table_reverse() {
        let op = Operation::CreateTable {
            fqn: users(),
            table: Table::new(users()).column("id", Column::new("bigint")),
            foreign_keys: Vec::new(),
        };

        match op.reverse() {
            Operation::DropTable { fqn } => assert_eq!(fqn, users()),
            _ => panic!("Expected DropTable"),
        }
    }

    #[test]
    fn test_drop_table_reverses_to_noop() {
        let op = Operation::DropTable { fqn: users() };

        match op.reverse() {
            Operation::Noop { fqn, comment } => {
                assert_eq!(fqn, users());
                assert!(comment.contains("public.users"));
            }
            _ => panic!("Expected Noop"),
        }
    }

    #[test]
    fn test_rename_table_reverse() {
        let op = Operation::RenameTable {
            fqn: Fqn::new("public", "old_name"),
            new_name: "new_name".to_string(),
        };

        match op.reverse() {
            Operation::RenameTable { fqn, new_name } => {
                assert_eq!(fqn, Fqn::new("public", "new_name"));
                assert_eq!(new_name, "old_name");
            }
            _ => panic!("Expected RenameTable"),
        }
        assert_eq!(op.reverse().reverse(), op);
    }

    #[test]
    fn test_column_reverses_carry_definition() {
        let def = Column::new("varchar").length(255).not_null();
        let op = Operation::DropColumn {
            fqn: users(),
            column: "email".to_string(),
            def: def.clone(),
        };

        match op.reverse() {
            Operation::AddColumn {
                fqn,
                column,
                def: added,
            } => {
                assert_eq!(fqn, users());
                assert_eq!(column, "email");
                assert_eq!(added, def);
            }
            _ => panic!("Expected AddColumn"),
        }
    }

    #[test]
    fn test_change_column_type_reverse_swaps() {
        let op = Operation::ChangeColumnType {
            fqn: users(),
            column: "price".to_string(),
            from: Column::new("numeric"),
            to: Column::new("numeric").length(10),
        };

        match op.reverse() {
            Operation::ChangeColumnType { from, to, .. } => {
                assert_eq!(from.length, Some(10));
                assert_eq!(to.length, None);
            }
            _ => panic!("Expected ChangeColumnType"),
        }
    }

    #[test]
    fn test_foreign_key_fqn_is_referencing_table() {
        let op = Operation::AddForeignKey {
            foreign_key: posts_author_fk(),
            constraint_name: "posts_author_id_fkey".to_string(),
        };

        assert_eq!(op.fqn(), &posts());
        assert_eq!(op.kind(), "AddForeignKey");
        assert_eq!(
            op.description(),
            "Add foreign key 'posts_author_id_fkey' from 'public.posts' to 'public.users'"
        );
    }

    #[test]
    fn test_ops_run_after_rename_into_their_table() {
        let rename = Operation::RenameTable {
            fqn: Fqn::new("public", "people"),
            new_name: "users".to_string(),
        };
        let add = Operation::AddColumn {
            fqn: users(),
            column: "email".to_string(),
            def: Column::new("text"),
        };
        let drop = Operation::DropTable {
            fqn: users(),
        };

        assert!(add.depends_on(&rename));
        assert!(!rename.depends_on(&add));
        assert!(!drop.depends_on(&rename));
    }

    #[test]
    fn test_add_foreign_key_dependencies() {
        let fk = Operation::AddForeignKey {
            foreign_key: posts_author_fk(),
            constraint_name: "posts_author_id_fkey".to_string(),
        };
        let create_users = Operation::CreateTable {
            fqn: users(),
            table: Table::new(users()),
            foreign_keys: Vec::new(),
        };
        let add_column = Operation::AddColumn {
            fqn: posts(),
            column: "author_id".to_string(),
            def: Column::new("bigint"),
        };
        let add_pk = Operation::AddPrimaryKey {
            fqn: users(),
            primary_key: PrimaryKey::new(["id"]),
        };
        let unrelated = Operation::AddColumn {
            fqn: posts(),
            column: "title".to_string(),
            def: Column::new("text"),
        };

        assert!(fk.depends_on(&create_users));
        assert!(fk.depends_on(&add_column));
        assert!(fk.depends_on(&add_pk));
        assert!(!fk.depends_on(&unrelated));
        assert!(!create_users.depends_on(&fk));
    }

    #[test]
    fn test_drops_run_after_foreign_key_drop() {
        let drop_fk = Operation::DropForeignKey {
            foreign_key: posts_author_fk(),
            constraint_name: "posts_author_id_fkey".to_string(),
        };
        let drop_users = Operation::DropTable { fqn: users() };
        let drop_column = Operation::DropColumn {
            fqn: posts(),
            column: "author_id".to_string(),
            def: Column::new("bigint"),
        };
        let change_type = Operation::ChangeColumnType {
            fqn: users(),
            column: "id".to_string(),
            from: Column::new("int"),
            to: Column::new("bigint"),
        };

        assert!(drop_users.depends_on(&drop_fk));
        assert!(drop_column.depends_on(&drop_fk));
        assert!(change_type.depends_on(&drop_fk));
        assert!(!drop_fk.depends_on(&drop_users));
    }

    #[test]
    fn test_key_dependencies() {
        let drop_unique = Operation::DropUniqueConstraint {
            fqn: users(),
            unique: UniqueConstraint::new("users_email_key", ["email"]),
        };
        let add_unique = Operation::AddUniqueConstraint {
            fqn: users(),
            unique: UniqueConstraint::new("users_email_uq", ["email"]),
        };
        let drop_email = Operation::DropColumn {
            fqn: users(),
            column: "email".to_string(),
            def: Column::new("text"),
        };
        let rename_id = Operation::RenameColumn {
            fqn: users(),
            old_name: "uid".to_string(),
            new_name: "id".to_string(),
        };
        let change_pk = Operation::ChangePrimaryKey {
            fqn: users(),
            old: PrimaryKey::new(["email"]),
            new: PrimaryKey::new(["id"]),
        };

        assert!(add_unique.depends_on(&drop_unique));
        assert!(drop_email.depends_on(&drop_unique));
        assert!(drop_email.depends_on(&change_pk));
        assert!(change_pk.depends_on(&rename_id));
        assert!(!change_pk.depends_on(&drop_email));
    }
}
