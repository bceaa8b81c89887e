//! In-memory schema evolution.
//!
//! [`SchemaState`] applies operations to a [`Schema`] the way a database would
//! apply the rendered statements, rejecting operations the schema cannot
//! accept. This checks a changeset without a database connection: applying
//! `diff(a, b)` to `a` must produce `b`.

use crate::changeset::Changeset;
use crate::error::{MigrateError, Result};
use crate::operations::Operation;
use crate::schema::{ForeignKey, Fqn, Schema, Table};

/// A schema that operations can be applied to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaState {
    schema: Schema,
}

fn missing_table(fqn: &Fqn) -> MigrateError {
    MigrateError::InvalidState(format!("Table '{fqn}' does not exist"))
}

fn missing_column(fqn: &Fqn, column: &str) -> MigrateError {
    MigrateError::InvalidState(format!("Column '{column}' does not exist in table '{fqn}'"))
}

impl SchemaState {
    /// Creates a new empty schema state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            schema: Schema::new(),
        }
    }

    /// Returns the current schema.
    #[must_use]
    pub const fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Consumes and returns the schema.
    #[must_use]
    pub fn into_schema(self) -> Schema {
        self.schema
    }

    /// Applies every operation of a changeset, in order.
    ///
    /// # Errors
    ///
    /// Stops at the first operation [`Self::apply_operation`] rejects.
    pub fn apply_changeset(&mut self, changeset: &Changeset) -> Result<()> {
        for operation in changeset {
            self.apply_operation(operation)?;
        }
        Ok(())
    }

    fn table_mut(&mut self, fqn: &Fqn) -> Result<&mut Table> {
        self.schema
            .get_table_mut(fqn)
            .ok_or_else(|| missing_table(fqn))
    }

    fn rewrite_foreign_keys(&mut self, rewrite: impl Fn(&mut ForeignKey)) {
        let foreign_keys = std::mem::take(&mut self.schema.foreign_keys);
        self.schema.foreign_keys = foreign_keys
            .into_iter()
            .map(|(mut fk, name)| {
                rewrite(&mut fk);
                (fk, name)
            })
            .collect();
    }

    fn check_column_exists(&self, fqn: &Fqn, columns: &[String]) -> Result<()> {
        let table = self.schema.get_table(fqn).ok_or_else(|| missing_table(fqn))?;
        columns
            .iter()
            .find(|c| table.get_column(c).is_none())
            .map_or(Ok(()), |column| Err(missing_column(fqn, column)))
    }

    /// Applies a single operation to the schema state.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::InvalidState`] when the operation does not fit
    /// the current state, e.g. a missing table or a duplicate column.
    #[allow(clippy::too_many_lines)]
    pub fn apply_operation(&mut self, operation: &Operation) -> Result<()> {
        match operation {
            // Foreign keys carried by the table arrive as their own operations.
            Operation::CreateTable { fqn, table, .. } => {
                if self.schema.get_table(fqn).is_some() {
                    return Err(MigrateError::InvalidState(format!("Table '{fqn}' already exists")));
                }
                let mut table = table.clone();
                table.fqn = fqn.clone();
                self.schema.add_table(table);
            }

            Operation::DropTable { fqn } => {
                if self.schema.get_table(fqn).is_none() {
                    return Err(missing_table(fqn));
                }
                if let Some(name) = self
                    .schema
                    .foreign_keys
                    .iter()
                    .find(|(fk, _)| fk.depends_on_table(fqn))
                    .map(|(_, name)| name)
                {
                    return Err(MigrateError::InvalidState(format!(
                        "Table '{fqn}' is still referenced by foreign key '{name}'"
                    )));
                }
                self.schema.tables.remove(fqn);
            }

            Operation::RenameTable { fqn, new_name } => {
                let new = fqn.with_table(new_name.clone());
                if self.schema.get_table(&new).is_some() {
                    return Err(MigrateError::InvalidState(format!("Table '{new}' already exists")));
                }
                let mut table = self
                    .schema
                    .tables
                    .remove(fqn)
                    .ok_or_else(|| missing_table(fqn))?;
                table.fqn = new.clone();
                self.schema.add_table(table);
                self.rewrite_foreign_keys(|fk| {
                    for side in [&mut fk.from, &mut fk.to] {
                        if side.fqn == *fqn {
                            side.fqn = new.clone();
                        }
                    }
                });
            }

            Operation::AddColumn { fqn, column, def } => {
                let table = self.table_mut(fqn)?;
                if table.get_column(column).is_some() {
                    return Err(MigrateError::InvalidState(format!(
                        "Column '{column}' already exists in table '{fqn}'"
                    )));
                }
                table.columns.insert(column.clone(), def.clone());
            }

            Operation::DropColumn { fqn, column, .. } => {
                if let Some(name) = self
                    .schema
                    .foreign_keys
                    .iter()
                    .find(|(fk, _)| fk.depends_on_column(fqn, column))
                    .map(|(_, name)| name)
                {
                    return Err(MigrateError::InvalidState(format!(
                        "Column '{column}' of table '{fqn}' is still referenced \
                         by foreign key '{name}'"
                    )));
                }
                let table = self.table_mut(fqn)?;
                if table.columns.remove(column).is_none() {
                    return Err(missing_column(fqn, column));
                }
            }

            Operation::RenameColumn {
                fqn,
                old_name,
                new_name,
            } => {
                let table = self.table_mut(fqn)?;
                if table.get_column(new_name).is_some() {
                    return Err(MigrateError::InvalidState(format!(
                        "Column '{new_name}' already exists in table '{fqn}'"
                    )));
                }
                let def = table
                    .columns
                    .remove(old_name)
                    .ok_or_else(|| missing_column(fqn, old_name))?;
                table.columns.insert(new_name.clone(), def);
                table.rename_key_column(old_name, new_name);
                self.rewrite_foreign_keys(|fk| {
                    for side in [&mut fk.from, &mut fk.to] {
                        if side.fqn != *fqn {
                            continue;
                        }
                        for column in side
                            .columns
                            .iter_mut()
                            .filter(|c| c.as_str() == old_name.as_str())
                        {
                            *column = new_name.clone();
                        }
                    }
                });
            }

            Operation::ChangeColumnType { fqn, column, to, .. } => {
                let table = self.table_mut(fqn)?;
                let def = table
                    .columns
                    .get_mut(column)
                    .ok_or_else(|| missing_column(fqn, column))?;
                *def = to.clone();
            }

            Operation::AddPrimaryKey { fqn, primary_key } => {
                self.check_column_exists(fqn, &primary_key.columns)?;
                let table = self.table_mut(fqn)?;
                if table.primary_key.is_some() {
                    return Err(MigrateError::InvalidState(format!(
                        "Table '{fqn}' already has a primary key"
                    )));
                }
                table.primary_key = Some(primary_key.clone());
            }

            Operation::DropPrimaryKey { fqn, .. } => {
                let table = self.table_mut(fqn)?;
                if table.primary_key.take().is_none() {
                    return Err(MigrateError::InvalidState(format!(
                        "Table '{fqn}' has no primary key"
                    )));
                }
            }

            Operation::ChangePrimaryKey { fqn, new, .. } => {
                self.check_column_exists(fqn, &new.columns)?;
                let table = self.table_mut(fqn)?;
                match table.primary_key {
                    Some(ref mut key) => *key = new.clone(),
                    None => {
                        return Err(MigrateError::InvalidState(format!(
                            "Table '{fqn}' has no primary key"
                        )))
                    }
                }
            }

            Operation::AddUniqueConstraint { fqn, unique } => {
                self.check_column_exists(fqn, &unique.columns)?;
                let table = self.table_mut(fqn)?;
                if table.unique_constraints.contains(unique) {
                    return Err(MigrateError::InvalidState(format!(
                        "Unique constraint '{}' already exists in table '{}'",
                        unique.name, fqn
                    )));
                }
                table.unique_constraints.push(unique.clone());
            }

            Operation::DropUniqueConstraint { fqn, unique } => {
                let table = self.table_mut(fqn)?;
                let idx = table
                    .unique_constraints
                    .iter()
                    .position(|u| u == unique)
                    .ok_or_else(|| {
                        MigrateError::InvalidState(format!(
                            "Unique constraint '{}' does not exist in table '{}'",
                            unique.name, fqn
                        ))
                    })?;
                table.unique_constraints.remove(idx);
            }

            Operation::AddForeignKey {
                foreign_key,
                constraint_name,
            } => {
                self.check_column_exists(&foreign_key.from.fqn, &foreign_key.from.columns)?;
                self.check_column_exists(&foreign_key.to.fqn, &foreign_key.to.columns)?;
                if self.schema.foreign_keys.contains_key(foreign_key) {
                    return Err(MigrateError::InvalidState(format!(
                        "Foreign key '{constraint_name}' already exists"
                    )));
                }
                self.schema
                    .foreign_keys
                    .insert(foreign_key.clone(), constraint_name.clone());
            }

            Operation::DropForeignKey {
                foreign_key,
                constraint_name,
            } => {
                if self.schema.foreign_keys.remove(foreign_key).is_none() {
                    return Err(MigrateError::InvalidState(format!(
                        "Foreign key '{constraint_name}' does not exist"
                    )));
                }
            }

            Operation::RenameForeignKey {
                foreign_key,
                old_name,
                new_name,
            } => {
                let name = self
                    .schema
                    .foreign_keys
                    .get_mut(foreign_key)
                    .ok_or_else(|| {
                        MigrateError::InvalidState(format!(
                            "Foreign key '{old_name}' does not exist"
                        ))
                    })?;
                *name = new_name.clone();
            }

            Operation::Noop { .. } => {}
        }
        Ok(())
    }
}

impl From<Schema> for SchemaState {
    fn from(schema: Schema) -> Self {
        Self { schema }
    }
}
