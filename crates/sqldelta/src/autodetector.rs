//! Autodetector for generating migrations from schema changes.
//!
//! This module compares the schema found in a database (current) with the
//! schema the application expects (target) and emits the operations that turn
//! one into the other. Tables and columns that disappear under one name and
//! appear under another with the same shape are reported as renames, and
//! foreign keys follow those renames instead of being dropped and re-created.
//!
//! The returned [`Changeset`] is unordered; call [`Changeset::resolve`] before
//! rendering or applying it.

use std::collections::BTreeMap;
use std::fmt;

use tracing::debug;

use crate::changeset::Changeset;
use crate::error::{MigrateError, Result};
use crate::operations::Operation;
use crate::refmap::RefMap;
use crate::schema::{default_fk_name, default_pk_name, Column, ForeignKey, Fqn, Schema, Table};
use crate::signature::{can_rename, equal_columns, ExactTypes, TypeEquivalence};

/// Options for the autodetector.
#[derive(Clone)]
pub struct AutodetectorOptions {
    /// Fail with [`MigrateError::AmbiguousRename`] when more than one current
    /// table or column could have been renamed to the same target. Otherwise
    /// the first candidate in name order wins.
    pub strict_renames: bool,
    /// Emit [`Operation::RenameForeignKey`] for foreign keys whose tables or
    /// columns were renamed, so their constraint names follow the convention.
    pub detect_renamed_fks: bool,
    /// Naming convention for foreign key constraints.
    pub fk_name: fn(&ForeignKey) -> String,
}

impl Default for AutodetectorOptions {
    fn default() -> Self {
        Self {
            strict_renames: false,
            detect_renamed_fks: false,
            fk_name: default_fk_name,
        }
    }
}

impl fmt::Debug for AutodetectorOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutodetectorOptions")
            .field("strict_renames", &self.strict_renames)
            .field("detect_renamed_fks", &self.detect_renamed_fks)
            .finish_non_exhaustive()
    }
}

impl AutodetectorOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes ambiguous renames an error.
    #[must_use]
    pub const fn with_strict_renames(mut self) -> Self {
        self.strict_renames = true;
        self
    }

    /// Enables foreign key constraint renames.
    #[must_use]
    pub const fn with_renamed_fks(mut self) -> Self {
        self.detect_renamed_fks = true;
        self
    }

    /// Sets the foreign key naming convention.
    #[must_use]
    pub const fn with_fk_naming(mut self, fk_name: fn(&ForeignKey) -> String) -> Self {
        self.fk_name = fk_name;
        self
    }
}

/// Detects schema changes and generates migration operations.
#[derive(Debug)]
pub struct Autodetector<E = ExactTypes> {
    options: AutodetectorOptions,
    types: E,
}

impl Default for Autodetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Autodetector {
    /// Creates a new autodetector with default options, comparing types by
    /// their spelling.
    #[must_use]
    pub fn new() -> Self {
        Self {
            options: AutodetectorOptions::default(),
            types: ExactTypes,
        }
    }

    /// Creates a new autodetector with custom options.
    #[must_use]
    pub const fn with_options(options: AutodetectorOptions) -> Self {
        Self {
            options,
            types: ExactTypes,
        }
    }
}

impl<E: TypeEquivalence> Autodetector<E> {
    /// Uses `types` to decide whether two column types are the same.
    #[must_use]
    pub fn with_types<T: TypeEquivalence>(self, types: T) -> Autodetector<T> {
        Autodetector {
            options: self.options,
            types,
        }
    }

    /// Returns the options.
    #[must_use]
    pub const fn options(&self) -> &AutodetectorOptions {
        &self.options
    }

    /// Compares two schemas and returns the operations needed to transform
    /// `current` into `target`.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::AmbiguousRename`] in strict rename mode when a
    /// rename has more than one candidate.
    pub fn diff(&self, current: &Schema, target: &Schema) -> Result<Changeset> {
        let mut detector = Detector {
            types: &self.types,
            options: &self.options,
            refs: RefMap::new(&current.foreign_keys),
            changes: Changeset::new(),
        };

        let mut remaining = current.tables.clone();
        for (fqn, target_table) in &target.tables {
            if let Some(mut current_table) = remaining.remove(fqn) {
                detector.diff_columns(&mut current_table, target_table, true)?;
                detector.diff_constraints(&current_table, target_table);
                continue;
            }

            let renamed = detector
                .find_renamed_table(&remaining, target, target_table)?
                .and_then(|old| remaining.remove(&old));
            let Some(mut current_table) = renamed else {
                let foreign_keys = target
                    .foreign_keys
                    .iter()
                    .filter(|(fk, _)| fk.from.fqn == *fqn)
                    .map(|(fk, name)| (fk.clone(), detector.constraint_name(fk, name)))
                    .collect();
                detector.changes.push(Operation::CreateTable {
                    fqn: fqn.clone(),
                    table: target_table.clone(),
                    foreign_keys,
                });
                continue;
            };

            debug!(from = %current_table.fqn, to = %fqn, "Detected table rename");
            // The key keeps the name it was created under.
            if let Some(key) = current_table.primary_key.as_mut() {
                key.name.get_or_insert_with(|| default_pk_name(&current_table.fqn.table));
            }
            detector.changes.push(Operation::RenameTable {
                fqn: current_table.fqn.clone(),
                new_name: fqn.table.clone(),
            });
            detector.refs.rename_table(&current_table.fqn, &fqn.table);
            current_table.fqn = fqn.clone();
            detector.diff_columns(&mut current_table, target_table, false)?;
            detector.diff_constraints(&current_table, target_table);
        }

        for fqn in remaining.keys() {
            if !target.tables.contains_key(fqn) {
                detector
                    .changes
                    .push(Operation::DropTable { fqn: fqn.clone() });
            }
        }

        detector.diff_foreign_keys(target);

        debug!(operations = detector.changes.len(), "Schema diff complete");
        Ok(detector.changes)
    }
}

/// Compares `current` with `target` using `types` for type equivalence and
/// default options.
///
/// # Errors
///
/// Never fails with default options; see [`Autodetector::diff`].
pub fn diff<E>(current: &Schema, target: &Schema, types: E) -> Result<Changeset>
where
    E: TypeEquivalence,
{
    Autodetector::new().with_types(types).diff(current, target)
}

/// Working state of one diff.
struct Detector<'a, E: ?Sized> {
    types: &'a E,
    options: &'a AutodetectorOptions,
    refs: RefMap,
    changes: Changeset,
}

impl<E: TypeEquivalence + ?Sized> Detector<'_, E> {
    /// Constraint name for a target foreign key, applying the naming
    /// convention when the target leaves it empty.
    fn constraint_name(&self, fk: &ForeignKey, name: &str) -> String {
        if name.is_empty() {
            (self.options.fk_name)(fk)
        } else {
            name.to_string()
        }
    }

    /// Picks the first of `candidates`, or fails if strict mode forbids
    /// choosing among several.
    fn pick<'c>(
        &self,
        scope: &str,
        target: &str,
        mut candidates: impl Iterator<Item = &'c str>,
    ) -> Result<Option<String>> {
        let Some(first) = candidates.next() else {
            return Ok(None);
        };
        if self.options.strict_renames {
            let others: Vec<&str> = candidates.collect();
            if !others.is_empty() {
                return Err(MigrateError::AmbiguousRename {
                    table: scope.to_string(),
                    target: target.to_string(),
                    candidates: std::iter::once(first)
                        .chain(others)
                        .map(str::to_string)
                        .collect(),
                });
            }
        }
        Ok(Some(first.to_string()))
    }

    /// Finds a current table that `target_table` may be a renamed copy of.
    fn find_renamed_table(
        &self,
        remaining: &BTreeMap<Fqn, Table>,
        target: &Schema,
        target_table: &Table,
    ) -> Result<Option<Fqn>> {
        let candidates = remaining
            .values()
            .filter(|t| !target.tables.contains_key(&t.fqn))
            .filter(|t| can_rename(t, target_table, self.types))
            .map(|t| t.fqn.table.as_str());

        let picked = self.pick(
            &target_table.fqn.schema,
            &target_table.fqn.to_string(),
            candidates,
        )?;
        Ok(picked.map(|name| target_table.fqn.with_table(name)))
    }

    /// Finds a current column that `target_col` may be a renamed copy of.
    fn find_renamed_column(
        &self,
        fqn: &Fqn,
        remaining: &BTreeMap<String, Column>,
        target: &Table,
        name: &str,
        target_col: &Column,
    ) -> Result<Option<String>> {
        let candidates = remaining
            .iter()
            .filter(|(n, _)| !target.columns.contains_key(*n))
            .filter(|(_, c)| equal_columns(c, target_col, self.types))
            .map(|(n, _)| n.as_str());

        self.pick(&fqn.to_string(), name, candidates)
    }

    fn diff_columns(
        &mut self,
        current: &mut Table,
        target: &Table,
        check_type: bool,
    ) -> Result<()> {
        let fqn = current.fqn.clone();
        let mut remaining = current.columns.clone();

        for (name, target_col) in &target.columns {
            if let Some(current_col) = remaining.remove(name) {
                if check_type && !equal_columns(&current_col, target_col, self.types) {
                    let mut to = target_col.clone();
                    if self.types.equivalent(&current_col, target_col) {
                        to.sql_type = current_col.sql_type.clone();
                        to.length = current_col.length;
                    }
                    self.changes.push(Operation::ChangeColumnType {
                        fqn: fqn.clone(),
                        column: name.clone(),
                        from: current_col,
                        to,
                    });
                }
                continue;
            }

            let renamed = self
                .find_renamed_column(&fqn, &remaining, target, name, target_col)?
                .and_then(|old| remaining.remove_entry(&old));
            let Some((old_name, _)) = renamed else {
                self.changes.push(Operation::AddColumn {
                    fqn: fqn.clone(),
                    column: name.clone(),
                    def: target_col.clone(),
                });
                continue;
            };

            debug!(table = %fqn, from = %old_name, to = %name, "Detected column rename");
            self.refs.rename_column(&fqn, &old_name, name);
            current.rename_key_column(&old_name, name);
            self.changes.push(Operation::RenameColumn {
                fqn: fqn.clone(),
                old_name,
                new_name: name.clone(),
            });
        }

        for (name, def) in remaining {
            if !target.columns.contains_key(&name) {
                self.changes.push(Operation::DropColumn {
                    fqn: fqn.clone(),
                    column: name,
                    def,
                });
            }
        }
        Ok(())
    }

    fn diff_constraints(&mut self, current: &Table, target: &Table) {
        let fqn = &current.fqn;

        for unique in &target.unique_constraints {
            if !current.unique_constraints.contains(unique) {
                self.changes.push(Operation::AddUniqueConstraint {
                    fqn: fqn.clone(),
                    unique: unique.clone(),
                });
            }
        }
        for unique in &current.unique_constraints {
            if !target.unique_constraints.contains(unique) {
                self.changes.push(Operation::DropUniqueConstraint {
                    fqn: fqn.clone(),
                    unique: unique.clone(),
                });
            }
        }

        match (&current.primary_key, &target.primary_key) {
            (None, Some(key)) => self.changes.push(Operation::AddPrimaryKey {
                fqn: fqn.clone(),
                primary_key: key.clone(),
            }),
            (Some(key), None) => self.changes.push(Operation::DropPrimaryKey {
                fqn: fqn.clone(),
                primary_key: key.clone(),
            }),
            (Some(old), Some(new)) if old.columns != new.columns => {
                self.changes.push(Operation::ChangePrimaryKey {
                    fqn: fqn.clone(),
                    old: old.clone(),
                    new: new.clone(),
                });
            }
            _ => {}
        }
    }

    fn diff_foreign_keys(&mut self, target: &Schema) {
        let mut current = self.refs.deref();

        if self.options.detect_renamed_fks {
            for updated in self.refs.updated() {
                let Some(target_name) = target.foreign_keys.get(&updated.current) else {
                    continue;
                };
                let new_name = self.constraint_name(&updated.current, target_name);
                if new_name == updated.name {
                    continue;
                }
                debug!(from = %updated.name, to = %new_name, "Detected foreign key rename");
                current.insert(updated.current.clone(), new_name.clone());
                self.changes.push(Operation::RenameForeignKey {
                    foreign_key: updated.current,
                    old_name: updated.name,
                    new_name,
                });
            }
        }

        for (fk, name) in &target.foreign_keys {
            if !current.contains_key(fk) {
                self.changes.push(Operation::AddForeignKey {
                    foreign_key: fk.clone(),
                    constraint_name: self.constraint_name(fk, name),
                });
            }
        }
        for (fk, name) in current {
            if !target.foreign_keys.contains_key(&fk) {
                self.changes.push(Operation::DropForeignKey {
                    foreign_key: fk,
                    constraint_name: name,
                });
            }
        }
    }
}
