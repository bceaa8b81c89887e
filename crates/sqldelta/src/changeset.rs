//! Changesets and dependency ordering.
//!
//! The autodetector emits operations in discovery order. Before they can be
//! rendered or applied they are sorted so that every operation runs after the
//! operations it depends on (see [`Operation::depends_on`]).

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dialect::MigrationDialect;
use crate::error::{MigrateError, Result};
use crate::operations::Operation;

/// An ordering constraint between two items of the same kind.
pub trait DependsOn {
    /// Returns true if `self` must come after `other`.
    fn depends_on(&self, other: &Self) -> bool;
}

impl DependsOn for Operation {
    fn depends_on(&self, other: &Self) -> bool {
        Self::depends_on(self, other)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    InProgress,
    Done,
}

struct Resolver<'a, T> {
    items: &'a [T],
    state: Vec<Visit>,
    order: Vec<usize>,
}

impl<T: DependsOn + fmt::Display> Resolver<'_, T> {
    fn visit(&mut self, idx: usize) -> Result<()> {
        match self.state[idx] {
            Visit::Done => return Ok(()),
            Visit::InProgress => {
                return Err(MigrateError::CircularDependency {
                    operation: self.items[idx].to_string(),
                })
            }
            Visit::New => {}
        }

        self.state[idx] = Visit::InProgress;
        for other in 0..self.items.len() {
            if other != idx && self.items[other].depends_on(&self.items[idx]) {
                self.visit(other)?;
            }
        }
        self.state[idx] = Visit::Done;
        self.order.push(idx);
        Ok(())
    }
}

/// Sorts `items` so that every item comes after the items it depends on.
///
/// Items are visited depth first, starting from each unvisited item in input
/// order; an item is placed in front of everything that depends on it. The
/// result is deterministic for a given input order.
///
/// # Errors
///
/// Returns [`MigrateError::CircularDependency`] on a dependency cycle; no
/// partial order is returned.
pub fn resolve_dependencies<T: DependsOn + fmt::Display>(items: Vec<T>) -> Result<Vec<T>> {
    let mut resolver = Resolver {
        items: &items,
        state: vec![Visit::New; items.len()],
        order: Vec::with_capacity(items.len()),
    };
    for idx in 0..items.len() {
        resolver.visit(idx)?;
    }
    let order = resolver.order;

    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    Ok(order
        .into_iter()
        .rev()
        .filter_map(|idx| slots[idx].take())
        .collect())
}

/// The operations that take one schema to another.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changeset {
    operations: Vec<Operation>,
}

impl Changeset {
    /// Creates an empty changeset.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            operations: Vec::new(),
        }
    }

    /// Appends an operation.
    pub fn push(&mut self, operation: Operation) {
        self.operations.push(operation);
    }

    /// Returns the operations in their current order.
    #[must_use]
    pub const fn operations(&self) -> &[Operation] {
        self.operations.as_slice()
    }

    /// Number of operations.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns true if there is nothing to do.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Iterates over the operations.
    #[must_use]
    pub fn iter(&self) -> std::slice::Iter<'_, Operation> {
        self.operations.iter()
    }

    /// Orders the operations by their dependencies.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::CircularDependency`] if the operations depend
    /// on each other in a cycle.
    pub fn resolve(self) -> Result<Self> {
        let operations = resolve_dependencies(self.operations)?;
        debug!(count = operations.len(), "Resolved changeset order");
        Ok(Self { operations })
    }

    /// Returns the changeset that undoes this one: every operation reversed,
    /// in reverse order.
    #[must_use]
    pub fn reverse(&self) -> Self {
        self.operations.iter().rev().map(Operation::reverse).collect()
    }

    /// Returns true if another operation of this changeset already does
    /// what `operation` does, when rendered for `dialect`.
    ///
    /// Dialects with inline foreign keys create them with their table, and
    /// lose them when the referencing table is dropped.
    fn is_covered<D: MigrationDialect + ?Sized>(&self, dialect: &D, operation: &Operation) -> bool {
        if !dialect.inline_foreign_keys() {
            return false;
        }
        match operation {
            Operation::AddForeignKey { foreign_key, .. } => self.operations.iter().any(|op| {
                matches!(op, Operation::CreateTable { foreign_keys, .. }
                    if foreign_keys.iter().any(|(fk, _)| fk == foreign_key))
            }),
            Operation::DropForeignKey { foreign_key, .. } => self.operations.iter().any(|op| {
                matches!(op, Operation::DropTable { fqn } if *fqn == foreign_key.from.fqn)
            }),
            _ => false,
        }
    }

    /// Renders the SQL statements of the changeset, in order.
    ///
    /// An operation may render as several statements, or as none when
    /// another operation already covers it.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Unsupported`] for the first operation the
    /// dialect cannot express.
    pub fn to_sql<D: MigrationDialect + ?Sized>(&self, dialect: &D) -> Result<Vec<String>> {
        let mut statements = Vec::with_capacity(self.operations.len());
        for op in &self.operations {
            if !self.is_covered(dialect, op) {
                statements.extend(dialect.statements(op)?);
            }
        }
        Ok(statements)
    }

    /// Renders the changeset as a script.
    ///
    /// Statements end with `;` and are separated by a blank line. Operations
    /// the dialect cannot express, or that another operation covers, become
    /// comments.
    #[must_use]
    pub fn to_script<D: MigrationDialect + ?Sized>(&self, dialect: &D) -> String {
        let mut statements = Vec::with_capacity(self.operations.len());
        for op in &self.operations {
            if let Operation::Noop { comment, .. } = op {
                statements.push(format!("-- {comment}"));
            } else if self.is_covered(dialect, op) {
                statements.push(format!("-- {}: covered by its table", op.description()));
            } else {
                match dialect.statements(op) {
                    Ok(sqls) => statements.extend(sqls.into_iter().map(|sql| {
                        if sql.starts_with("--") {
                            sql
                        } else {
                            format!("{sql};")
                        }
                    })),
                    Err(e) => statements.push(format!("-- {}: {e}", op.description())),
                }
            }
        }
        statements.join("\n\n")
    }
}

impl FromIterator<Operation> for Changeset {
    fn from_iter<I: IntoIterator<Item = Operation>>(iter: I) -> Self {
        Self {
            operations: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Changeset {
    type Item = Operation;
    type IntoIter = std::vec::IntoIter<Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.into_iter()
    }
}

impl<'a> IntoIterator for &'a Changeset {
    type Item = &'a Operation;
    type IntoIter = std::slice::Iter<'a, Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.iter()
    }
}
