//! Structural matching used for rename detection.
//!
//! A table that exists in the target schema under a name the database does not
//! know is either new or a renamed current table. The autodetector tells the
//! two apart by comparing [`Signature`]s: the multiset of column type shapes,
//! ignoring names and order.

use crate::schema::{Column, Table};

/// Decides whether two columns have the same type.
///
/// Dialects alias types (`varchar` / `character varying`, `int` / `integer`),
/// so comparing the type strings directly would report false changes.
pub trait TypeEquivalence {
    /// Returns true if both columns have equivalent types.
    fn equivalent(&self, a: &Column, b: &Column) -> bool;
}

impl<F> TypeEquivalence for F
where
    F: Fn(&Column, &Column) -> bool,
{
    fn equivalent(&self, a: &Column, b: &Column) -> bool {
        self(a, b)
    }
}

/// Types are equivalent when spelled the same (ignoring case) with the same
/// length.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactTypes;

impl TypeEquivalence for ExactTypes {
    fn equivalent(&self, a: &Column, b: &Column) -> bool {
        a.sql_type.eq_ignore_ascii_case(&b.sql_type) && a.length == b.length
    }
}

/// Name-blind, order-blind multiset of a table's column types.
///
/// Columns are grouped with the [`TypeEquivalence`] rather than exact equality,
/// which makes counting a linear scan per column. Schemas hold tens to
/// hundreds of columns per table, so this stays cheap.
pub struct Signature<'a, E: ?Sized> {
    shapes: Vec<(&'a Column, usize)>,
    types: &'a E,
}

impl<'a, E: TypeEquivalence + ?Sized> Signature<'a, E> {
    /// Scans the columns of `table`.
    #[must_use]
    pub fn new(table: &'a Table, types: &'a E) -> Self {
        let mut shapes: Vec<(&'a Column, usize)> = Vec::new();
        for column in table.columns.values() {
            let index = shapes
                .iter()
                .position(|(shape, _)| types.equivalent(shape, column))
                .unwrap_or(shapes.len());
            if index == shapes.len() {
                shapes.push((column, 0));
            }
            shapes[index].1 += 1;
        }
        Self { shapes, types }
    }

    /// Number of columns whose type is equivalent to `column`'s.
    #[must_use]
    pub fn count(&self, column: &Column) -> usize {
        self.shapes
            .iter()
            .find(|(shape, _)| self.types.equivalent(shape, column))
            .map_or(0, |(_, count)| *count)
    }

    /// Number of distinct type shapes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.shapes.len()
    }

    /// Returns true if the table has no columns.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}

impl<E: TypeEquivalence + ?Sized> PartialEq for Signature<'_, E> {
    fn eq(&self, other: &Self) -> bool {
        self.shapes.len() == other.shapes.len()
            && self
                .shapes
                .iter()
                .all(|(shape, count)| other.count(shape) == *count)
    }
}

impl<E: ?Sized> std::fmt::Debug for Signature<'_, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(
                self.shapes
                    .iter()
                    .map(|(shape, count)| (&shape.sql_type, shape.length, count)),
            )
            .finish()
    }
}

/// Returns true if `current` may have been renamed to `target`: both live in
/// the same database schema and have equal signatures.
#[must_use]
pub fn can_rename<E>(current: &Table, target: &Table, types: &E) -> bool
where
    E: TypeEquivalence + ?Sized,
{
    current.fqn.schema == target.fqn.schema
        && Signature::new(current, types) == Signature::new(target, types)
}

/// Strict column comparison: equivalent type, same default, nullability,
/// auto-increment and identity.
#[must_use]
pub fn equal_columns<E: TypeEquivalence + ?Sized>(a: &Column, b: &Column, types: &E) -> bool {
    types.equivalent(a, b)
        && a.default == b.default
        && a.nullable == b.nullable
        && a.auto_increment == b.auto_increment
        && a.identity == b.identity
}
