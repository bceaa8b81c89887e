//! Foreign key tracking across renames.
//!
//! When the autodetector decides a table or column was renamed, every foreign
//! key of the current schema that mentions it must follow, otherwise the final
//! comparison against the target's foreign keys would report the key as dropped
//! and re-added. [`RefMap`] owns the foreign keys in an arena and indexes them
//! by the tables on either side, so a rename touches only the affected keys.

use std::collections::{BTreeMap, BTreeSet};

use crate::schema::{ColumnReference, ForeignKey, Fqn};

#[derive(Debug, Clone)]
struct Entry {
    original: ForeignKey,
    current: ForeignKey,
    name: String,
}

/// A foreign key whose tables or columns were renamed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatedForeignKey {
    /// The key as it was in the current schema.
    pub original: ForeignKey,
    /// The key after every recorded rename.
    pub current: ForeignKey,
    /// Constraint name in the current schema.
    pub name: String,
}

/// Foreign keys of one schema, kept valid through table and column renames.
#[derive(Debug, Clone, Default)]
pub struct RefMap {
    entries: Vec<Entry>,
    index: BTreeMap<Fqn, BTreeSet<usize>>,
}

impl RefMap {
    /// Builds the map from a schema's foreign keys.
    #[must_use]
    pub fn new(foreign_keys: &BTreeMap<ForeignKey, String>) -> Self {
        let mut map = Self::default();
        for (fk, name) in foreign_keys {
            let id = map.entries.len();
            map.index.entry(fk.from.fqn.clone()).or_default().insert(id);
            map.index.entry(fk.to.fqn.clone()).or_default().insert(id);
            map.entries.push(Entry {
                original: fk.clone(),
                current: fk.clone(),
                name: name.clone(),
            });
        }
        map
    }

    /// Number of tracked foreign keys.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no foreign keys are tracked.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records that table `old` is now called `new_name`.
    pub fn rename_table(&mut self, old: &Fqn, new_name: &str) {
        let Some(ids) = self.index.remove(old) else {
            return;
        };
        let new = old.with_table(new_name);
        for &id in &ids {
            let fk = &mut self.entries[id].current;
            for side in [&mut fk.from, &mut fk.to] {
                if side.fqn == *old {
                    side.fqn = new.clone();
                }
            }
        }
        self.index.entry(new).or_default().extend(ids);
    }

    /// Records that column `old` of table `fqn` is now called `new`.
    pub fn rename_column(&mut self, fqn: &Fqn, old: &str, new: &str) {
        let Some(ids) = self.index.get(fqn) else {
            return;
        };
        for &id in ids {
            let fk = &mut self.entries[id].current;
            for side in [&mut fk.from, &mut fk.to] {
                rename_in(side, fqn, old, new);
            }
        }
    }

    /// The foreign keys as they are after every recorded rename, mapped to
    /// their constraint names.
    #[must_use]
    pub fn deref(&self) -> BTreeMap<ForeignKey, String> {
        self.entries
            .iter()
            .map(|e| (e.current.clone(), e.name.clone()))
            .collect()
    }

    /// Foreign keys that changed because of a rename.
    #[must_use]
    pub fn updated(&self) -> Vec<UpdatedForeignKey> {
        self.entries
            .iter()
            .filter(|e| e.original != e.current)
            .map(|e| UpdatedForeignKey {
                original: e.original.clone(),
                current: e.current.clone(),
                name: e.name.clone(),
            })
            .collect()
    }
}

fn rename_in(side: &mut ColumnReference, fqn: &Fqn, old: &str, new: &str) {
    if side.fqn != *fqn {
        return;
    }
    for column in side.columns.iter_mut().filter(|c| c.as_str() == old) {
        *column = new.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fk(from: (&str, &str), to: (&str, &str)) -> ForeignKey {
        ForeignKey::new(
            ColumnReference::new(Fqn::new("public", from.0), [from.1]),
            ColumnReference::new(Fqn::new("public", to.0), [to.1]),
        )
    }

    fn map(fks: &[ForeignKey]) -> RefMap {
        let named: BTreeMap<ForeignKey, String> = fks
            .iter()
            .map(|fk| (fk.clone(), crate::schema::default_fk_name(fk)))
            .collect();
        RefMap::new(&named)
    }

    #[test]
    fn test_rename_referenced_table() {
        let mut refs = map(&[fk(("t2", "t1_id"), ("t1", "id"))]);
        refs.rename_table(&Fqn::new("public", "t1"), "t1_renamed");

        let fks = refs.deref();
        assert_eq!(fks.len(), 1);
        let (key, name) = fks.iter().next().unwrap();
        assert_eq!(*key, fk(("t2", "t1_id"), ("t1_renamed", "id")));
        assert_eq!(name, "t2_t1_id_fkey");
    }

    #[test]
    fn test_rename_column_on_both_sides_of_self_reference() {
        let mut refs = map(&[ForeignKey::new(
            ColumnReference::new(Fqn::new("public", "nodes"), ["parent"]),
            ColumnReference::new(Fqn::new("public", "nodes"), ["parent"]),
        )]);
        refs.rename_column(&Fqn::new("public", "nodes"), "parent", "parent_id");

        let expected = ForeignKey::new(
            ColumnReference::new(Fqn::new("public", "nodes"), ["parent_id"]),
            ColumnReference::new(Fqn::new("public", "nodes"), ["parent_id"]),
        );
        assert!(refs.deref().contains_key(&expected));
    }

    #[test]
    fn test_chained_renames_match_direct_rename() {
        let mut refs = map(&[
            fk(("posts", "author_id"), ("users", "id")),
            fk(("comments", "post_id"), ("posts", "id")),
        ]);
        refs.rename_table(&Fqn::new("public", "users"), "accounts");
        refs.rename_column(&Fqn::new("public", "accounts"), "id", "account_id");
        refs.rename_table(&Fqn::new("public", "posts"), "articles");
        refs.rename_column(&Fqn::new("public", "articles"), "author_id", "writer_id");

        let expected: BTreeSet<ForeignKey> = [
            fk(("articles", "writer_id"), ("accounts", "account_id")),
            fk(("comments", "post_id"), ("articles", "id")),
        ]
        .into_iter()
        .collect();
        let actual: BTreeSet<ForeignKey> = refs.deref().into_keys().collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_unrelated_renames_leave_keys_alone() {
        let mut refs = map(&[fk(("posts", "author_id"), ("users", "id"))]);
        refs.rename_table(&Fqn::new("public", "tags"), "labels");
        refs.rename_column(&Fqn::new("public", "users"), "email", "mail");

        assert!(refs.updated().is_empty());
        assert_eq!(refs.len(), 1);
    }

    #[test]
    fn test_updated_reports_original_and_current() {
        let original = fk(("posts", "author_id"), ("users", "id"));
        let mut refs = map(&[original.clone(), fk(("tags", "post_id"), ("posts", "id"))]);
        refs.rename_column(&Fqn::new("public", "users"), "id", "user_id");

        let updated = refs.updated();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].original, original);
        assert_eq!(updated[0].current, fk(("posts", "author_id"), ("users", "user_id")));
        assert_eq!(updated[0].name, "posts_author_id_fkey");
    }
}
