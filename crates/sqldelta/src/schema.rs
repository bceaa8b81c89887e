//! Schema representation types.
//!
//! These types describe one point-in-time picture of a relational schema. The
//! same model is used for the schema found in a live database (produced by an
//! [`Inspector`](crate::inspect::Inspector)) and for the schema the
//! application's models expect; the autodetector compares the two.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Fully-qualified table name: database schema plus table name.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fqn {
    /// Database schema (namespace), e.g. `public` or `main`.
    #[serde(default)]
    pub schema: String,
    /// Table name.
    pub table: String,
}

impl Fqn {
    /// Creates a new fully-qualified name.
    #[must_use]
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// Returns the same schema with a different table name.
    #[must_use]
    pub fn with_table(&self, table: impl Into<String>) -> Self {
        Self {
            schema: self.schema.clone(),
            table: table.into(),
        }
    }
}

impl fmt::Display for Fqn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.schema.is_empty() {
            write!(f, "{}", self.table)
        } else {
            write!(f, "{}.{}", self.schema, self.table)
        }
    }
}

const fn default_nullable() -> bool {
    true
}

// serde's `skip_serializing_if` passes a reference.
#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_true(value: &bool) -> bool {
    *value
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(value: &bool) -> bool {
    !*value
}

/// Schema definition for a column. The column name is the key it is stored
/// under in [`Table::columns`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// SQL type as the database (or the model) spells it, e.g. `varchar`.
    pub sql_type: String,
    /// Length parameter, e.g. the `255` of `varchar(255)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    /// Default value expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Whether the column allows NULL values.
    #[serde(default = "default_nullable", skip_serializing_if = "is_true")]
    pub nullable: bool,
    /// Whether the column auto-increments (serial, AUTOINCREMENT).
    #[serde(default, skip_serializing_if = "is_false")]
    pub auto_increment: bool,
    /// Whether the column is an identity column.
    #[serde(default, skip_serializing_if = "is_false")]
    pub identity: bool,
}

impl Column {
    /// Creates a nullable column of the given type.
    #[must_use]
    pub fn new(sql_type: impl Into<String>) -> Self {
        Self {
            sql_type: sql_type.into(),
            length: None,
            default: None,
            nullable: true,
            auto_increment: false,
            identity: false,
        }
    }

    /// Sets the length parameter.
    #[must_use]
    pub const fn length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    /// Sets the column as NOT NULL.
    #[must_use]
    pub const fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Sets the default value expression.
    #[must_use]
    pub fn default(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    /// Sets the column to auto-increment.
    #[must_use]
    pub const fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Marks the column as an identity column.
    #[must_use]
    pub const fn identity(mut self) -> Self {
        self.identity = true;
        self
    }
}

/// Primary key constraint. Column order is significant.
///
/// Keys compare by their column lists only; databases name them by convention
/// and the name carries no meaning for the diff.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct PrimaryKey {
    /// Constraint name, when the database reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Key columns in order.
    pub columns: Vec<String>,
}

impl PrimaryKey {
    /// Creates an unnamed primary key.
    #[must_use]
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: None,
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Sets the constraint name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl PartialEq for PrimaryKey {
    fn eq(&self, other: &Self) -> bool {
        self.columns == other.columns
    }
}

/// Unique constraint over one or more columns.
///
/// Two constraints are equal when their names match and they cover the same
/// set of columns.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct UniqueConstraint {
    /// Constraint name; empty when the database generates it by convention.
    #[serde(default)]
    pub name: String,
    /// Columns that form the unique constraint.
    pub columns: Vec<String>,
}

impl UniqueConstraint {
    /// Creates a unique constraint.
    #[must_use]
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns true if `column` is part of the constraint.
    #[must_use]
    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Returns true if both constraints cover the same set of columns.
    #[must_use]
    pub fn same_columns(&self, other: &Self) -> bool {
        sorted(&self.columns) == sorted(&other.columns)
    }
}

impl PartialEq for UniqueConstraint {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.same_columns(other)
    }
}

fn sorted(columns: &[String]) -> Vec<&str> {
    let mut out: Vec<&str> = columns.iter().map(String::as_str).collect();
    out.sort_unstable();
    out
}

/// Complete schema definition for a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Fully-qualified table name.
    #[serde(flatten)]
    pub fqn: Fqn,
    /// Column definitions keyed by column name.
    #[serde(default)]
    pub columns: BTreeMap<String, Column>,
    /// Unique constraint definitions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unique_constraints: Vec<UniqueConstraint>,
    /// Primary key, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<PrimaryKey>,
}

impl Table {
    /// Creates a table without columns.
    #[must_use]
    pub const fn new(fqn: Fqn) -> Self {
        Self {
            fqn,
            columns: BTreeMap::new(),
            unique_constraints: Vec::new(),
            primary_key: None,
        }
    }

    /// Adds a column to the table.
    #[must_use]
    pub fn column(mut self, name: impl Into<String>, column: Column) -> Self {
        self.columns.insert(name.into(), column);
        self
    }

    /// Sets the primary key columns.
    #[must_use]
    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = Some(PrimaryKey::new(columns));
        self
    }

    /// Adds a unique constraint.
    #[must_use]
    pub fn unique_constraint(mut self, constraint: UniqueConstraint) -> Self {
        self.unique_constraints.push(constraint);
        self
    }

    /// Gets a column by name.
    #[must_use]
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// Renames `old` to `new` in the primary key and unique constraint column
    /// lists.
    pub(crate) fn rename_key_column(&mut self, old: &str, new: &str) {
        let keys = self
            .primary_key
            .iter_mut()
            .map(|pk| &mut pk.columns)
            .chain(self.unique_constraints.iter_mut().map(|u| &mut u.columns));
        for columns in keys {
            for column in columns.iter_mut().filter(|c| c.as_str() == old) {
                *column = new.to_string();
            }
        }
    }
}

/// One side of a foreign key: a table and an ordered list of its columns.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColumnReference {
    /// Table holding the columns.
    #[serde(flatten)]
    pub fqn: Fqn,
    /// Columns in order.
    pub columns: Vec<String>,
}

impl ColumnReference {
    /// Creates a column reference.
    #[must_use]
    pub fn new<I, S>(fqn: Fqn, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fqn,
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns true if the reference is on `fqn` and includes `column`.
    #[must_use]
    pub fn contains(&self, fqn: &Fqn, column: &str) -> bool {
        self.fqn == *fqn && self.columns.iter().any(|c| c == column)
    }
}

/// A foreign key, identified by what it connects rather than by its
/// constraint name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Referencing columns.
    pub from: ColumnReference,
    /// Referenced columns.
    pub to: ColumnReference,
}

impl ForeignKey {
    /// Creates a foreign key.
    #[must_use]
    pub const fn new(from: ColumnReference, to: ColumnReference) -> Self {
        Self { from, to }
    }

    /// Returns true if either side of the key is on `fqn`.
    #[must_use]
    pub fn depends_on_table(&self, fqn: &Fqn) -> bool {
        self.from.fqn == *fqn || self.to.fqn == *fqn
    }

    /// Returns true if either side of the key includes `fqn.column`.
    #[must_use]
    pub fn depends_on_column(&self, fqn: &Fqn, column: &str) -> bool {
        self.from.contains(fqn, column) || self.to.contains(fqn, column)
    }
}

/// Constraint name a foreign key gets when none is given:
/// `{table}_{columns}_fkey`.
#[must_use]
pub fn default_fk_name(fk: &ForeignKey) -> String {
    format!("{}_{}_fkey", fk.from.fqn.table, fk.from.columns.join("_"))
}

/// Constraint name a primary key gets when none is given: `{table}_pkey`.
///
/// Databases keep the name when the table is renamed, so it is derived from
/// the name the table had when the key was created.
#[must_use]
pub fn default_pk_name(table: &str) -> String {
    format!("{table}_pkey")
}

/// The complete database schema: tables and the foreign keys between them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// All tables, keyed by their fully-qualified name.
    #[serde(with = "table_list", default)]
    pub tables: BTreeMap<Fqn, Table>,
    /// Foreign keys mapped to their constraint names.
    #[serde(with = "fk_list", default)]
    pub foreign_keys: BTreeMap<ForeignKey, String>,
}

impl Schema {
    /// Creates a new empty schema.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tables: BTreeMap::new(),
            foreign_keys: BTreeMap::new(),
        }
    }

    /// Adds a table to the schema.
    #[must_use]
    pub fn table(mut self, table: Table) -> Self {
        self.add_table(table);
        self
    }

    /// Adds a foreign key to the schema.
    #[must_use]
    pub fn foreign_key(mut self, fk: ForeignKey, name: impl Into<String>) -> Self {
        self.foreign_keys.insert(fk, name.into());
        self
    }

    /// Inserts a table, replacing any table with the same name.
    pub fn add_table(&mut self, table: Table) {
        self.tables.insert(table.fqn.clone(), table);
    }

    /// Gets a table by name.
    #[must_use]
    pub fn get_table(&self, fqn: &Fqn) -> Option<&Table> {
        self.tables.get(fqn)
    }

    /// Gets a mutable table by name.
    #[must_use]
    pub fn get_table_mut(&mut self, fqn: &Fqn) -> Option<&mut Table> {
        self.tables.get_mut(fqn)
    }

    /// Parses a schema from its JSON representation.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Serialization`](crate::error::MigrateError)
    /// if `json` is not a valid schema document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a schema from a JSON file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or does not hold a valid schema.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Serializes the schema as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Fails only if serialization itself fails.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Stores the table map as a JSON array; each table carries its own name.
mod table_list {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serializer};

    use super::{Fqn, Table};

    pub fn serialize<S: Serializer>(
        tables: &BTreeMap<Fqn, Table>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(tables.values())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<Fqn, Table>, D::Error> {
        let tables = Vec::<Table>::deserialize(deserializer)?;
        Ok(tables.into_iter().map(|t| (t.fqn.clone(), t)).collect())
    }
}

/// Stores the foreign key map as a JSON array of `{from, to, name}`.
mod fk_list {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::{ColumnReference, ForeignKey};

    #[derive(Serialize)]
    struct EntryRef<'a> {
        from: &'a ColumnReference,
        to: &'a ColumnReference,
        name: &'a str,
    }

    #[derive(Deserialize)]
    struct Entry {
        from: ColumnReference,
        to: ColumnReference,
        #[serde(default)]
        name: String,
    }

    pub fn serialize<S: Serializer>(
        fks: &BTreeMap<ForeignKey, String>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(fks.iter().map(|(fk, name)| EntryRef {
            from: &fk.from,
            to: &fk.to,
            name,
        }))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<ForeignKey, String>, D::Error> {
        let entries = Vec::<Entry>::deserialize(deserializer)?;
        Ok(entries
            .into_iter()
            .map(|e| (ForeignKey::new(e.from, e.to), e.name))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Table {
        Table::new(Fqn::new("public", "users"))
            .column("id", Column::new("bigint").not_null().auto_increment())
            .column("email", Column::new("varchar").length(255).not_null())
            .primary_key(["id"])
            .unique_constraint(UniqueConstraint::new("users_email_key", ["email"]))
    }

    #[test]
    fn test_table_builder() {
        let table = users();

        assert_eq!(table.fqn.to_string(), "public.users");
        assert_eq!(table.columns.len(), 2);
        assert_eq!(table.primary_key, Some(PrimaryKey::new(["id"]).named("users_pkey")));
        assert_eq!(table.get_column("email").unwrap().length, Some(255));
        assert!(table.get_column("id").unwrap().auto_increment);
        assert!(!table.get_column("id").unwrap().nullable);
    }

    #[test]
    fn test_unique_equality_ignores_column_order() {
        let a = UniqueConstraint::new("uq", ["a", "b"]);
        let b = UniqueConstraint::new("uq", ["b", "a"]);
        let c = UniqueConstraint::new("other", ["a", "b"]);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.same_columns(&c));
    }

    #[test]
    fn test_rename_key_column() {
        let mut table = users();
        table.rename_key_column("email", "mail");
        table.rename_key_column("id", "user_id");

        assert_eq!(table.primary_key.unwrap().columns, vec!["user_id"]);
        assert_eq!(table.unique_constraints[0].columns, vec!["mail"]);
    }

    #[test]
    fn test_foreign_key_dependencies() {
        let users = Fqn::new("public", "users");
        let posts = Fqn::new("public", "posts");
        let fk = ForeignKey::new(
            ColumnReference::new(posts.clone(), ["user_id"]),
            ColumnReference::new(users.clone(), ["id"]),
        );

        assert!(fk.depends_on_table(&users));
        assert!(fk.depends_on_table(&posts));
        assert!(!fk.depends_on_table(&Fqn::new("public", "tags")));
        assert!(fk.depends_on_column(&posts, "user_id"));
        assert!(!fk.depends_on_column(&posts, "id"));
        assert_eq!(default_fk_name(&fk), "posts_user_id_fkey");
        assert_eq!(default_pk_name("users"), "users_pkey");
    }

    #[test]
    fn test_schema_json_format() {
        let json = r#"{
            "tables": [
                {"schema": "public", "table": "users",
                 "columns": {"id": {"sql_type": "bigint", "nullable": false}},
                 "primary_key": {"columns": ["id"]}},
                {"schema": "public", "table": "posts",
                 "columns": {
                    "id": {"sql_type": "bigint", "nullable": false},
                    "user_id": {"sql_type": "bigint"}
                 }}
            ],
            "foreign_keys": [
                {"from": {"schema": "public", "table": "posts", "columns": ["user_id"]},
                 "to": {"schema": "public", "table": "users", "columns": ["id"]},
                 "name": "posts_user_id_fkey"}
            ]
        }"#;

        let schema = Schema::from_json_str(json).unwrap();
        assert_eq!(schema.tables.len(), 2);
        let posts = schema.get_table(&Fqn::new("public", "posts")).unwrap();
        assert!(posts.get_column("user_id").unwrap().nullable);
        assert!(posts.primary_key.is_none());
        assert_eq!(
            schema.foreign_keys.values().next().map(String::as_str),
            Some("posts_user_id_fkey")
        );

        let reparsed = Schema::from_json_str(&schema.to_json_string().unwrap()).unwrap();
        assert_eq!(reparsed, schema);
    }

    #[test]
    fn test_schema_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.json");
        let schema = Schema::new().table(users());
        std::fs::write(&path, schema.to_json_string().unwrap()).unwrap();

        let loaded = Schema::from_json_file(&path).unwrap();
        assert_eq!(loaded, schema);

        assert!(Schema::from_json_file(dir.path().join("missing.json")).is_err());
    }
}
