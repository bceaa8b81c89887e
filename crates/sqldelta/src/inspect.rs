//! Reading the current schema from a live database.
//!
//! The autodetector needs the schema the database actually has. An
//! [`Inspector`] produces it as a [`Schema`]; it must fail rather than return
//! a partial picture, since anything missing would be diffed as "to create".

use std::collections::BTreeMap;
use std::future::Future;

use sqlx::sqlite::SqlitePool;
use tracing::debug;

use crate::error::{MigrateError, Result};
use crate::schema::{
    default_fk_name, Column, ColumnReference, ForeignKey, Fqn, PrimaryKey, Schema, Table,
    UniqueConstraint,
};

/// Source of the current database schema.
pub trait Inspector {
    /// Reads every table, column, key and constraint.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Database`] when a query fails and
    /// [`MigrateError::Inspect`] for objects the schema model cannot hold.
    fn inspect(&self) -> impl Future<Output = Result<Schema>> + Send;
}

/// Splits a declared type such as `VARCHAR(255)` into `("varchar", Some(255))`.
///
/// Parameters that are not a single length (`numeric(10,2)`) stay part of the
/// type name.
fn parse_type(declared: &str) -> (String, Option<u32>) {
    let declared = declared.trim().to_ascii_lowercase();
    let parsed = declared
        .strip_suffix(')')
        .and_then(|rest| rest.split_once('('))
        .and_then(|(base, length)| Some((base.trim().to_string(), length.trim().parse().ok()?)));
    parsed.map_or_else(|| (declared, None), |(base, length)| (base, Some(length)))
}

/// Inspects a SQLite database through `sqlite_master` and the table-valued
/// pragma functions.
///
/// SQLite does not store foreign key names, so keys are named by the
/// `{table}_{columns}_fkey` convention. Unique constraints declared inside
/// `CREATE TABLE` are reported without a name.
#[derive(Debug, Clone)]
pub struct SqliteInspector {
    pool: SqlitePool,
    schema: String,
}

impl SqliteInspector {
    /// Creates an inspector for the `main` database.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            schema: "main".to_string(),
        }
    }

    fn fqn(&self, table: &str) -> Fqn {
        Fqn::new(self.schema.clone(), table)
    }

    async fn inspect_table(&self, name: &str, sql: &str) -> Result<Table> {
        let rows: Vec<(String, String, i64, Option<String>, i64)> = sqlx::query_as(
            r#"SELECT name, type, "notnull", dflt_value, pk
               FROM pragma_table_info(?) ORDER BY cid"#,
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        let mut table = Table::new(self.fqn(name));
        let mut key: Vec<(i64, String)> = Vec::new();
        for (column, declared, not_null, default, pk) in rows {
            let (sql_type, length) = parse_type(&declared);
            table.columns.insert(
                column.clone(),
                Column {
                    sql_type,
                    length,
                    default,
                    nullable: not_null == 0,
                    auto_increment: false,
                    identity: false,
                },
            );
            if pk > 0 {
                key.push((pk, column));
            }
        }

        key.sort();
        let key: Vec<String> = key.into_iter().map(|(_, column)| column).collect();
        if let [column] = key.as_slice() {
            if sql.to_ascii_uppercase().contains("AUTOINCREMENT") {
                if let Some(def) = table.columns.get_mut(column) {
                    def.auto_increment = true;
                }
            }
        }
        if !key.is_empty() {
            table.primary_key = Some(PrimaryKey::new(key));
        }

        table.unique_constraints = self.inspect_uniques(name).await?;
        Ok(table)
    }

    async fn inspect_uniques(&self, table: &str) -> Result<Vec<UniqueConstraint>> {
        let indexes: Vec<(String, i64, String)> = sqlx::query_as(
            r#"SELECT name, "unique", origin FROM pragma_index_list(?) ORDER BY name"#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        let mut uniques = Vec::new();
        for (index, unique, origin) in indexes {
            if unique == 0 || origin == "pk" {
                continue;
            }
            let columns: Vec<(Option<String>,)> =
                sqlx::query_as("SELECT name FROM pragma_index_info(?) ORDER BY seqno")
                    .bind(&index)
                    .fetch_all(&self.pool)
                    .await?;
            let columns = columns
                .into_iter()
                .map(|(column,)| column)
                .collect::<Option<Vec<String>>>()
                .ok_or_else(|| {
                    MigrateError::Inspect(format!(
                        "Unique index '{index}' on '{table}' uses an expression"
                    ))
                })?;
            let name = if origin == "u" { String::new() } else { index };
            uniques.push(UniqueConstraint::new(name, columns));
        }
        Ok(uniques)
    }

    async fn inspect_foreign_keys(
        &self,
        tables: &BTreeMap<Fqn, Table>,
        table: &Fqn,
    ) -> Result<Vec<ForeignKey>> {
        let rows: Vec<(i64, String, String, Option<String>)> = sqlx::query_as(
            r#"SELECT id, "table", "from", "to" FROM pragma_foreign_key_list(?) ORDER BY id, seq"#,
        )
        .bind(&table.table)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: BTreeMap<i64, (String, Vec<String>, Vec<Option<String>>)> =
            BTreeMap::new();
        for (id, referenced, from, to) in rows {
            let entry = grouped
                .entry(id)
                .or_insert_with(|| (referenced, Vec::new(), Vec::new()));
            entry.1.push(from);
            entry.2.push(to);
        }

        let mut foreign_keys = Vec::new();
        for (referenced, from, to) in grouped.into_values() {
            let referenced = self.fqn(&referenced);
            let to = to
                .into_iter()
                .collect::<Option<Vec<String>>>()
                .or_else(|| {
                    tables
                        .get(&referenced)
                        .and_then(|t| t.primary_key.as_ref())
                        .map(|key| key.columns.clone())
                })
                .ok_or_else(|| {
                    MigrateError::Inspect(format!(
                        "Foreign key on '{table}' references '{referenced}', \
                         which has no primary key"
                    ))
                })?;
            foreign_keys.push(ForeignKey::new(
                ColumnReference::new(table.clone(), from),
                ColumnReference::new(referenced, to),
            ));
        }
        Ok(foreign_keys)
    }
}

impl Inspector for SqliteInspector {
    async fn inspect(&self) -> Result<Schema> {
        let tables: Vec<(String, Option<String>)> = sqlx::query_as(
            "SELECT name, sql FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut schema = Schema::new();
        for (name, sql) in &tables {
            let table = self
                .inspect_table(name, sql.as_deref().unwrap_or_default())
                .await?;
            schema.add_table(table);
        }

        let names: Vec<Fqn> = schema.tables.keys().cloned().collect();
        for fqn in &names {
            for fk in self.inspect_foreign_keys(&schema.tables, fqn).await? {
                let name = default_fk_name(&fk);
                schema.foreign_keys.insert(fk, name);
            }
        }

        debug!(
            tables = schema.tables.len(),
            foreign_keys = schema.foreign_keys.len(),
            "Inspected SQLite schema"
        );
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn create_test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .expect("Failed to create in-memory SQLite pool")
    }

    async fn execute(pool: &SqlitePool, sql: &str) {
        sqlx::query(sql).execute(pool).await.unwrap();
    }

    #[test]
    fn test_parse_type() {
        assert_eq!(parse_type("VARCHAR(255)"), ("varchar".to_string(), Some(255)));
        assert_eq!(parse_type("integer"), ("integer".to_string(), None));
        assert_eq!(
            parse_type("NUMERIC(10,2)"),
            ("numeric(10,2)".to_string(), None)
        );
        assert_eq!(parse_type(""), (String::new(), None));
    }

    #[tokio::test]
    async fn test_inspect_tables_and_keys() {
        let pool = create_test_pool().await;
        execute(
            &pool,
            "CREATE TABLE users (\
                id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT, \
                email VARCHAR(255) NOT NULL, \
                active BOOLEAN DEFAULT 1, \
                UNIQUE (email))",
        )
        .await;
        execute(
            &pool,
            "CREATE TABLE posts (\
                id INTEGER NOT NULL, \
                user_id INTEGER REFERENCES users, \
                slug TEXT, \
                PRIMARY KEY (id))",
        )
        .await;
        execute(&pool, "CREATE UNIQUE INDEX posts_slug_key ON posts (slug)").await;

        let schema = SqliteInspector::new(pool).inspect().await.unwrap();

        assert_eq!(schema.tables.len(), 2);
        let users = schema.get_table(&Fqn::new("main", "users")).unwrap();
        let id = users.get_column("id").unwrap();
        assert_eq!(id.sql_type, "integer");
        assert!(id.auto_increment);
        assert!(!id.nullable);
        let email = users.get_column("email").unwrap();
        assert_eq!(email.sql_type, "varchar");
        assert_eq!(email.length, Some(255));
        assert_eq!(users.get_column("active").unwrap().default.as_deref(), Some("1"));
        assert_eq!(users.primary_key, Some(PrimaryKey::new(["id"])));
        assert_eq!(
            users.unique_constraints,
            vec![UniqueConstraint::new("", ["email"])]
        );

        let posts = schema.get_table(&Fqn::new("main", "posts")).unwrap();
        assert!(!posts.get_column("id").unwrap().auto_increment);
        assert_eq!(
            posts.unique_constraints,
            vec![UniqueConstraint::new("posts_slug_key", ["slug"])]
        );

        let expected = ForeignKey::new(
            ColumnReference::new(Fqn::new("main", "posts"), ["user_id"]),
            ColumnReference::new(Fqn::new("main", "users"), ["id"]),
        );
        assert_eq!(
            schema.foreign_keys.get(&expected).map(String::as_str),
            Some("posts_user_id_fkey")
        );
    }

    #[tokio::test]
    async fn test_inspect_empty_database() {
        let pool = create_test_pool().await;
        let schema = SqliteInspector::new(pool).inspect().await.unwrap();

        assert!(schema.tables.is_empty());
        assert!(schema.foreign_keys.is_empty());
    }
}
