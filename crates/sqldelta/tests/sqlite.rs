//! Inspect, diff and apply against an in-memory SQLite database.

use sqldelta::prelude::*;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

async fn create_test_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .expect("Failed to create in-memory SQLite pool")
}

fn main_table(name: &str) -> Table {
    Table::new(Fqn::new("main", name))
}

fn target() -> Schema {
    Schema::new()
        .table(
            main_table("accounts")
                .column("id", Column::new("integer").not_null().auto_increment())
                .column("full_name", Column::new("text"))
                .column("email", Column::new("text"))
                .primary_key(["id"])
                .unique_constraint(UniqueConstraint::new("accounts_email_key", ["email"])),
        )
        .table(
            main_table("tags")
                .column("id", Column::new("integer").not_null())
                .column("label", Column::new("varchar").length(64).not_null())
                .primary_key(["id"]),
        )
}

async fn seed(pool: &SqlitePool) {
    sqlx::query(
        "CREATE TABLE users (\
            id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT, \
            name TEXT, \
            email TEXT)",
    )
    .execute(pool)
    .await
    .unwrap();
    sqlx::query("INSERT INTO users (name, email) VALUES ('Ada', 'ada@example.com')")
        .execute(pool)
        .await
        .unwrap();
}

async fn plan_to(pool: &SqlitePool, target: &Schema) -> Changeset {
    let current = SqliteInspector::new(pool.clone()).inspect().await.unwrap();
    Autodetector::new()
        .with_types(SqliteDialect::new())
        .diff(&current, target)
        .unwrap()
        .resolve()
        .unwrap()
}

async fn plan(pool: &SqlitePool) -> Changeset {
    plan_to(pool, &target()).await
}

/// Authors and their posts, created from scratch.
fn blog() -> Schema {
    let author = ForeignKey::new(
        ColumnReference::new(Fqn::new("main", "posts"), ["author_id"]),
        ColumnReference::new(Fqn::new("main", "authors"), ["id"]),
    );
    Schema::new()
        .table(
            main_table("authors")
                .column("id", Column::new("integer").not_null().auto_increment())
                .column("handle", Column::new("text").not_null())
                .column("email", Column::new("text"))
                .primary_key(["id"])
                .unique_constraint(UniqueConstraint::new("authors_handle_key", ["handle"]))
                .unique_constraint(UniqueConstraint::new("", ["email"])),
        )
        .table(
            main_table("posts")
                .column("id", Column::new("integer").not_null())
                .column("author_id", Column::new("integer").not_null())
                .column("title", Column::new("text"))
                .primary_key(["id"]),
        )
        .foreign_key(author, "posts_author_id_fkey")
}

#[tokio::test]
async fn test_apply_reaches_target_schema() {
    let pool = create_test_pool().await;
    seed(&pool).await;

    let changeset = plan(&pool).await;
    assert_eq!(
        changeset.iter().filter(|op| op.kind() == "RenameTable").count(),
        1
    );
    assert_eq!(
        changeset.iter().filter(|op| op.kind() == "RenameColumn").count(),
        1
    );

    let executor = MigrationExecutor::new(pool.clone(), SqliteDialect::new());
    executor.apply(&changeset).await.unwrap();

    assert!(plan(&pool).await.is_empty());

    // Renames keep the data.
    let row: (String,) = sqlx::query_as("SELECT full_name FROM accounts WHERE id = 1")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(row.0, "Ada");
}

#[tokio::test]
async fn test_rollback_restores_inspected_schema() {
    let pool = create_test_pool().await;
    seed(&pool).await;
    let before = SqliteInspector::new(pool.clone()).inspect().await.unwrap();

    let changeset = plan(&pool).await;
    let executor = MigrationExecutor::new(pool.clone(), SqliteDialect::new());
    executor.apply(&changeset).await.unwrap();
    executor.rollback(&changeset).await.unwrap();

    let after = SqliteInspector::new(pool).inspect().await.unwrap();
    assert_eq!(after, before);
}

#[tokio::test]
async fn test_unsupported_change_leaves_database_untouched() {
    let pool = create_test_pool().await;
    seed(&pool).await;

    let mut target = Schema::new().table(
        main_table("users")
            .column("id", Column::new("integer").not_null().auto_increment())
            .column("name", Column::new("text").not_null())
            .column("email", Column::new("text"))
            .column("bio", Column::new("text"))
            .primary_key(["id"]),
    );
    let current = SqliteInspector::new(pool.clone()).inspect().await.unwrap();
    let changeset = diff(&current, &target, SqliteDialect::new())
        .unwrap()
        .resolve()
        .unwrap();

    let executor = MigrationExecutor::new(pool.clone(), SqliteDialect::new());
    match executor.apply(&changeset).await {
        Err(MigrateError::Unsupported { operation, .. }) => {
            assert_eq!(operation, "ChangeColumnType");
        }
        _ => panic!("Expected Unsupported"),
    }

    // Without the type change the same diff applies cleanly.
    if let Some(users) = target.get_table_mut(&Fqn::new("main", "users")) {
        users.columns.insert("name".to_string(), Column::new("text"));
    }
    let changeset = diff(&current, &target, SqliteDialect::new())
        .unwrap()
        .resolve()
        .unwrap();
    assert_eq!(executor.apply(&changeset).await.unwrap(), 1);
}

#[tokio::test]
async fn test_created_table_keeps_named_unique() {
    let pool = create_test_pool().await;
    let target = Schema::new().table(
        main_table("authors")
            .column("id", Column::new("integer").not_null().auto_increment())
            .column("handle", Column::new("text").not_null())
            .primary_key(["id"])
            .unique_constraint(UniqueConstraint::new("authors_handle_key", ["handle"])),
    );

    let changeset = plan_to(&pool, &target).await;
    let executor = MigrationExecutor::new(pool.clone(), SqliteDialect::new());
    assert_eq!(executor.apply(&changeset).await.unwrap(), 2);

    let inspected = SqliteInspector::new(pool.clone()).inspect().await.unwrap();
    assert_eq!(inspected, target);
    assert!(plan_to(&pool, &target).await.is_empty());

    sqlx::query("INSERT INTO authors (handle) VALUES ('ada')")
        .execute(&pool)
        .await
        .unwrap();
    assert!(sqlx::query("INSERT INTO authors (handle) VALUES ('ada')")
        .execute(&pool)
        .await
        .is_err());
}

#[tokio::test]
async fn test_created_tables_keep_foreign_keys() {
    let pool = create_test_pool().await;

    let changeset = plan_to(&pool, &blog()).await;
    assert_eq!(
        changeset.iter().filter(|op| op.kind() == "AddForeignKey").count(),
        1
    );
    let executor = MigrationExecutor::new(pool.clone(), SqliteDialect::new());
    executor.apply(&changeset).await.unwrap();

    assert!(plan_to(&pool, &blog()).await.is_empty());

    sqlx::query("INSERT INTO authors (handle) VALUES ('ada')")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO posts (id, author_id, title) VALUES (1, 1, 'Notes')")
        .execute(&pool)
        .await
        .unwrap();
    // Foreign keys are enforced on sqlx connections.
    assert!(
        sqlx::query("INSERT INTO posts (id, author_id, title) VALUES (2, 42, 'Orphan')")
            .execute(&pool)
            .await
            .is_err()
    );

    sqlx::query("DELETE FROM posts").execute(&pool).await.unwrap();
    executor.rollback(&changeset).await.unwrap();
    let after = SqliteInspector::new(pool).inspect().await.unwrap();
    assert_eq!(after, Schema::new());
}
