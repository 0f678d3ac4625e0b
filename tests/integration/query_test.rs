//! Query execution integration tests.
//!
//! Runs reads, statements and transactions against in-memory SQLite.

use pretty_assertions::assert_eq;
use zangetsu_data::db::{Database, SqliteClient, Status, Value};

async fn seeded() -> Database<SqliteClient> {
    let mut db = Database::sqlite_memory("sql");
    let result = db
        .execute_transaction(&[
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, age INTEGER)",
            "INSERT INTO users (name, age) VALUES ('alice', 30), ('bob', 17), ('carol', NULL)",
        ])
        .await;
    assert!(!result.is_error(), "seed failed: {:?}", result.message());
    db
}

#[tokio::test]
async fn test_read_with_positional_params() {
    let mut db = seeded().await;

    let result = db
        .read(
            "SELECT name FROM users WHERE age > ? ORDER BY name",
            &[Value::Int(18)],
        )
        .await;

    assert_eq!(result.column_names(), vec!["name"]);
    assert_eq!(result.rows, vec![vec![Value::String("alice".into())]]);
}

#[tokio::test]
async fn test_read_null_values() {
    let mut db = seeded().await;
    let result = db
        .read("SELECT age FROM users WHERE name = ?", &[Value::from("carol")])
        .await;
    assert_eq!(result.get(0, "age"), Some(&Value::Null));
}

#[tokio::test]
async fn test_read_error_returns_empty_result() {
    let mut db = seeded().await;
    let result = db.read("SELECT * FROM missing_table", &[]).await;
    assert!(result.is_empty());
    assert!(result.columns.is_empty());

    let err = db.try_read("SELECT * FROM missing_table", &[]).await.unwrap_err();
    assert_eq!(err.category(), "Remote Error");
}

#[tokio::test]
async fn test_read_runs_write_statements() {
    let mut db = seeded().await;
    db.read("DELETE FROM users WHERE name = 'bob'", &[]).await;
    let result = db.read("SELECT COUNT(*) AS n FROM users", &[]).await;
    assert_eq!(result.get(0, "n"), Some(&Value::Int(2)));
}

#[tokio::test]
async fn test_execute_reports_rows_affected() {
    let mut db = seeded().await;
    let result = db.execute("UPDATE users SET age = 18 WHERE age IS NULL OR age < 18").await;

    assert_eq!(result.status_of(), Some(Status::Success));
    assert_eq!(result.get(0, "rows_affected"), Some(&Value::Int(2)));
}

#[tokio::test]
async fn test_execute_returns_rows_for_select() {
    let mut db = seeded().await;
    let result = db.execute("SELECT id, name FROM users ORDER BY id").await;
    assert_eq!(result.column_names(), vec!["id", "name"]);
    assert_eq!(result.row_count(), 3);
}

#[tokio::test]
async fn test_execute_error_is_status_record() {
    let mut db = seeded().await;
    let result = db.execute("INSERT INTO users (id, name) VALUES (1, 'dup')").await;

    assert!(result.is_error());
    assert!(result.message().unwrap().starts_with("Failed to execute query"));
}

#[tokio::test]
async fn test_transaction_failure_leaves_no_effect() {
    let mut db = seeded().await;
    let result = db
        .execute_transaction(&[
            "INSERT INTO users (name, age) VALUES ('dave', 40)",
            "INSERT INTO users (name, age) VALUES (NULL, 41)",
        ])
        .await;

    assert!(result.is_error());
    let count = db.read("SELECT COUNT(*) AS n FROM users", &[]).await;
    assert_eq!(count.get(0, "n"), Some(&Value::Int(3)));
}

#[tokio::test]
async fn test_transaction_reports_each_statement() {
    let mut db = seeded().await;
    let result = db
        .execute_transaction(&[
            "UPDATE users SET age = age + 1 WHERE age IS NOT NULL",
            "DELETE FROM users WHERE name = 'carol'",
        ])
        .await;

    assert_eq!(result.column_names(), vec!["query", "rows_affected"]);
    assert_eq!(result.column_values("rows_affected"), vec![&Value::Int(2), &Value::Int(1)]);
}

#[tokio::test]
async fn test_create_and_drop_table() {
    let mut db = Database::sqlite_memory("sql");

    let created = db
        .create_table("events", &[("id", "INTEGER PRIMARY KEY"), ("kind", "TEXT")])
        .await;
    assert_eq!(created.status_of(), Some(Status::Success));
    assert_eq!(db.try_list_tables().await.unwrap(), vec!["events".to_string()]);

    let dropped = db.drop_table("events").await;
    assert_eq!(dropped.status_of(), Some(Status::Success));
    assert!(db.try_list_tables().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_create_table_rejects_bad_identifier() {
    let mut db = Database::sqlite_memory("sql");
    let result = db.create_table("bad name; --", &[("id", "INTEGER")]).await;
    assert!(result.is_error());
    assert!(!db.is_connected());
}
