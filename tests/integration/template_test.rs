//! Query file integration tests.
//!
//! Renders templates from a temporary directory and runs them.

use pretty_assertions::assert_eq;
use std::fs;
use tempfile::{tempdir, TempDir};
use zangetsu_data::db::{Database, SqliteClient, Value};
use zangetsu_data::error::DataError;
use zangetsu_data::sql::Bindings;

async fn setup(files: &[(&str, &str)]) -> (TempDir, Database<SqliteClient>) {
    let dir = tempdir().unwrap();
    for (name, body) in files {
        fs::write(dir.path().join(name), body).unwrap();
    }
    let mut db = Database::sqlite_memory(dir.path());
    db.execute_transaction(&[
        "CREATE TABLE people (name TEXT, age INTEGER)",
        "INSERT INTO people VALUES ('kid', 9), ('adult', 40)",
    ])
    .await;
    (dir, db)
}

#[tokio::test]
async fn test_get_query_from_file_substitutes() {
    let (_dir, db) = setup(&[("adults.sql", "SELECT * WHERE age > {{min_age}}")]).await;
    let sql = db
        .get_query_from_file("adults", &Bindings::new().with("min_age", 18))
        .unwrap();
    assert_eq!(sql, "SELECT * WHERE age > 18");
}

#[tokio::test]
async fn test_execute_query_file_with_bindings_and_params() {
    let (_dir, mut db) = setup(&[(
        "by_age.sql",
        "SELECT name FROM {{ table }} WHERE age > ? ORDER BY name",
    )])
    .await;

    let result = db
        .execute_query_file(
            "by_age.sql",
            &[Value::Int(18)],
            &Bindings::new().with("table", "people"),
        )
        .await;
    assert_eq!(result.rows, vec![vec![Value::from("adult")]]);
}

#[tokio::test]
async fn test_missing_query_file() {
    let (_dir, mut db) = setup(&[]).await;

    let err = db.get_query_from_file("nope", &Bindings::new()).unwrap_err();
    assert!(matches!(err, DataError::NotFound(_)));

    let result = db.execute_query_file("nope", &[], &Bindings::new()).await;
    assert!(result.is_error());
}

#[tokio::test]
async fn test_unbound_placeholder_is_template_error() {
    let (_dir, mut db) = setup(&[("q.sql", "SELECT {{missing}}")]).await;

    let err = db
        .try_execute_query_file("q", &[], &Bindings::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::Template(_)));
}

#[tokio::test]
async fn test_query_name_cannot_escape_directory() {
    let (_dir, db) = setup(&[]).await;
    let err = db.get_query_from_file("../etc/passwd", &Bindings::new()).unwrap_err();
    assert!(matches!(err, DataError::Validation(_)));
}

#[tokio::test]
async fn test_missing_template_directory_is_precondition() {
    let dir = tempdir().unwrap();
    let db = Database::sqlite_memory(dir.path().join("absent"));
    let err = db.get_query_from_file("q", &Bindings::new()).unwrap_err();
    assert!(err.is_precondition());
}
