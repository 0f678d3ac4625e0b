//! Schema introspection integration tests.
//!
//! Tests table listing and the normalized schema shape.

use pretty_assertions::assert_eq;
use zangetsu_data::db::{
    Column, Database, MockDatabaseClient, SqliteClient, Status, Value, SCHEMA_COLUMNS,
};
use zangetsu_data::sql::TemplateLoader;

async fn seeded() -> Database<SqliteClient> {
    let mut db = Database::sqlite_memory("sql");
    db.execute_transaction(&[
        "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL, note TEXT DEFAULT 'none')",
        "CREATE TABLE orders (id INTEGER PRIMARY KEY, user_id INTEGER, total REAL)",
    ])
    .await;
    db
}

#[tokio::test]
async fn test_list_tables() {
    let mut db = seeded().await;
    let result = db.list_tables().await;
    assert_eq!(result.column_names(), vec!["table_name"]);
    assert_eq!(
        result.column_values("table_name"),
        vec![&Value::from("orders"), &Value::from("users")]
    );
}

#[tokio::test]
async fn test_table_schema_is_normalized() {
    let mut db = seeded().await;
    let schema = db.get_table_schema("users").await;

    assert_eq!(schema.column_names(), SCHEMA_COLUMNS.to_vec());
    assert_eq!(
        schema.rows,
        vec![
            vec![
                Value::from("id"),
                Value::from("INTEGER"),
                Value::Bool(false),
                Value::Null,
                Value::Bool(true),
                Value::from("users"),
            ],
            vec![
                Value::from("email"),
                Value::from("TEXT"),
                Value::Bool(false),
                Value::Null,
                Value::Bool(false),
                Value::from("users"),
            ],
            vec![
                Value::from("note"),
                Value::from("TEXT"),
                Value::Bool(true),
                Value::from("'none'"),
                Value::Bool(false),
                Value::from("users"),
            ],
        ]
    );
}

#[tokio::test]
async fn test_unknown_table_schema_is_error_record() {
    let mut db = seeded().await;
    let schema = db.get_table_schema("nope").await;
    assert!(schema.is_error());

    let err = db.try_get_table_schema("nope").await.unwrap_err();
    assert_eq!(err.category(), "Not Found");
}

#[tokio::test]
async fn test_all_schemas_concatenate() {
    let mut db = seeded().await;
    let all = db.export_schema(None).await;

    assert_eq!(all.row_count(), 6);
    let tables: Vec<_> = all
        .column_values("table_name")
        .into_iter()
        .map(|v| v.to_display_string())
        .collect();
    assert_eq!(tables, vec!["orders", "orders", "orders", "users", "users", "users"]);
}

#[tokio::test]
async fn test_all_schemas_empty_database_warns() {
    let mut db = Database::sqlite_memory("sql");
    let all = db.get_all_schemas().await;
    assert_eq!(all.status_of(), Some(Status::Warning));
}

#[tokio::test]
async fn test_all_schemas_skip_failing_table() {
    let client = MockDatabaseClient::new()
        .with_table("good", vec![Column::new("id", "int")])
        .with_broken_table("bad")
        .with_table("also_good", vec![Column::new("x", "text"), Column::new("y", "text")]);
    let mut db = Database::new(client, TemplateLoader::new("sql"));

    let all = db.get_all_schemas().await;
    assert!(!all.is_error());
    assert_eq!(all.row_count(), 3);
    assert!(all
        .column_values("table_name")
        .iter()
        .all(|v| **v != Value::from("bad")));
}
