//! Connection lifecycle integration tests.
//!
//! Tests lazy connect, idempotent connect/close and connection errors.

use tempfile::tempdir;
use zangetsu_data::config::{ConnectionConfig, DatabaseConfig, SqliteConfig};
use zangetsu_data::db::{self, Database, PostgresClient, Value};
use zangetsu_data::error::DataError;
use zangetsu_data::sql::TemplateLoader;

/// Helper to get test database URL from environment.
fn get_test_database_url() -> Option<String> {
    std::env::var("DATABASE_URL").ok()
}

/// Helper to create a disconnected Postgres database.
fn get_test_postgres() -> Option<Database<PostgresClient>> {
    let url = get_test_database_url()?;
    let config = ConnectionConfig::from_connection_string(&url).ok()?;
    let client = PostgresClient::new(config).ok()?;
    Some(Database::new(client, TemplateLoader::new("sql")))
}

#[tokio::test]
async fn test_postgres_connect_is_idempotent() {
    let Some(mut db) = get_test_postgres() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    db.connect().await.unwrap();
    db.connect().await.unwrap();
    assert!(db.is_connected());

    let result = db.read("SELECT 1 AS num", &[]).await;
    assert_eq!(result.get(0, "num"), Some(&Value::Int(1)));

    db.close().await.unwrap();
    db.close().await.unwrap();
    assert!(!db.is_connected());
}

#[tokio::test]
async fn test_postgres_descriptor_masks_password() {
    let Some(db) = get_test_postgres() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let info = db.database_info();
    let text = info.rows[0][0].to_display_string();
    assert!(text.starts_with("PostgreSQL Database Connection: postgres://"));
    if let Some(password) = ConnectionConfig::from_connection_string(&get_test_database_url().unwrap())
        .unwrap()
        .password
    {
        assert!(!text.contains(&format!(":{password}@")));
    }
}

#[tokio::test(flavor = "current_thread")]
async fn test_postgres_connect_with_invalid_port() {
    let config = ConnectionConfig::new("127.0.0.1", 1, "testdb", "testuser", "testpass");
    let mut db = Database::new(PostgresClient::new(config).unwrap(), TemplateLoader::new("sql"));

    let err = db.connect().await.unwrap_err();
    assert!(matches!(err, DataError::Connection(_)), "got {err:?}");
    assert!(!db.is_connected());

    // Sentinel read swallows the failure.
    assert!(db.read("SELECT 1", &[]).await.is_empty());
}

#[tokio::test]
async fn test_sqlite_file_is_created_lazily() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("lazy.db");
    let config = DatabaseConfig::Sqlite(SqliteConfig::file(&path));

    let mut db = db::open(&config, TemplateLoader::new(dir.path())).unwrap();
    assert!(!db.is_connected());
    assert!(!path.exists());

    db.execute("CREATE TABLE t (id INTEGER)").await;
    assert!(db.is_connected());
    assert!(path.exists());
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_sqlite_data_survives_reconnect() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("persist.db");
    let mut db = Database::sqlite(&path, dir.path());

    db.execute("CREATE TABLE notes (body TEXT)").await;
    db.execute("INSERT INTO notes VALUES ('kept')").await;
    db.close().await.unwrap();
    assert!(!db.is_connected());

    let result = db.read("SELECT body FROM notes", &[]).await;
    assert_eq!(result.get(0, "body"), Some(&Value::String("kept".into())));
}

#[tokio::test]
async fn test_close_without_connect_is_noop() {
    let mut db = Database::sqlite_memory("sql");
    db.close().await.unwrap();
    assert!(!db.is_connected());
}
