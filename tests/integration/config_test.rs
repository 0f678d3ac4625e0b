//! Configuration integration tests.
//!
//! Loads TOML files and opens the configured databases.

use pretty_assertions::assert_eq;
use std::fs;
use tempfile::tempdir;
use zangetsu_data::config::{Config, DatabaseConfig};
use zangetsu_data::db::{self, DatabaseBackend, Value};
use zangetsu_data::sql::TemplateLoader;

#[test]
fn test_missing_config_file_yields_defaults() {
    let dir = tempdir().unwrap();
    let config = Config::load_from_file(&dir.path().join("none.toml")).unwrap();
    assert!(config.databases.is_empty());
    assert!(config.get_database(None).is_none());
}

#[test]
fn test_invalid_config_names_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[databases.default]\nkind = \"oracle\"\n").unwrap();

    let err = Config::load_from_file(&path).unwrap_err();
    assert_eq!(err.category(), "Configuration Error");
    assert!(err.to_string().contains("bad.toml"));
}

#[tokio::test]
async fn test_open_configured_sqlite() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("app.db");
    let config_path = dir.path().join("config.toml");
    fs::write(
        &config_path,
        format!(
            r#"
sql_dir = "{sql}"

[databases.default]
kind = "sqlite"
path = "{db}"

[databases.warehouse]
kind = "bigquery"
project_id = "proj"
dataset_id = "ds"
"#,
            sql = dir.path().display(),
            db = db_path.display()
        ),
    )
    .unwrap();

    let config = Config::load_from_file(&config_path).unwrap();
    assert_eq!(
        config.get_database(Some("warehouse")).map(DatabaseConfig::backend),
        Some(DatabaseBackend::BigQuery)
    );

    let database = config.get_database(None).unwrap();
    let mut db = db::open(database, TemplateLoader::new(&config.sql_dir)).unwrap();
    assert_eq!(db.backend(), DatabaseBackend::Sqlite);

    let result = db.read("SELECT 41 + 1 AS answer", &[]).await;
    assert_eq!(result.get(0, "answer"), Some(&Value::Int(42)));
    db.close().await.unwrap();
}
