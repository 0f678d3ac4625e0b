//! SQLite database client implementation.
//!
//! Provides the `SqliteClient` struct that implements the `DatabaseClient`
//! trait for SQLite files and private in-memory databases using sqlx.

use crate::config::SqliteConfig;
use crate::db::{Column, ColumnInfo, Database, DatabaseBackend, DatabaseClient, QueryResult, Row, Value};
use crate::error::{DataError, Result};
use crate::sql::TemplateLoader;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{
    Column as SqlxColumn, ConnectOptions, Connection, Executor, Row as SqlxRow, Statement,
    TypeInfo, ValueRef,
};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;
use tracing::{debug, warn};

/// A SQLite-backed [`Database`].
pub type Sqlite = Database<SqliteClient>;

impl Database<SqliteClient> {
    /// Creates a database for the SQLite file at `path`.
    pub fn sqlite(path: impl Into<PathBuf>, sql_dir: impl Into<PathBuf>) -> Self {
        Database::new(
            SqliteClient::new(SqliteConfig::file(path.into())),
            TemplateLoader::new(sql_dir),
        )
    }

    /// Creates a database backed by a private in-memory SQLite instance.
    pub fn sqlite_memory(sql_dir: impl Into<PathBuf>) -> Self {
        Database::new(
            SqliteClient::new(SqliteConfig::memory()),
            TemplateLoader::new(sql_dir),
        )
    }
}

/// SQLite database client. Owns at most one connection.
#[derive(Debug)]
pub struct SqliteClient {
    config: SqliteConfig,
    conn: Option<SqliteConnection>,
}

impl SqliteClient {
    /// Creates a disconnected client.
    pub fn new(config: SqliteConfig) -> Self {
        Self { config, conn: None }
    }

    fn connect_options(&self) -> Result<SqliteConnectOptions> {
        if self.config.is_memory() {
            return SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DataError::config(format!("Invalid SQLite options: {e}")));
        }
        Ok(SqliteConnectOptions::new()
            .filename(&self.config.path)
            .create_if_missing(self.config.create_if_missing))
    }

    fn connection(&mut self) -> Result<&mut SqliteConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| DataError::precondition("SQLite connection is not open"))
    }
}

#[async_trait]
impl DatabaseClient for SqliteClient {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Sqlite
    }

    fn descriptor(&self) -> String {
        self.config.descriptor()
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    async fn connect(&mut self) -> Result<()> {
        if self.conn.is_some() {
            return Ok(());
        }
        let conn = self
            .connect_options()?
            .connect()
            .await
            .map_err(|e| DataError::connection(format!("Cannot open {}: {e}", self.descriptor())))?;
        debug!("Opened SQLite database {}", self.config.path);
        self.conn = Some(conn);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().await?;
        }
        Ok(())
    }

    async fn fetch(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let conn = self.connection()?;
        let start = Instant::now();

        let mut query = sqlx::query(sql);
        for param in params {
            query = match param {
                Value::Null => query.bind(None::<String>),
                Value::Bool(b) => query.bind(*b),
                Value::Int(i) => query.bind(*i),
                Value::Float(f) => query.bind(*f),
                Value::String(s) => query.bind(s.clone()),
                Value::Bytes(b) => query.bind(b.clone()),
            };
        }
        let result = query.fetch_all(&mut *conn).await?;
        let execution_time = start.elapsed();

        let columns: Vec<ColumnInfo> = match result.first() {
            Some(first_row) => first_row
                .columns()
                .iter()
                .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                .collect(),
            None => {
                let statement = (&mut *conn).prepare(sql).await?;
                statement
                    .columns()
                    .iter()
                    .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                    .collect()
            }
        };

        let rows: Vec<Row> = result.iter().map(convert_row).collect();
        Ok(QueryResult::with_data(columns, rows).with_execution_time(execution_time))
    }

    async fn execute(&mut self, sql: &str) -> Result<Option<u64>> {
        let conn = self.connection()?;
        let done = sqlx::query(sql).execute(&mut *conn).await?;
        Ok(Some(done.rows_affected()))
    }

    async fn execute_batch(&mut self, statements: &[String]) -> Result<Vec<Option<u64>>> {
        let conn = self.connection()?;
        let mut tx = conn.begin().await?;
        let mut counts = Vec::with_capacity(statements.len());

        for statement in statements {
            match sqlx::query(statement).execute(&mut *tx).await {
                Ok(done) => counts.push(Some(done.rows_affected())),
                Err(e) => {
                    if let Err(rollback) = tx.rollback().await {
                        warn!("Rollback failed: {rollback}");
                    }
                    return Err(e.into());
                }
            }
        }

        tx.commit().await?;
        Ok(counts)
    }

    async fn list_tables(&mut self) -> Result<Vec<String>> {
        let conn = self.connection()?;
        let tables: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT name
            FROM sqlite_master
            WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#,
        )
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| DataError::remote(format!("Failed to fetch tables: {e}")))?;
        Ok(tables)
    }

    async fn table_columns(&mut self, table: &str) -> Result<Vec<Column>> {
        let conn = self.connection()?;
        let rows: Vec<(String, String, i64, Option<String>, i64)> = sqlx::query_as(
            r#"
            SELECT name, type, "notnull", dflt_value, pk
            FROM pragma_table_info(?1)
            ORDER BY cid
            "#,
        )
        .bind(table)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| DataError::remote(format!("Failed to fetch columns for {table}: {e}")))?;

        if rows.is_empty() {
            return Err(DataError::not_found(format!("table '{table}'")));
        }

        Ok(rows
            .into_iter()
            .map(|(name, data_type, not_null, default, pk)| Column {
                name,
                data_type,
                is_nullable: not_null == 0 && pk == 0,
                default,
                is_primary_key: pk > 0,
            })
            .collect())
    }
}

/// Converts a sqlx SqliteRow to our Row type.
fn convert_row(row: &SqliteRow) -> Row {
    (0..row.columns().len())
        .map(|i| convert_value(row, i))
        .collect()
}

/// Converts one cell using its runtime storage class, since SQLite column
/// declarations do not constrain the stored value.
fn convert_value(row: &SqliteRow, index: usize) -> Value {
    let storage = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_uppercase(),
        Err(_) => return Value::Null,
    };

    let value = match storage.as_str() {
        "INTEGER" => row.try_get_unchecked::<i64, _>(index).map(Value::Int),
        "REAL" => row.try_get_unchecked::<f64, _>(index).map(Value::Float),
        "BLOB" => row.try_get_unchecked::<Vec<u8>, _>(index).map(Value::Bytes),
        _ => row.try_get_unchecked::<String, _>(index).map(Value::String),
    };
    value.unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Status;
    use pretty_assertions::assert_eq;

    fn memory_db() -> Sqlite {
        Database::sqlite_memory("sql")
    }

    #[tokio::test]
    async fn test_connect_twice_keeps_one_connection() {
        let mut db = memory_db();
        db.connect().await.unwrap();
        db.execute("CREATE TABLE kept (id INTEGER)").await;
        db.connect().await.unwrap();

        // A second connection to :memory: would be a fresh, empty database.
        let tables = db.try_list_tables().await.unwrap();
        assert_eq!(tables, vec!["kept".to_string()]);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut db = memory_db();
        db.close().await.unwrap();
        db.connect().await.unwrap();
        db.close().await.unwrap();
        db.close().await.unwrap();
        assert!(!db.is_connected());
    }

    #[tokio::test]
    async fn test_read_with_params_and_types() {
        let mut db = memory_db();
        db.try_execute_transaction(&[
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, score REAL, avatar BLOB)",
            "INSERT INTO users VALUES (1, 'ann', 9.5, x'0102')",
            "INSERT INTO users VALUES (2, 'bob', NULL, NULL)",
        ])
        .await
        .unwrap();

        let result = db
            .try_read("SELECT * FROM users WHERE id > ?", &[Value::Int(0)])
            .await
            .unwrap();
        assert_eq!(result.column_names(), vec!["id", "name", "score", "avatar"]);
        assert_eq!(
            result.rows[0],
            vec![
                Value::Int(1),
                Value::from("ann"),
                Value::Float(9.5),
                Value::Bytes(vec![1, 2])
            ]
        );
        assert_eq!(result.get(1, "score"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_empty_result_keeps_columns() {
        let mut db = memory_db();
        db.execute("CREATE TABLE t (a INTEGER, b TEXT)").await;
        let result = db.try_read("SELECT a, b FROM t", &[]).await.unwrap();
        assert!(result.is_empty());
        assert_eq!(result.column_names(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_execute_reports_rows_affected() {
        let mut db = memory_db();
        db.execute("CREATE TABLE t (a INTEGER)").await;
        db.execute("INSERT INTO t VALUES (1), (2), (3)").await;
        let result = db.execute("UPDATE t SET a = a + 1 WHERE a > 1").await;
        assert_eq!(result.status_of(), Some(Status::Success));
        assert_eq!(result.get(0, "rows_affected"), Some(&Value::Int(2)));
    }

    #[tokio::test]
    async fn test_execute_error_is_status_record() {
        let mut db = memory_db();
        let result = db.execute("INSERT INTO missing VALUES (1)").await;
        assert!(result.is_error());
    }

    #[tokio::test]
    async fn test_failed_transaction_leaves_no_effect() {
        let mut db = memory_db();
        db.execute("CREATE TABLE t (a INTEGER NOT NULL)").await;

        let result = db
            .execute_transaction(&["INSERT INTO t VALUES (1)", "INSERT INTO t VALUES (NULL)"])
            .await;
        assert!(result.is_error());

        let rows = db.try_read("SELECT COUNT(*) AS n FROM t", &[]).await.unwrap();
        assert_eq!(rows.get(0, "n"), Some(&Value::Int(0)));
    }

    #[tokio::test]
    async fn test_create_and_drop_table() {
        let mut db = memory_db();
        let created = db
            .create_table("users", &[("id", "INTEGER PRIMARY KEY"), ("email", "TEXT NOT NULL")])
            .await;
        assert_eq!(created.status_of(), Some(Status::Success));

        let duplicate = db.create_table("users", &[("id", "INTEGER")]).await;
        assert!(duplicate.is_error());

        let dropped = db.drop_table("users").await;
        assert_eq!(dropped.status_of(), Some(Status::Success));
        assert!(db.try_list_tables().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_table_schema() {
        let mut db = memory_db();
        db.execute(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL, note TEXT DEFAULT 'n/a')",
        )
        .await;

        let schema = db.try_get_table_schema("users").await.unwrap();
        assert_eq!(schema.row_count(), 3);
        assert_eq!(schema.get(0, "primary_key"), Some(&Value::Bool(true)));
        assert_eq!(schema.get(1, "nullable"), Some(&Value::Bool(false)));
        assert_eq!(schema.get(2, "default"), Some(&Value::from("'n/a'")));
        assert_eq!(schema.get(2, "type"), Some(&Value::from("TEXT")));

        assert!(matches!(
            db.try_get_table_schema("ghost").await,
            Err(DataError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.db");

        let mut db = Database::sqlite(&path, dir.path());
        db.execute("CREATE TABLE t (a INTEGER)").await;
        db.close().await.unwrap();

        let mut reopened = Database::sqlite(&path, dir.path());
        assert_eq!(reopened.try_list_tables().await.unwrap(), vec!["t".to_string()]);
        assert_eq!(reopened.descriptor(), format!("sqlite:{}", path.display()));
    }

    #[tokio::test]
    async fn test_fetch_requires_connection() {
        let mut client = SqliteClient::new(SqliteConfig::memory());
        let err = client.fetch("SELECT 1", &[]).await.unwrap_err();
        assert!(err.is_precondition());
    }
}
