//! PostgreSQL database client implementation.
//!
//! Provides the `PostgresClient` struct that implements the `DatabaseClient` trait
//! for PostgreSQL databases using sqlx.

use crate::config::ConnectionConfig;
use crate::db::{Column, ColumnInfo, Database, DatabaseBackend, DatabaseClient, QueryResult, Row, Value};
use crate::error::{DataError, Result};
use crate::sql::TemplateLoader;
use async_trait::async_trait;
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::{Column as SqlxColumn, Connection, Executor, Row as SqlxRow, Statement, TypeInfo};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Maximum number of connection retry attempts.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// A PostgreSQL-backed [`Database`].
pub type Postgresql = Database<PostgresClient>;

impl Database<PostgresClient> {
    /// Creates a database from discrete connection fields. Nothing is
    /// opened until first use.
    pub fn postgres(
        host: &str,
        port: u16,
        db_name: &str,
        user: &str,
        password: &str,
        sql_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let config = ConnectionConfig::new(host, port, db_name, user, password);
        Ok(Database::new(
            PostgresClient::new(config)?,
            TemplateLoader::new(sql_dir),
        ))
    }

    /// Like [`postgres`](Self::postgres) but opens the connection right away.
    pub async fn connect_new(
        host: &str,
        port: u16,
        db_name: &str,
        user: &str,
        password: &str,
        sql_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let mut db = Self::postgres(host, port, db_name, user, password, sql_dir)?;
        db.connect().await?;
        Ok(db)
    }
}

/// PostgreSQL database client. Owns at most one connection.
#[derive(Debug)]
pub struct PostgresClient {
    config: ConnectionConfig,
    conn: Option<PgConnection>,
}

impl PostgresClient {
    /// Creates a disconnected client. Fails if the configuration cannot
    /// form a connection string.
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        config.to_connection_string()?;
        Ok(Self { config, conn: None })
    }

    /// Returns the connection configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn connection(&mut self) -> Result<&mut PgConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| DataError::precondition("PostgreSQL connection is not open"))
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Postgres
    }

    fn descriptor(&self) -> String {
        self.config.masked_connection_string()
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    async fn connect(&mut self) -> Result<()> {
        if self.conn.is_some() {
            return Ok(());
        }
        let conn_str = self.config.to_connection_string()?;

        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);
        let mut attempt = 1;

        loop {
            debug!("Connection attempt {} of {}", attempt, MAX_RETRY_ATTEMPTS);

            match PgConnection::connect(&conn_str).await {
                Ok(conn) => {
                    debug!("Successfully connected to {}", self.config.display_string());
                    self.conn = Some(conn);
                    return Ok(());
                }
                Err(e) if attempt < MAX_RETRY_ATTEMPTS && is_transient_error(&e) => {
                    warn!(
                        "Connection attempt {} failed (transient error), retrying in {:?}",
                        attempt, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(map_connection_error(e, &self.config)),
            }
        }
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
        let result = query
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| DataError::remote(format_query_error(e)))?;
        let execution_time = start.elapsed();

        // Column metadata comes from the first row, or from the prepared
        // statement when the result is empty.
        let columns: Vec<ColumnInfo> = match result.first() {
            Some(first_row) => first_row
                .columns()
                .iter()
                .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                .collect(),
            None => match (&mut *conn).prepare(sql).await {
                Ok(statement) => statement
                    .columns()
                    .iter()
                    .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                    .collect(),
                Err(e) => {
                    debug!("Could not describe empty result: {e}");
                    Vec::new()
                }
            },
        };

        let rows: Vec<Row> = result.iter().map(convert_row).collect();
        Ok(QueryResult::with_data(columns, rows).with_execution_time(execution_time))
    }

    async fn execute(&mut self, sql: &str) -> Result<Option<u64>> {
        let conn = self.connection()?;
        let done = sqlx::query(sql)
            .execute(&mut *conn)
            .await
            .map_err(|e| DataError::remote(format_query_error(e)))?;
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
                    return Err(DataError::remote(format_query_error(e)));
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
            SELECT table_name::text
            FROM information_schema.tables
            WHERE table_schema = 'public' AND table_type = 'BASE TABLE'
            ORDER BY table_name
            "#,
        )
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| DataError::remote(format!("Failed to fetch tables: {e}")))?;
        Ok(tables)
    }

    async fn table_columns(&mut self, table: &str) -> Result<Vec<Column>> {
        let conn = self.connection()?;
        let rows: Vec<(String, String, String, Option<String>, bool)> = sqlx::query_as(
            r#"
            SELECT
                c.column_name::text,
                c.data_type::text,
                c.is_nullable::text,
                c.column_default::text,
                EXISTS (
                    SELECT 1
                    FROM information_schema.table_constraints tc
                    JOIN information_schema.key_column_usage kcu
                        ON tc.constraint_name = kcu.constraint_name
                        AND tc.table_schema = kcu.table_schema
                    WHERE tc.table_schema = c.table_schema
                        AND tc.table_name = c.table_name
                        AND tc.constraint_type = 'PRIMARY KEY'
                        AND kcu.column_name = c.column_name
                ) AS is_primary_key
            FROM information_schema.columns c
            WHERE c.table_schema = 'public' AND c.table_name = $1
            ORDER BY c.ordinal_position
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
            .map(|(name, data_type, is_nullable, default, is_primary_key)| Column {
                name,
                data_type,
                is_nullable: is_nullable == "YES",
                default,
                is_primary_key,
            })
            .collect())
    }
}

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Converts a single column value from a PgRow to our Value type.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    match type_name.to_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),

        "INT2" | "SMALLINT" => row
            .try_get::<Option<i16>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT4" | "INT" | "INTEGER" => row
            .try_get::<Option<i32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT8" | "BIGINT" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null),

        "FLOAT4" | "REAL" => row
            .try_get::<Option<f32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Float(v as f64))
            .unwrap_or(Value::Null),

        "FLOAT8" | "DOUBLE PRECISION" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),

        "BYTEA" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null),

        "JSON" | "JSONB" => row
            .try_get::<Option<serde_json::Value>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null),

        // Everything else is read as text
        _ => row
            .try_get::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

/// Determines if an error is transient and worth retrying.
fn is_transient_error(error: &sqlx::Error) -> bool {
    if matches!(error, sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut) {
        return true;
    }

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
        || error_str.contains("does not exist")
    {
        return false;
    }

    error_str.contains("connection refused")
        || error_str.contains("timed out")
        || error_str.contains("temporarily unavailable")
        || error_str.contains("connection reset")
        || error_str.contains("broken pipe")
}

/// Maps sqlx connection errors to user-facing messages.
fn map_connection_error(error: sqlx::Error, config: &ConnectionConfig) -> DataError {
    let host = config.host.as_deref().unwrap_or("localhost");
    let port = config.port;
    let user = config.user.as_deref().unwrap_or("unknown");
    let database = config.database.as_deref().unwrap_or("unknown");

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        DataError::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        DataError::connection(format!(
            "Authentication failed for user '{user}'. Check your credentials."
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        DataError::connection(format!("Database '{database}' does not exist."))
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        DataError::connection(format!(
            "Connection to {host}:{port} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        DataError::connection(error.to_string())
    }
}

/// Formats a query error with the server's detail and hint when present.
fn format_query_error(error: sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = format!("ERROR: {}", db_error.message());
    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            result.push_str("\n  DETAIL: ");
            result.push_str(detail);
        }
        if let Some(hint) = pg_error.hint() {
            result.push_str("\n  HINT: ");
            result.push_str(hint);
        }
    }
    result
}
