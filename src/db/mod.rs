//! Database abstraction layer.
//!
//! Backends implement the [`DatabaseClient`] trait; [`Database`] wraps one
//! client and exposes the tabular-result API on top of it.

mod bigquery;
mod database;
mod mock;
mod postgres;
mod schema;
mod sqlite;
mod types;

pub use bigquery::{BigQuery, BigQueryClient};
pub use database::{Database, DATABASE_INFO_COLUMN, TABLE_NAME_COLUMN};
pub use mock::MockDatabaseClient;
pub use postgres::{Postgresql, PostgresClient};
pub use schema::{schema_table, Column, SCHEMA_COLUMNS};
pub use sqlite::{Sqlite, SqliteClient};
pub use types::{ColumnInfo, QueryResult, Row, Status, Value, MESSAGE_COLUMN, STATUS_COLUMN};

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::sql::TemplateLoader;
use async_trait::async_trait;
use sqlparser::dialect::{BigQueryDialect, Dialect, PostgreSqlDialect, SQLiteDialect};

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Postgres,
    Sqlite,
    BigQuery,
}

impl DatabaseBackend {
    /// Returns the backend as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
            Self::BigQuery => "bigquery",
        }
    }

    /// Parses a backend from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::Postgres),
            "sqlite" => Some(Self::Sqlite),
            "bigquery" => Some(Self::BigQuery),
            _ => None,
        }
    }

    /// Returns the URL scheme used in connection descriptors.
    pub fn url_scheme(&self) -> &'static str {
        self.as_str()
    }

    /// Returns the human-readable product name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Postgres => "PostgreSQL",
            Self::Sqlite => "SQLite",
            Self::BigQuery => "BigQuery",
        }
    }

    /// Returns the SQL dialect used to classify statements for this backend.
    pub fn dialect(&self) -> Box<dyn Dialect> {
        match self {
            Self::Postgres => Box::new(PostgreSqlDialect {}),
            Self::Sqlite => Box::new(SQLiteDialect {}),
            Self::BigQuery => Box::new(BigQueryDialect {}),
        }
    }
}

/// Builds a lazily-connecting database for the given configuration.
///
/// This is the central factory used by the CLI.
pub fn open(
    config: &DatabaseConfig,
    templates: TemplateLoader,
) -> Result<Database<Box<dyn DatabaseClient>>> {
    let client: Box<dyn DatabaseClient> = match config {
        DatabaseConfig::Postgres(pg) => Box::new(PostgresClient::new(pg.clone())?),
        DatabaseConfig::Sqlite(lite) => Box::new(SqliteClient::new(lite.clone())),
        DatabaseConfig::BigQuery(bq) => Box::new(BigQueryClient::new(bq.clone())?),
    };
    Ok(Database::new(client, templates))
}

/// Trait defining the interface for database clients.
///
/// A client owns at most one open connection. Every method except
/// [`connect`](Self::connect), [`close`](Self::close) and the accessors
/// requires an open connection and fails with a precondition error
/// otherwise.
#[async_trait]
pub trait DatabaseClient: Send {
    /// Returns the backend this client talks to.
    fn backend(&self) -> DatabaseBackend;

    /// Returns the connection descriptor with any password masked.
    fn descriptor(&self) -> String;

    /// Returns true while a connection is open.
    fn is_connected(&self) -> bool;

    /// Opens the connection. No-op when already connected.
    async fn connect(&mut self) -> Result<()>;

    /// Closes the connection. No-op when not connected.
    async fn close(&mut self) -> Result<()>;

    /// Runs a row-returning statement with positional parameters.
    async fn fetch(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Runs one statement and commits it, returning the affected-row count
    /// when the backend reports one.
    async fn execute(&mut self, sql: &str) -> Result<Option<u64>>;

    /// Runs all statements as one atomic unit. Either every statement takes
    /// effect or none does.
    async fn execute_batch(&mut self, statements: &[String]) -> Result<Vec<Option<u64>>>;

    /// Lists the user tables visible to this connection.
    async fn list_tables(&mut self) -> Result<Vec<String>>;

    /// Describes the columns of one table. An unknown table is a not-found
    /// error.
    async fn table_columns(&mut self, table: &str) -> Result<Vec<Column>>;
}

#[async_trait]
impl<C: DatabaseClient + ?Sized> DatabaseClient for Box<C> {
    fn backend(&self) -> DatabaseBackend {
        (**self).backend()
    }

    fn descriptor(&self) -> String {
        (**self).descriptor()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    async fn connect(&mut self) -> Result<()> {
        (**self).connect().await
    }

    async fn close(&mut self) -> Result<()> {
        (**self).close().await
    }

    async fn fetch(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        (**self).fetch(sql, params).await
    }

    async fn execute(&mut self, sql: &str) -> Result<Option<u64>> {
        (**self).execute(sql).await
    }

    async fn execute_batch(&mut self, statements: &[String]) -> Result<Vec<Option<u64>>> {
        (**self).execute_batch(statements).await
    }

    async fn list_tables(&mut self) -> Result<Vec<String>> {
        (**self).list_tables().await
    }

    async fn table_columns(&mut self, table: &str) -> Result<Vec<Column>> {
        (**self).table_columns(table).await
    }
}
