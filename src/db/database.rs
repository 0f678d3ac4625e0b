//! The database access base.
//!
//! [`Database`] owns one [`DatabaseClient`] and a [`TemplateLoader`]. Each
//! operation comes in two forms: a `try_` method that propagates
//! [`DataError`], and a sentinel method that logs the failure and returns a
//! safe tabular value instead (an empty result or a status record).

use std::fmt;
use std::sync::OnceLock;
use std::time::Instant;

use regex::Regex;
use tracing::{debug, error, info, warn};

use super::{schema_table, ColumnInfo, DatabaseBackend, DatabaseClient, QueryResult, Value};
use crate::error::{DataError, Result};
use crate::sql::{classify, Bindings, TemplateLoader};

/// Column holding the descriptor in [`Database::database_info`].
pub const DATABASE_INFO_COLUMN: &str = "database_info";

/// Column holding table names in [`Database::list_tables`].
pub const TABLE_NAME_COLUMN: &str = "table_name";

fn table_identifier() -> &'static Regex {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    IDENT.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$")
            .expect("identifier pattern is valid")
    })
}

fn check_identifier(kind: &str, name: &str) -> Result<()> {
    if table_identifier().is_match(name) {
        Ok(())
    } else {
        Err(DataError::validation(format!("invalid {kind} name '{name}'")))
    }
}

/// A database connection with the tabular-result API on top.
pub struct Database<C: DatabaseClient> {
    client: C,
    templates: TemplateLoader,
}

impl<C: DatabaseClient> Database<C> {
    /// Wraps a client. Nothing is opened until the first operation that
    /// needs a connection.
    pub fn new(client: C, templates: TemplateLoader) -> Self {
        Self { client, templates }
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns the template loader.
    pub fn templates(&self) -> &TemplateLoader {
        &self.templates
    }

    /// Returns the backend of the underlying client.
    pub fn backend(&self) -> DatabaseBackend {
        self.client.backend()
    }

    /// Returns the masked connection descriptor.
    pub fn descriptor(&self) -> String {
        self.client.descriptor()
    }

    /// Returns true while a connection is open.
    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    /// Opens the connection. Calling it again while connected is a no-op.
    pub async fn connect(&mut self) -> Result<()> {
        if self.client.is_connected() {
            debug!("Already connected to {}", self.descriptor());
            return Ok(());
        }
        self.client.connect().await?;
        info!("Connected to {}", self.descriptor());
        Ok(())
    }

    /// Closes the connection. Does nothing when no connection is open.
    pub async fn close(&mut self) -> Result<()> {
        if !self.client.is_connected() {
            return Ok(());
        }
        self.client.close().await?;
        info!("Closed connection to {}", self.descriptor());
        Ok(())
    }

    /// One-row result describing the connection.
    pub fn database_info(&self) -> QueryResult {
        QueryResult::from_names(
            &[DATABASE_INFO_COLUMN],
            vec![vec![Value::from(self.to_string())]],
        )
    }

    /// Runs a read query with positional parameters.
    pub async fn try_read(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let classification = classify(self.backend().dialect().as_ref(), sql);
        if !classification.is_read_only() {
            warn!(
                "read() called with a {} statement; running it anyway",
                classification.kind
            );
        }
        self.connect().await?;
        self.client.fetch(sql, params).await
    }

    /// Runs a read query; any failure is logged and yields an empty result.
    pub async fn read(&mut self, sql: &str, params: &[Value]) -> QueryResult {
        match self.try_read(sql, params).await {
            Ok(result) => result,
            Err(e) => {
                error!("Failed to read from database: {e}");
                QueryResult::new()
            }
        }
    }

    /// Runs one statement and commits it.
    ///
    /// Row-returning statements yield their rows. Anything else yields a
    /// `success` record with a `rows_affected` column.
    pub async fn try_execute(&mut self, sql: &str) -> Result<QueryResult> {
        let classification = classify(self.backend().dialect().as_ref(), sql);
        self.connect().await?;

        if classification.returns_rows {
            return self.client.fetch(sql, &[]).await;
        }

        let start = Instant::now();
        let affected = self.client.execute(sql).await?;
        Ok(QueryResult::success("Query executed successfully")
            .with_constant_column("rows_affected", "int8", Value::from(affected))
            .with_execution_time(start.elapsed()))
    }

    /// Runs one statement; a failure becomes an `error` status record.
    pub async fn execute(&mut self, sql: &str) -> QueryResult {
        match self.try_execute(sql).await {
            Ok(result) => result,
            Err(e) => {
                let message = format!("Failed to execute query: {e}");
                error!("{message}");
                QueryResult::error(message)
            }
        }
    }

    /// Runs every statement in one transaction.
    ///
    /// Returns one record per statement with `query` and `rows_affected`.
    /// If any statement fails, none of them take effect.
    pub async fn try_execute_transaction<S: AsRef<str>>(
        &mut self,
        queries: &[S],
    ) -> Result<QueryResult> {
        let statements: Vec<String> = queries.iter().map(|q| q.as_ref().to_string()).collect();
        self.connect().await?;

        let start = Instant::now();
        let counts = self.client.execute_batch(&statements).await?;
        let rows = statements
            .into_iter()
            .zip(counts)
            .map(|(query, count)| vec![Value::String(query), Value::from(count)])
            .collect();

        Ok(QueryResult::with_data(
            vec![
                ColumnInfo::new("query", "text"),
                ColumnInfo::new("rows_affected", "int8"),
            ],
            rows,
        )
        .with_execution_time(start.elapsed()))
    }

    /// Runs a transaction; a failure becomes an `error` status record.
    pub async fn execute_transaction<S: AsRef<str>>(&mut self, queries: &[S]) -> QueryResult {
        match self.try_execute_transaction(queries).await {
            Ok(result) => result,
            Err(e) => {
                let message = format!("Transaction rolled back: {e}");
                error!("{message}");
                QueryResult::error(message)
            }
        }
    }

    /// Creates a table from `(column, definition)` pairs, e.g.
    /// `("id", "INTEGER PRIMARY KEY")`.
    pub async fn try_create_table(
        &mut self,
        table_name: &str,
        columns: &[(&str, &str)],
    ) -> Result<()> {
        check_identifier("table", table_name)?;
        if columns.is_empty() {
            return Err(DataError::validation(format!(
                "table '{table_name}' needs at least one column"
            )));
        }
        let mut definitions = Vec::with_capacity(columns.len());
        for (name, data_type) in columns {
            check_identifier("column", name)?;
            definitions.push(format!("{name} {data_type}"));
        }

        let ddl = format!("CREATE TABLE {table_name} ({})", definitions.join(", "));
        self.connect().await?;
        self.client.execute(&ddl).await?;
        Ok(())
    }

    /// Creates a table and reports the outcome as a status record.
    pub async fn create_table(&mut self, table_name: &str, columns: &[(&str, &str)]) -> QueryResult {
        match self.try_create_table(table_name, columns).await {
            Ok(()) => {
                info!("Created table {table_name}");
                QueryResult::success(format!("Table {table_name} created successfully"))
            }
            Err(e) => {
                let message = format!("Failed to create table {table_name}: {e}");
                error!("{message}");
                QueryResult::error(message)
            }
        }
    }

    /// Drops a table.
    pub async fn try_drop_table(&mut self, table_name: &str) -> Result<()> {
        check_identifier("table", table_name)?;
        self.connect().await?;
        self.client
            .execute(&format!("DROP TABLE {table_name}"))
            .await?;
        Ok(())
    }

    /// Drops a table and reports the outcome as a status record.
    pub async fn drop_table(&mut self, table_name: &str) -> QueryResult {
        match self.try_drop_table(table_name).await {
            Ok(()) => {
                info!("Dropped table {table_name}");
                QueryResult::success(format!("Table {table_name} dropped successfully"))
            }
            Err(e) => {
                let message = format!("Failed to drop table {table_name}: {e}");
                error!("{message}");
                QueryResult::error(message)
            }
        }
    }

    /// Returns the names of all user tables.
    pub async fn try_list_tables(&mut self) -> Result<Vec<String>> {
        self.connect().await?;
        self.client.list_tables().await
    }

    /// Lists tables as a one-column `table_name` result.
    pub async fn list_tables(&mut self) -> QueryResult {
        match self.try_list_tables().await {
            Ok(tables) => QueryResult::from_names(
                &[TABLE_NAME_COLUMN],
                tables.into_iter().map(|t| vec![Value::String(t)]).collect(),
            ),
            Err(e) => {
                let message = format!("Failed to list tables: {e}");
                error!("{message}");
                QueryResult::error(message)
            }
        }
    }

    /// Returns the normalized schema of one table.
    pub async fn try_get_table_schema(&mut self, table_name: &str) -> Result<QueryResult> {
        self.connect().await?;
        let columns = self.client.table_columns(table_name).await?;
        Ok(schema_table(table_name, &columns))
    }

    /// Returns one table's schema, or an `error` status record.
    pub async fn get_table_schema(&mut self, table_name: &str) -> QueryResult {
        match self.try_get_table_schema(table_name).await {
            Ok(schema) => schema,
            Err(e) => {
                let message = format!("Failed to get schema for table {table_name}: {e}");
                error!("{message}");
                QueryResult::error(message)
            }
        }
    }

    /// Concatenates the schema of every table.
    ///
    /// A table whose introspection fails is skipped. When no schema could
    /// be collected the result is a `warning` status record.
    pub async fn get_all_schemas(&mut self) -> QueryResult {
        let tables = match self.try_list_tables().await {
            Ok(tables) => tables,
            Err(e) => {
                let message = format!("Failed to get table schemas: {e}");
                error!("{message}");
                return QueryResult::error(message);
            }
        };

        let mut combined = QueryResult::new();
        for table in &tables {
            match self.try_get_table_schema(table).await {
                Ok(schema) => {
                    combined.append(schema);
                }
                Err(e) => warn!("Skipping schema of table {table}: {e}"),
            }
        }

        if combined.columns.is_empty() {
            return QueryResult::warning("No tables found or no schema could be retrieved");
        }
        combined
    }

    /// One table's schema when `table_name` is given, otherwise all of them.
    pub async fn export_schema(&mut self, table_name: Option<&str>) -> QueryResult {
        match table_name {
            Some(name) => self.get_table_schema(name).await,
            None => self.get_all_schemas().await,
        }
    }

    /// Loads the named query file and renders it with `bindings`.
    pub fn get_query_from_file(&self, query_name: &str, bindings: &Bindings) -> Result<String> {
        self.templates.load(query_name, bindings)
    }

    /// Renders a query file and reads it with positional parameters.
    pub async fn try_execute_query_file(
        &mut self,
        query_name: &str,
        params: &[Value],
        bindings: &Bindings,
    ) -> Result<QueryResult> {
        let sql = self.get_query_from_file(query_name, bindings)?;
        debug!("Rendered {query_name}: {sql}");
        self.try_read(&sql, params).await
    }

    /// Renders and reads a query file.
    ///
    /// Template failures become `error` status records. Query failures
    /// behave like [`read`](Self::read) and yield an empty result.
    pub async fn execute_query_file(
        &mut self,
        query_name: &str,
        params: &[Value],
        bindings: &Bindings,
    ) -> QueryResult {
        let sql = match self.get_query_from_file(query_name, bindings) {
            Ok(sql) => sql,
            Err(e) => {
                let message = format!("Failed to load query file {query_name}: {e}");
                error!("{message}");
                return QueryResult::error(message);
            }
        };
        self.read(&sql, params).await
    }
}

impl<C: DatabaseClient> fmt::Display for Database<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Database Connection: {}",
            self.backend().display_name(),
            self.descriptor()
        )
    }
}

impl<C: DatabaseClient> fmt::Debug for Database<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("descriptor", &self.descriptor())
            .field("connected", &self.is_connected())
            .field("templates", &self.templates.root())
            .finish()
    }
}
