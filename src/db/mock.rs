//! Mock database client for testing.
//!
//! Keeps table definitions in memory and records every statement it is
//! asked to run. Individual tables can be marked as broken so that
//! introspection fails for them only.

use super::{Column, DatabaseBackend, DatabaseClient, QueryResult, Value};
use crate::error::{DataError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

/// A mock database client that returns predefined results.
#[derive(Debug, Default)]
pub struct MockDatabaseClient {
    tables: BTreeMap<String, Vec<Column>>,
    broken_tables: HashSet<String>,
    fail_queries: bool,
    connected: bool,
    connect_count: usize,
    executed: Vec<String>,
    batch_count: usize,
}

impl MockDatabaseClient {
    /// Creates a new mock database client with no tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table with the given columns.
    pub fn with_table(mut self, name: &str, columns: Vec<Column>) -> Self {
        self.tables.insert(name.to_string(), columns);
        self
    }

    /// Adds a table whose introspection always fails.
    pub fn with_broken_table(mut self, name: &str) -> Self {
        self.tables.insert(name.to_string(), Vec::new());
        self.broken_tables.insert(name.to_string());
        self
    }

    /// Makes every fetch and execute fail with a remote error.
    pub fn failing(mut self) -> Self {
        self.fail_queries = true;
        self
    }

    /// Returns how many times a connection was actually opened.
    pub fn connect_count(&self) -> usize {
        self.connect_count
    }

    /// Returns every statement committed so far.
    pub fn executed(&self) -> &[String] {
        &self.executed
    }

    /// Returns how many batches were committed as one transaction.
    pub fn batch_count(&self) -> usize {
        self.batch_count
    }

    fn check(&self) -> Result<()> {
        if !self.connected {
            return Err(DataError::precondition("not connected"));
        }
        if self.fail_queries {
            return Err(DataError::remote("mock backend failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Sqlite
    }

    fn descriptor(&self) -> String {
        "sqlite::memory:".to_string()
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self) -> Result<()> {
        if !self.connected {
            self.connected = true;
            self.connect_count += 1;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    async fn fetch(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.check()?;
        let mut row = vec![Value::from(sql)];
        row.extend(params.iter().cloned());
        let mut names = vec!["result".to_string()];
        names.extend((1..=params.len()).map(|i| format!("param_{i}")));
        Ok(QueryResult::from_names(names.as_slice(), vec![row]).with_execution_time(Duration::from_millis(1)))
    }

    async fn execute(&mut self, sql: &str) -> Result<Option<u64>> {
        self.check()?;
        self.executed.push(sql.to_string());
        Ok(Some(1))
    }

    async fn execute_batch(&mut self, statements: &[String]) -> Result<Vec<Option<u64>>> {
        self.check()?;
        if let Some(bad) = statements.iter().find(|s| s.contains("FAIL")) {
            return Err(DataError::remote(format!("statement rejected: {bad}")));
        }
        self.executed.extend(statements.iter().cloned());
        self.batch_count += 1;
        Ok(statements.iter().map(|_| Some(1)).collect())
    }

    async fn list_tables(&mut self) -> Result<Vec<String>> {
        self.check()?;
        Ok(self.tables.keys().cloned().collect())
    }

    async fn table_columns(&mut self, table: &str) -> Result<Vec<Column>> {
        self.check()?;
        if self.broken_tables.contains(table) {
            return Err(DataError::remote(format!("cannot introspect {table}")));
        }
        self.tables
            .get(table)
            .cloned()
            .ok_or_else(|| DataError::not_found(format!("table '{table}'")))
    }
}
