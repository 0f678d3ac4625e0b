//! Table schema types.
//!
//! Every backend reports columns through [`Column`]; [`schema_table`] turns
//! them into the normalized tabular shape returned to callers.

use serde::{Deserialize, Serialize};

use super::{ColumnInfo, QueryResult, Value};

/// Names of the normalized schema columns, in order.
pub const SCHEMA_COLUMNS: [&str; 6] = [
    "name",
    "type",
    "nullable",
    "default",
    "primary_key",
    "table_name",
];

/// A single column of a table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Data type as reported by the backend.
    pub data_type: String,

    /// Whether NULL is allowed.
    pub is_nullable: bool,

    /// Default value expression, if any.
    pub default: Option<String>,

    /// Whether the column is part of the primary key.
    pub is_primary_key: bool,
}

impl Column {
    /// Creates a nullable, non-key column with no default.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
            default: None,
            is_primary_key: false,
        }
    }

    fn to_row(&self, table_name: &str) -> Vec<Value> {
        vec![
            Value::from(self.name.as_str()),
            Value::from(self.data_type.as_str()),
            Value::Bool(self.is_nullable),
            Value::from(self.default.clone()),
            Value::Bool(self.is_primary_key),
            Value::from(table_name),
        ]
    }
}

/// Builds the normalized schema table for one table's columns.
///
/// Fields are mapped by name, never by position, so the output shape does
/// not depend on the order a backend's introspection query returns.
pub fn schema_table(table_name: &str, columns: &[Column]) -> QueryResult {
    let info = SCHEMA_COLUMNS
        .iter()
        .map(|name| {
            let data_type = match *name {
                "nullable" | "primary_key" => "bool",
                _ => "text",
            };
            ColumnInfo::new(*name, data_type)
        })
        .collect();
    let rows = columns.iter().map(|c| c.to_row(table_name)).collect();
    QueryResult::with_data(info, rows)
}
