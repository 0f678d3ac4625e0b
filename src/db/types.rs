//! Tabular result types.
//!
//! `QueryResult` is the uniform return shape of every read operation, and
//! doubles as a status record (`status`, `message`, ...) on failure paths.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Column name used by status records.
pub const STATUS_COLUMN: &str = "status";

/// Column name holding the human-readable message of a status record.
pub const MESSAGE_COLUMN: &str = "message";

/// Outcome carried by a status record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Warning,
    Error,
}

impl Status {
    /// Returns the status as it appears in the `status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tabular result: ordered columns plus rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryResult {
    /// Column metadata for the result set.
    pub columns: Vec<ColumnInfo>,

    /// Rows of data. Every row has one value per column.
    pub rows: Vec<Row>,

    /// Time taken to produce the result.
    #[serde(with = "duration_serde")]
    pub execution_time: Duration,
}

impl QueryResult {
    /// Creates a new empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a result with the given columns and rows.
    pub fn with_data(columns: Vec<ColumnInfo>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            execution_time: Duration::ZERO,
        }
    }

    /// Creates a result from column names alone, typing every column as `text`.
    pub fn from_names<S: AsRef<str>>(names: &[S], rows: Vec<Row>) -> Self {
        let columns = names
            .iter()
            .map(|name| ColumnInfo::new(name.as_ref(), "text"))
            .collect();
        Self::with_data(columns, rows)
    }

    /// Creates a one-row status record.
    pub fn status(status: Status, message: impl Into<String>) -> Self {
        Self::from_names(
            &[STATUS_COLUMN, MESSAGE_COLUMN],
            vec![vec![
                Value::from(status.as_str()),
                Value::String(message.into()),
            ]],
        )
    }

    /// Creates a one-row `success` status record.
    pub fn success(message: impl Into<String>) -> Self {
        Self::status(Status::Success, message)
    }

    /// Creates a one-row `warning` status record.
    pub fn warning(message: impl Into<String>) -> Self {
        Self::status(Status::Warning, message)
    }

    /// Creates a one-row `error` status record.
    pub fn error(message: impl Into<String>) -> Self {
        Self::status(Status::Error, message)
    }

    /// Sets the execution time.
    pub fn with_execution_time(mut self, duration: Duration) -> Self {
        self.execution_time = duration;
        self
    }

    /// Appends a column holding the same value in every row.
    pub fn with_constant_column(mut self, name: &str, data_type: &str, value: Value) -> Self {
        self.columns.push(ColumnInfo::new(name, data_type));
        for row in &mut self.rows {
            row.push(value.clone());
        }
        self
    }

    /// Returns the number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the result set is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the column names in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Returns the position of the named column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Returns the value at `row` in the named column.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(index))
    }

    /// Returns every value of the named column.
    pub fn column_values(&self, column: &str) -> Vec<&Value> {
        match self.column_index(column) {
            Some(index) => self.rows.iter().filter_map(|r| r.get(index)).collect(),
            None => Vec::new(),
        }
    }

    /// Returns the status of a status record, if this result is one.
    pub fn status_of(&self) -> Option<Status> {
        match self.get(0, STATUS_COLUMN)? {
            Value::String(s) => match s.as_str() {
                "success" => Some(Status::Success),
                "warning" => Some(Status::Warning),
                "error" => Some(Status::Error),
                _ => None,
            },
            _ => None,
        }
    }

    /// Returns true if this result carries an `error` status.
    pub fn is_error(&self) -> bool {
        self.column_values(STATUS_COLUMN)
            .iter()
            .any(|v| matches!(v, Value::String(s) if s == Status::Error.as_str()))
    }

    /// Returns the message of a status record.
    pub fn message(&self) -> Option<&str> {
        match self.get(0, MESSAGE_COLUMN)? {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Appends the rows of `other`. Columns are taken from the first
    /// non-empty side; rows of a mismatching shape are rejected.
    pub fn append(&mut self, other: QueryResult) -> bool {
        if self.columns.is_empty() {
            *self = other;
            return true;
        }
        if self.column_names() != other.column_names() {
            return false;
        }
        self.rows.extend(other.rows);
        self.execution_time += other.execution_time;
        true
    }
}

/// Metadata about a column in a result set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,

    /// Column data type as reported by the backend.
    pub data_type: String,
}

impl ColumnInfo {
    /// Creates a new column info with the given name and type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// A row of data from a tabular result.
pub type Row = Vec<Value>;

/// Represents a single cell value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    /// NULL value.
    #[default]
    Null,

    /// Boolean value.
    Bool(bool),

    /// Signed integer (up to i64).
    Int(i64),

    /// Floating point number.
    Float(f64),

    /// Text/string value.
    String(String),

    /// Binary data.
    Bytes(Vec<u8>),
}

impl Value {
    /// Attempts to convert the value to a string representation.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Bytes(b) => format!("<{} bytes>", b.len()),
        }
    }

    /// Converts the value to JSON for remote APIs.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(_) => serde_json::Value::String(self.to_display_string()),
        }
    }

    /// Converts a JSON cell into a value. Nested arrays and objects are kept
    /// as their JSON text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            other => Value::String(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

// Conversion implementations for common types
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        i64::try_from(v)
            .map(Value::Int)
            .unwrap_or(Value::Float(v as f64))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

/// Serde support for Duration (not natively supported by serde).
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_nanos().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let nanos = u128::deserialize(deserializer)?;
        Ok(Duration::from_nanos(nanos as u64))
    }
}
