//! Error types for zangetsu-data.
//!
//! Defines the single error enum shared by the database, template and
//! spreadsheet layers.

use thiserror::Error;

/// Main error type for data-access operations.
#[derive(Error, Debug)]
pub enum DataError {
    /// A template, file, table or sheet that does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An operation attempted before its required setup (no target document,
    /// missing template directory, ...).
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Errors reported by a backend or remote API.
    #[error("Remote error: {0}")]
    Remote(String),

    /// Template rendering failures (unbound placeholder, malformed tag).
    #[error("Template error: {0}")]
    Template(String),

    /// Invalid caller input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection establishment errors (host unreachable, auth failed, etc.)
    #[error("Connection error: {0}")]
    Connection(String),
}

impl DataError {
    /// Creates a not-found error with the given message.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Creates a precondition error with the given message.
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    /// Creates a remote error with the given message.
    pub fn remote(msg: impl Into<String>) -> Self {
        Self::Remote(msg.into())
    }

    /// Creates a template error with the given message.
    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template(msg.into())
    }

    /// Creates a validation error with the given message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Returns true for errors that signal caller misuse rather than a
    /// runtime fault. These are never swallowed by the sentinel API.
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition(_))
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "Not Found",
            Self::Precondition(_) => "Precondition Failed",
            Self::Remote(_) => "Remote Error",
            Self::Template(_) => "Template Error",
            Self::Validation(_) => "Validation Error",
            Self::Config(_) => "Configuration Error",
            Self::Connection(_) => "Connection Error",
        }
    }
}

impl From<sqlx::Error> for DataError {
    fn from(error: sqlx::Error) -> Self {
        Self::Remote(error.to_string())
    }
}

/// Result type alias using DataError.
pub type Result<T> = std::result::Result<T, DataError>;
