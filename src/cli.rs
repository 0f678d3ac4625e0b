//! Command-line argument parsing for zangetsu.
//!
//! Uses clap derive; every database subcommand maps onto one operation of
//! [`Database`](crate::db::Database), every `sheet` subcommand onto one of
//! [`Spreadsheet`](crate::sheets::Spreadsheet).

use crate::config::DatabaseConfig;
use crate::db::Value;
use crate::error::Result;
use crate::output::OutputFormat;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Query SQL databases, BigQuery and Google Sheets as tables.
#[derive(Parser, Debug)]
#[command(name = "zangetsu")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Named database from the config file
    #[arg(short = 'c', long, global = true, value_name = "NAME")]
    pub database: Option<String>,

    /// Connection descriptor (postgres://..., sqlite:PATH, bigquery://PROJECT/DATASET)
    #[arg(long, global = true, value_name = "DESCRIPTOR", env = "ZANGETSU_URL")]
    pub url: Option<String>,

    /// Directory holding `<name>.sql` templates (overrides config)
    #[arg(long, global = true, value_name = "DIR")]
    pub sql_dir: Option<PathBuf>,

    /// Output format: text or json
    #[arg(long, global = true, value_name = "FORMAT", default_value = "text")]
    pub format: OutputFormat,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Show which database the connection points at
    Info,

    /// List tables
    Tables,

    /// Show column schema for one table, or all tables
    Schema {
        /// Table name
        table: Option<String>,
    },

    /// Run a read-only query
    Read {
        sql: String,
        /// Positional parameter (repeatable)
        #[arg(short, long = "param", value_name = "VALUE", value_parser = parse_value)]
        params: Vec<Value>,
    },

    /// Run one statement and commit
    Exec { sql: String },

    /// Run several statements in one transaction
    Tx {
        #[arg(required = true)]
        statements: Vec<String>,
    },

    /// Print a rendered query template
    Render {
        name: String,
        /// Template variable as KEY=VALUE (repeatable)
        #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
        vars: Vec<(String, Value)>,
    },

    /// Render a query template and run it as a read
    Run {
        name: String,
        #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
        vars: Vec<(String, Value)>,
        #[arg(short, long = "param", value_name = "VALUE", value_parser = parse_value)]
        params: Vec<Value>,
    },

    /// Spreadsheet operations
    Sheet {
        /// Spreadsheet document id (overrides config and SPREADSHEET_ID)
        #[arg(long, value_name = "ID")]
        spreadsheet: Option<String>,

        #[command(subcommand)]
        action: SheetCommand,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum SheetCommand {
    /// List sheet titles
    List,
    /// Read a sheet as a table (first row is the header)
    Read {
        name: String,
        #[arg(long, value_name = "A1")]
        range: Option<String>,
    },
    /// Add a sheet
    Create { name: String },
    /// Delete a sheet
    Delete { name: String },
    /// Clear a sheet or a range of it
    Clear {
        name: String,
        #[arg(long, value_name = "A1")]
        range: Option<String>,
    },
}

/// Parses a command-line literal into a typed value.
///
/// `null`, booleans, integers and floats are recognized; anything else is
/// a string.
pub fn parse_value(s: &str) -> std::result::Result<Value, String> {
    if s.eq_ignore_ascii_case("null") {
        return Ok(Value::Null);
    }
    if let Ok(b) = s.parse::<bool>() {
        return Ok(Value::Bool(b));
    }
    if let Ok(i) = s.parse::<i64>() {
        return Ok(Value::Int(i));
    }
    if let Ok(f) = s.parse::<f64>() {
        if f.is_finite() {
            return Ok(Value::Float(f));
        }
    }
    Ok(Value::String(s.to_string()))
}

/// Parses `KEY=VALUE` into a template binding.
pub fn parse_var(s: &str) -> std::result::Result<(String, Value), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("Invalid variable '{s}'. Expected KEY=VALUE"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("Invalid variable '{s}'. Key is empty"));
    }
    Ok((key.to_string(), parse_value(value)?))
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Converts a `--url` descriptor to a database config, if given.
    pub fn to_database_config(&self) -> Result<Option<DatabaseConfig>> {
        self.url
            .as_deref()
            .map(DatabaseConfig::from_descriptor)
            .transpose()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::Config::default_path)
    }

    /// Returns the named database to use, if specified.
    pub fn database_name(&self) -> Option<&str> {
        self.database.as_deref()
    }
}
