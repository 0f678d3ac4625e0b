//! zangetsu-data - a thin data-access layer.
//!
//! Relational databases (PostgreSQL, SQLite), BigQuery and Google Sheets
//! all read and write the same tabular [`QueryResult`](db::QueryResult).

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod output;
pub mod sheets;
pub mod sql;
