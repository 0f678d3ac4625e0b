//! Integration tests for zangetsu-data.

pub mod config_test;
pub mod connection_test;
pub mod query_test;
pub mod schema_test;
pub mod sheets_test;
pub mod template_test;
