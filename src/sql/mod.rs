//! SQL text helpers: statement classification and query templates.

pub mod classify;
pub mod template;

pub use classify::{classify, Classification, StatementKind};
pub use template::{render, Bindings, TemplateLoader};
