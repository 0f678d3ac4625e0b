//! Statement classification.
//!
//! Parses SQL with sqlparser to decide whether a statement produces a result
//! set and whether it leaves data untouched. Unparseable input falls back to
//! a leading-keyword check.

use std::fmt;

use sqlparser::ast::{Query, Select, SetExpr, Statement, TableFactor, TableWithJoins};
use sqlparser::dialect::Dialect;
use sqlparser::parser::Parser;

/// Keywords that begin a row-returning statement when parsing fails.
const ROW_KEYWORDS: [&str; 7] = ["SELECT", "WITH", "SHOW", "EXPLAIN", "VALUES", "PRAGMA", "TABLE"];

/// What a statement does to the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// Reads only (SELECT, EXPLAIN, SHOW, ...).
    Read,
    /// Modifies rows (INSERT, UPDATE, DELETE, MERGE, data-modifying CTEs).
    Write,
    /// Changes schema or privileges (CREATE, DROP, ALTER, TRUNCATE, GRANT, ...).
    Schema,
    /// Could not be determined.
    Unknown,
}

impl StatementKind {
    fn priority(self) -> u8 {
        match self {
            Self::Read => 0,
            Self::Write => 1,
            Self::Schema => 2,
            Self::Unknown => 3,
        }
    }

    fn max(self, other: Self) -> Self {
        if other.priority() > self.priority() {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Schema => write!(f, "schema"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Result of classifying a SQL string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// The most impactful kind across all statements.
    pub kind: StatementKind,
    /// Whether the last statement produces a result set.
    pub returns_rows: bool,
}

impl Classification {
    /// Returns true if executing the SQL cannot change data or schema.
    pub fn is_read_only(&self) -> bool {
        self.kind == StatementKind::Read
    }
}

/// Classifies `sql` using the given dialect.
pub fn classify(dialect: &dyn Dialect, sql: &str) -> Classification {
    match Parser::parse_sql(dialect, sql) {
        Ok(statements) if !statements.is_empty() => {
            let kind = statements
                .iter()
                .map(classify_statement)
                .fold(StatementKind::Read, StatementKind::max);
            let returns_rows = statements.last().is_some_and(statement_returns_rows);
            Classification { kind, returns_rows }
        }
        _ => classify_by_keyword(sql),
    }
}

/// Fallback used when the statement cannot be parsed.
fn classify_by_keyword(sql: &str) -> Classification {
    let first = sql
        .split_whitespace()
        .next()
        .map(|word| word.trim_start_matches('(').to_uppercase())
        .unwrap_or_default();
    let returns_rows = ROW_KEYWORDS.contains(&first.as_str());
    let kind = match first.as_str() {
        "SELECT" | "SHOW" | "EXPLAIN" | "VALUES" | "TABLE" => StatementKind::Read,
        "INSERT" | "UPDATE" | "DELETE" | "MERGE" => StatementKind::Write,
        "CREATE" | "DROP" | "ALTER" | "TRUNCATE" | "GRANT" | "REVOKE" => StatementKind::Schema,
        _ => StatementKind::Unknown,
    };
    Classification { kind, returns_rows }
}

fn statement_returns_rows(statement: &Statement) -> bool {
    matches!(
        statement,
        Statement::Query(_)
            | Statement::Explain { .. }
            | Statement::ExplainTable { .. }
            | Statement::ShowVariable { .. }
            | Statement::ShowTables { .. }
            | Statement::ShowColumns { .. }
            | Statement::ShowCreate { .. }
            | Statement::ShowFunctions { .. }
            | Statement::ShowStatus { .. }
            | Statement::ShowCollation { .. }
            | Statement::Pragma { .. }
    )
}

fn classify_statement(statement: &Statement) -> StatementKind {
    match statement {
        // Query: may contain data-modifying CTEs, so recurse
        Statement::Query(query) => classify_query(query),
        Statement::Explain {
            analyze, statement, ..
        } => {
            if *analyze {
                // EXPLAIN ANALYZE executes the statement
                classify_statement(statement)
            } else {
                StatementKind::Read
            }
        }
        Statement::ExplainTable { .. }
        | Statement::ShowVariable { .. }
        | Statement::ShowTables { .. }
        | Statement::ShowColumns { .. }
        | Statement::ShowCreate { .. }
        | Statement::ShowFunctions { .. }
        | Statement::ShowStatus { .. }
        | Statement::ShowCollation { .. } => StatementKind::Read,

        Statement::Insert(_)
        | Statement::Update { .. }
        | Statement::Merge { .. }
        | Statement::Delete(_) => StatementKind::Write,

        Statement::Drop { .. }
        | Statement::Truncate { .. }
        | Statement::AlterTable { .. }
        | Statement::AlterIndex { .. }
        | Statement::AlterView { .. }
        | Statement::AlterRole { .. }
        | Statement::CreateTable { .. }
        | Statement::CreateIndex { .. }
        | Statement::CreateView { .. }
        | Statement::CreateSchema { .. }
        | Statement::CreateDatabase { .. }
        | Statement::CreateFunction { .. }
        | Statement::CreateProcedure { .. }
        | Statement::CreateRole { .. }
        | Statement::CreateSequence { .. }
        | Statement::CreateType { .. }
        | Statement::Grant { .. }
        | Statement::Revoke { .. } => StatementKind::Schema,

        _ => StatementKind::Unknown,
    }
}

/// Classifies a Query, returning the most impactful kind found in its CTEs
/// and body.
fn classify_query(query: &Query) -> StatementKind {
    let ctes = query
        .with
        .iter()
        .flat_map(|with| with.cte_tables.iter())
        .map(|cte| classify_query(&cte.query))
        .fold(StatementKind::Read, StatementKind::max);
    ctes.max(classify_set_expr(&query.body))
}

fn classify_set_expr(set_expr: &SetExpr) -> StatementKind {
    match set_expr {
        SetExpr::Insert(stmt) | SetExpr::Update(stmt) => classify_statement(stmt),
        SetExpr::Query(query) => classify_query(query),
        SetExpr::Select(select) => classify_select(select),
        SetExpr::SetOperation { left, right, .. } => {
            classify_set_expr(left).max(classify_set_expr(right))
        }
        _ => StatementKind::Read,
    }
}

fn classify_select(select: &Select) -> StatementKind {
    select
        .from
        .iter()
        .map(classify_table_with_joins)
        .fold(StatementKind::Read, StatementKind::max)
}

fn classify_table_with_joins(twj: &TableWithJoins) -> StatementKind {
    twj.joins
        .iter()
        .map(|join| classify_table_factor(&join.relation))
        .fold(classify_table_factor(&twj.relation), StatementKind::max)
}

fn classify_table_factor(factor: &TableFactor) -> StatementKind {
    match factor {
        TableFactor::Derived { subquery, .. } => classify_query(subquery),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => classify_table_with_joins(table_with_joins),
        _ => StatementKind::Read,
    }
}
