//! Output formatting for command results.
//!
//! Provides two formats: an aligned text table and JSON.

use crate::db::QueryResult;
use serde::Serialize;

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Aligned plain-text table.
    #[default]
    Text,
    /// JSON object with columns and row objects.
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Invalid output format: {s}. Expected: text or json")),
        }
    }
}

/// JSON output structure.
#[derive(Debug, Serialize)]
struct JsonOutput<'a> {
    columns: Vec<&'a str>,
    rows: Vec<serde_json::Map<String, serde_json::Value>>,
    row_count: usize,
    duration_ms: u128,
}

/// Formats query results.
pub struct ResultOutput {
    format: OutputFormat,
}

impl ResultOutput {
    /// Creates a new output formatter.
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats the result according to the configured format.
    pub fn format(&self, result: &QueryResult) -> String {
        match self.format {
            OutputFormat::Text => self.format_text(result),
            OutputFormat::Json => self.format_json(result),
        }
    }

    /// Formats a plain list of strings (sheet names, rendered SQL, ...).
    pub fn format_lines(&self, lines: &[String]) -> String {
        match self.format {
            OutputFormat::Text => lines.iter().map(|l| format!("{l}\n")).collect(),
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(lines).unwrap_or_else(|_| "[]".to_string());
                format!("{json}\n")
            }
        }
    }

    /// Formats as an aligned table.
    fn format_text(&self, result: &QueryResult) -> String {
        if result.columns.is_empty() {
            return "(0 rows)\n".to_string();
        }

        let cells: Vec<Vec<String>> = result
            .rows
            .iter()
            .map(|row| row.iter().map(|v| v.to_display_string()).collect())
            .collect();

        let mut widths: Vec<usize> = result
            .columns
            .iter()
            .map(|c| c.name.chars().count())
            .collect();
        for row in &cells {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let mut out = String::new();
        out.push_str(&pad_line(result.columns.iter().map(|c| c.name.as_str()), &widths));
        out.push('\n');
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        out.push_str(&rule.join("-+-"));
        out.push('\n');
        for row in &cells {
            out.push_str(&pad_line(row.iter().map(String::as_str), &widths));
            out.push('\n');
        }

        let count = result.row_count();
        out.push_str(&format!(
            "({} row{})\n",
            count,
            if count == 1 { "" } else { "s" }
        ));
        out
    }

    /// Formats as JSON.
    fn format_json(&self, result: &QueryResult) -> String {
        let names = result.column_names();
        let rows = result
            .rows
            .iter()
            .map(|row| {
                names
                    .iter()
                    .zip(row)
                    .map(|(name, value)| (name.to_string(), value.to_json()))
                    .collect()
            })
            .collect();
        let output = JsonOutput {
            columns: names.clone(),
            rows,
            row_count: result.row_count(),
            duration_ms: result.execution_time.as_millis(),
        };
        let json = serde_json::to_string_pretty(&output).unwrap_or_else(|_| "{}".to_string());
        format!("{json}\n")
    }
}

fn pad_line<'a>(values: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let padded: Vec<String> = values
        .zip(widths)
        .map(|(v, w)| format!("{:<width$}", v, width = *w))
        .collect();
    padded.join(" | ").trim_end().to_string()
}
