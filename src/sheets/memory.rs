//! In-memory Sheets backend.
//!
//! Mirrors the observable behavior of the remote API closely enough for
//! tests: values read back as formatted strings, trailing empty cells are
//! trimmed, and sheet titles are unique per document.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value as Json;

use super::{BatchRequest, Grid, SheetProperties, SheetsApi};
use crate::error::{DataError, Result};

#[derive(Debug, Default)]
struct Sheet {
    properties: SheetProperties,
    cells: Grid,
}

#[derive(Debug, Default)]
struct Document {
    sheets: Vec<Sheet>,
}

#[derive(Debug, Default)]
struct State {
    documents: BTreeMap<String, Document>,
    next_document: u64,
    next_sheet: i64,
    failing: bool,
}

/// A [`SheetsApi`] that keeps documents in process memory.
#[derive(Debug, Default)]
pub struct InMemorySheets {
    state: Mutex<State>,
}

/// Zero-based cell position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cell {
    row: usize,
    col: usize,
}

/// A parsed range: the sheet title plus optional start and end cells.
#[derive(Debug, PartialEq, Eq)]
struct Range<'a> {
    sheet: &'a str,
    start: Cell,
    end: Option<Cell>,
}

fn parse_cell(text: &str) -> Result<Cell> {
    let split = text
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(|| DataError::validation(format!("invalid cell '{text}'")))?;
    let (letters, digits) = text.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(DataError::validation(format!("invalid cell '{text}'")));
    }
    let col = letters
        .to_ascii_uppercase()
        .bytes()
        .fold(0usize, |acc, b| acc * 26 + usize::from(b - b'A' + 1))
        - 1;
    let row: usize = digits
        .parse()
        .ok()
        .filter(|r| *r > 0)
        .ok_or_else(|| DataError::validation(format!("invalid cell '{text}'")))?;
    Ok(Cell { row: row - 1, col })
}

fn parse_range(range: &str) -> Result<Range<'_>> {
    let Some((sheet, cells)) = range.split_once('!') else {
        return Ok(Range {
            sheet: range,
            start: Cell { row: 0, col: 0 },
            end: None,
        });
    };
    let (start, end) = match cells.split_once(':') {
        Some((start, end)) => (parse_cell(start)?, Some(parse_cell(end)?)),
        None => (parse_cell(cells)?, None),
    };
    Ok(Range { sheet, start, end })
}

/// Renders a cell the way the remote returns formatted values.
fn formatted(value: &Json) -> Json {
    match value {
        Json::Null => Json::String(String::new()),
        Json::String(_) => value.clone(),
        other => Json::String(other.to_string()),
    }
}

fn is_blank(value: &Json) -> bool {
    matches!(value, Json::Null) || value.as_str() == Some("")
}

fn trim_grid(mut grid: Grid) -> Grid {
    for row in &mut grid {
        while row.last().is_some_and(is_blank) {
            row.pop();
        }
    }
    while grid.last().is_some_and(|row| row.is_empty()) {
        grid.pop();
    }
    grid
}

impl InMemorySheets {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail with a remote error.
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    /// Creates a document with the given sheets and returns its id.
    pub fn add_document(&self, _title: &str, sheet_titles: &[&str]) -> String {
        let mut state = self.lock();
        state.next_document += 1;
        let id = format!("doc-{}", state.next_document);
        let mut document = Document::default();
        for title in sheet_titles {
            let sheet_id = state.next_sheet;
            state.next_sheet += 1;
            document.sheets.push(Sheet {
                properties: SheetProperties {
                    sheet_id,
                    title: title.to_string(),
                },
                cells: Grid::new(),
            });
        }
        state.documents.insert(id.clone(), document);
        id
    }

    /// Replaces the contents of one sheet.
    pub fn put_values(&self, spreadsheet_id: &str, sheet_title: &str, grid: Grid) {
        let mut state = self.lock();
        if let Some(sheet) = state
            .documents
            .get_mut(spreadsheet_id)
            .and_then(|d| d.sheets.iter_mut().find(|s| s.properties.title == sheet_title))
        {
            sheet.cells = grid;
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with_sheet<T>(
        &self,
        spreadsheet_id: &str,
        sheet_title: &str,
        f: impl FnOnce(&mut Sheet) -> T,
    ) -> Result<T> {
        let mut state = self.lock();
        if state.failing {
            return Err(DataError::remote("simulated Sheets API failure"));
        }
        let document = state
            .documents
            .get_mut(spreadsheet_id)
            .ok_or_else(|| DataError::remote(format!("Requested entity was not found: {spreadsheet_id}")))?;
        let sheet = document
            .sheets
            .iter_mut()
            .find(|s| s.properties.title == sheet_title)
            .ok_or_else(|| DataError::remote(format!("Unable to parse range: {sheet_title}")))?;
        Ok(f(sheet))
    }
}

fn write_at(cells: &mut Grid, start: Cell, values: &Grid) -> u64 {
    let mut count = 0;
    for (r, row) in values.iter().enumerate() {
        let target_row = start.row + r;
        if cells.len() <= target_row {
            cells.resize(target_row + 1, Vec::new());
        }
        let target = &mut cells[target_row];
        for (c, value) in row.iter().enumerate() {
            let target_col = start.col + c;
            if target.len() <= target_col {
                target.resize(target_col + 1, Json::Null);
            }
            target[target_col] = formatted(value);
            count += 1;
        }
    }
    count
}

#[async_trait]
impl SheetsApi for InMemorySheets {
    async fn get_values(&self, spreadsheet_id: &str, range: &str) -> Result<Grid> {
        let range = parse_range(range)?;
        self.with_sheet(spreadsheet_id, range.sheet, |sheet| {
            let rows = sheet.cells.iter().skip(range.start.row);
            let grid: Grid = match range.end {
                Some(end) => rows
                    .take(end.row.saturating_sub(range.start.row) + 1)
                    .map(|row| {
                        row.iter()
                            .skip(range.start.col)
                            .take(end.col.saturating_sub(range.start.col) + 1)
                            .map(formatted)
                            .collect()
                    })
                    .collect(),
                None => rows
                    .map(|row| row.iter().skip(range.start.col).map(formatted).collect())
                    .collect(),
            };
            trim_grid(grid)
        })
    }

    async fn update_values(&self, spreadsheet_id: &str, range: &str, values: Grid) -> Result<u64> {
        let range = parse_range(range)?;
        self.with_sheet(spreadsheet_id, range.sheet, |sheet| {
            write_at(&mut sheet.cells, range.start, &values)
        })
    }

    async fn append_values(&self, spreadsheet_id: &str, range: &str, values: Grid) -> Result<u64> {
        let range = parse_range(range)?;
        self.with_sheet(spreadsheet_id, range.sheet, |sheet| {
            let used = trim_grid(sheet.cells.clone()).len();
            let start = Cell {
                row: used,
                col: range.start.col,
            };
            write_at(&mut sheet.cells, start, &values)
        })
    }

    async fn clear_values(&self, spreadsheet_id: &str, range: &str) -> Result<()> {
        let range = parse_range(range)?;
        self.with_sheet(spreadsheet_id, range.sheet, |sheet| {
            for (r, row) in sheet.cells.iter_mut().enumerate() {
                if r < range.start.row || range.end.is_some_and(|end| r > end.row) {
                    continue;
                }
                for (c, cell) in row.iter_mut().enumerate() {
                    let in_cols = c >= range.start.col && range.end.map_or(true, |end| c <= end.col);
                    if in_cols {
                        *cell = Json::Null;
                    }
                }
            }
        })
    }

    async fn get_sheets(&self, spreadsheet_id: &str) -> Result<Vec<SheetProperties>> {
        let state = self.lock();
        if state.failing {
            return Err(DataError::remote("simulated Sheets API failure"));
        }
        let document = state
            .documents
            .get(spreadsheet_id)
            .ok_or_else(|| DataError::remote(format!("Requested entity was not found: {spreadsheet_id}")))?;
        Ok(document.sheets.iter().map(|s| s.properties.clone()).collect())
    }

    async fn batch_update(&self, spreadsheet_id: &str, requests: Vec<BatchRequest>) -> Result<()> {
        let mut state = self.lock();
        if state.failing {
            return Err(DataError::remote("simulated Sheets API failure"));
        }
        let mut next_sheet = state.next_sheet;
        let document = state
            .documents
            .get_mut(spreadsheet_id)
            .ok_or_else(|| DataError::remote(format!("Requested entity was not found: {spreadsheet_id}")))?;

        // Validate everything first so the batch applies atomically.
        let mut titles: Vec<String> = document.sheets.iter().map(|s| s.properties.title.clone()).collect();
        for request in &requests {
            match request {
                BatchRequest::AddSheet { properties } => {
                    if titles.contains(&properties.title) {
                        return Err(DataError::remote(format!(
                            "Invalid requests[0].addSheet: A sheet with the name \"{}\" already exists.",
                            properties.title
                        )));
                    }
                    titles.push(properties.title.clone());
                }
                BatchRequest::DeleteSheet { sheet_id } => {
                    if !document.sheets.iter().any(|s| s.properties.sheet_id == *sheet_id) {
                        return Err(DataError::remote(format!("No sheet with id: {sheet_id}")));
                    }
                }
            }
        }

        for request in requests {
            match request {
                BatchRequest::AddSheet { properties } => {
                    document.sheets.push(Sheet {
                        properties: SheetProperties {
                            sheet_id: next_sheet,
                            title: properties.title,
                        },
                        cells: Grid::new(),
                    });
                    next_sheet += 1;
                }
                BatchRequest::DeleteSheet { sheet_id } => {
                    document.sheets.retain(|s| s.properties.sheet_id != sheet_id);
                }
            }
        }
        state.next_sheet = next_sheet;
        Ok(())
    }

    async fn create_spreadsheet(&self, title: &str, first_sheet: Option<&str>) -> Result<String> {
        if self.lock().failing {
            return Err(DataError::remote("simulated Sheets API failure"));
        }
        Ok(self.add_document(title, &[first_sheet.unwrap_or("Sheet1")]))
    }
}
