//! Spreadsheet access.
//!
//! [`Spreadsheet`] targets one document through a [`SheetsApi`]
//! implementation. Until a document id is set, every operation except
//! [`Spreadsheet::set_spreadsheet_id`] and
//! [`Spreadsheet::create_spreadsheet`] fails with a precondition error.
//!
//! Sentinel methods log remote failures and return `false`, an empty list,
//! `None` or an error status record. Precondition errors are never
//! swallowed. The `try_` methods propagate everything.

mod google;
mod memory;

pub use google::{GoogleSheetsClient, SHEETS_SCOPE};
pub use memory::InMemorySheets;

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::db::{ColumnInfo, QueryResult, Row, Value};
use crate::error::{DataError, Result};

/// A 2-D block of cell values, row-major.
pub type Grid = Vec<Vec<serde_json::Value>>;

/// Default top-left cell for writes.
pub const DEFAULT_RANGE_START: &str = "A1";

/// Identity of one sheet (tab) in a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetProperties {
    pub sheet_id: i64,
    pub title: String,
}

/// One structural change for `spreadsheets.batchUpdate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchRequest {
    #[serde(rename = "addSheet")]
    AddSheet { properties: NewSheet },
    #[serde(rename = "deleteSheet")]
    DeleteSheet {
        #[serde(rename = "sheetId")]
        sheet_id: i64,
    },
}

impl BatchRequest {
    /// Request adding a sheet titled `title`.
    pub fn add_sheet(title: impl Into<String>) -> Self {
        Self::AddSheet {
            properties: NewSheet {
                title: title.into(),
            },
        }
    }

    /// Request deleting the sheet with `sheet_id`.
    pub fn delete_sheet(sheet_id: i64) -> Self {
        Self::DeleteSheet { sheet_id }
    }
}

/// Properties of a sheet to be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSheet {
    pub title: String,
}

/// Remote operations on spreadsheet documents.
///
/// Ranges use A1 notation (`Sheet1!A1:B2`, or a bare sheet name for the
/// whole sheet).
#[async_trait]
pub trait SheetsApi: Send + Sync {
    /// Reads the values in `range`. Trailing empty cells are omitted by the
    /// remote, so rows may be ragged.
    async fn get_values(&self, spreadsheet_id: &str, range: &str) -> Result<Grid>;

    /// Overwrites cells starting at `range`. Returns the updated cell count.
    async fn update_values(&self, spreadsheet_id: &str, range: &str, values: Grid) -> Result<u64>;

    /// Inserts rows after the data in `range`. Returns the updated cell count.
    async fn append_values(&self, spreadsheet_id: &str, range: &str, values: Grid) -> Result<u64>;

    /// Clears the values in `range`, keeping formatting.
    async fn clear_values(&self, spreadsheet_id: &str, range: &str) -> Result<()>;

    /// Lists the sheets of a document in tab order.
    async fn get_sheets(&self, spreadsheet_id: &str) -> Result<Vec<SheetProperties>>;

    /// Applies structural changes atomically.
    async fn batch_update(&self, spreadsheet_id: &str, requests: Vec<BatchRequest>) -> Result<()>;

    /// Creates a document whose first sheet is titled `first_sheet` (or the
    /// remote default) and returns its id.
    async fn create_spreadsheet(&self, title: &str, first_sheet: Option<&str>) -> Result<String>;
}

/// Joins a sheet name and an optional cell range into A1 notation.
pub fn a1_range(sheet_name: &str, range: Option<&str>) -> String {
    match range {
        Some(range) if !range.is_empty() => format!("{sheet_name}!{range}"),
        _ => sheet_name.to_string(),
    }
}

/// Serializes a tabular value into a grid, optionally led by its header.
pub fn to_grid(data: &QueryResult, include_header: bool) -> Grid {
    let mut grid = Vec::with_capacity(data.row_count() + usize::from(include_header));
    if include_header {
        grid.push(
            data.columns
                .iter()
                .map(|c| serde_json::Value::String(c.name.clone()))
                .collect(),
        );
    }
    grid.extend(
        data.rows
            .iter()
            .map(|row| row.iter().map(Value::to_json).collect()),
    );
    grid
}

/// Turns a grid whose first row is the header into a tabular value.
///
/// Rows shorter than the header are padded with nulls. A row with more
/// cells than the header is rejected rather than truncated.
pub fn from_grid(grid: Grid) -> Result<QueryResult> {
    let mut rows = grid.into_iter();
    let Some(header) = rows.next() else {
        return Ok(QueryResult::new());
    };

    let columns: Vec<ColumnInfo> = header
        .iter()
        .map(|cell| ColumnInfo::new(Value::from_json(cell).to_display_string(), "text"))
        .collect();
    let width = columns.len();

    let rows: Vec<Row> = rows
        .enumerate()
        .map(|(i, cells)| {
            if cells.len() > width {
                // Row 1 is the header.
                return Err(DataError::validation(format!(
                    "row {} has {} cells but the header has {width} columns",
                    i + 2,
                    cells.len()
                )));
            }
            let mut row: Row = cells.iter().map(Value::from_json).collect();
            row.resize(width, Value::Null);
            Ok(row)
        })
        .collect::<Result<_>>()?;

    Ok(QueryResult::with_data(columns, rows))
}

/// A spreadsheet document handle.
pub struct Spreadsheet<A: SheetsApi> {
    api: A,
    spreadsheet_id: Option<String>,
}

impl Spreadsheet<GoogleSheetsClient> {
    /// Authenticates against Google Sheets with the service-account key at
    /// `credentials_path`.
    pub async fn google(
        credentials_path: impl AsRef<Path>,
        spreadsheet_id: Option<String>,
    ) -> Result<Self> {
        let api = GoogleSheetsClient::from_service_account_file(credentials_path).await?;
        Ok(Self::new(api, spreadsheet_id))
    }
}

impl<A: SheetsApi> Spreadsheet<A> {
    /// Wraps an API handle, optionally targeting a document.
    pub fn new(api: A, spreadsheet_id: Option<String>) -> Self {
        Self {
            api,
            spreadsheet_id: spreadsheet_id.filter(|id| !id.is_empty()),
        }
    }

    /// Returns the API handle.
    pub fn api(&self) -> &A {
        &self.api
    }

    /// Returns the target document id, if set.
    pub fn spreadsheet_id(&self) -> Option<&str> {
        self.spreadsheet_id.as_deref()
    }

    /// Sets the target document.
    pub fn set_spreadsheet_id(&mut self, spreadsheet_id: impl Into<String>) {
        let spreadsheet_id = spreadsheet_id.into();
        debug!("Spreadsheet id set to '{spreadsheet_id}'");
        self.spreadsheet_id = Some(spreadsheet_id);
    }

    fn target(&self) -> Result<&str> {
        self.spreadsheet_id.as_deref().ok_or_else(|| {
            DataError::precondition("spreadsheet id is not set; call set_spreadsheet_id() first")
        })
    }

    /// Reads a sheet (or a range of it) with the first row as header.
    pub async fn try_read_sheet(&self, sheet_name: &str, range: Option<&str>) -> Result<QueryResult> {
        let id = self.target()?;
        let grid = self.api.get_values(id, &a1_range(sheet_name, range)).await?;
        if grid.is_empty() {
            warn!("No data found in sheet '{sheet_name}'");
        }
        from_grid(grid)
    }

    /// Reads a sheet; remote failures become an `error` status record.
    pub async fn read_sheet(&self, sheet_name: &str, range: Option<&str>) -> Result<QueryResult> {
        match self.try_read_sheet(sheet_name, range).await {
            Err(e) if !e.is_precondition() => {
                let message = format!("Failed to read sheet '{sheet_name}': {e}");
                error!("{message}");
                Ok(QueryResult::error(message))
            }
            other => other,
        }
    }

    /// Writes `data` starting at `range_start` of `sheet_name`.
    pub async fn try_write_sheet(
        &self,
        data: &QueryResult,
        sheet_name: &str,
        range_start: &str,
        include_header: bool,
    ) -> Result<u64> {
        let id = self.target()?;
        let range = a1_range(sheet_name, Some(range_start));
        let cells = self
            .api
            .update_values(id, &range, to_grid(data, include_header))
            .await?;
        debug!("{cells} cells updated in '{range}'");
        Ok(cells)
    }

    /// Writes data; returns false on remote failure.
    pub async fn write_sheet(
        &self,
        data: &QueryResult,
        sheet_name: &str,
        range_start: &str,
        include_header: bool,
    ) -> Result<bool> {
        let outcome = self
            .try_write_sheet(data, sheet_name, range_start, include_header)
            .await;
        swallow(outcome.map(|_| true), false, || {
            format!("Failed to write sheet '{sheet_name}'")
        })
    }

    /// Appends `data` as new rows after the existing data of `sheet_name`.
    pub async fn try_append_sheet(
        &self,
        data: &QueryResult,
        sheet_name: &str,
        include_header: bool,
    ) -> Result<u64> {
        let id = self.target()?;
        let cells = self
            .api
            .append_values(id, sheet_name, to_grid(data, include_header))
            .await?;
        debug!("{cells} cells appended to '{sheet_name}'");
        Ok(cells)
    }

    /// Appends data; returns false on remote failure.
    pub async fn append_sheet(
        &self,
        data: &QueryResult,
        sheet_name: &str,
        include_header: bool,
    ) -> Result<bool> {
        let outcome = self.try_append_sheet(data, sheet_name, include_header).await;
        swallow(outcome.map(|_| true), false, || {
            format!("Failed to append to sheet '{sheet_name}'")
        })
    }

    /// Clears a sheet, or only `range` of it.
    pub async fn try_clear_sheet(&self, sheet_name: &str, range: Option<&str>) -> Result<()> {
        let id = self.target()?;
        self.api.clear_values(id, &a1_range(sheet_name, range)).await?;
        debug!("Cleared sheet '{sheet_name}'");
        Ok(())
    }

    /// Clears a sheet; returns false on remote failure.
    pub async fn clear_sheet(&self, sheet_name: &str, range: Option<&str>) -> Result<bool> {
        let outcome = self.try_clear_sheet(sheet_name, range).await;
        swallow(outcome.map(|_| true), false, || {
            format!("Failed to clear sheet '{sheet_name}'")
        })
    }

    /// Returns the sheet titles in tab order.
    pub async fn try_list_sheet_names(&self) -> Result<Vec<String>> {
        let id = self.target()?;
        let sheets = self.api.get_sheets(id).await?;
        Ok(sheets.into_iter().map(|s| s.title).collect())
    }

    /// Returns the sheet titles; empty on remote failure.
    pub async fn list_sheet_names(&self) -> Result<Vec<String>> {
        swallow(self.try_list_sheet_names().await, Vec::new(), || {
            "Failed to list sheet names".to_string()
        })
    }

    /// Adds a sheet titled `sheet_name`.
    pub async fn try_create_sheet(&self, sheet_name: &str) -> Result<()> {
        let id = self.target()?;
        self.api
            .batch_update(id, vec![BatchRequest::add_sheet(sheet_name)])
            .await?;
        debug!("Created sheet '{sheet_name}'");
        Ok(())
    }

    /// Adds a sheet; returns false on failure. An existing sheet of the
    /// same name is reported as a warning.
    pub async fn create_sheet(&self, sheet_name: &str) -> Result<bool> {
        match self.try_create_sheet(sheet_name).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_precondition() => Err(e),
            Err(e) if e.to_string().contains("already exists") => {
                warn!("Sheet '{sheet_name}' already exists");
                Ok(false)
            }
            Err(e) => {
                error!("Failed to create sheet '{sheet_name}': {e}");
                Ok(false)
            }
        }
    }

    /// Deletes the sheet titled `sheet_name`. An unknown title is a
    /// not-found error.
    pub async fn try_delete_sheet(&self, sheet_name: &str) -> Result<()> {
        let id = self.target()?;
        let sheets = self.api.get_sheets(id).await?;
        let sheet = sheets
            .iter()
            .find(|s| s.title == sheet_name)
            .ok_or_else(|| DataError::not_found(format!("sheet '{sheet_name}'")))?;
        self.api
            .batch_update(id, vec![BatchRequest::delete_sheet(sheet.sheet_id)])
            .await?;
        debug!("Deleted sheet '{sheet_name}'");
        Ok(())
    }

    /// Deletes a sheet; returns false when it does not exist or the remote
    /// call fails.
    pub async fn delete_sheet(&self, sheet_name: &str) -> Result<bool> {
        match self.try_delete_sheet(sheet_name).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_precondition() => Err(e),
            Err(DataError::NotFound(_)) => {
                warn!("Sheet '{sheet_name}' not found");
                Ok(false)
            }
            Err(e) => {
                error!("Failed to delete sheet '{sheet_name}': {e}");
                Ok(false)
            }
        }
    }

    /// Creates a new document and returns its id. The first name titles the
    /// initial sheet; the rest are added afterwards. The handle's own
    /// target is left unchanged.
    pub async fn try_create_spreadsheet<S: AsRef<str>>(
        &self,
        title: &str,
        sheet_names: &[S],
    ) -> Result<String> {
        let mut names = sheet_names.iter().map(AsRef::as_ref);
        let id = self.api.create_spreadsheet(title, names.next()).await?;

        let extra: Vec<BatchRequest> = names.map(BatchRequest::add_sheet).collect();
        if !extra.is_empty() {
            self.api.batch_update(&id, extra).await?;
        }
        debug!("Created spreadsheet '{title}' ({id})");
        Ok(id)
    }

    /// Creates a new document; `None` on failure.
    pub async fn create_spreadsheet<S: AsRef<str>>(
        &self,
        title: &str,
        sheet_names: &[S],
    ) -> Option<String> {
        match self.try_create_spreadsheet(title, sheet_names).await {
            Ok(id) => Some(id),
            Err(e) => {
                error!("Failed to create spreadsheet '{title}': {e}");
                None
            }
        }
    }
}

/// Logs and replaces a non-precondition error with `fallback`.
fn swallow<T>(outcome: Result<T>, fallback: T, context: impl FnOnce() -> String) -> Result<T> {
    match outcome {
        Err(e) if !e.is_precondition() => {
            error!("{}: {e}", context());
            Ok(fallback)
        }
        other => other,
    }
}

impl<A: SheetsApi> fmt::Display for Spreadsheet<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Spreadsheet(spreadsheet_id='{}')",
            self.spreadsheet_id.as_deref().unwrap_or("")
        )
    }
}
