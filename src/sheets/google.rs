//! Google Sheets REST client.
//!
//! Authenticates with a service-account key and talks to the v4 API
//! directly over reqwest.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use url::Url;
use yup_oauth2::authenticator::DefaultAuthenticator;
use yup_oauth2::ServiceAccountAuthenticator;

use super::{BatchRequest, Grid, SheetProperties, SheetsApi};
use crate::error::{DataError, Result};

/// OAuth scope granting read/write access to spreadsheets.
pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Sheets API base URL.
const SHEETS_API_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// How user-supplied values are interpreted on write.
const VALUE_INPUT_OPTION: &str = "USER_ENTERED";

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Grid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateResponse {
    #[serde(default)]
    updated_cells: u64,
}

#[derive(Debug, Deserialize)]
struct AppendResponse {
    #[serde(default)]
    updates: Option<UpdateResponse>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetResponse {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedSpreadsheet {
    spreadsheet_id: String,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorResponse {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    message: String,
}

/// Sheets API client backed by a service account.
pub struct GoogleSheetsClient {
    http: Client,
    auth: DefaultAuthenticator,
}

impl std::fmt::Debug for GoogleSheetsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleSheetsClient").finish_non_exhaustive()
    }
}

impl GoogleSheetsClient {
    /// Builds a client from a service-account key file.
    pub async fn from_service_account_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DataError::config(format!(
                "Credentials file not found: {}",
                path.display()
            )));
        }
        let key = yup_oauth2::read_service_account_key(path).await.map_err(|e| {
            DataError::config(format!(
                "Invalid service account key {}: {}",
                path.display(),
                e
            ))
        })?;
        let auth = ServiceAccountAuthenticator::builder(key)
            .build()
            .await
            .map_err(|e| DataError::connection(format!("Failed to authenticate with Google: {}", e)))?;
        let http = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| DataError::connection(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { http, auth })
    }

    async fn bearer(&self) -> Result<String> {
        let token = self
            .auth
            .token(&[SHEETS_SCOPE])
            .await
            .map_err(|e| DataError::connection(format!("Failed to obtain access token: {}", e)))?;
        token
            .token()
            .map(str::to_string)
            .ok_or_else(|| DataError::connection("Access token response was empty"))
    }

    async fn send(&self, method: Method, url: Url, body: Option<serde_json::Value>) -> Result<String> {
        debug!(%method, %url, "Sheets API request");
        let token = self.bearer().await?;
        let mut request = self.http.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DataError::remote("Sheets API request timed out")
            } else if e.is_connect() {
                DataError::connection("Failed to connect to the Sheets API. Check your network.")
            } else {
                DataError::remote(format!("Request failed: {}", e))
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DataError::remote(format!("Failed to read response: {}", e)))?;
        if !status.is_success() {
            return Err(parse_error(status, &body));
        }
        Ok(body)
    }
}

/// Parses an API error response.
fn parse_error(status: StatusCode, body: &str) -> DataError {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return DataError::remote(format!(
            "Sheets API denied access ({}). Share the document with the service account.",
            status
        ));
    }
    if let Ok(error) = serde_json::from_str::<GoogleErrorResponse>(body) {
        return DataError::remote(format!("Sheets API error: {}", error.error.message));
    }
    DataError::remote(format!("Sheets API error ({}): {}", status, body))
}

fn parse_body<T: for<'de> Deserialize<'de>>(body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| DataError::remote(format!("Failed to parse response: {}", e)))
}

/// Builds `{base}/{segments...}` with each segment percent-encoded.
fn endpoint(segments: &[&str], query: &[(&str, &str)]) -> Result<Url> {
    let mut url = Url::parse(SHEETS_API_URL).map_err(|e| DataError::config(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| DataError::config("Sheets API URL cannot be a base"))?
        .extend(segments);
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }
    Ok(url)
}

fn values_url(spreadsheet_id: &str, range: &str, action: Option<&str>, query: &[(&str, &str)]) -> Result<Url> {
    let last = match action {
        Some(action) => format!("{range}:{action}"),
        None => range.to_string(),
    };
    endpoint(&[spreadsheet_id, "values", &last], query)
}

#[async_trait]
impl SheetsApi for GoogleSheetsClient {
    async fn get_values(&self, spreadsheet_id: &str, range: &str) -> Result<Grid> {
        let url = values_url(spreadsheet_id, range, None, &[])?;
        let body = self.send(Method::GET, url, None).await?;
        Ok(parse_body::<ValueRange>(&body)?.values)
    }

    async fn update_values(&self, spreadsheet_id: &str, range: &str, values: Grid) -> Result<u64> {
        let url = values_url(
            spreadsheet_id,
            range,
            None,
            &[("valueInputOption", VALUE_INPUT_OPTION)],
        )?;
        let body = self
            .send(Method::PUT, url, Some(json!({ "range": range, "values": values })))
            .await?;
        Ok(parse_body::<UpdateResponse>(&body)?.updated_cells)
    }

    async fn append_values(&self, spreadsheet_id: &str, range: &str, values: Grid) -> Result<u64> {
        let url = values_url(
            spreadsheet_id,
            range,
            Some("append"),
            &[
                ("valueInputOption", VALUE_INPUT_OPTION),
                ("insertDataOption", "INSERT_ROWS"),
            ],
        )?;
        let body = self
            .send(Method::POST, url, Some(json!({ "values": values })))
            .await?;
        Ok(parse_body::<AppendResponse>(&body)?
            .updates
            .map_or(0, |u| u.updated_cells))
    }

    async fn clear_values(&self, spreadsheet_id: &str, range: &str) -> Result<()> {
        let url = values_url(spreadsheet_id, range, Some("clear"), &[])?;
        self.send(Method::POST, url, Some(json!({}))).await?;
        Ok(())
    }

    async fn get_sheets(&self, spreadsheet_id: &str) -> Result<Vec<SheetProperties>> {
        let url = endpoint(&[spreadsheet_id], &[("fields", "sheets.properties")])?;
        let body = self.send(Method::GET, url, None).await?;
        Ok(parse_body::<SpreadsheetResponse>(&body)?
            .sheets
            .into_iter()
            .map(|s| s.properties)
            .collect())
    }

    async fn batch_update(&self, spreadsheet_id: &str, requests: Vec<BatchRequest>) -> Result<()> {
        let url = endpoint(&[&format!("{spreadsheet_id}:batchUpdate")], &[])?;
        self.send(Method::POST, url, Some(json!({ "requests": requests })))
            .await?;
        Ok(())
    }

    async fn create_spreadsheet(&self, title: &str, first_sheet: Option<&str>) -> Result<String> {
        let mut body = json!({ "properties": { "title": title } });
        if let Some(sheet) = first_sheet {
            body["sheets"] = json!([{ "properties": { "title": sheet } }]);
        }
        let url = endpoint(&[], &[])?;
        let response = self.send(Method::POST, url, Some(body)).await?;
        Ok(parse_body::<CreatedSpreadsheet>(&response)?.spreadsheet_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_values_url_encodes_range() {
        let url = values_url("abc", "My Sheet!A1", None, &[]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc/values/My%20Sheet!A1"
        );
    }

    #[test]
    fn test_values_url_with_action_and_query() {
        let url = values_url(
            "abc",
            "Data",
            Some("append"),
            &[("valueInputOption", VALUE_INPUT_OPTION)],
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc/values/Data:append?valueInputOption=USER_ENTERED"
        );
    }

    #[test]
    fn test_endpoint_without_segments_is_base() {
        assert_eq!(endpoint(&[], &[]).unwrap().as_str(), SHEETS_API_URL);
    }

    #[test]
    fn test_parse_value_range_without_values() {
        let parsed: ValueRange = parse_body(r#"{"range":"Sheet1!A1:Z1000","majorDimension":"ROWS"}"#).unwrap();
        assert!(parsed.values.is_empty());
    }

    #[test]
    fn test_parse_sheet_properties() {
        let body = r#"{"sheets":[{"properties":{"sheetId":0,"title":"Sheet1","index":0}},{"properties":{"sheetId":42,"title":"Data"}}]}"#;
        let parsed: SpreadsheetResponse = parse_body(body).unwrap();
        let titles: Vec<_> = parsed.sheets.iter().map(|s| s.properties.title.as_str()).collect();
        assert_eq!(titles, vec!["Sheet1", "Data"]);
        assert_eq!(parsed.sheets[1].properties.sheet_id, 42);
    }

    #[test]
    fn test_parse_append_response() {
        let body = r#"{"spreadsheetId":"x","updates":{"updatedRows":2,"updatedCells":6}}"#;
        let parsed: AppendResponse = parse_body(body).unwrap();
        assert_eq!(parsed.updates.map(|u| u.updated_cells), Some(6));
    }

    #[test]
    fn test_parse_error_with_google_message() {
        let body = r#"{"error":{"code":400,"message":"Unable to parse range: Nope","status":"INVALID_ARGUMENT"}}"#;
        let error = parse_error(StatusCode::BAD_REQUEST, body);
        assert!(matches!(error, DataError::Remote(_)));
        assert!(error.to_string().contains("Unable to parse range: Nope"));
    }

    #[test]
    fn test_parse_error_access_denied() {
        let error = parse_error(StatusCode::FORBIDDEN, "");
        assert!(error.to_string().contains("service account"));
    }

    #[test]
    fn test_parse_error_fallback() {
        let error = parse_error(StatusCode::INTERNAL_SERVER_ERROR, "boom");
        assert!(error.to_string().contains("boom"));
    }
}
