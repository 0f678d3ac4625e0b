//! BigQuery database client implementation.
//!
//! Queries go through the jobs.query endpoint of `gcp_bigquery_client`,
//! authenticated with a service-account key read from an explicit path.
//! Multi-statement transactions are sent as a single script. Results are
//! read to the last page before they are returned.

use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

use async_trait::async_trait;
use gcp_bigquery_client::model::dataset_reference::DatasetReference;
use gcp_bigquery_client::model::get_query_results_parameters::GetQueryResultsParameters;
use gcp_bigquery_client::model::query_parameter::QueryParameter;
use gcp_bigquery_client::model::query_parameter_type::QueryParameterType;
use gcp_bigquery_client::model::query_parameter_value::QueryParameterValue;
use gcp_bigquery_client::model::query_request::QueryRequest;
use gcp_bigquery_client::model::query_response::QueryResponse;
use tracing::{debug, warn};

use crate::config::BigQueryConfig;
use crate::db::{Column, ColumnInfo, Database, DatabaseBackend, DatabaseClient, QueryResult, Row, Value};
use crate::error::{DataError, Result};
use crate::sql::TemplateLoader;

/// How long one jobs.getQueryResults call waits for a running job.
const POLL_TIMEOUT_MS: i32 = 10_000;

/// Polls allowed for a job that has not completed yet.
const MAX_POLLS: usize = 30;

/// A BigQuery-backed [`Database`].
pub type BigQuery = Database<BigQueryClient>;

impl Database<BigQueryClient> {
    /// Creates a database for `project_id.dataset_id`, authenticating with
    /// the service-account key at `credentials_path` on first use.
    pub fn bigquery(
        project_id: &str,
        dataset_id: &str,
        credentials_path: impl Into<PathBuf>,
        sql_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let config = BigQueryConfig::new(project_id, dataset_id, credentials_path);
        Ok(Database::new(
            BigQueryClient::new(config)?,
            TemplateLoader::new(sql_dir),
        ))
    }
}

/// BigQuery client. Holds the authenticated API client once connected.
pub struct BigQueryClient {
    config: BigQueryConfig,
    project_id: String,
    dataset_id: String,
    client: Option<gcp_bigquery_client::Client>,
}

impl fmt::Debug for BigQueryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BigQueryClient")
            .field("project_id", &self.project_id)
            .field("dataset_id", &self.dataset_id)
            .field("connected", &self.client.is_some())
            .finish()
    }
}

impl BigQueryClient {
    /// Creates a disconnected client. Project and dataset are required.
    pub fn new(config: BigQueryConfig) -> Result<Self> {
        let (project_id, dataset_id) = config.require_ids()?;
        let (project_id, dataset_id) = (project_id.to_string(), dataset_id.to_string());
        Ok(Self {
            config,
            project_id,
            dataset_id,
            client: None,
        })
    }

    fn client(&self) -> Result<&gcp_bigquery_client::Client> {
        self.client
            .as_ref()
            .ok_or_else(|| DataError::precondition("BigQuery client is not connected"))
    }

    /// Returns `project.dataset.INFORMATION_SCHEMA.<view>` quoted for use in SQL.
    fn information_schema(&self, view: &str) -> String {
        format!(
            "`{}.{}.INFORMATION_SCHEMA.{view}`",
            self.project_id, self.dataset_id
        )
    }

    /// Runs a query and returns the complete response: a job still
    /// running after the first call is polled, and further pages are
    /// fetched until no page token remains.
    async fn run(&self, request: QueryRequest) -> Result<QueryResponse> {
        let client = self.client()?;
        let mut response = client
            .job()
            .query(&self.project_id, request)
            .await
            .map_err(|e| DataError::remote(format!("BigQuery query failed: {e}")))?
            .query_response()
            .clone();

        let mut polls = 0;
        while let Some(parameters) = next_page(&response)? {
            if response.job_complete == Some(false) {
                polls += 1;
                if polls > MAX_POLLS {
                    return Err(DataError::remote(
                        "BigQuery job did not complete in time",
                    ));
                }
                debug!("BigQuery job still running (poll {polls})");
            }
            let id = job_id(&response)?;
            let page = client
                .job()
                .get_query_results(&self.project_id, &id, parameters)
                .await
                .map_err(|e| DataError::remote(format!("BigQuery query failed: {e}")))?;
            merge_page(&mut response, page.into())?;
        }
        Ok(response)
    }

    /// Every request resolves unqualified table names against the dataset.
    fn request(&self, sql: &str) -> QueryRequest {
        let mut request = QueryRequest::new(sql.to_string());
        request.default_dataset = Some(DatasetReference {
            dataset_id: self.dataset_id.clone(),
            project_id: self.project_id.clone(),
        });
        request
    }
}

#[async_trait]
impl DatabaseClient for BigQueryClient {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::BigQuery
    }

    fn descriptor(&self) -> String {
        self.config.descriptor()
    }

    fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    async fn connect(&mut self) -> Result<()> {
        if self.client.is_some() {
            return Ok(());
        }
        let path = self
            .config
            .credentials_path
            .as_ref()
            .ok_or_else(|| DataError::config("BigQuery credentials_path is required"))?;

        let key = yup_oauth2::read_service_account_key(path).await.map_err(|e| {
            DataError::connection(format!(
                "Cannot read service account key {}: {e}",
                path.display()
            ))
        })?;
        let client = gcp_bigquery_client::Client::from_service_account_key(key, false)
            .await
            .map_err(|e| DataError::connection(format!("BigQuery authentication failed: {e}")))?;

        debug!("Authenticated BigQuery client for {}", self.descriptor());
        self.client = Some(client);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.client = None;
        Ok(())
    }

    async fn fetch(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let mut request = self.request(sql);
        if !params.is_empty() {
            request.parameter_mode = Some("POSITIONAL".to_string());
            request.query_parameters = Some(positional_parameters(params)?);
        }

        let start = Instant::now();
        let response = self.run(request).await?;
        Ok(convert_response(&response).with_execution_time(start.elapsed()))
    }

    async fn execute(&mut self, sql: &str) -> Result<Option<u64>> {
        let response = self.run(self.request(sql)).await?;
        Ok(affected_rows(&response))
    }

    async fn execute_batch(&mut self, statements: &[String]) -> Result<Vec<Option<u64>>> {
        // The script reports one total, not per-statement counts.
        self.run(self.request(&transaction_script(statements))).await?;
        Ok(vec![None; statements.len()])
    }

    async fn list_tables(&mut self) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT table_name FROM {} ORDER BY table_name",
            self.information_schema("TABLES")
        );
        let result = convert_response(&self.run(self.request(&sql)).await?);
        Ok(result
            .column_values("table_name")
            .into_iter()
            .map(Value::to_display_string)
            .collect())
    }

    async fn table_columns(&mut self, table: &str) -> Result<Vec<Column>> {
        let sql = format!(
            "SELECT column_name, data_type, is_nullable, column_default \
             FROM {} WHERE table_name = @table_name ORDER BY ordinal_position",
            self.information_schema("COLUMNS")
        );
        let mut request = self.request(&sql);
        request.parameter_mode = Some("NAMED".to_string());
        request.query_parameters = Some(vec![QueryParameter {
            name: Some("table_name".to_string()),
            parameter_type: Some(scalar_type("STRING")),
            parameter_value: Some(scalar_value(Some(table.to_string()))),
        }]);

        let result = convert_response(&self.run(request).await?);
        if result.is_empty() {
            return Err(DataError::not_found(format!("table '{table}'")));
        }

        Ok(result
            .rows
            .iter()
            .map(|row| Column {
                name: cell_text(row, 0).unwrap_or_default(),
                data_type: cell_text(row, 1).unwrap_or_default(),
                is_nullable: cell_text(row, 2).as_deref() == Some("YES"),
                default: cell_text(row, 3).filter(|d| d != "NULL"),
                is_primary_key: false,
            })
            .collect())
    }
}

fn cell_text(row: &Row, index: usize) -> Option<String> {
    match row.get(index)? {
        Value::Null => None,
        other => Some(other.to_display_string()),
    }
}

fn scalar_type(type_name: &str) -> QueryParameterType {
    QueryParameterType {
        array_type: None,
        struct_types: None,
        r#type: type_name.to_string(),
    }
}

fn scalar_value(value: Option<String>) -> QueryParameterValue {
    QueryParameterValue {
        array_values: None,
        struct_values: None,
        value,
    }
}

/// Builds unnamed parameters for `?` placeholders.
fn positional_parameters(params: &[Value]) -> Result<Vec<QueryParameter>> {
    params
        .iter()
        .map(|param| {
            let (type_name, value) = match param {
                Value::Null => ("STRING", None),
                Value::Bool(b) => ("BOOL", Some(b.to_string())),
                Value::Int(i) => ("INT64", Some(i.to_string())),
                Value::Float(f) => ("FLOAT64", Some(f.to_string())),
                Value::String(s) => ("STRING", Some(s.clone())),
                Value::Bytes(_) => {
                    return Err(DataError::validation(
                        "binary parameters are not supported for BigQuery",
                    ))
                }
            };
            Ok(QueryParameter {
                name: None,
                parameter_type: Some(scalar_type(type_name)),
                parameter_value: Some(scalar_value(value)),
            })
        })
        .collect()
}

/// Wraps statements in one BigQuery multi-statement transaction. A single
/// statement is atomic on its own and is sent bare.
fn transaction_script(statements: &[String]) -> String {
    if let [statement] = statements {
        return statement.trim().trim_end_matches(';').to_string();
    }
    let mut script = String::from("BEGIN TRANSACTION;\n");
    for statement in statements {
        script.push_str(statement.trim().trim_end_matches(';'));
        script.push_str(";\n");
    }
    script.push_str("COMMIT TRANSACTION;");
    script
}

/// Returns the parameters for the next jobs.getQueryResults call, or
/// `None` once the response holds every row.
fn next_page(response: &QueryResponse) -> Result<Option<GetQueryResultsParameters>> {
    let running = response.job_complete == Some(false);
    if !running && response.page_token.is_none() {
        return Ok(None);
    }
    let location = response
        .job_reference
        .as_ref()
        .and_then(|job| job.location.clone());
    Ok(Some(GetQueryResultsParameters {
        location,
        // A running job restarts from its first page.
        page_token: if running { None } else { response.page_token.clone() },
        timeout_ms: Some(POLL_TIMEOUT_MS),
        ..Default::default()
    }))
}

fn job_id(response: &QueryResponse) -> Result<String> {
    response
        .job_reference
        .as_ref()
        .and_then(|job| job.job_id.clone())
        .ok_or_else(|| {
            DataError::remote("BigQuery returned a partial result without a job reference")
        })
}

/// Folds one getQueryResults response into the accumulated one.
fn merge_page(response: &mut QueryResponse, page: QueryResponse) -> Result<()> {
    if response.job_complete == Some(false) {
        let job_reference = response.job_reference.take();
        *response = page;
        if response.job_reference.is_none() {
            response.job_reference = job_reference;
        }
        return Ok(());
    }
    if page.page_token.is_some() && page.page_token == response.page_token {
        return Err(DataError::remote("BigQuery returned the same page token twice"));
    }
    if let Some(rows) = page.rows {
        response.rows.get_or_insert_with(Vec::new).extend(rows);
    }
    response.page_token = page.page_token;
    Ok(())
}

fn affected_rows(response: &QueryResponse) -> Option<u64> {
    response
        .num_dml_affected_rows
        .as_deref()
        .and_then(|n| n.parse().ok())
}

/// Reads the field type name the way the REST API spells it (`INTEGER`,
/// `FLOAT64`, ...).
fn field_type_name<T: serde::Serialize + fmt::Debug>(field_type: &T) -> String {
    serde_json::to_value(field_type)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| format!("{field_type:?}").to_uppercase())
}

fn convert_response(response: &QueryResponse) -> QueryResult {
    if let Some(total) = response.total_rows.as_deref().and_then(|n| n.parse::<usize>().ok()) {
        let received = response.rows.as_ref().map_or(0, Vec::len);
        if received != total {
            warn!("BigQuery reported {total} rows but returned {received}");
        }
    }

    let columns: Vec<ColumnInfo> = response
        .schema
        .as_ref()
        .and_then(|schema| schema.fields.as_ref())
        .map(|fields| {
            fields
                .iter()
                .map(|field| ColumnInfo::new(field.name.clone(), field_type_name(&field.r#type)))
                .collect()
        })
        .unwrap_or_default();

    let rows: Vec<Row> = response
        .rows
        .as_ref()
        .map(|rows| {
            rows.iter()
                .map(|row| {
                    let cells = row.columns.as_deref().unwrap_or_default();
                    columns
                        .iter()
                        .enumerate()
                        .map(|(i, column)| {
                            let cell = cells.get(i).and_then(|c| c.value.as_ref());
                            convert_cell(cell, &column.data_type)
                        })
                        .collect()
                })
                .collect()
        })
        .unwrap_or_default();

    QueryResult::with_data(columns, rows)
}

/// Scalars arrive as JSON strings; decode them by the declared field type.
fn convert_cell(cell: Option<&serde_json::Value>, type_name: &str) -> Value {
    let Some(cell) = cell else {
        return Value::Null;
    };
    let Some(text) = cell.as_str() else {
        return Value::from_json(cell);
    };

    let parsed = match type_name {
        "INTEGER" | "INT64" => text.parse().ok().map(Value::Int),
        "FLOAT" | "FLOAT64" => text.parse().ok().map(Value::Float),
        "BOOLEAN" | "BOOL" => text.parse().ok().map(Value::Bool),
        _ => None,
    };
    parsed.unwrap_or_else(|| Value::String(text.to_string()))
}
