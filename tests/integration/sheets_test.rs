//! Spreadsheet integration tests.
//!
//! Drives [`Spreadsheet`] over the in-memory Sheets backend, including a
//! round trip from SQLite into a sheet.

use pretty_assertions::assert_eq;
use serde_json::json;
use zangetsu_data::db::{Database, QueryResult, Value};
use zangetsu_data::error::DataError;
use zangetsu_data::sheets::{InMemorySheets, SheetsApi, Spreadsheet};

fn sheet_with_document(sheets: &[&str]) -> Spreadsheet<InMemorySheets> {
    let api = InMemorySheets::new();
    let id = api.add_document("test", sheets);
    Spreadsheet::new(api, Some(id))
}

#[tokio::test]
async fn test_query_result_round_trips_through_sheet() {
    let mut db = Database::sqlite_memory("sql");
    db.execute_transaction(&[
        "CREATE TABLE scores (player TEXT, points INTEGER)",
        "INSERT INTO scores VALUES ('ann', 10), ('ben', 7)",
    ])
    .await;
    let data = db
        .read("SELECT player, points FROM scores ORDER BY points DESC", &[])
        .await;

    let sheet = sheet_with_document(&["Scores"]);
    assert!(sheet.write_sheet(&data, "Scores", "A1", true).await.unwrap());

    let back = sheet.read_sheet("Scores", None).await.unwrap();
    assert_eq!(back.column_names(), vec!["player", "points"]);
    assert_eq!(
        back.rows,
        vec![
            vec![Value::from("ann"), Value::from("10")],
            vec![Value::from("ben"), Value::from("7")],
        ]
    );
}

#[tokio::test]
async fn test_read_sheet_pads_short_rows() {
    let sheet = sheet_with_document(&["Sheet1"]);
    let id = sheet.spreadsheet_id().unwrap().to_string();
    sheet.api().put_values(
        &id,
        "Sheet1",
        vec![
            vec![json!("a"), json!("b"), json!("c")],
            vec![json!("1"), json!("2")],
        ],
    );

    let result = sheet.read_sheet("Sheet1", None).await.unwrap();
    assert_eq!(
        result.rows,
        vec![vec![Value::from("1"), Value::from("2"), Value::Null]]
    );
}

#[tokio::test]
async fn test_append_and_clear() {
    let sheet = sheet_with_document(&["Log"]);
    let first = QueryResult::from_names(&["event"], vec![vec![Value::from("start")]]);
    let second = QueryResult::from_names(&["event"], vec![vec![Value::from("stop")]]);

    assert!(sheet.write_sheet(&first, "Log", "A1", true).await.unwrap());
    assert!(sheet.append_sheet(&second, "Log", false).await.unwrap());
    let log = sheet.read_sheet("Log", None).await.unwrap();
    assert_eq!(log.row_count(), 2);

    assert!(sheet.clear_sheet("Log", None).await.unwrap());
    assert!(sheet.read_sheet("Log", None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sheet_management() {
    let sheet = sheet_with_document(&["Sheet1"]);

    assert!(sheet.create_sheet("Data").await.unwrap());
    assert!(!sheet.create_sheet("Data").await.unwrap());
    assert_eq!(sheet.list_sheet_names().await.unwrap(), vec!["Sheet1", "Data"]);

    assert!(sheet.delete_sheet("Sheet1").await.unwrap());
    assert!(!sheet.delete_sheet("Sheet1").await.unwrap());
    assert_eq!(sheet.list_sheet_names().await.unwrap(), vec!["Data"]);
}

#[tokio::test]
async fn test_create_spreadsheet_does_not_retarget() {
    let sheet = sheet_with_document(&["Sheet1"]);
    let original = sheet.spreadsheet_id().unwrap().to_string();

    let id = sheet.create_spreadsheet("Report", &["Summary", "Detail"]).await.unwrap();
    assert_ne!(id, original);
    assert_eq!(sheet.spreadsheet_id(), Some(original.as_str()));

    let report = Spreadsheet::new(InMemorySheets::new(), Some(id.clone()));
    // A fresh backend does not know the document.
    assert!(report.list_sheet_names().await.unwrap().is_empty());

    let names = sheet.api().get_sheets(&id);
    let titles: Vec<String> = names.await.unwrap().into_iter().map(|s| s.title).collect();
    assert_eq!(titles, vec!["Summary", "Detail"]);
}

#[tokio::test]
async fn test_remote_failures_are_swallowed() {
    let sheet = sheet_with_document(&["Sheet1"]);
    sheet.api().set_failing(true);
    let data = QueryResult::from_names(&["x"], vec![vec![Value::Int(1)]]);

    assert!(!sheet.write_sheet(&data, "Sheet1", "A1", true).await.unwrap());
    assert!(!sheet.append_sheet(&data, "Sheet1", true).await.unwrap());
    assert!(!sheet.clear_sheet("Sheet1", None).await.unwrap());
    assert!(!sheet.create_sheet("New").await.unwrap());
    assert!(!sheet.delete_sheet("Sheet1").await.unwrap());
    assert!(sheet.list_sheet_names().await.unwrap().is_empty());
    assert!(sheet.read_sheet("Sheet1", None).await.unwrap().is_error());
    assert!(sheet.create_spreadsheet("Nope", &["A"]).await.is_none());
}

#[tokio::test]
async fn test_missing_spreadsheet_id_is_precondition() {
    let sheet = Spreadsheet::new(InMemorySheets::new(), None);
    let err = sheet.list_sheet_names().await.unwrap_err();
    assert!(matches!(err, DataError::Precondition(_)));

    let err = sheet.read_sheet("Sheet1", None).await.unwrap_err();
    assert!(err.is_precondition());
}
