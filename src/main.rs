//! zangetsu: query SQL databases, BigQuery and Google Sheets as tables.

use tracing::{debug, error, info};
use zangetsu_data::cli::{Cli, Command, SheetCommand};
use zangetsu_data::config::{Config, ConnectionConfig, DatabaseConfig, SpreadsheetConfig};
use zangetsu_data::db::{self, Database, DatabaseClient, QueryResult, Value, TABLE_NAME_COLUMN};
use zangetsu_data::error::{DataError, Result};
use zangetsu_data::logging::init_stderr_logging;
use zangetsu_data::output::ResultOutput;
use zangetsu_data::sheets::Spreadsheet;
use zangetsu_data::sql::{Bindings, TemplateLoader};

fn main() {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();
    init_stderr_logging(cli.verbose);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(cli)) {
        error!("{}: {}", e.category(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;
    let output = ResultOutput::new(cli.format);

    if let Command::Sheet {
        spreadsheet,
        action,
    } = &cli.command
    {
        return run_sheet(config.spreadsheet.clone(), spreadsheet.clone(), action, &output).await;
    }

    let database = resolve_database(&cli, &config)?;
    let sql_dir = cli.sql_dir.clone().unwrap_or_else(|| config.sql_dir.clone());
    let mut db = db::open(&database, TemplateLoader::new(sql_dir))?;
    debug!("Using {}", db);

    let outcome = run_database(&mut db, &cli.command, &output).await;
    db.close().await?;
    outcome
}

/// Resolves the database to use, in order of precedence:
/// 1. `--url` descriptor
/// 2. Named database from config (`--database`)
/// 3. Default database from config
/// 4. Postgres from `PG*` environment variables
fn resolve_database(cli: &Cli, config: &Config) -> Result<DatabaseConfig> {
    let mut database = match cli.to_database_config()? {
        Some(database) => database,
        None => match cli.database_name() {
            Some(name) => config.get_database(Some(name)).cloned().ok_or_else(|| {
                DataError::config(format!("Database '{}' not found in config file", name))
            })?,
            None => match config.get_database(None) {
                Some(database) => database.clone(),
                None => DatabaseConfig::Postgres(ConnectionConfig::default()),
            },
        },
    };

    database.apply_env_defaults();

    if let DatabaseConfig::Postgres(pg) = &database {
        if pg.database.is_none() {
            return Err(DataError::config(
                "No database configured. Use --url, a config file, or PGDATABASE.",
            ));
        }
    }
    Ok(database)
}

async fn run_database<C: DatabaseClient>(
    db: &mut Database<C>,
    command: &Command,
    output: &ResultOutput,
) -> Result<()> {
    let result = match command {
        Command::Info => db.database_info(),
        Command::Tables => {
            let tables = db.try_list_tables().await?;
            QueryResult::from_names(
                &[TABLE_NAME_COLUMN],
                tables.into_iter().map(|t| vec![Value::String(t)]).collect(),
            )
        }
        Command::Schema { table: Some(table) } => db.try_get_table_schema(table).await?,
        Command::Schema { table: None } => db.get_all_schemas().await,
        Command::Read { sql, params } => db.try_read(sql, params).await?,
        Command::Exec { sql } => db.try_execute(sql).await?,
        Command::Tx { statements } => db.try_execute_transaction(statements.as_slice()).await?,
        Command::Render { name, vars } => {
            let bindings: Bindings = vars.iter().cloned().collect();
            let sql = db.get_query_from_file(name, &bindings)?;
            print!("{}", output.format_lines(&[sql]));
            return Ok(());
        }
        Command::Run { name, vars, params } => {
            let bindings: Bindings = vars.iter().cloned().collect();
            db.try_execute_query_file(name, params, &bindings).await?
        }
        Command::Sheet { .. } => unreachable!("sheet commands do not open a database"),
    };

    print!("{}", output.format(&result));
    if result.is_error() {
        return Err(DataError::remote(result.message().unwrap_or("operation failed").to_string()));
    }
    Ok(())
}

async fn run_sheet(
    mut config: SpreadsheetConfig,
    spreadsheet_id: Option<String>,
    action: &SheetCommand,
    output: &ResultOutput,
) -> Result<()> {
    config.apply_env_defaults();
    let credentials = config.credentials_path.ok_or_else(|| {
        DataError::config("No Google credentials configured. Set GOOGLE_APPLICATION_CREDENTIALS.")
    })?;
    let spreadsheet_id = spreadsheet_id.or(config.spreadsheet_id);
    let sheet = Spreadsheet::google(credentials, spreadsheet_id).await?;

    match action {
        SheetCommand::List => {
            let names = sheet.try_list_sheet_names().await?;
            print!("{}", output.format_lines(&names));
        }
        SheetCommand::Read { name, range } => {
            let data = sheet.try_read_sheet(name, range.as_deref()).await?;
            print!("{}", output.format(&data));
        }
        SheetCommand::Create { name } => {
            sheet.try_create_sheet(name).await?;
            print!("{}", output.format(&QueryResult::success(format!("Created sheet '{name}'"))));
        }
        SheetCommand::Delete { name } => {
            sheet.try_delete_sheet(name).await?;
            print!("{}", output.format(&QueryResult::success(format!("Deleted sheet '{name}'"))));
        }
        SheetCommand::Clear { name, range } => {
            sheet.try_clear_sheet(name, range.as_deref()).await?;
            print!("{}", output.format(&QueryResult::success(format!("Cleared sheet '{name}'"))));
        }
    }
    Ok(())
}
