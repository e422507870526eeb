use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use nl2sql::bootstrap::bootstrap;
use nl2sql::catalog::CatalogSnapshot;
use nl2sql::config::ServiceConfig;
use nl2sql::db::Row;
use nl2sql::execution_loop::QueryResponse;
use nl2sql::observability::init_tracing;
use nl2sql::security::{GatePolicy, SqlSafetyGate};
use serde_json::Value;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "nl2sql")]
#[command(about = "Ask questions of a database in plain language")]
#[command(version)]
struct Args {
    /// Metadata document (overrides METADATA_PATH)
    #[arg(short, long, global = true)]
    metadata: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question: route, generate SQL, validate and run it
    Ask {
        question: String,

        /// Generate and validate the SQL without running it
        #[arg(long)]
        no_execute: bool,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Run a SQL statement through the safety gate (no database needed)
    Validate { sql: String },

    /// Print the catalog's schema description
    Schema,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Table,
    Csv,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let mut config = ServiceConfig::from_env()?;
    if let Some(metadata) = args.metadata {
        config.metadata_path = metadata;
    }

    match args.command {
        Commands::Ask {
            question,
            no_execute,
            format,
        } => {
            info!("Question: {}", question);
            let state = bootstrap(config).await?;
            let response = state.orchestrator.handle(&question, !no_execute).await?;
            print_response(&response, format)?;
        }
        Commands::Validate { sql } => {
            let snapshot = CatalogSnapshot::load(&config.metadata_path)
                .with_context(|| format!("loading {}", config.metadata_path.display()))?;
            let gate = SqlSafetyGate::new(GatePolicy::with_default_limit(
                config.default_row_limit as usize,
            ));
            match gate.validate_for_catalog(&sql, &snapshot) {
                Ok(normalized) => println!("{}", normalized),
                Err(rejection) => anyhow::bail!("Rejected: {}", rejection),
            }
        }
        Commands::Schema => {
            let snapshot = CatalogSnapshot::load(&config.metadata_path)
                .with_context(|| format!("loading {}", config.metadata_path.display()))?;
            println!("{}", snapshot.schema_text());
        }
    }

    Ok(())
}

fn print_response(response: &QueryResponse, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(response)?);
        }
        OutputFormat::Table => {
            println!("-- intent: {}", response.intent.as_deref().unwrap_or("unknown"));
            println!("{}\n", response.sql);
            print_table(&response.rows);
            if response.figure.is_some() {
                println!("\n(figure available with --format json)");
            }
        }
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(io::stdout());
            let columns = column_names(&response.rows);
            writer.write_record(&columns)?;
            for row in &response.rows {
                writer.write_record(columns.iter().map(|c| cell_text(row.get(c))))?;
            }
            writer.flush()?;
        }
    }
    Ok(())
}

fn column_names(rows: &[Row]) -> Vec<String> {
    rows.first()
        .map(|row| row.keys().cloned().collect())
        .unwrap_or_default()
}

fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn print_table(rows: &[Row]) {
    if rows.is_empty() {
        println!("(no rows)");
        return;
    }
    let columns = column_names(rows);
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| columns.iter().map(|c| cell_text(row.get(c))).collect())
        .collect();
    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            cells
                .iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(c.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let line = |values: &[String]| -> String {
        values
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{:<width$}", v, width = *w))
            .collect::<Vec<_>>()
            .join(" | ")
    };
    let _ = writeln!(out, "{}", line(&columns));
    let _ = writeln!(
        out,
        "{}",
        widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("-+-")
    );
    for row in &cells {
        let _ = writeln!(out, "{}", line(row));
    }
    let _ = writeln!(out, "({} rows)", rows.len());
}
