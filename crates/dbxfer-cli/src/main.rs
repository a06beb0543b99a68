//! dbxfer CLI - offline tools for dependency-ordered transfer files.

use clap::{Parser, Subcommand};
use dbxfer::{
    DependencyResolver, MemoryPlatform, Model, SessionConfig, TransferEngine, TransferError,
};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "dbxfer")]
#[command(about = "Dependency-ordered relational data transfer")]
#[command(version)]
struct Cli {
    /// Path to YAML session configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "warn")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the export order of a model's tables
    TableOrder {
        /// Path to YAML model file
        #[arg(short, long)]
        model: PathBuf,
    },

    /// Show the insertion order and deferred references for a transfer file
    Plan {
        /// Path to YAML model file
        #[arg(short, long)]
        model: PathBuf,

        /// Transfer file to plan
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Decode a transfer file and write it back in canonical form
    Normalize {
        /// Path to YAML model file
        #[arg(short, long)]
        model: PathBuf,

        /// Transfer file to read
        #[arg(short, long)]
        input: PathBuf,

        /// Output file [default: stdout]
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Load a transfer file into an in-memory database with full constraint checking
    Check {
        /// Path to YAML model file
        #[arg(short, long)]
        model: PathBuf,

        /// Transfer file to load
        #[arg(short, long)]
        input: PathBuf,
    },
}

/// One deferred reference in a plan report.
#[derive(Serialize)]
struct FixUpReport {
    row: String,
    columns: Vec<String>,
    target: String,
}

/// Plan output for `--output-json`.
#[derive(Serialize)]
struct PlanReport {
    rows: usize,
    skipped_rows: u64,
    skipped_columns: u64,
    order: Vec<String>,
    fixups: Vec<FixUpReport>,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), TransferError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(TransferError::Config)?;

    let config = match &cli.config {
        Some(path) => {
            let config = SessionConfig::load(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => SessionConfig::default(),
    };

    match cli.command {
        Commands::TableOrder { model } => {
            let model = load_model(&model)?;
            let groups = DependencyResolver::new(&model).resolve_tables();

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&groups)?);
            } else {
                for (i, group) in groups.iter().enumerate() {
                    let names: Vec<&str> = group.tables.iter().map(|t| t.name.as_str()).collect();
                    let marker = if group.cyclic { " (cyclic)" } else { "" };
                    println!("{:>3}. {}{}", i + 1, names.join(", "), marker);
                }
            }
        }

        Commands::Plan { model, input } => {
            let engine = TransferEngine::new(load_model(&model)?, config)?;
            let planned = engine.plan(open_input(&input)?)?;

            let report = PlanReport {
                rows: planned.rows.len(),
                skipped_rows: planned.read.skipped_rows,
                skipped_columns: planned.read.skipped_columns,
                order: planned
                    .plan
                    .order
                    .iter()
                    .map(|i| planned.rows[*i].describe())
                    .collect(),
                fixups: planned
                    .plan
                    .fixups
                    .iter()
                    .map(|f| FixUpReport {
                        row: planned.rows[f.row].describe(),
                        columns: f.columns.clone(),
                        target: planned.rows[f.target].describe(),
                    })
                    .collect(),
            };

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "Restore plan: {} rows, {} deferred references",
                    report.rows,
                    report.fixups.len()
                );
                for (i, row) in report.order.iter().enumerate() {
                    println!("{:>6}. {}", i + 1, row);
                }
                if !report.fixups.is_empty() {
                    println!("Deferred references:");
                    for fixup in &report.fixups {
                        println!(
                            "  {} [{}] -> {}",
                            fixup.row,
                            fixup.columns.join(", "),
                            fixup.target
                        );
                    }
                }
                if report.skipped_rows > 0 || report.skipped_columns > 0 {
                    println!(
                        "Skipped {} rows and {} values not in the model",
                        report.skipped_rows, report.skipped_columns
                    );
                }
            }
        }

        Commands::Normalize {
            model,
            input,
            output,
        } => {
            let engine = TransferEngine::new(load_model(&model)?, config)?;
            let reader = open_input(&input)?;
            let rows = match output {
                Some(path) => {
                    let file = BufWriter::new(File::create(&path)?);
                    let rows = engine.normalize(reader, file)?;
                    info!("Wrote {} rows to {:?}", rows, path);
                    rows
                }
                None => {
                    let stdout = std::io::stdout();
                    let mut lock = stdout.lock();
                    let rows = engine.normalize(reader, &mut lock)?;
                    lock.flush()?;
                    rows
                }
            };
            if cli.output_json {
                println!("{}", serde_json::json!({ "rows_written": rows }));
            }
        }

        Commands::Check { model, input } => {
            let model = load_model(&model)?;
            let engine = TransferEngine::new(Arc::clone(&model), config)?;
            let platform = Arc::new(MemoryPlatform::new(model));
            let cancel = setup_signal_handler();

            let result = engine
                .restore(platform, open_input(&input)?, Some(cancel))
                .await?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                println!("Check completed!");
                println!("  Run ID: {}", result.run_id);
                println!("  Duration: {:.2}s", result.duration_seconds);
                println!("  Rows: {}", result.load.rows_inserted);
                println!(
                    "  Deferred references: {} ({} updated, {} inline)",
                    result.load.fixups_deferred,
                    result.load.fixups_issued,
                    result.load.fixups_applied_inline
                );
                println!("  External references: {}", result.load.external_references);
                if result.read.skipped_rows > 0 || result.read.skipped_columns > 0 {
                    println!(
                        "  Skipped: {} rows, {} values",
                        result.read.skipped_rows, result.read.skipped_columns
                    );
                }
            }
        }
    }

    Ok(())
}

fn load_model(path: &Path) -> Result<Arc<Model>, TransferError> {
    let model = Model::load(path)?;
    info!("Loaded model {:?} with {} tables", path, model.tables().len());
    Ok(Arc::new(model))
}

fn open_input(path: &Path) -> Result<BufReader<File>, TransferError> {
    Ok(BufReader::new(File::open(path)?))
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => return Err(format!("unknown verbosity: {other}")),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("unknown log format: {other}")),
    }

    Ok(())
}

/// Flip the returned receiver to `true` on Ctrl-C.
fn setup_signal_handler() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Stopping after the current row...");
            let _ = tx.send(true);
        }
    });
    rx
}
