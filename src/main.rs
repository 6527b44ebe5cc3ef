use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

use vendor_etl::config::Config;
use vendor_etl::constants;
use vendor_etl::jobs;
use vendor_etl::loader::{LoadReport, LoadStatus};
use vendor_etl::logging;
use vendor_etl::runs::RunRecorder;
use vendor_etl::store::SqliteStore;
use vendor_etl::summarizer::SummaryReport;

#[derive(Parser)]
#[command(name = "vendor-etl")]
#[command(about = "Load inventory exports into SQLite and build the vendor sales summary")]
#[command(version = "0.1.0")]
struct Cli {
    /// Config file (defaults to vendor_etl.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load every data file in a directory, one table per file
    Load {
        /// Directory holding the exported files
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Build the vendor sales summary table
    Summarize,
    /// Run load and summarize sequentially
    Run {
        /// Directory holding the exported files
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Show recent job runs
    Runs {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

impl Commands {
    fn log_file(&self) -> &'static str {
        match self {
            Commands::Load { .. } => constants::LOAD_LOG_FILE,
            Commands::Summarize => constants::SUMMARY_LOG_FILE,
            Commands::Run { .. } | Commands::Runs { .. } => constants::RUN_LOG_FILE,
        }
    }
}

fn print_load_report(report: &LoadReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!("\n📊 Load Results for {}:", report.data_dir);
    for file in &report.files {
        match &file.status {
            LoadStatus::Loaded { rows } => {
                println!("   ✅ {} -> {} ({} rows)", file.file, file.table, rows)
            }
            LoadStatus::Failed { error } => println!("   ❌ {}: {}", file.file, error),
        }
    }
    println!(
        "   Loaded: {}  Failed: {}  Time: {:.2} minutes",
        report.loaded(),
        report.failed(),
        report.elapsed_secs / 60.0
    );
    Ok(())
}

fn print_summary_report(report: &SummaryReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("\n📊 Summary written to {}", report.table);
        println!("   Rows: {}", report.rows);
        println!("   Fingerprint: {}", report.fingerprint);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_env();
    if let Some(database) = cli.database {
        config.database = database;
    }
    if let Commands::Load { data_dir: Some(dir) } | Commands::Run { data_dir: Some(dir) } =
        &cli.command
    {
        config.data_dir = dir.clone();
    }
    config.validate()?;

    let _guard = logging::init_logging(&config.log_dir, cli.command.log_file())?;
    info!(database = %config.database.display(), "Opening store");

    // The store handle lives for this run only and closes on drop.
    let mut store = SqliteStore::open(&config.database)?;

    // Progress lines go to stderr; with --json stdout holds one JSON document.
    match cli.command {
        Commands::Load { .. } => {
            eprintln!("📥 Loading files from {}...", config.data_dir.display());
            let report = jobs::load_job(&mut store, &config)?;
            print_load_report(&report, cli.json)?;
        }
        Commands::Summarize => {
            eprintln!("🔨 Building {}...", config.summary_table);
            let report = jobs::summarize_job(&mut store, &config)?;
            print_summary_report(&report, cli.json)?;
        }
        Commands::Run { .. } => {
            eprintln!("🚀 Running full pipeline (load + summarize)...");

            eprintln!("\n📥 Step 1: Loading files from {}...", config.data_dir.display());
            let load = jobs::load_job(&mut store, &config)?;
            if !cli.json {
                print_load_report(&load, false)?;
            }

            eprintln!("\n🔨 Step 2: Building {}...", config.summary_table);
            let summary = jobs::summarize_job(&mut store, &config)?;
            if cli.json {
                let combined = json!({ "load": load, "summary": summary });
                println!("{}", serde_json::to_string_pretty(&combined)?);
            } else {
                print_summary_report(&summary, false)?;
            }

            eprintln!("✅ Full pipeline completed successfully!");
        }
        Commands::Runs { limit } => {
            let history = RunRecorder::history(&store, limit)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&history.to_json_rows())?);
            } else {
                println!("{history}");
            }
        }
    }
    Ok(())
}
