use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use rncp_registry::{pipeline, setup_database, table_counts, Outputs, PipelineConfig, PipelineReport};

#[derive(Parser)]
#[command(name = "rncp-registry", version, about = "Qualification registry export → CSV tables / SQLite")]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the export into CSV tables
    Extract { input: PathBuf, csv_dir: PathBuf },

    /// Extract the export straight into SQLite
    Load { input: PathBuf, database: PathBuf },

    /// Full process: CSV tables and SQLite
    Run {
        input: PathBuf,
        csv_dir: PathBuf,
        database: PathBuf,
    },

    /// Row count of every table
    Counts { database: PathBuf },
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Extract { input, csv_dir } => run_pipeline(
            &config,
            input,
            Outputs {
                csv_dir: Some(csv_dir),
                database: None,
            },
        ),
        Commands::Load { input, database } => run_pipeline(
            &config,
            input,
            Outputs {
                csv_dir: None,
                database: Some(database),
            },
        ),
        Commands::Run {
            input,
            csv_dir,
            database,
        } => run_pipeline(
            &config,
            input,
            Outputs {
                csv_dir: Some(csv_dir),
                database: Some(database),
            },
        ),
        Commands::Counts { database } => run_counts(database),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<PipelineConfig> {
    let config = match path {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    Ok(config.with_env()?)
}

fn run_pipeline(config: &PipelineConfig, input: PathBuf, outputs: Outputs) -> Result<()> {
    println!("📂 Registry export: {}", input.display());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let report = pipeline::run(config, input, &outputs).context("Pipeline failed")?;
    print_report(&report);

    Ok(())
}

fn print_report(report: &PipelineReport) {
    println!("✓ Active rows: {}", report.rows);
    println!("✓ Rows skipped: {}", report.stats.rows_skipped);
    println!("✓ Segments dropped: {}", report.stats.segments_dropped);
    if report.stats.suspect_splits > 0 {
        println!("⚠️  Suspect splits: {}", report.stats.suspect_splits);
    }

    if let Some(enrichment) = &report.enrichment {
        println!(
            "✓ Partner listings: {} found / {} visited ({} new organizations)",
            enrichment.listings_found, enrichment.entries_visited, enrichment.organizations_added
        );
    }

    for (sink, tables) in &report.sinks {
        println!("\n💾 {} ({} rows)", sink, tables.total_rows());
        for (table, rows) in &tables.tables {
            println!("   {:<28} {}", table, rows);
        }
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("🔑 Fingerprint: {}", report.fingerprint);
}

fn run_counts(database: PathBuf) -> Result<()> {
    if !database.exists() {
        anyhow::bail!("Database not found: {}", database.display());
    }

    let conn = Connection::open(&database)?;
    setup_database(&conn)?;

    println!("🔍 {}", database.display());
    for (table, count) in table_counts(&conn)? {
        println!("   {:<28} {}", table, count);
    }

    Ok(())
}
