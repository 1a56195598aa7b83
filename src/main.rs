use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use pubmed_parser_rust::config::AppConfig;
use pubmed_parser_rust::file_writer::write_records_to_file;
use pubmed_parser_rust::logging::{init_logging, OperationTimer};
use pubmed_parser_rust::models::{InvalidPmidPolicy, OutputFormat};
use pubmed_parser_rust::service::{extract_unique, IngestOptions, IngestService};
use pubmed_parser_rust::validation::InputValidator;
use pubmed_parser_rust::Database;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Extra configuration file, layered over config/default and config/local
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse PubMed XML files into the citation store
    Ingest {
        /// Input file, directory or glob pattern
        input: String,

        /// SQLite database path
        #[arg(long)]
        db: Option<String>,

        /// Number of extraction workers (0 = one per CPU)
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,

        /// Reparse files even if they are unchanged
        #[arg(long)]
        force: bool,

        /// Only process the first few input files
        #[arg(long)]
        test: bool,

        /// Records per transaction
        #[arg(long)]
        chunk_size: Option<usize>,

        /// What to do with articles without a pmid (drop or keep)
        #[arg(long)]
        invalid_pmid: Option<InvalidPmidPolicy>,
    },
    /// Extract and deduplicate records into a JSON or CSV file, without a store
    Export {
        /// Input file, directory or glob pattern
        input: String,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Output format (json or csv)
        #[arg(short, long, default_value = "json")]
        format: OutputFormat,

        /// Number of extraction workers (0 = one per CPU)
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,

        /// Only process the first few input files
        #[arg(long)]
        test: bool,

        /// What to do with articles without a pmid (drop or keep)
        #[arg(long)]
        invalid_pmid: Option<InvalidPmidPolicy>,
    },
    /// Print the effective configuration as YAML
    ShowConfig,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Load configuration
    let config = AppConfig::load(cli.config.as_deref())?;

    // Initialize logging
    let log_level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    let _guard = init_logging(
        Some(log_level),
        config.logging.file_path.as_deref().map(Path::new),
        &config.logging.format,
    )?;

    info!("Starting pubmed-parser");

    // Process command
    match cli.command {
        Commands::Ingest {
            input,
            db,
            concurrency,
            force,
            test,
            chunk_size,
            invalid_pmid,
        } => {
            let mut config = config;
            if let Some(db) = db {
                config.database.path = db;
            }
            apply_overrides(&mut config, concurrency, invalid_pmid);
            if let Some(chunk_size) = chunk_size {
                config.ingest.chunk_size = chunk_size;
            }
            ingest(&config, &input, force, test)
        }
        Commands::Export {
            input,
            output,
            format,
            concurrency,
            test,
            invalid_pmid,
        } => {
            let mut config = config;
            apply_overrides(&mut config, concurrency, invalid_pmid);
            export(&config, &input, &output, format, test)
        }
        Commands::ShowConfig => show_config(&config),
    }
}

fn apply_overrides(config: &mut AppConfig, concurrency: Option<usize>, invalid_pmid: Option<InvalidPmidPolicy>) {
    if let Some(concurrency) = concurrency {
        config.ingest.concurrency = concurrency;
    }
    if let Some(policy) = invalid_pmid {
        config.ingest.invalid_pmid_policy = policy;
    }
}

/// Run the ingestion pipeline and print the run summary
#[allow(clippy::print_stdout)]
fn ingest(config: &AppConfig, input: &str, force: bool, test: bool) -> Result<()> {
    config.validate()?;
    InputValidator::validate_input(input)?;
    InputValidator::validate_database_path(&config.database.path)?;

    let db = Database::new(&config.database.path, config.database.pool_size, config.busy_timeout())
        .context("Failed to open citation store")?;
    let options = IngestOptions::from_config(config, force, test)?;

    let timer = OperationTimer::new("ingest");
    let report = IngestService::new(&db, options)
        .run(input)
        .with_context(|| format!("Ingestion of {input} aborted"))?;
    timer.finish();

    println!("{report}");
    Ok(())
}

/// Extract, deduplicate and write records to a file
#[allow(clippy::print_stdout)]
fn export(config: &AppConfig, input: &str, output: &Path, format: OutputFormat, test: bool) -> Result<()> {
    config.validate()?;
    InputValidator::validate_input(input)?;

    let options = IngestOptions::from_config(config, false, test)?;
    let timer = OperationTimer::new("export");
    let (records, report) = extract_unique(input, &options)?;
    let written = write_records_to_file(&records, format, output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    timer.finish();

    info!(written, path = %output.display(), format = format.extension(), "Export finished");
    println!("{report}");
    Ok(())
}

#[allow(clippy::print_stdout)]
fn show_config(config: &AppConfig) -> Result<()> {
    print!("{}", config.to_yaml()?);
    Ok(())
}
