//! csv-import CLI - run CSV imports described by JSON job definitions
//!
//! ```bash
//! csv-import run --job users.json --store users.store.json users.csv
//! csv-import run --job users.json --dry-run --json - < users.csv
//! csv-import header --job users.json users.csv
//! csv-import operations
//! ```

use clap::{Parser, Subcommand};
use csv_importer::{
    operations_description, DocumentStore, ImportConfig, Importer, InvalidPolicy, JobDefinition,
    Document, Report,
};
use env_logger::Env;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "csv-import")]
#[command(about = "Import CSV files into a JSON document store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a CSV file
    Run {
        /// Input CSV file, or - for stdin
        input: PathBuf,

        /// Job definition (JSON)
        #[arg(short, long)]
        job: PathBuf,

        /// Document store file (default: in memory, nothing kept)
        #[arg(short, long)]
        store: Option<PathBuf>,

        /// Override the job's identifier column
        #[arg(short, long)]
        identifier: Option<String>,

        /// Override the job's policy for failing rows (skip or abort)
        #[arg(long)]
        when_invalid: Option<InvalidPolicy>,

        /// Validate rows without saving anything
        #[arg(long)]
        dry_run: bool,

        /// Print the report summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show how a CSV header resolves against a job
    Header {
        /// Input CSV file, or - for stdin
        input: PathBuf,

        /// Job definition (JSON)
        #[arg(short, long)]
        job: PathBuf,
    },

    /// Show available cell operations
    Operations,
}

fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            input,
            job,
            store,
            identifier,
            when_invalid,
            dry_run,
            json,
        } => cmd_run(
            &input,
            &job,
            store.as_deref(),
            identifier,
            when_invalid,
            dry_run,
            json,
        ),

        Commands::Header { input, job } => cmd_header(&input, &job),

        Commands::Operations => cmd_operations(),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Point the importer at a path, or at stdin for `-`.
fn with_input<'c>(importer: Importer<'c, Document>, input: &Path) -> Importer<'c, Document> {
    if input == Path::new("-") {
        importer.file(io::stdin())
    } else {
        importer.path(input)
    }
}

fn load_job(path: &Path) -> Result<(JobDefinition, ImportConfig<Document>), Box<dyn std::error::Error>> {
    let job = JobDefinition::from_path(path)?;
    let mut config = job.to_config()?;
    if let Some(name) = &job.name {
        log::info!("Loaded job '{}'", name);
    }
    config = config.after_save(|document: &Document| {
        log::debug!("Saved document {:?}", document.id);
    });
    Ok((job, config))
}

fn cmd_run(
    input: &Path,
    job_path: &Path,
    store_path: Option<&Path>,
    identifier: Option<String>,
    when_invalid: Option<InvalidPolicy>,
    dry_run: bool,
    json: bool,
) -> Result<bool, Box<dyn std::error::Error>> {
    let (job, mut config) = load_job(job_path)?;
    if let Some(policy) = when_invalid {
        config = config.when_invalid(policy);
    }

    let mut store = match store_path {
        Some(path) => DocumentStore::open(path)?,
        None => DocumentStore::in_memory(),
    }
    .with_rules(job.store_rules());

    let mut importer = with_input(Importer::new(&config), input);
    if let Some(key) = identifier {
        importer = importer.identifier(key);
    }

    let report = if dry_run {
        importer.preview(&store)?
    } else {
        importer.run(&mut store)?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report.summary())?);
    } else {
        print_report(&report);
    }

    Ok(report.success())
}

fn print_report(report: &Report<Document>) {
    for row in report.failed_rows().iter().copied().chain(report.failed_row.as_ref()) {
        eprintln!("   Line {}: {}", row.line, row.status.label());
        for (column, messages) in &row.errors {
            eprintln!("     - {} {}", column, messages.join(", "));
        }
    }
    if !report.extra_columns.is_empty() {
        eprintln!("   Ignored columns: {}", report.extra_columns.join(", "));
    }

    let icon = if report.success() { "✅" } else { "❌" };
    println!("{} {}", icon, report.message());
}

fn cmd_header(input: &Path, job_path: &Path) -> Result<bool, Box<dyn std::error::Error>> {
    let (_, config) = load_job(job_path)?;
    let header = with_input(Importer::new(&config), input).header()?;

    for column in header.columns() {
        match column.index {
            Some(i) => println!("   {} <- {}", column.key, header.raw_columns()[i]),
            None if column.required => println!("   {} (missing, required)", column.key),
            None => println!("   {} (missing)", column.key),
        }
    }
    for extra in header.extra_columns() {
        println!("   ? {}", extra);
    }

    Ok(header.is_valid())
}

fn cmd_operations() -> Result<bool, Box<dyn std::error::Error>> {
    println!("{}", operations_description());
    Ok(true)
}
