//! PLS-CADD XML report CLI
//!
//! Command-line tool for loading, inspecting and exporting the tables of
//! PLS-CADD XML reports.

use clap::{Args, Parser, Subcommand, ValueEnum};
use plsxml_core::{
    export_csv_dir, load_paths, write_json, LoadManifest, LoadReport, ParseOptions, Table,
    TableStore,
};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "plsxml")]
#[command(about = "PLS-CADD XML report loader", long_about = None)]
#[command(version)]
struct Cli {
    /// Log per-file and per-table progress
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct LoadArgs {
    /// XML reports, ZIP archives or directories to load, in order
    #[arg(required = true)]
    sources: Vec<PathBuf>,

    /// Only load this table (repeatable)
    #[arg(short, long = "table")]
    tables: Vec<String>,

    /// Attach units from `units` attributes to numeric values
    #[arg(short, long)]
    units: bool,
}

impl LoadArgs {
    fn options(&self, verbose: bool) -> ParseOptions {
        let options = ParseOptions::new().with_units(self.units).with_verbose(verbose);
        if self.tables.is_empty() {
            options
        } else {
            options.with_tables(self.tables.iter().cloned())
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    /// One CSV file per table, written into the output directory
    Csv,
    /// A single JSON object of table name to rows
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every table with the fields and values of its first row
    Summary {
        #[command(flatten)]
        load: LoadArgs,
    },

    /// List loaded tables with their row and column counts
    Tables {
        #[command(flatten)]
        load: LoadArgs,
    },

    /// Show the rows of the selected tables
    Show {
        #[command(flatten)]
        load: LoadArgs,

        /// Maximum number of rows to display per table
        #[arg(short, long)]
        limit: Option<usize>,

        /// Columns to display (comma-separated)
        #[arg(short, long)]
        columns: Option<String>,
    },

    /// Export the selected tables
    Export {
        #[command(flatten)]
        load: LoadArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value = "csv")]
        format: ExportFormat,

        /// Output directory (csv) or file (json); json goes to stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Load and export as described by a manifest file
    Run {
        /// Path to manifest file (JSON)
        #[arg(short, long)]
        manifest: PathBuf,
    },

    /// Write a manifest file for the given sources
    CreateManifest {
        #[command(flatten)]
        load: LoadArgs,

        /// Output path for the manifest file
        #[arg(short, long)]
        output: PathBuf,

        /// Export file recorded in the manifest
        #[arg(long)]
        export: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn run(cli: Cli) -> plsxml_core::Result<()> {
    let verbose = cli.verbose;

    match cli.command {
        Commands::Summary { load } => cmd_summary(&load, verbose),
        Commands::Tables { load } => cmd_tables(&load, verbose),
        Commands::Show {
            load,
            limit,
            columns,
        } => cmd_show(&load, verbose, limit, columns),
        Commands::Export {
            load,
            format,
            output,
        } => cmd_export(&load, verbose, format, output.as_deref()),
        Commands::Run { manifest } => cmd_run(&manifest),
        Commands::CreateManifest {
            load,
            output,
            export,
        } => cmd_create_manifest(&load, verbose, &output, export),
    }
}

/// Load every source into a fresh store and report what happened on stderr
fn load_store(sources: &[PathBuf], options: &ParseOptions) -> (TableStore, LoadReport) {
    let mut store = TableStore::new();
    let report = load_paths(&mut store, sources, options);

    eprintln!(
        "Loaded {} table(s) from {} input(s): {} rows, {} duplicates dropped",
        store.len(),
        report.appended.len(),
        report.rows_loaded(),
        report.duplicates_dropped()
    );
    if !report.skipped.is_empty() || !report.failures.is_empty() {
        eprintln!(
            "{} path(s) skipped, {} input(s) failed",
            report.skipped.len(),
            report.failures.len()
        );
    }

    (store, report)
}

fn cmd_summary(load: &LoadArgs, verbose: bool) -> plsxml_core::Result<()> {
    let (store, _) = load_store(&load.sources, &load.options(verbose));
    print!("{}", store.table_summary());
    Ok(())
}

fn cmd_tables(load: &LoadArgs, verbose: bool) -> plsxml_core::Result<()> {
    let (store, _) = load_store(&load.sources, &load.options(verbose));

    println!("Tables ({}):", store.len());
    println!();

    for table in store.iter() {
        println!(
            "  {} ({} rows, {} columns)",
            table.name,
            table.row_count(),
            table.column_count()
        );
    }

    Ok(())
}

fn cmd_show(
    load: &LoadArgs,
    verbose: bool,
    limit: Option<usize>,
    columns: Option<String>,
) -> plsxml_core::Result<()> {
    let (store, _) = load_store(&load.sources, &load.options(verbose));

    // Filter columns if specified
    let col_filter: Option<Vec<&str>> = columns.as_ref().map(|c| c.split(',').collect());

    for table in selected_tables(&store, &load.tables)? {
        println!("{}", table.name);
        print_table(table, col_filter.as_deref(), limit);
        println!();
    }

    Ok(())
}

fn print_table(table: &Table, col_filter: Option<&[&str]>, limit: Option<usize>) {
    let display_cols: Vec<&str> = table
        .columns
        .iter()
        .map(|c| c.name.as_str())
        .filter(|name| col_filter.is_none_or(|filter| filter.contains(name)))
        .collect();

    println!("{}", display_cols.join("\t"));
    println!("{}", "-".repeat(display_cols.len() * 12));

    let row_limit = limit.unwrap_or(table.rows.len());
    for row in table.rows.iter().take(row_limit) {
        let values: Vec<String> = display_cols
            .iter()
            .map(|name| row.get(name).map(|v| v.to_string_value()).unwrap_or_default())
            .collect();
        println!("{}", values.join("\t"));
    }

    if table.rows.len() > row_limit {
        println!("... ({} more rows)", table.rows.len() - row_limit);
    }
}

fn cmd_export(
    load: &LoadArgs,
    verbose: bool,
    format: ExportFormat,
    output: Option<&Path>,
) -> plsxml_core::Result<()> {
    let (store, _) = load_store(&load.sources, &load.options(verbose));
    let names = table_names(&load.tables);

    match format {
        ExportFormat::Csv => {
            let output_dir = output.ok_or_else(|| plsxml_core::Error::InvalidInput {
                path: PathBuf::from("-"),
                reason: "csv export needs an --output directory".to_string(),
            })?;
            let written = export_csv_dir(&store, names.as_deref(), output_dir)?;

            println!("Exported {} table(s) to {}", written.len(), output_dir.display());
            for path in &written {
                println!("  - {}", path.display());
            }
        }
        ExportFormat::Json => export_json(&store, names.as_deref(), output)?,
    }

    Ok(())
}

fn cmd_run(manifest_path: &Path) -> plsxml_core::Result<()> {
    let manifest = LoadManifest::load(manifest_path)?;
    println!("Running manifest with {} source(s)", manifest.sources.len());

    let (store, _) = load_store(&manifest.sources, &manifest.options());
    export_json(&store, None, manifest.output.as_deref())
}

fn cmd_create_manifest(
    load: &LoadArgs,
    verbose: bool,
    output: &Path,
    export: Option<PathBuf>,
) -> plsxml_core::Result<()> {
    let mut manifest = LoadManifest::new(load.sources.clone());
    manifest.tables = (!load.tables.is_empty()).then(|| load.tables.clone());
    manifest.units = load.units;
    manifest.verbose = verbose;
    manifest.output = export;

    manifest.save(output)?;
    println!("Created manifest: {}", output.display());

    Ok(())
}

fn export_json(store: &TableStore, names: Option<&[&str]>, output: Option<&Path>) -> plsxml_core::Result<()> {
    match output {
        Some(path) => {
            let file = File::create(path)?;
            let mut writer = BufWriter::new(file);
            write_json(store, names, &mut writer)?;
            writeln!(writer)?;
            writer.flush()?;
            eprintln!("Exported {} table(s) to {}", names.map_or(store.len(), <[_]>::len), path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            write_json(store, names, &mut writer)?;
            writeln!(writer)?;
        }
    }
    Ok(())
}

/// Explicit table selection, `None` for all tables
fn table_names(tables: &[String]) -> Option<Vec<&str>> {
    (!tables.is_empty()).then(|| tables.iter().map(String::as_str).collect())
}

fn selected_tables<'a>(store: &'a TableStore, tables: &[String]) -> plsxml_core::Result<Vec<&'a Table>> {
    match table_names(tables) {
        None => Ok(store.iter().collect()),
        Some(names) => names
            .into_iter()
            .map(|name| {
                store
                    .get(name)
                    .ok_or_else(|| plsxml_core::Error::TableNotFound(name.to_string()))
            })
            .collect(),
    }
}
