//! `clientele` command-line entry point.
//!
//! Usage:
//!   clientele import clients.csv
//!   clientele list --search acme --sort-by company_name --sort-direction asc
//!   clientele show 42
//!   clientele export --duplicates-only --out dupes.csv

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;

use clientele_lib::config::{load_config, load_config_from, Config};
use clientele_lib::db::ClientDb;
use clientele_lib::import::{import_csv_path, ExistingKeyPolicy, ImportOptions};
use clientele_lib::queries::{
    export_clients, list_clients, show_client, ClientFilter, QueryError, SortColumn, SortDirection,
};

/// Exit code for a lookup that found nothing.
const EXIT_NOT_FOUND: u8 = 2;

#[derive(Parser)]
#[command(name = "clientele")]
#[command(about = "Import client CSVs and track duplicate groups")]
#[command(version)]
struct Cli {
    /// Database file (overrides config `dbPath`)
    #[arg(long, global = true, env = "CLIENTELE_DB")]
    db: Option<PathBuf>,

    /// Config file (default: ~/.clientele/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a CSV file and print the import report as JSON
    Import {
        file: PathBuf,
        /// Batch tag for the inserted rows (default: random UUID)
        #[arg(long)]
        batch_id: Option<String>,
        /// Insert rows whose key is already stored and link them to the stored root
        #[arg(long)]
        link_existing: bool,
    },
    /// List clients as JSON
    List {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        duplicates_only: bool,
        #[arg(long, default_value = "id")]
        sort_by: String,
        #[arg(long, default_value = "desc")]
        sort_direction: String,
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// Show one client and its same-key duplicates
    Show { id: i64 },
    /// Export clients as CSV
    Export {
        #[arg(long)]
        duplicates_only: bool,
        /// Output file (default: stdout)
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = match cli.config.as_deref() {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    let db = open_db(cli.db.as_deref(), &config)?;

    match cli.command {
        Commands::Import {
            file,
            batch_id,
            link_existing,
        } => {
            let mut opts = ImportOptions::generated()
                .with_batch_size(config.batch_size)
                .with_page_size(config.scan_page_size)
                .with_existing_policy(if link_existing {
                    ExistingKeyPolicy::Link
                } else {
                    config.on_existing
                });
            if let Some(batch_id) = batch_id {
                opts.batch_id = batch_id;
            }
            let report = import_csv_path(&db, &file, &opts)?;
            print_json(&report)?;
        }
        Commands::List {
            search,
            duplicates_only,
            sort_by,
            sort_direction,
            page,
        } => {
            let filter = ClientFilter {
                search,
                duplicates_only,
                sort_by: SortColumn::parse(&sort_by),
                sort_direction: SortDirection::parse(&sort_direction),
                page,
                per_page: config.per_page,
            };
            print_json(&list_clients(&db, &filter)?)?;
        }
        Commands::Show { id } => match show_client(&db, id) {
            Ok(detail) => print_json(&detail)?,
            Err(QueryError::NotFound(id)) => {
                eprintln!("Client {id} not found");
                return Ok(ExitCode::from(EXIT_NOT_FOUND));
            }
            Err(e) => return Err(e.into()),
        },
        Commands::Export {
            duplicates_only,
            out,
        } => match out {
            Some(path) => {
                let file = File::create(&path)?;
                let out = BufWriter::new(file);
                let n = export_clients(&db, out, duplicates_only, config.scan_page_size)?;
                eprintln!("Wrote {n} clients to {}", path.display());
            }
            None => {
                export_clients(&db, io::stdout().lock(), duplicates_only, config.scan_page_size)?;
            }
        },
    }

    Ok(ExitCode::SUCCESS)
}

fn open_db(
    explicit: Option<&Path>,
    config: &Config,
) -> Result<ClientDb, Box<dyn std::error::Error>> {
    let db = match explicit.or(config.db_path.as_deref()) {
        Some(path) => ClientDb::open_at(path.to_path_buf())?,
        None => ClientDb::open()?,
    };
    Ok(db)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}
