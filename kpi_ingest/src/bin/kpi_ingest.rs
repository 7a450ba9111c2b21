use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use kpi_ingest::{
    cell::{CellValue, collect_columns},
    connection::{ConnectionPatch, NewConnection, SourceProvider},
    db::migrate,
    import::{self, CreateConnectionImport, ImportResult},
    kpi_catalog::{self, SyncOptions},
    mapping::{ColumnMapping, MappingSelection, selected_mappings, suggest_mappings},
    repo::{ConnectionRepository, KpiRepository, sqlite::SqliteStore},
    sample,
    source::FileSource,
};
use shared_utils::config::{Settings, load_settings};

#[derive(Parser)]
#[command(version, about = "KPI spreadsheet ingestion CLI")]
struct Cli {
    /// Settings file (TOML).
    #[arg(long, global = true, env = "KPI_INGEST_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,
    /// SQLite database path or `sqlite:` URL; overrides the settings file.
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Apply pending schema migrations.
    Migrate,
    Kpis(KpisCmd),
    Connection(ConnectionCmd),
    /// Import a CSV/Excel file through a connection's stored mapping.
    Import {
        #[arg(long)]
        connection: i32,
        #[arg(long)]
        deal: String,
        #[arg(long, value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        sheet: Option<String>,
        #[arg(long)]
        user: Option<String>,
    },
    /// Sync a connection from a file-backed spreadsheet source.
    Sync {
        #[arg(long)]
        connection: i32,
        #[arg(long)]
        deal: String,
        #[arg(long, value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        user: Option<String>,
    },
    /// Show how the first rows of a file map through a connection. Writes nothing.
    Preview {
        #[arg(long)]
        connection: i32,
        #[arg(long, value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        sheet: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Suggest KPI codes for the columns of a file.
    Suggest {
        #[arg(long, value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        sheet: Option<String>,
        /// Rows sampled for the numeric check.
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Print the deterministic sample dataset, or import it into a new connection.
    Sample {
        #[arg(long, default_value_t = sample::DEFAULT_SEED)]
        seed: u64,
        #[arg(long, requires_all = ["deal", "fund"])]
        import: bool,
        #[arg(long)]
        deal: Option<String>,
        #[arg(long)]
        fund: Option<String>,
        #[arg(long)]
        user: Option<String>,
    },
}

#[derive(Args)]
struct KpisCmd {
    #[command(subcommand)]
    sub: KpisSub,
}

#[derive(Subcommand)]
enum KpisSub {
    /// Load a KPI catalog into the definitions table (bundled catalog by default).
    Sync {
        #[arg(long, value_name = "FILE")]
        file: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        prune: bool,
    },
    List,
}

#[derive(Args)]
struct ConnectionCmd {
    #[command(subcommand)]
    sub: ConnectionSub,
}

#[derive(Subcommand)]
enum ConnectionSub {
    Create {
        #[arg(long)]
        fund: String,
        #[arg(long)]
        deal: Option<String>,
        #[arg(long, value_parser = parse_provider, default_value = "excel")]
        provider: SourceProvider,
        #[arg(long)]
        name: String,
        #[arg(long)]
        spreadsheet_id: Option<String>,
        #[arg(long)]
        sheet: Option<String>,
        /// JSON array of `{columnName, kpiCode, dataType, include}`.
        #[arg(long, value_name = "FILE")]
        mapping: Option<PathBuf>,
    },
    List {
        #[arg(long)]
        fund: Option<String>,
    },
    Show {
        id: i32,
    },
    Delete {
        id: i32,
    },
    /// Replace the stored mapping with a JSON array of `{columnName, kpiCode, dataType}`.
    SetMapping {
        id: i32,
        #[arg(long, value_name = "FILE")]
        file: PathBuf,
    },
}

fn parse_provider(s: &str) -> Result<SourceProvider, String> {
    s.parse().map_err(|e: anyhow::Error| e.to_string())
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parse {}", path.display()))
}

fn report(result: &ImportResult) -> Result<()> {
    print_json(result)?;
    if !result.success {
        bail!("import failed");
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?;
    init_tracing(&settings);

    let db_url = cli
        .database_url
        .clone()
        .or_else(|| settings.database_url.clone())
        .context("no database configured: pass --database-url or set DATABASE_URL")?;
    let user = |explicit: Option<String>| explicit.or_else(|| settings.default_user.clone());

    if let Cmd::Migrate = cli.cmd {
        migrate::run_sqlite(&db_url)?;
        info!(database = %db_url, "migrations applied");
        return Ok(());
    }

    let mut store = SqliteStore::open(&db_url)?;

    match cli.cmd {
        Cmd::Migrate => {}
        Cmd::Kpis(KpisCmd { sub }) => match sub {
            KpisSub::Sync {
                file,
                dry_run,
                prune,
            } => {
                let cat = match file {
                    Some(path) => kpi_catalog::load_catalog_path(path)?,
                    None => kpi_catalog::default_catalog()?,
                };
                let diff =
                    kpi_catalog::sync_catalog(store.conn(), cat, SyncOptions { dry_run, prune })?;
                println!("{diff}");
            }
            KpisSub::List => print_json(&store.get_all_definitions()?)?,
        },
        Cmd::Connection(ConnectionCmd { sub }) => match sub {
            ConnectionSub::Create {
                fund,
                deal,
                provider,
                name,
                spreadsheet_id,
                sheet,
                mapping,
            } => {
                let selections: Vec<MappingSelection> = match mapping {
                    Some(path) => read_json(&path)?,
                    None => Vec::new(),
                };
                let new = NewConnection {
                    fund_id: fund,
                    deal_id: deal,
                    provider,
                    name,
                    spreadsheet_id,
                    sheet_name: sheet,
                    credentials: None,
                    sync_frequency: None,
                    sync_enabled: false,
                };
                let conn = store.create_connection(&new, &selected_mappings(&selections))?;
                print_json(&conn)?;
            }
            ConnectionSub::List { fund } => print_json(&store.list_connections(fund.as_deref())?)?,
            ConnectionSub::Show { id } => match store.get_connection(id)? {
                Some(conn) => print_json(&conn)?,
                None => bail!("connection {id} not found"),
            },
            ConnectionSub::Delete { id } => {
                if !store.delete_connection(id)? {
                    bail!("connection {id} not found");
                }
                info!(connection_id = id, "connection deleted");
            }
            ConnectionSub::SetMapping { id, file } => {
                let mapping: Vec<ColumnMapping> = read_json(&file)?;
                let conn = store.update_connection(id, &ConnectionPatch::mapping(mapping))?;
                print_json(&conn)?;
            }
        },
        Cmd::Import {
            connection,
            deal,
            file,
            sheet,
            user: who,
        } => {
            let rows = FileSource::new(file).with_sheet(sheet).read(None)?;
            let who = user(who);
            let result = import::import_excel(&mut store, &deal, connection, rows, who.as_deref());
            report(&result)?;
        }
        Cmd::Sync {
            connection,
            deal,
            file,
            user: who,
        } => {
            let who = user(who);
            let mut source = FileSource::new(file);
            let result = import::sync_google_sheets(
                &mut store,
                connection,
                &deal,
                who.as_deref(),
                &mut source,
            );
            report(&result)?;
        }
        Cmd::Preview {
            connection,
            file,
            sheet,
            limit,
        } => {
            let mut rows = FileSource::new(file).with_sheet(sheet).read(None)?;
            rows.truncate(limit);
            print_json(&import::preview_mapped_data(&mut store, connection, &rows)?)?;
        }
        Cmd::Suggest { file, sheet, limit } => {
            let rows = FileSource::new(file).with_sheet(sheet).read(None)?;
            let columns = collect_columns(&rows);
            let mut samples = indexmap::IndexMap::new();
            for c in &columns {
                let values: Vec<CellValue> =
                    rows.iter().take(limit).filter_map(|r| r.get(c).cloned()).collect();
                samples.insert(c.clone(), values);
            }
            let definitions = store.get_all_definitions()?;
            if definitions.is_empty() {
                warn!("no KPI definitions loaded; run `kpi-ingest kpis sync` first");
            }
            print_json(&suggest_mappings(&columns, &definitions, Some(&samples)))?;
        }
        Cmd::Sample {
            seed,
            import: do_import,
            deal,
            fund,
            user: who,
        } => {
            let data = sample::get_sample_data_with_seed(seed);
            if !do_import {
                return print_json(&data);
            }
            let (Some(deal), Some(fund)) = (deal, fund) else {
                bail!("--import needs --deal and --fund");
            };

            // sample columns map onto the bundled catalog
            let diff = kpi_catalog::sync_catalog(
                store.conn(),
                kpi_catalog::default_catalog()?,
                SyncOptions::default(),
            )?;
            if !diff.is_noop() {
                info!(added = diff.added.len(), "seeded bundled KPI catalog");
            }

            let input = CreateConnectionImport {
                connection: NewConnection {
                    fund_id: fund,
                    deal_id: Some(deal.clone()),
                    provider: SourceProvider::Excel,
                    name: data.name.clone(),
                    spreadsheet_id: None,
                    sheet_name: None,
                    credentials: None,
                    sync_frequency: None,
                    sync_enabled: false,
                },
                deal_id: deal,
                mappings: data
                    .mapping
                    .iter()
                    .cloned()
                    .map(MappingSelection::included)
                    .collect(),
                rows: data.rows,
                user_id: user(who),
            };
            report(&import::create_connection_and_import(&mut store, &input))?;
        }
    }

    Ok(())
}
