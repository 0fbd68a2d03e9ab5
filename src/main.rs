use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use vlan_tools::accounting::{RetentionPolicy, clean_accounting};
use vlan_tools::batch::{BatchOptions, run_batch};
use vlan_tools::config::{StoreSettings, load_store_settings, load_vlan_list};
use vlan_tools::io::sheet_read::DirectorySource;
use vlan_tools::io::sheet_write::SnapshotFormat;
use vlan_tools::reconcile::{SyncOptions, TracingSink};
use vlan_tools::store::StoreConnector;
use vlan_tools::{Result, ToolError};

fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    init_logging(&cli.log_file, cli.verbose)?;
    match cli.command {
        Command::Sync(args) => execute_sync(args),
        Command::CleanAccounting(args) => execute_clean_accounting(args),
    }
}

fn init_logging(log_file: &Path, verbose: bool) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .map_err(|err| ToolError::Logging(format!("{}: {err}", log_file.display())))?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(Mutex::new(file));
    let console_layer =
        verbose.then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| ToolError::Logging(err.to_string()))
}

fn execute_sync(args: SyncArgs) -> Result<()> {
    let descriptors = load_vlan_list(&args.list_vlans)?;
    let source = DirectorySource::new(&args.sheets_dir);

    let mut sync_options = SyncOptions::default();
    let connector = if args.skip_store_sync {
        None
    } else {
        match load_store_settings(&args.mysql_settings).and_then(|settings| {
            sync_options.auth_scheme = settings.auth_scheme;
            open_connector(&settings)
        }) {
            Ok(connector) => Some(connector),
            Err(err) => {
                error!(error = %err, "authentication store unavailable");
                None
            }
        }
    };

    let options = BatchOptions {
        output_dir: args.output_dir,
        generate_lease_files: args.generate_lease_files,
        sync_store: !args.skip_store_sync,
        only_vlans: args.only_these_vlans,
        snapshot_dir: args.snapshot_dir,
        snapshot_format: args.snapshot_format.into(),
        sync_options,
    };

    let outcomes = run_batch(
        &descriptors,
        &source,
        connector.as_deref(),
        &options,
        &mut TracingSink,
    );
    let failed = outcomes
        .iter()
        .filter(|outcome| outcome.dhcp.is_failed() || outcome.radius.is_failed())
        .count();
    info!(processed = outcomes.len(), failed, "batch finished");
    Ok(())
}

fn execute_clean_accounting(args: CleanAccountingArgs) -> Result<()> {
    let settings = load_store_settings(&args.mysql_settings)?;
    let connector = open_connector(&settings)?;
    let policy = RetentionPolicy {
        days_stale: args.days_stale,
        maximum_days: args.maximum_days,
    };
    clean_accounting(
        &*connector,
        policy,
        chrono::Local::now().naive_local(),
    )?;
    Ok(())
}

#[cfg(feature = "mysql")]
fn open_connector(settings: &StoreSettings) -> Result<Box<dyn StoreConnector>> {
    let connector = vlan_tools::store::mysql::MySqlConnector::new(settings)?;
    Ok(Box::new(connector))
}

#[cfg(not(feature = "mysql"))]
fn open_connector(_settings: &StoreSettings) -> Result<Box<dyn StoreConnector>> {
    Err(ToolError::Store(
        "built without MySQL support (enable the `mysql` feature)".to_string(),
    ))
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Generate ISC DHCPd host files and synchronise FreeRADIUS from VLAN inventories."
)]
struct Cli {
    /// Log file.
    #[arg(short, long, global = true, default_value = "output.log")]
    log_file: PathBuf,

    /// Also log to standard error.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate every VLAN inventory and push it to the lease files and the
    /// authentication store.
    Sync(SyncArgs),
    /// Delete stale and old sessions from the RADIUS accounting table.
    CleanAccounting(CleanAccountingArgs),
}

#[derive(clap::Args)]
struct SyncArgs {
    /// Output directory for DHCPd configuration files.
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    output_dir: PathBuf,

    /// JSON-formatted list of VLANs.
    #[arg(short = 'c', long, value_name = "JSON_LIST_VLANS", default_value = "list_vlans.json")]
    list_vlans: PathBuf,

    /// JSON-formatted authentication store settings.
    #[arg(
        short = 'd',
        long,
        value_name = "JSON_MYSQL_SETTINGS",
        default_value = "mysql_settings.json"
    )]
    mysql_settings: PathBuf,

    /// Directory holding one workbook (or JSON export) per VLAN sheet.
    #[arg(short = 's', long, value_name = "DIR", default_value = ".")]
    sheets_dir: PathBuf,

    /// Only process these VLAN ids.
    #[arg(long, value_name = "ID", num_args = 1..)]
    only_these_vlans: Vec<i64>,

    /// Write DHCPd configuration files.
    #[arg(long)]
    generate_lease_files: bool,

    /// Do not touch the authentication store.
    #[arg(long)]
    skip_store_sync: bool,

    /// Save the fetched inventory of every VLAN into this directory.
    #[arg(long, value_name = "DIR")]
    snapshot_dir: Option<PathBuf>,

    /// File format of the inventory snapshots.
    #[arg(long, value_enum, default_value_t = SnapshotFormatKind::Json)]
    snapshot_format: SnapshotFormatKind,
}

#[derive(clap::Args)]
struct CleanAccountingArgs {
    /// JSON-formatted authentication store settings.
    #[arg(
        short = 'd',
        long,
        value_name = "JSON_MYSQL_SETTINGS",
        default_value = "mysql_settings.json"
    )]
    mysql_settings: PathBuf,

    /// Number of days to keep sessions that never stopped.
    #[arg(short = 's', long, default_value_t = 30)]
    days_stale: u32,

    /// Maximum number of days to keep closed sessions.
    #[arg(short, long, default_value_t = 90)]
    maximum_days: u32,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum SnapshotFormatKind {
    Json,
    Xlsx,
}

impl From<SnapshotFormatKind> for SnapshotFormat {
    fn from(kind: SnapshotFormatKind) -> Self {
        match kind {
            SnapshotFormatKind::Json => SnapshotFormat::Json,
            SnapshotFormatKind::Xlsx => SnapshotFormat::Xlsx,
        }
    }
}
