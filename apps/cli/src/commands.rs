//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use rowpipe_core::{
    ApiRequest, AppState, BatchPhase, Pipeline, ProgressReporter, RowStatus, open_store, serve,
};
use rowpipe_shared::{
    AppConfig, BatchOutcome, CanonicalRecord, Locator, RecordKey, RecordPatch, init_config,
    load_config, load_config_from,
};
use rowpipe_storage::StoreGateway;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// rowpipe: ingest tabular rows and JSON payloads into one record store.
#[derive(Parser)]
#[command(
    name = "rowpipe",
    version,
    about = "Validate, enrich and persist delimited batches and single JSON records.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.rowpipe/rowpipe.toml).
    #[arg(long, global = true, env = "ROWPIPE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Process one delimited object from the object source.
    Ingest {
        /// Object locator: bucket/key or scheme://bucket/key.
        locator: String,
    },

    /// Create a single record from a JSON payload.
    Create {
        /// JSON object body.
        #[arg(long)]
        body: String,

        /// Caller identity recorded as the source detail.
        #[arg(long)]
        caller: Option<String>,
    },

    /// Serve the record endpoint over HTTP.
    Serve {
        /// Listen address (overrides [server].bind).
        #[arg(long)]
        bind: Option<String>,
    },

    /// Inspect and correct stored records.
    Records {
        #[command(subcommand)]
        action: RecordsAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Record tooling subcommands.
#[derive(Subcommand)]
pub(crate) enum RecordsAction {
    /// List records in key order.
    List {
        #[arg(long, default_value = "50")]
        limit: usize,
    },
    /// Show one record, or every version of an id.
    Get {
        #[arg(long)]
        id: String,

        /// Exact version; omit to show all versions.
        #[arg(long)]
        timestamp: Option<i64>,
    },
    /// Patch mutable fields of one record version.
    Update {
        #[arg(long)]
        id: String,

        #[arg(long)]
        timestamp: i64,

        /// field=value pairs (name, category, price, stock).
        #[arg(long = "set", required = true)]
        set: Vec<String>,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "rowpipe=info",
        1 => "rowpipe=debug",
        _ => "rowpipe=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Ingest { locator } => {
            cmd_ingest(&resolve_config(config_path.as_ref())?, &locator).await
        }
        Command::Create { body, caller } => {
            cmd_create(&resolve_config(config_path.as_ref())?, body, caller).await
        }
        Command::Serve { bind } => {
            cmd_serve(&resolve_config(config_path.as_ref())?, bind).await
        }
        Command::Records { action } => {
            let config = resolve_config(config_path.as_ref())?;
            match action {
                RecordsAction::List { limit } => cmd_records_list(&config, limit).await,
                RecordsAction::Get { id, timestamp } => {
                    cmd_records_get(&config, &id, timestamp).await
                }
                RecordsAction::Update { id, timestamp, set } => {
                    cmd_records_update(&config, RecordKey { id, timestamp }, &set).await
                }
            }
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path.as_ref()).await,
        },
    }
}

fn resolve_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_ingest(config: &AppConfig, locator: &str) -> Result<()> {
    let locator: Locator = locator.parse()?;
    let pipeline = Pipeline::from_config(config).await?;

    info!(%locator, "ingesting object");

    let reporter = CliProgress::new();
    let outcome = pipeline.batch.run(&locator, &reporter).await;
    if outcome.is_err() {
        reporter.spinner.finish_and_clear();
    }
    let outcome = outcome?;

    println!();
    println!("  Batch complete: {locator}");
    println!("  Rows:      {}", outcome.total);
    println!("  Persisted: {}", outcome.succeeded);
    println!("  Rejected:  {}", outcome.rejected);
    println!("  Failed:    {}", outcome.failed);
    println!("  Success:   {:.2}%", outcome.success_rate * 100.0);
    println!("  Digest:    {}", outcome.digest);
    println!("  Time:      {:.1}s", outcome.elapsed_ms as f64 / 1000.0);

    if !outcome.errors.is_empty() {
        println!();
        for err in &outcome.errors {
            println!(
                "  row {} (line {}): {} {}",
                err.row, err.line, err.kind, err.message
            );
        }
    }
    println!();

    Ok(())
}

async fn cmd_create(config: &AppConfig, body: String, caller: Option<String>) -> Result<()> {
    let pipeline = Pipeline::from_config(config).await?;

    let response = pipeline
        .records
        .handle(ApiRequest::post(body).with_caller(caller.unwrap_or_else(|| "cli".into())))
        .await;

    println!("{}", serde_json::to_string_pretty(&response.body)?);
    if response.status >= 400 {
        return Err(eyre!("request failed with status {}", response.status));
    }
    Ok(())
}

async fn cmd_serve(config: &AppConfig, bind: Option<String>) -> Result<()> {
    let pipeline = Pipeline::from_config(config).await?;
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());

    info!(%bind, "starting HTTP server");
    serve(
        AppState {
            records: pipeline.records,
        },
        &bind,
    )
    .await?;
    Ok(())
}

async fn cmd_records_list(config: &AppConfig, limit: usize) -> Result<()> {
    let store = open_store(&config.store, true).await?;
    let records = store.scan(limit).await?;

    if records.is_empty() {
        println!("No records.");
        return Ok(());
    }

    println!(
        "  {:<38} {:>14}  {:<24} {:<16} {:>10} {:>7}  SOURCE",
        "ID", "TIMESTAMP", "NAME", "CATEGORY", "PRICE", "STOCK"
    );
    for record in &records {
        println!(
            "  {:<38} {:>14}  {:<24} {:<16} {:>10.2} {:>7}  {}",
            record.id,
            record.timestamp,
            truncate(&record.name, 24),
            truncate(&record.category, 16),
            record.price,
            record.stock,
            record.source.kind(),
        );
    }
    println!();
    println!("  {} record(s)", records.len());
    Ok(())
}

async fn cmd_records_get(config: &AppConfig, id: &str, timestamp: Option<i64>) -> Result<()> {
    let store = open_store(&config.store, true).await?;

    let records: Vec<CanonicalRecord> = match timestamp {
        Some(timestamp) => {
            let key = RecordKey {
                id: id.to_string(),
                timestamp,
            };
            let record = store
                .get(&key)
                .await?
                .ok_or_else(|| eyre!("no record at {key}"))?;
            vec![record]
        }
        None => store.query(id).await?,
    };

    if records.is_empty() {
        return Err(eyre!("no records with id '{id}'"));
    }
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

async fn cmd_records_update(config: &AppConfig, key: RecordKey, set: &[String]) -> Result<()> {
    let pairs = set
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .ok_or_else(|| eyre!("expected field=value, got '{pair}'"))
        })
        .collect::<Result<Vec<_>>>()?;
    let patch = RecordPatch::parse(pairs)?;

    let store = open_store(&config.store, false).await?;
    let updated = store
        .update(&key, &patch)
        .await?
        .ok_or_else(|| eyre!("no record at {key}"))?;

    info!(%key, "record updated");
    println!("{}", serde_json::to_string_pretty(&updated)?);
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(path: Option<&PathBuf>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, phase: BatchPhase) {
        self.spinner.set_message(phase.as_str().to_string());
    }

    fn row_processed(&self, row: usize, status: RowStatus) {
        let status = match status {
            RowStatus::Persisted => "persisted",
            RowStatus::Rejected => "rejected",
            RowStatus::Failed => "failed",
        };
        self.spinner.set_message(format!("Processing row {row} ({status})"));
    }

    fn done(&self, _outcome: &BatchOutcome) {
        self.spinner.finish_and_clear();
    }
}
