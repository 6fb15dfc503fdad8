//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use flashnotes_catalog::{TitleFilter, YouTubeCatalog};
use flashnotes_core::{ItemOutcome, Pipeline, ProgressReporter, RunReport};
use flashnotes_shared::{
    AppConfig, CatalogItem, SinkBackend, init_config, load_config, load_config_from, require_env,
};
use flashnotes_storage::{CouchStore, DocumentStore, Ledger, LocalStore, Sink};
use flashnotes_summarizer::AnthropicSummarizer;
use flashnotes_transcript::TimedTextClient;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Flashnotes: turn new channel uploads into stored notes.
#[derive(Parser)]
#[command(
    name = "flashnotes",
    version,
    about = "Summarize new channel uploads and store them as notes.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.flashnotes/flashnotes.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Defaults to `run`.
    #[command(subcommand)]
    pub command: Option<Command>,
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
    /// Process new uploads once and exit.
    Run(RunArgs),

    /// Inspect the processed-set ledger.
    Ledger {
        #[command(subcommand)]
        action: LedgerAction,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Overrides for a single run.
#[derive(clap::Args, Default)]
pub(crate) struct RunArgs {
    /// Channel to poll.
    #[arg(long)]
    pub channel: Option<String>,

    /// How many recent uploads to list (capped at 50).
    #[arg(long)]
    pub max_results: Option<u32>,

    /// Title marker that selects uploads.
    #[arg(long)]
    pub marker: Option<String>,

    /// Ledger file.
    #[arg(long)]
    pub ledger: Option<PathBuf>,

    /// Destination store backend.
    #[arg(long, value_enum)]
    pub backend: Option<BackendArg>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum BackendArg {
    Couchdb,
    Libsql,
}

impl From<BackendArg> for SinkBackend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Couchdb => SinkBackend::Couchdb,
            BackendArg::Libsql => SinkBackend::Libsql,
        }
    }
}

/// Ledger subcommands.
#[derive(Subcommand)]
pub(crate) enum LedgerAction {
    /// Print every processed item id.
    List {
        /// Ledger file.
        #[arg(long)]
        ledger: Option<PathBuf>,
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
        0 => "flashnotes=info",
        1 => "flashnotes=debug",
        _ => "flashnotes=trace",
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
    match cli.command.unwrap_or_else(|| Command::Run(RunArgs::default())) {
        Command::Run(args) => cmd_run(config_path, args).await,
        Command::Ledger { action } => match action {
            LedgerAction::List { ledger } => cmd_ledger_list(config_path, ledger).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

fn resolve_config(path: Option<PathBuf>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(&path)?,
        None => load_config()?,
    };
    Ok(config)
}

impl RunArgs {
    fn apply(self, config: &mut AppConfig) {
        if let Some(channel) = self.channel {
            config.source.channel_id = channel;
        }
        if let Some(max_results) = self.max_results {
            config.source.max_results = max_results;
        }
        if let Some(marker) = self.marker {
            config.filter.marker = marker;
        }
        if let Some(ledger) = self.ledger {
            config.ledger.path = ledger;
        }
        if let Some(backend) = self.backend {
            config.sink.backend = backend.into();
        }
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(config_path: Option<PathBuf>, args: RunArgs) -> Result<()> {
    let mut config = resolve_config(config_path)?;
    args.apply(&mut config);
    config.validate()?;

    let mut pipeline = build_pipeline(&config).await?;

    info!(
        channel = %config.source.channel_id,
        marker = %config.filter.marker,
        backend = ?config.sink.backend,
        "starting run"
    );

    let reporter = CliProgress::new();
    let report = pipeline.run(&reporter).await?;

    println!();
    println!("  Run complete.");
    println!("  Run:       {}", report.run_id);
    println!("  Listed:    {}", report.items.len());
    println!("  Processed: {}", report.processed());
    println!("  Skipped:   {}", report.skipped());
    println!("  Failed:    {}", report.failed());
    println!("  Time:      {:.1}s", report.elapsed.as_secs_f64());
    println!();

    Ok(())
}

/// Wire every collaborator from config. Missing credentials fail here,
/// before anything is fetched.
async fn build_pipeline(config: &AppConfig) -> Result<Pipeline> {
    let youtube_key = require_env(&config.source.api_key_env)?;
    let anthropic_key = require_env(&config.summarizer.api_key_env)?;

    let catalog = YouTubeCatalog::new(&config.source, youtube_key, &config.http)?;
    let transcripts = TimedTextClient::new(&config.transcript, &config.http)?;
    let summarizer = AnthropicSummarizer::new(&config.summarizer, anthropic_key, &config.http)?;

    let store: Arc<dyn DocumentStore> = match config.sink.backend {
        SinkBackend::Couchdb => {
            let password = match &config.sink.username {
                Some(_) => Some(require_env(&config.sink.password_env)?),
                None => None,
            };
            Arc::new(CouchStore::new(&config.sink, password, &config.http)?)
        }
        SinkBackend::Libsql => Arc::new(LocalStore::open(&config.sink.local_path).await?),
    };

    let ledger = Ledger::load(&config.ledger.path)
        .await
        .wrap_err("failed to load the processed-set ledger")?;

    Ok(Pipeline::new(
        Box::new(catalog),
        Box::new(transcripts),
        Box::new(summarizer),
        Sink::new(store),
        ledger,
        TitleFilter::new(config.filter.marker.clone()),
    ))
}

async fn cmd_ledger_list(config_path: Option<PathBuf>, path: Option<PathBuf>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let path = path.unwrap_or(config.ledger.path);
    let ledger = Ledger::load(&path).await?;

    for id in ledger.ids() {
        println!("{id}");
    }
    eprintln!(
        "{} processed item(s) in {}",
        ledger.len(),
        ledger.path().display()
    );
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config written to {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<PathBuf>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner, one line per finished item.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn item_started(&self, item: &CatalogItem, current: usize, total: usize) {
        self.spinner
            .set_message(format!("[{current}/{total}] {}", item.title));
    }

    fn item_finished(&self, item: &CatalogItem, outcome: &ItemOutcome) {
        let mark = match outcome {
            ItemOutcome::Processed { .. } => "✓",
            ItemOutcome::Failed { .. } => "✗",
            _ => "·",
        };
        self.spinner
            .println(format!("  {mark} {} ({}): {outcome}", item.title, item.id));
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn bare_invocation_defaults_to_run() {
        let cli = Cli::try_parse_from(["flashnotes"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn run_overrides_apply_to_config() {
        let cli = Cli::try_parse_from([
            "flashnotes",
            "-v",
            "run",
            "--max-results",
            "10",
            "--marker",
            "Daily Flash",
            "--backend",
            "libsql",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);

        let Some(Command::Run(args)) = cli.command else {
            panic!("expected run");
        };
        let mut config = AppConfig::default();
        args.apply(&mut config);
        assert_eq!(config.source.max_results, 10);
        assert_eq!(config.filter.marker, "Daily Flash");
        assert_eq!(config.sink.backend, SinkBackend::Libsql);
    }

    #[test]
    fn ledger_list_accepts_global_config() {
        let cli = Cli::try_parse_from([
            "flashnotes",
            "ledger",
            "list",
            "--config",
            "/tmp/fn.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/fn.toml")));
        assert!(matches!(
            cli.command,
            Some(Command::Ledger {
                action: LedgerAction::List { ledger: None }
            })
        ));
    }
}
