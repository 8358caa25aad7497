//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use lorebook_core::{HarvestDeps, HarvestReport, ProgressReporter, harvest, write_summary};
use lorebook_crawler::Fetcher;
use lorebook_imaging::ImageNormalizer;
use lorebook_shared::{
    AppConfig, ExhaustedPolicy, HarvestConfig, NormalizerConfig, init_config, load_config,
    load_config_from, validate_config,
};
use lorebook_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Lorebook: harvest champion lore into a local database.
#[derive(Parser)]
#[command(
    name = "lorebook",
    version,
    about = "Incrementally harvest champion lore, per language, into a local database.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.lorebook/lorebook.toml).
    #[arg(long, global = true)]
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
    /// Harvest champions not yet stored for each configured language.
    Harvest(HarvestArgs),

    /// Write meta.json and the per-language lore exports.
    Summary {
        /// Database to read (defaults to [storage] database_path).
        #[arg(long)]
        db: Option<PathBuf>,

        /// Output directory.
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Flags that override the `[harvest]`, `[source]` and `[storage]` config.
#[derive(Args)]
pub(crate) struct HarvestArgs {
    /// Champion count seen by the previous run; list pages with no more blocks stop the run.
    #[arg(long, env = "PREVIOUS_CHAMP_COUNT")]
    pub previous_count: Option<usize>,

    /// What to do when a list page has no new champions.
    #[arg(long)]
    pub exhausted_policy: Option<PolicyArg>,

    /// Languages to harvest, in order (repeatable; defaults to [source] languages).
    #[arg(long = "lang")]
    pub langs: Vec<String>,

    /// Database path.
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Directory under which imgs/ is written.
    #[arg(long)]
    pub assets: Option<PathBuf>,

    /// Maximum concurrent champion continuations.
    #[arg(long)]
    pub concurrency: Option<u32>,

    /// Browserless-style render endpoint for client-side-rendered pages.
    #[arg(long)]
    pub render_endpoint: Option<String>,

    /// Print the run report as JSON.
    #[arg(long)]
    pub json: bool,
}

/// `--exhausted-policy` values.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum PolicyArg {
    StopRun,
    SkipLanguage,
}

impl From<PolicyArg> for ExhaustedPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::StopRun => ExhaustedPolicy::StopRun,
            PolicyArg::SkipLanguage => ExhaustedPolicy::SkipLanguage,
        }
    }
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
        0 => "lorebook=info",
        1 => "lorebook=debug",
        _ => "lorebook=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Harvest(args) => {
            let config = resolve_config(cli.config.as_deref())?;
            cmd_harvest(config, args).await
        }
        Command::Summary { db, out } => {
            let config = resolve_config(cli.config.as_deref())?;
            cmd_summary(&config, db.as_deref(), &out).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(cli.config.as_deref()).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_harvest(mut config: AppConfig, args: HarvestArgs) -> Result<()> {
    if let Some(count) = args.previous_count {
        config.harvest.previous_count = count;
    }
    if let Some(policy) = args.exhausted_policy {
        config.harvest.exhausted_policy = policy.into();
    }
    if !args.langs.is_empty() {
        config.source.languages = args.langs;
    }
    if let Some(db) = args.db {
        config.storage.database_path = db.to_string_lossy().into_owned();
    }
    if let Some(assets) = args.assets {
        config.storage.asset_root = assets.to_string_lossy().into_owned();
    }
    if let Some(concurrency) = args.concurrency {
        config.harvest.concurrency = concurrency;
    }
    if args.render_endpoint.is_some() {
        config.harvest.render_endpoint = args.render_endpoint;
    }
    validate_config(&config)?;

    let harvest_config = HarvestConfig::from(&config);
    let normalizer_config = NormalizerConfig::from(&config);

    info!(
        db = %config.storage.database_path,
        languages = ?harvest_config.languages,
        previous_count = harvest_config.previous_count,
        policy = ?harvest_config.exhausted_policy,
        "harvesting"
    );

    let deps = HarvestDeps {
        storage: Arc::new(Storage::open(Path::new(&config.storage.database_path)).await?),
        fetcher: Arc::new(Fetcher::new(&harvest_config)?),
        normalizer: Arc::new(ImageNormalizer::new(&normalizer_config)?),
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, finishing in-flight champions");
            on_interrupt.cancel();
        }
    });

    let reporter = Arc::new(CliProgress::new());
    let report = harvest(&harvest_config, deps, reporter, cancel).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!("  Harvest complete");
    println!("  Run:       {}", report.run_id);
    println!("  Seeded:    {}", list_or_dash(&report.seeded));
    println!("  Abandoned: {}", list_or_dash(&report.abandoned));
    println!("  Exhausted: {}", list_or_dash(&report.exhausted));
    if report.stopped_early() {
        println!("  Stopped before: {}", report.not_started.join(", "));
    }
    println!("  Stored:    {}", report.inserted);
    println!("  Skipped:   {} already stored", report.skipped_existing);
    println!("  Failed:    {}", report.failed);
    println!(
        "  Images:    {} stored, {} cached, {} failed",
        report.images_stored, report.images_cached, report.image_failures
    );
    println!("  Time:      {:.1}s", report.elapsed_ms as f64 / 1000.0);
    println!();
    Ok(())
}

fn list_or_dash(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}

async fn cmd_summary(config: &AppConfig, db: Option<&Path>, out: &Path) -> Result<()> {
    let db_path = db
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&config.storage.database_path));
    let storage = Storage::open_readonly(&db_path).await?;

    let output = write_summary(&storage, out).await?;

    println!();
    println!("  Summary written to {}", output.meta_path.display());
    for (lang, count) in &output.meta.per_lang {
        println!("  {lang:<6} {count}");
    }
    println!("  Total: {}", output.meta.tot_champ_count);
    if !output.meta.allchamps {
        println!("  Note: languages have different champion counts");
    }
    println!();
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
    scheduled: AtomicUsize,
    finished: AtomicUsize,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self {
            spinner,
            scheduled: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        }
    }
}

impl ProgressReporter for CliProgress {
    fn language_started(&self, lang: &str) {
        self.spinner.set_message(format!("Listing {lang}"));
    }

    fn language_scheduled(&self, lang: &str, scheduled: usize) {
        let total = self.scheduled.fetch_add(scheduled, Ordering::Relaxed) + scheduled;
        self.spinner
            .set_message(format!("{lang}: {scheduled} new champions ({total} queued)"));
    }

    fn champion_finished(&self, champion: &str, lang: &str, stored: bool) {
        let done = self.finished.fetch_add(1, Ordering::Relaxed) + 1;
        let total = self.scheduled.load(Ordering::Relaxed);
        let mark = if stored { "stored" } else { "skipped" };
        self.spinner
            .set_message(format!("[{done}/{total}] {lang} {champion} {mark}"));
    }

    fn done(&self, _report: &HarvestReport) {
        self.spinner.finish_and_clear();
    }
}
