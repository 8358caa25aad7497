//! Application configuration for Lorebook.
//!
//! User config lives at `~/.lorebook/lorebook.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{LorebookError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "lorebook.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".lorebook";

/// Seed requests for consecutive languages are never issued closer than this.
pub const MIN_SEED_INTERVAL: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Config structs (matching lorebook.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where the lore pages live and which languages to harvest.
    #[serde(default)]
    pub source: SourceConfig,

    /// Crawl behaviour.
    #[serde(default)]
    pub harvest: HarvestSection,

    /// Database and asset locations.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Image normalization settings.
    #[serde(default)]
    pub images: ImagesConfig,
}

/// `[source]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Host serving the lore pages for most languages.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-language host overrides (`zh_CN` is served from its own host).
    #[serde(default = "default_host_overrides")]
    pub host_overrides: BTreeMap<String, String>,

    /// Language codes to harvest, in dispatch order.
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            host_overrides: default_host_overrides(),
            languages: default_languages(),
        }
    }
}

fn default_base_url() -> String {
    "https://universe.leagueoflegends.com".into()
}
fn default_host_overrides() -> BTreeMap<String, String> {
    BTreeMap::from([("zh_CN".to_string(), "https://yz.lol.qq.com".to_string())])
}
fn default_languages() -> Vec<String> {
    [
        "en_US", "fr_FR", "de_DE", "es_ES", "it_IT", "pl_PL", "pt_BR", "ru_RU", "ja_JP",
        "ko_KR", "zh_CN",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// What to do when a list page shows no new content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExhaustedPolicy {
    /// Cancel the whole run; languages not yet seeded are abandoned.
    #[default]
    StopRun,
    /// Skip only the exhausted language and keep dispatching.
    SkipLanguage,
}

/// `[harvest]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestSection {
    /// Champion count seen by the previous run (list-page threshold).
    #[serde(default)]
    pub previous_count: usize,

    /// Behaviour when a list page has no new content.
    #[serde(default)]
    pub exhausted_policy: ExhaustedPolicy,

    /// Pause between seed requests of consecutive languages.
    #[serde(default = "default_seed_interval")]
    pub seed_interval_ms: u64,

    /// Settle delay after each page load, before extraction.
    #[serde(default = "default_settle")]
    pub settle_ms: u64,

    /// Maximum concurrent champion continuations.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Extra attempts for a failed fetch.
    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: u32,

    /// Base backoff between fetch attempts (doubled each retry).
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Optional Browserless-style `/content` endpoint used to render pages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_endpoint: Option<String>,
}

impl Default for HarvestSection {
    fn default() -> Self {
        Self {
            previous_count: 0,
            exhausted_policy: ExhaustedPolicy::default(),
            seed_interval_ms: default_seed_interval(),
            settle_ms: default_settle(),
            concurrency: default_concurrency(),
            fetch_retries: default_fetch_retries(),
            retry_backoff_ms: default_retry_backoff(),
            render_endpoint: None,
        }
    }
}

fn default_seed_interval() -> u64 {
    1000
}
fn default_settle() -> u64 {
    1000
}
fn default_concurrency() -> u32 {
    4
}
fn default_fetch_retries() -> u32 {
    2
}
fn default_retry_backoff() -> u64 {
    500
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database holding harvested champions.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Directory under which `imgs/` is created.
    #[serde(default = "default_asset_root")]
    pub asset_root: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            asset_root: default_asset_root(),
        }
    }
}

fn default_database_path() -> String {
    "lore.db".into()
}
fn default_asset_root() -> String {
    ".".into()
}

/// `[images]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagesConfig {
    /// Byte budget a stored image must fit.
    #[serde(default = "default_budget")]
    pub budget_bytes: u64,

    /// JPEG quality used when re-encoding.
    #[serde(default = "default_quality")]
    pub quality: u8,

    /// Per-pass scale factor applied to both dimensions.
    #[serde(default = "default_scale")]
    pub scale: f64,

    /// Smallest width or height the shrink loop may produce.
    #[serde(default = "default_min_dimension")]
    pub min_dimension: u32,

    /// Hard cap on shrink passes.
    #[serde(default = "default_max_passes")]
    pub max_passes: u32,

    /// Concurrent blocking resize jobs.
    #[serde(default = "default_resize_workers")]
    pub resize_workers: u32,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            budget_bytes: default_budget(),
            quality: default_quality(),
            scale: default_scale(),
            min_dimension: default_min_dimension(),
            max_passes: default_max_passes(),
            resize_workers: default_resize_workers(),
        }
    }
}

fn default_budget() -> u64 {
    50 * 1024
}
fn default_quality() -> u8 {
    95
}
fn default_scale() -> f64 {
    0.9
}
fn default_min_dimension() -> u32 {
    16
}
fn default_max_passes() -> u32 {
    40
}
fn default_resize_workers() -> u32 {
    2
}

// ---------------------------------------------------------------------------
// Harvest config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime harvest configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Default host for seed pages.
    pub base_url: String,
    /// Per-language host overrides.
    pub host_overrides: BTreeMap<String, String>,
    /// Languages in dispatch order.
    pub languages: Vec<String>,
    /// List-page threshold from the previous run.
    pub previous_count: usize,
    /// Behaviour on an exhausted list page.
    pub exhausted_policy: ExhaustedPolicy,
    /// Requested pause between language seeds (clamped, see [`Self::seed_interval`]).
    pub seed_interval_ms: u64,
    /// Settle delay after each page load.
    pub settle_ms: u64,
    /// Maximum concurrent champion continuations.
    pub concurrency: u32,
    /// Extra attempts for a failed fetch.
    pub fetch_retries: u32,
    /// Base retry backoff.
    pub retry_backoff_ms: u64,
    /// Optional rendering endpoint.
    pub render_endpoint: Option<String>,
}

impl HarvestConfig {
    /// Pause between seeds, never below [`MIN_SEED_INTERVAL`].
    pub fn seed_interval(&self) -> Duration {
        Duration::from_millis(self.seed_interval_ms).max(MIN_SEED_INTERVAL)
    }

    /// Settle delay applied after each page load.
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Seed (list page) URL for a language: `<host>/<lang>/champions/`.
    pub fn seed_url(&self, lang: &str) -> Result<Url> {
        let host = self
            .host_overrides
            .get(lang)
            .unwrap_or(&self.base_url)
            .trim_end_matches('/');
        let raw = format!("{host}/{lang}/champions/");
        Url::parse(&raw)
            .map_err(|e| LorebookError::config(format!("invalid seed URL '{raw}': {e}")))
    }
}

impl From<&AppConfig> for HarvestConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            base_url: config.source.base_url.clone(),
            host_overrides: config.source.host_overrides.clone(),
            languages: config.source.languages.clone(),
            previous_count: config.harvest.previous_count,
            exhausted_policy: config.harvest.exhausted_policy,
            seed_interval_ms: config.harvest.seed_interval_ms,
            settle_ms: config.harvest.settle_ms,
            concurrency: config.harvest.concurrency,
            fetch_retries: config.harvest.fetch_retries,
            retry_backoff_ms: config.harvest.retry_backoff_ms,
            render_endpoint: config.harvest.render_endpoint.clone(),
        }
    }
}

/// Runtime image normalizer configuration.
#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    /// Directory under which `imgs/` lives.
    pub asset_root: PathBuf,
    /// Byte budget.
    pub budget_bytes: u64,
    /// JPEG quality.
    pub quality: u8,
    /// Per-pass scale factor.
    pub scale: f64,
    /// Smallest allowed dimension.
    pub min_dimension: u32,
    /// Hard cap on passes.
    pub max_passes: u32,
    /// Concurrent blocking resize jobs.
    pub resize_workers: u32,
}

impl From<&AppConfig> for NormalizerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            asset_root: PathBuf::from(&config.storage.asset_root),
            budget_bytes: config.images.budget_bytes,
            quality: config.images.quality,
            scale: config.images.scale,
            min_dimension: config.images.min_dimension,
            max_passes: config.images.max_passes,
            resize_workers: config.images.resize_workers,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.lorebook/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LorebookError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.lorebook/lorebook.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LorebookError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        LorebookError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Reject values the pipeline cannot run with.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.source.languages.is_empty() {
        return Err(LorebookError::config("[source] languages must not be empty"));
    }
    if config.harvest.concurrency == 0 {
        return Err(LorebookError::config("[harvest] concurrency must be at least 1"));
    }
    if !(config.images.scale > 0.0 && config.images.scale < 1.0) {
        return Err(LorebookError::config(format!(
            "[images] scale must be in (0, 1), got {}",
            config.images.scale
        )));
    }
    if config.images.resize_workers == 0 {
        return Err(LorebookError::config("[images] resize_workers must be at least 1"));
    }
    Ok(())
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LorebookError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LorebookError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LorebookError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
