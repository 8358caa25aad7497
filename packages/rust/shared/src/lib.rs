//! Shared types, error model, and configuration for Lorebook.
//!
//! This crate is the foundation depended on by all other Lorebook crates.
//! It provides:
//! - [`LorebookError`], the unified error type
//! - Domain types ([`ChampionRecord`], [`PartialRecord`], [`FrontierEntry`], [`Stage`])
//! - Configuration ([`AppConfig`], [`HarvestConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ExhaustedPolicy, HarvestConfig, HarvestSection, ImagesConfig, MIN_SEED_INTERVAL,
    NormalizerConfig, SourceConfig, StorageConfig, config_dir, config_file_path, init_config,
    load_config, load_config_from, validate_config,
};
pub use error::{LorebookError, Result};
pub use types::{ChampionRecord, DetailFields, FrontierEntry, PartialRecord, RunId, Stage};
