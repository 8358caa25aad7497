//! Error types for Lorebook.
//!
//! Library crates use [`LorebookError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Lorebook operations.
#[derive(Debug, thiserror::Error)]
pub enum LorebookError {
    /// Bad or unreadable `lorebook.toml`, or an invalid override.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while fetching a page or an image.
    #[error("network error: {0}")]
    Network(String),

    /// Malformed document or JSON payload.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// libSQL failure in the dedup store.
    #[error("storage error: {0}")]
    Storage(String),

    /// Image decoding, resizing or encoding error.
    #[error("image error: {0}")]
    Image(String),

    /// The shrink loop hit its floor before the image fit the byte budget.
    #[error("image {identity} still {size} bytes after {passes} passes (budget {budget})")]
    ImageBudget {
        identity: String,
        size: u64,
        budget: u64,
        passes: u32,
    },

    /// Filesystem failure on a database, asset or export path.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input the pipeline refuses to work with.
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Result alias for every Lorebook library crate.
pub type Result<T> = std::result::Result<T, LorebookError>;

impl LorebookError {
    /// [`LorebookError::Config`] with `msg`.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// [`LorebookError::Parse`] with `msg`.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// [`LorebookError::Validation`] with `msg`.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Attach the offending path to an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
