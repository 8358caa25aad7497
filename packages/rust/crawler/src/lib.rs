//! Lore page fetching and extraction.
//!
//! This crate provides:
//! - [`fetcher`]: scope-checked page fetches with settle delay and retry
//! - [`stages`]: per-stage extractors and the champion state machine
//! - [`text`]: whitespace and quote normalization

pub mod fetcher;
pub mod stages;
pub mod text;

pub use fetcher::{Fetcher, HostScope};
pub use stages::{
    BioPage, DetailPage, ImageRequest, ListDecision, ListPage, ListedChampion, Next, Step, advance,
};
pub use text::{clean_quote, clean_text, title_case};
