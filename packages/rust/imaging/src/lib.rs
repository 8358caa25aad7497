//! Hero image normalization.
//!
//! Each champion has one image asset at `<asset_root>/imgs/<identity>.jpg`.
//! [`ImageNormalizer`] downloads it once and fits it under the configured
//! byte budget with the shrink loop in [`shrink`].

pub mod normalizer;
pub mod shrink;

pub use normalizer::{IMAGE_DIR, ImageNormalizer, NormalizeOutcome, asset_path, sanitize_identity};
pub use shrink::{ShrinkPolicy, ShrinkReport, shrink_file};
