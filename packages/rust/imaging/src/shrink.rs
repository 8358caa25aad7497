//! Proportional shrink loop that fits a stored image under a byte budget.
//!
//! This is CPU-bound and synchronous; callers run it on a blocking thread.

use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use tracing::debug;

use lorebook_shared::{LorebookError, NormalizerConfig, Result};

/// Budget and guards for one shrink run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShrinkPolicy {
    pub budget_bytes: u64,
    pub quality: u8,
    pub scale: f64,
    pub min_dimension: u32,
    pub max_passes: u32,
}

impl From<&NormalizerConfig> for ShrinkPolicy {
    fn from(config: &NormalizerConfig) -> Self {
        Self {
            budget_bytes: config.budget_bytes,
            quality: config.quality,
            scale: config.scale,
            min_dimension: config.min_dimension,
            max_passes: config.max_passes,
        }
    }
}

/// Final state of a shrunk file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShrinkReport {
    /// File size after the last pass.
    pub size: u64,
    /// Number of resize passes applied.
    pub passes: u32,
}

/// Shrink the image at `path` in place until it fits the budget.
///
/// Each pass scales both dimensions by `policy.scale` (floored) with a
/// Lanczos3 filter and re-encodes as JPEG. A file already under budget is left
/// untouched. Returns [`LorebookError::ImageBudget`] when the pass cap or the
/// dimension floor is hit first; `path` then holds the last pass.
pub fn shrink_file(path: &Path, identity: &str, policy: &ShrinkPolicy) -> Result<ShrinkReport> {
    let raw = std::fs::read(path).map_err(|e| LorebookError::io(path, e))?;
    let mut size = raw.len() as u64;
    if size <= policy.budget_bytes {
        return Ok(ShrinkReport { size, passes: 0 });
    }

    let decoded = image::load_from_memory(&raw)
        .map_err(|e| LorebookError::Image(format!("{identity}: decode failed: {e}")))?;
    let mut img = DynamicImage::ImageRgb8(decoded.to_rgb8());
    let mut passes = 0;

    while size > policy.budget_bytes {
        let over_budget = || LorebookError::ImageBudget {
            identity: identity.to_string(),
            size,
            budget: policy.budget_bytes,
            passes,
        };
        if passes >= policy.max_passes {
            return Err(over_budget());
        }

        let (width, height) = img.dimensions();
        let next_width = (f64::from(width) * policy.scale).floor() as u32;
        let next_height = (f64::from(height) * policy.scale).floor() as u32;
        if next_width < policy.min_dimension || next_height < policy.min_dimension {
            return Err(over_budget());
        }

        img = img.resize_exact(next_width, next_height, FilterType::Lanczos3);
        let encoded = encode_jpeg(&img, policy.quality)
            .map_err(|e| LorebookError::Image(format!("{identity}: encode failed: {e}")))?;
        std::fs::write(path, &encoded).map_err(|e| LorebookError::io(path, e))?;

        size = encoded.len() as u64;
        passes += 1;
        debug!(identity, passes, width = next_width, height = next_height, size, "shrink pass");
    }

    Ok(ShrinkReport { size, passes })
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> image::ImageResult<Vec<u8>> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).encode_image(&img.to_rgb8())?;
    Ok(buf)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;
    use std::path::PathBuf;

    use image::{ImageFormat, Rgb, RgbImage};

    /// PNG of deterministic noise; compresses badly, so it is large.
    pub(crate) fn noisy_png(width: u32, height: u32) -> Vec<u8> {
        let mut state: u32 = 0x1234_5678;
        let img = RgbImage::from_fn(width, height, |_, _| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let [a, b, c, _] = state.to_le_bytes();
            Rgb([a, b, c])
        });
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn temp_file(bytes: &[u8]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lorebook_shrink_{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("asset.jpg");
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn policy() -> ShrinkPolicy {
        ShrinkPolicy {
            budget_bytes: 50 * 1024,
            quality: 95,
            scale: 0.9,
            min_dimension: 16,
            max_passes: 40,
        }
    }

    #[test]
    fn under_budget_is_untouched() {
        let bytes = noisy_png(8, 8);
        let path = temp_file(&bytes);
        let report = shrink_file(&path, "tiny", &policy()).unwrap();
        assert_eq!(report.passes, 0);
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
    }

    #[test]
    fn shrinks_until_within_budget() {
        let path = temp_file(&noisy_png(400, 400));
        let report = shrink_file(&path, "noise", &policy()).unwrap();

        assert!(report.passes >= 1);
        assert!(report.passes <= policy().max_passes);
        assert!(report.size <= policy().budget_bytes);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), report.size);

        let stored = image::open(&path).unwrap();
        assert!(stored.width() < 400);
        assert_eq!(image::guess_format(&std::fs::read(&path).unwrap()).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn pass_cap_returns_budget_error() {
        let path = temp_file(&noisy_png(400, 400));
        let capped = ShrinkPolicy {
            max_passes: 1,
            ..policy()
        };
        match shrink_file(&path, "noise", &capped) {
            Err(LorebookError::ImageBudget { passes, budget, .. }) => {
                assert_eq!(passes, 1);
                assert_eq!(budget, 50 * 1024);
            }
            other => panic!("expected ImageBudget, got {other:?}"),
        }
    }

    #[test]
    fn dimension_floor_returns_budget_error() {
        let path = temp_file(&noisy_png(400, 400));
        let floored = ShrinkPolicy {
            min_dimension: 380,
            ..policy()
        };
        let err = shrink_file(&path, "noise", &floored).unwrap_err();
        assert!(matches!(err, LorebookError::ImageBudget { passes: 0, .. }));
    }

    #[test]
    fn undecodable_oversized_file_is_an_image_error() {
        let path = temp_file(&vec![0u8; 60 * 1024]);
        let err = shrink_file(&path, "junk", &policy()).unwrap_err();
        assert!(matches!(err, LorebookError::Image(_)));
    }
}
