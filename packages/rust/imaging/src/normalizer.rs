//! Image acquisition: download once, then shrink on a bounded blocking pool.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, instrument, warn};
use url::Url;

use lorebook_shared::{LorebookError, NormalizerConfig, Result};

use crate::shrink::{ShrinkPolicy, ShrinkReport, shrink_file};

/// Directory under the asset root holding normalized images.
pub const IMAGE_DIR: &str = "imgs";

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\W+").expect("valid regex"));

/// Keep only word characters of an identity.
pub fn sanitize_identity(identity: &str) -> String {
    NON_WORD.replace_all(identity, "").into_owned()
}

/// `<asset_root>/imgs/<sanitized identity>.jpg`.
pub fn asset_path(asset_root: &Path, identity: &str) -> PathBuf {
    asset_root
        .join(IMAGE_DIR)
        .join(format!("{}.jpg", sanitize_identity(identity)))
}

/// What [`ImageNormalizer::normalize`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeOutcome {
    /// The asset already existed; nothing was fetched.
    Cached,
    /// The asset was downloaded and fits the budget.
    Stored { size: u64, passes: u32 },
}

/// Downloads hero images and fits them under the byte budget.
pub struct ImageNormalizer {
    client: Client,
    asset_root: PathBuf,
    policy: ShrinkPolicy,
    resize_permits: Arc<Semaphore>,
    /// One lock per identity; the same champion is harvested in every language.
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ImageNormalizer {
    pub fn new(config: &NormalizerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| LorebookError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            asset_root: config.asset_root.clone(),
            policy: ShrinkPolicy::from(config),
            resize_permits: Arc::new(Semaphore::new(config.resize_workers.max(1) as usize)),
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    /// Path the asset for `identity` is stored at.
    pub fn asset_path(&self, identity: &str) -> PathBuf {
        asset_path(&self.asset_root, identity)
    }

    /// Ensure a budget-conforming asset exists for `identity`.
    ///
    /// The download is shrunk at `<asset>.part` and renamed into place only
    /// once it fits; on any failure nothing is left at the asset path.
    #[instrument(skip(self, source), fields(url = %source))]
    pub async fn normalize(&self, identity: &str, source: &Url) -> Result<NormalizeOutcome> {
        let key = sanitize_identity(identity);
        if key.is_empty() {
            return Err(LorebookError::validation(format!(
                "image identity '{identity}' has no word characters"
            )));
        }

        let lock = self.in_flight.lock().await.entry(key.clone()).or_default().clone();
        let result = {
            let _guard = lock.lock().await;
            self.acquire(identity, source).await
        };

        // Map entry plus our clone: nobody else is waiting on this identity
        let mut in_flight = self.in_flight.lock().await;
        if Arc::strong_count(&lock) == 2 {
            in_flight.remove(&key);
        }
        result
    }

    async fn acquire(&self, identity: &str, source: &Url) -> Result<NormalizeOutcome> {
        let path = self.asset_path(identity);
        if tokio::fs::try_exists(&path)
            .await
            .map_err(|e| LorebookError::io(&path, e))?
        {
            debug!(path = %path.display(), "image already present");
            return Ok(NormalizeOutcome::Cached);
        }

        let bytes = self.download(source).await?;
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| LorebookError::io(dir, e))?;
        }

        let part = path.with_extension("jpg.part");
        tokio::fs::write(&part, &bytes)
            .await
            .map_err(|e| LorebookError::io(&part, e))?;

        let report = match self.shrink(identity, &part).await {
            Ok(report) => report,
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&part).await {
                    warn!(path = %part.display(), error = %cleanup, "failed to remove partial image");
                }
                return Err(e);
            }
        };
        tokio::fs::rename(&part, &path)
            .await
            .map_err(|e| LorebookError::io(&path, e))?;

        info!(
            size = report.size,
            passes = report.passes,
            downloaded = bytes.len(),
            "image stored"
        );
        Ok(NormalizeOutcome::Stored {
            size: report.size,
            passes: report.passes,
        })
    }

    async fn shrink(&self, identity: &str, part: &Path) -> Result<ShrinkReport> {
        let _permit = self
            .resize_permits
            .acquire()
            .await
            .map_err(|e| LorebookError::Image(format!("resize pool closed: {e}")))?;

        let policy = self.policy;
        let identity = identity.to_string();
        let part = part.to_path_buf();
        tokio::task::spawn_blocking(move || shrink_file(&part, &identity, &policy))
            .await
            .map_err(|e| LorebookError::Image(format!("resize task failed: {e}")))?
    }

    async fn download(&self, source: &Url) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(source.as_str())
            .send()
            .await
            .map_err(|e| LorebookError::Network(format!("{source}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LorebookError::Network(format!("{source}: HTTP {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| LorebookError::Network(format!("{source}: body read failed: {e}")))?;
        Ok(bytes.to_vec())
    }
}
