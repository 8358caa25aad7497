//! End-to-end harvest: seed languages, run one continuation per new champion,
//! persist finished records.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use lorebook_crawler::{Fetcher, ImageRequest, ListedChampion, Next, advance};
use lorebook_imaging::{ImageNormalizer, NormalizeOutcome};
use lorebook_shared::{
    FrontierEntry, HarvestConfig, LorebookError, PartialRecord, Result, RunId, Stage,
};
use lorebook_storage::{InsertOutcome, Storage};

use crate::dispatcher::{DispatchSummary, Dispatcher};

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Progress callback for reporting harvest status.
pub trait ProgressReporter: Send + Sync {
    /// Called when a language's seed page is about to be fetched.
    fn language_started(&self, lang: &str);
    /// Called when a language produced `scheduled` new champions.
    fn language_scheduled(&self, lang: &str, scheduled: usize);
    /// Called when a champion continuation ends, stored or not.
    fn champion_finished(&self, champion: &str, lang: &str, stored: bool);
    /// Called when the harvest completes.
    fn done(&self, report: &HarvestReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn language_started(&self, _lang: &str) {}
    fn language_scheduled(&self, _lang: &str, _scheduled: usize) {}
    fn champion_finished(&self, _champion: &str, _lang: &str, _stored: bool) {}
    fn done(&self, _report: &HarvestReport) {}
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Outcome of one harvest run, also stored as the run's stats JSON.
#[derive(Debug, Clone, Serialize)]
pub struct HarvestReport {
    pub run_id: RunId,
    /// Languages whose list page was processed.
    pub seeded: Vec<String>,
    /// Languages skipped because the list page failed or was empty.
    pub abandoned: Vec<String>,
    /// Languages whose list page had no new content.
    pub exhausted: Vec<String>,
    /// Languages never seeded because the run was cancelled.
    pub not_started: Vec<String>,
    /// Champions listed across all processed list pages.
    pub discovered: usize,
    /// Listed champions already in the store.
    pub skipped_existing: usize,
    /// Continuations started.
    pub scheduled: usize,
    pub inserted: usize,
    pub already_present: usize,
    /// Continuations dropped after a fetch, extraction or store error.
    pub failed: usize,
    pub pages_fetched: usize,
    pub images_stored: usize,
    pub images_cached: usize,
    pub image_failures: usize,
    pub elapsed_ms: u64,
}

impl HarvestReport {
    /// True when the run stopped before seeding every language.
    pub fn stopped_early(&self) -> bool {
        !self.not_started.is_empty()
    }
}

/// Counters shared by every continuation of a run.
#[derive(Debug, Default)]
pub(crate) struct HarvestStats {
    inserted: AtomicUsize,
    already_present: AtomicUsize,
    failed: AtomicUsize,
    pages_fetched: AtomicUsize,
    images_stored: AtomicUsize,
    images_cached: AtomicUsize,
    image_failures: AtomicUsize,
}

impl HarvestStats {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Harvest entry point
// ---------------------------------------------------------------------------

/// Collaborators a harvest runs against.
pub struct HarvestDeps {
    pub storage: Arc<Storage>,
    pub fetcher: Arc<Fetcher>,
    pub normalizer: Arc<ImageNormalizer>,
}

/// State shared between the dispatcher and every continuation.
pub(crate) struct Harvester {
    pub(crate) deps: HarvestDeps,
    pub(crate) progress: Arc<dyn ProgressReporter>,
    pub(crate) stats: HarvestStats,
    permits: Arc<Semaphore>,
}

/// Run a full harvest over every configured language.
///
/// Cancelling `cancel` stops seeding further languages; continuations that
/// are already running are allowed to finish.
#[instrument(skip_all, fields(languages = config.languages.len(), previous_count = config.previous_count))]
pub async fn harvest(
    config: &HarvestConfig,
    deps: HarvestDeps,
    progress: Arc<dyn ProgressReporter>,
    cancel: CancellationToken,
) -> Result<HarvestReport> {
    let start = Instant::now();
    let run_id = RunId::new();

    info!(%run_id, "starting harvest");
    deps.storage
        .insert_harvest_run(&run_id, config.previous_count)
        .await?;

    let harvester = Arc::new(Harvester {
        deps,
        progress,
        stats: HarvestStats::default(),
        permits: Arc::new(Semaphore::new(config.concurrency.max(1) as usize)),
    });

    let mut tasks = JoinSet::new();
    let dispatch = Dispatcher::new(config, Arc::clone(&harvester))
        .run(&mut tasks, cancel)
        .await;

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "champion task panicked");
            HarvestStats::bump(&harvester.stats.failed);
        }
    }

    let report = build_report(run_id, dispatch, &harvester.stats, start);
    let stats_json = serde_json::to_string(&report)
        .map_err(|e| LorebookError::Storage(format!("failed to encode run stats: {e}")))?;
    harvester
        .deps
        .storage
        .finish_harvest_run(&report.run_id, &stats_json)
        .await?;

    info!(
        run_id = %report.run_id,
        inserted = report.inserted,
        failed = report.failed,
        skipped_existing = report.skipped_existing,
        elapsed_ms = report.elapsed_ms,
        "harvest complete"
    );
    harvester.progress.done(&report);
    Ok(report)
}

fn build_report(
    run_id: RunId,
    dispatch: DispatchSummary,
    stats: &HarvestStats,
    start: Instant,
) -> HarvestReport {
    HarvestReport {
        run_id,
        seeded: dispatch.seeded,
        abandoned: dispatch.abandoned,
        exhausted: dispatch.exhausted,
        not_started: dispatch.not_started,
        discovered: dispatch.discovered,
        skipped_existing: dispatch.skipped_existing,
        scheduled: dispatch.scheduled,
        inserted: HarvestStats::get(&stats.inserted),
        already_present: HarvestStats::get(&stats.already_present),
        failed: HarvestStats::get(&stats.failed) + dispatch.failed,
        pages_fetched: HarvestStats::get(&stats.pages_fetched) + dispatch.pages_fetched,
        images_stored: HarvestStats::get(&stats.images_stored),
        images_cached: HarvestStats::get(&stats.images_cached),
        image_failures: HarvestStats::get(&stats.image_failures),
        elapsed_ms: start.elapsed().as_millis() as u64,
    }
}

// ---------------------------------------------------------------------------
// Champion continuation
// ---------------------------------------------------------------------------

impl Harvester {
    /// Start the Detail -> Bio -> [Story] continuation for a new champion.
    pub(crate) fn spawn_champion(
        self: &Arc<Self>,
        tasks: &mut JoinSet<()>,
        lang: &str,
        listed: ListedChampion,
    ) {
        let harvester = Arc::clone(self);
        let permits = Arc::clone(&self.permits);
        let lang = lang.to_string();

        tasks.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            harvester.run_champion(&lang, listed).await;
        });
    }

    async fn run_champion(&self, lang: &str, listed: ListedChampion) {
        let champion = listed.code.clone();

        let stored = match self.drive(lang, listed).await {
            Ok(InsertOutcome::Inserted) => {
                HarvestStats::bump(&self.stats.inserted);
                info!(%champion, lang, "champion stored");
                true
            }
            Ok(InsertOutcome::AlreadyPresent) => {
                HarvestStats::bump(&self.stats.already_present);
                debug!(%champion, lang, "champion stored concurrently, insert skipped");
                false
            }
            Err(e) => {
                HarvestStats::bump(&self.stats.failed);
                error!(%champion, lang, error = %e, "champion dropped");
                false
            }
        };
        self.progress.champion_finished(&champion, lang, stored);
    }

    /// Fetch and advance until the record is finished, then insert it.
    async fn drive(&self, lang: &str, listed: ListedChampion) -> Result<InsertOutcome> {
        let mut entry = FrontierEntry::new(lang, listed.url, Stage::Detail);
        let mut partial = PartialRecord::new(listed.code, lang);

        loop {
            let body = self.deps.fetcher.fetch(&entry.url).await?;
            HarvestStats::bump(&self.stats.pages_fetched);

            let step = advance(&entry, partial, &body)?;
            if let Some(image) = step.image {
                self.normalize_image(&image).await;
            }

            match step.next {
                Next::Fetch {
                    entry: next_entry,
                    partial: grown,
                } => {
                    debug!(champion = %grown.champion, lang, stage = %next_entry.stage, url = %next_entry.url, "next stage");
                    entry = next_entry;
                    partial = grown;
                }
                Next::Done(record) => return self.deps.storage.insert_champion(&record).await,
            }
        }
    }

    /// Normalize a hero image; failures never stop the record.
    async fn normalize_image(&self, image: &ImageRequest) {
        match self.deps.normalizer.normalize(&image.identity, &image.url).await {
            Ok(NormalizeOutcome::Cached) => HarvestStats::bump(&self.stats.images_cached),
            Ok(NormalizeOutcome::Stored { .. }) => HarvestStats::bump(&self.stats.images_stored),
            Err(e) => {
                HarvestStats::bump(&self.stats.image_failures);
                warn!(identity = %image.identity, url = %image.url, error = %e, "image normalization failed");
            }
        }
    }
}
