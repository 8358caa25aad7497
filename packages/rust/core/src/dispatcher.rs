//! Per-language seeding with pacing and run-level cancellation.
//!
//! The dispatcher walks the configured languages in order. For each one it
//! fetches the list page, applies the new-content threshold, and schedules a
//! continuation for every champion not already stored. A list page with no
//! new content cancels the run under [`ExhaustedPolicy::StopRun`].

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use lorebook_crawler::stages::list;
use lorebook_crawler::{ListDecision, ListPage};
use lorebook_shared::{ExhaustedPolicy, HarvestConfig};

use crate::pipeline::Harvester;

/// What the dispatcher did across all languages.
#[derive(Debug, Default)]
pub(crate) struct DispatchSummary {
    pub seeded: Vec<String>,
    pub abandoned: Vec<String>,
    pub exhausted: Vec<String>,
    pub not_started: Vec<String>,
    pub discovered: usize,
    pub skipped_existing: usize,
    pub scheduled: usize,
    /// Store lookups that failed; those champions are dropped.
    pub failed: usize,
    pub pages_fetched: usize,
}

/// Seeds one language after another.
pub(crate) struct Dispatcher<'a> {
    config: &'a HarvestConfig,
    harvester: Arc<Harvester>,
    pacing: Duration,
}

impl<'a> Dispatcher<'a> {
    pub(crate) fn new(config: &'a HarvestConfig, harvester: Arc<Harvester>) -> Self {
        Self {
            config,
            harvester,
            pacing: config.seed_interval(),
        }
    }

    /// Seed every language until done or `cancel` fires.
    ///
    /// Continuations are spawned into `tasks`; the caller drains them.
    pub(crate) async fn run(
        &self,
        tasks: &mut JoinSet<()>,
        cancel: CancellationToken,
    ) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        let languages = &self.config.languages;

        info!(
            languages = languages.len(),
            pacing_ms = self.pacing.as_millis() as u64,
            threshold = self.config.previous_count,
            "dispatcher started"
        );

        for (index, lang) in languages.iter().enumerate() {
            if index > 0 {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.pacing) => {}
                }
            }
            if cancel.is_cancelled() {
                summary.not_started = languages[index..].to_vec();
                info!(remaining = ?summary.not_started, "run cancelled, remaining languages abandoned");
                break;
            }

            self.seed_language(lang, tasks, &cancel, &mut summary).await;
        }

        summary
    }

    async fn seed_language(
        &self,
        lang: &str,
        tasks: &mut JoinSet<()>,
        cancel: &CancellationToken,
        summary: &mut DispatchSummary,
    ) {
        let progress = &self.harvester.progress;
        progress.language_started(lang);

        let seed = match self.config.seed_url(lang) {
            Ok(url) => url,
            Err(e) => {
                error!(lang, error = %e, "cannot build seed URL, skipping language");
                summary.abandoned.push(lang.to_string());
                return;
            }
        };

        let body = match self.harvester.deps.fetcher.fetch(&seed).await {
            Ok(body) => body,
            Err(e) => {
                error!(lang, url = %seed, error = %e, "list page fetch failed, skipping language");
                summary.abandoned.push(lang.to_string());
                return;
            }
        };
        summary.pages_fetched += 1;

        let page: ListPage = list::parse(&body, &seed);
        let threshold = self.config.previous_count;

        match ListDecision::evaluate(page.block_count, threshold) {
            ListDecision::Abandon => {
                error!(lang, url = %seed, "list page has no champions, skipping language");
                summary.abandoned.push(lang.to_string());
            }
            ListDecision::Exhausted => {
                summary.exhausted.push(lang.to_string());
                match self.config.exhausted_policy {
                    ExhaustedPolicy::StopRun => {
                        warn!(lang, blocks = page.block_count, threshold, "no new champions, stopping run");
                        cancel.cancel();
                    }
                    ExhaustedPolicy::SkipLanguage => {
                        info!(lang, blocks = page.block_count, threshold, "no new champions, skipping language");
                    }
                }
            }
            ListDecision::Proceed => {
                summary.seeded.push(lang.to_string());
                summary.discovered += page.champions.len();
                let scheduled = self.schedule(lang, page, tasks, summary).await;
                info!(lang, scheduled, "language seeded");
                progress.language_scheduled(lang, scheduled);
            }
        }
    }

    /// Spawn continuations for the champions not yet stored for `lang`.
    async fn schedule(
        &self,
        lang: &str,
        page: ListPage,
        tasks: &mut JoinSet<()>,
        summary: &mut DispatchSummary,
    ) -> usize {
        let storage = &self.harvester.deps.storage;
        let mut scheduled = 0;

        for listed in page.champions {
            match storage.champion_exists(&listed.code, lang).await {
                Ok(true) => {
                    debug!(champion = %listed.code, lang, "already stored");
                    summary.skipped_existing += 1;
                }
                Ok(false) => {
                    self.harvester.spawn_champion(tasks, lang, listed);
                    scheduled += 1;
                }
                Err(e) => {
                    error!(champion = %listed.code, lang, error = %e, "store lookup failed, champion dropped");
                    summary.failed += 1;
                }
            }
        }

        summary.scheduled += scheduled;
        scheduled
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use lorebook_shared::ExhaustedPolicy;

    use crate::pipeline::{HarvestReport, SilentProgress, harvest};
    use crate::test_site::{FakeSite, Harness};

    async fn run_with(harness: &Harness, cancel: CancellationToken) -> HarvestReport {
        harvest(&harness.config, harness.deps(), Arc::new(SilentProgress), cancel)
            .await
            .unwrap()
    }

    async fn run(harness: &Harness) -> HarvestReport {
        run_with(harness, CancellationToken::new()).await
    }

    #[tokio::test]
    async fn empty_list_page_skips_only_that_language() {
        let site = FakeSite::new().with_blocks("fr_FR", 12);
        let harness = Harness::start(site, &["en_US", "fr_FR"], 10).await;

        let report = run(&harness).await;
        assert_eq!(report.abandoned, vec!["en_US"]);
        assert_eq!(report.seeded, vec!["fr_FR"]);
        assert_eq!(report.inserted, 12);
        assert_eq!(harness.detail_fetches().await, 12);
    }

    #[tokio::test]
    async fn no_new_content_stops_the_run() {
        let site = FakeSite::new()
            .with_blocks("en_US", 10)
            .with_blocks("fr_FR", 12);
        let harness = Harness::start(site, &["en_US", "fr_FR"], 10).await;

        let report = run(&harness).await;
        assert_eq!(report.exhausted, vec!["en_US"]);
        assert_eq!(report.not_started, vec!["fr_FR"]);
        assert!(report.stopped_early());
        assert_eq!(harness.list_fetches("fr_FR").await, 0);
        assert_eq!(harness.detail_fetches().await, 0);
    }

    #[tokio::test]
    async fn skip_language_policy_keeps_dispatching() {
        let site = FakeSite::new()
            .with_blocks("en_US", 10)
            .with_blocks("fr_FR", 12);
        let mut harness = Harness::start(site, &["en_US", "fr_FR"], 10).await;
        harness.config.exhausted_policy = ExhaustedPolicy::SkipLanguage;

        let report = run(&harness).await;
        assert_eq!(report.exhausted, vec!["en_US"]);
        assert_eq!(report.seeded, vec!["fr_FR"]);
        assert!(!report.stopped_early());
        assert_eq!(harness.detail_fetches().await, 12);
    }

    #[tokio::test]
    async fn unreachable_seed_is_abandoned() {
        let mut harness = Harness::start(FakeSite::new(), &["en_US"], 0).await;
        // Non-HTTP hosts are never fetched
        harness
            .config
            .host_overrides
            .insert("en_US".into(), "ftp://nowhere.invalid".into());

        let report = run(&harness).await;
        assert_eq!(report.abandoned, vec!["en_US"]);
        assert_eq!(report.scheduled, 0);
    }

    #[tokio::test]
    async fn cancelled_token_seeds_nothing() {
        let site = FakeSite::new().with_blocks("en_US", 3);
        let harness = Harness::start(site, &["en_US", "fr_FR"], 0).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = run_with(&harness, cancel).await;
        assert_eq!(report.not_started, vec!["en_US", "fr_FR"]);
        assert_eq!(harness.list_fetches("en_US").await, 0);
    }

    #[tokio::test]
    async fn pacing_spaces_language_seeds() {
        let site = FakeSite::new()
            .with_blocks("en_US", 1)
            .with_blocks("fr_FR", 1);
        let mut harness = Harness::start(site, &["en_US", "fr_FR"], 0).await;
        // Below the floor; clamped to one second
        harness.config.seed_interval_ms = 10;

        let started = std::time::Instant::now();
        let report = run(&harness).await;
        assert_eq!(report.inserted, 2);
        assert!(started.elapsed() >= lorebook_shared::MIN_SEED_INTERVAL);
    }
}
