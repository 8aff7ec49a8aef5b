//! The crawl entry point: discovery, fast path, fallback, reconcile.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument};

use super::discover::UrlDiscoverer;
use super::extract::DetailExtractor;
use super::fallback::RenderFallback;
use super::reconcile::Reconciler;
use crate::context::RunContext;
use crate::error::{CrawlError, CrawlResult};
use crate::ratelimit::RateLimiterRegistry;
use crate::session::SessionPool;
use crate::traits::browser::BrowserLauncher;
use crate::traits::fetcher::PageFetcher;
use crate::traits::store::JobStore;
use crate::types::config::CrawlerConfig;
use crate::types::filter::JobFilter;
use crate::types::job::{Company, ExtractedJob, JobRecord, UpsertOutcome};
use crate::types::outcome::ExtractionOutcome;
use crate::types::summary::{CompletenessWarning, CrawlSummary, ExtractionStats};

/// Next stream item, or `None` once `cancel` fires.
async fn next_unless_cancelled<St>(stream: &mut St, cancel: &CancellationToken) -> Option<St::Item>
where
    St: Stream + Unpin,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        item = stream.next() => item,
    }
}

/// Runs crawls for companies registered in a [`JobStore`].
///
/// Owns the browser session pool and the per-host rate limiters, so both are
/// shared by every run made through the same runner.
pub struct CrawlRunner<S, F, L>
where
    S: JobStore,
    F: PageFetcher,
    L: BrowserLauncher,
{
    store: S,
    fetcher: Arc<F>,
    pool: SessionPool<L>,
    limiters: RateLimiterRegistry,
    config: CrawlerConfig,
    discoverer: UrlDiscoverer,
    fallback: RenderFallback,
    reconciler: Reconciler,
}

impl<S, F, L> CrawlRunner<S, F, L>
where
    S: JobStore,
    F: PageFetcher,
    L: BrowserLauncher,
{
    pub fn new(store: S, fetcher: F, launcher: L, config: CrawlerConfig) -> Self {
        Self {
            store,
            fetcher: Arc::new(fetcher),
            pool: SessionPool::new(launcher, config.sessions.clone()),
            limiters: RateLimiterRegistry::new(config.rate_limiter.clone()),
            discoverer: UrlDiscoverer::new(config.discovery.clone()),
            fallback: RenderFallback::new(config.fallback.clone()),
            reconciler: Reconciler::new(config.reconcile.clone()),
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn pool(&self) -> &SessionPool<L> {
        &self.pool
    }

    pub fn limiters(&self) -> &RateLimiterRegistry {
        &self.limiters
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    /// Register (or look up) a company to crawl.
    pub async fn register_company(&self, name: &str, base_url: &str) -> CrawlResult<Company> {
        Ok(self.store.ensure_company(name, base_url).await?)
    }

    /// Jobs matching `filter`, most recently seen first.
    pub async fn query_jobs(&self, filter: &JobFilter) -> CrawlResult<Vec<JobRecord>> {
        Ok(self.store.query(filter).await?)
    }

    /// Crawl one company end to end.
    ///
    /// Only an unknown company, an unloadable listing or a store failure make
    /// this return `Err`; per-URL failures are reported in the summary. If
    /// `cancel` fires, work in flight is abandoned, reconciliation is skipped
    /// and the summary is marked `aborted`.
    pub async fn run_crawl(
        &self,
        company_id: i64,
        cancel: CancellationToken,
    ) -> CrawlResult<CrawlSummary> {
        let company = self
            .store
            .company(company_id)
            .await?
            .ok_or(CrawlError::UnknownCompany(company_id))?;
        let ctx = RunContext::for_company(&company);
        let span = ctx.span();

        self.run_company(&company, &ctx, &cancel)
            .instrument(span)
            .await
    }

    /// Crawl every registered company in turn.
    ///
    /// A failed company is logged and reported; it does not stop the others.
    pub async fn run_all(
        &self,
        cancel: CancellationToken,
    ) -> CrawlResult<Vec<(Company, CrawlResult<CrawlSummary>)>> {
        let companies = self.store.companies().await?;
        let mut results = Vec::with_capacity(companies.len());

        for company in companies {
            if cancel.is_cancelled() {
                warn!(remaining = %company.name, "Cancelled, not starting further runs");
                break;
            }
            let result = self.run_crawl(company.id, cancel.clone()).await;
            if let Err(e) = &result {
                error!(company = %company.name, error = %e, "Crawl run failed");
            }
            results.push((company, result));
        }
        Ok(results)
    }

    /// Close idle browser sessions.
    pub async fn shutdown(&self) {
        self.pool.close_all().await;
    }

    async fn run_company(
        &self,
        company: &Company,
        ctx: &RunContext,
        cancel: &CancellationToken,
    ) -> CrawlResult<CrawlSummary> {
        let mut summary = CrawlSummary::new(ctx.run_id, company.id);
        let seen_at = Utc::now();
        info!(base_url = %company.base_url, "Crawl run starting");

        // Phase 1: discovery
        let report = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Run cancelled during discovery");
                summary.aborted = true;
                return Ok(summary);
            }
            report = self.discoverer.discover(&self.pool, &company.base_url) => report?,
        };
        summary.discovered = report.found();
        summary.completeness_warning = report.completeness_warning();
        if let Some(e) = report.incomplete_error() {
            warn!(error = %e, "Proceeding with partial URL set");
        }

        let mut observed = HashSet::new();

        // Phase 2: fast path
        let extractor = DetailExtractor::new(
            self.fetcher.clone(),
            self.limiters.for_url(&company.base_url),
            self.config.extractor.clone(),
        );
        let urls: Vec<String> = report.urls.into_iter().map(|c| c.url).collect();
        let mut stats = ExtractionStats::default();
        let mut routed = Vec::new();
        {
            let stream = extractor.extract_stream(urls, ctx);
            tokio::pin!(stream);
            while let Some((url, outcome)) = next_unless_cancelled(&mut stream, cancel).await {
                stats.record(&outcome);
                match outcome {
                    ExtractionOutcome::Success(job) => {
                        self.record(company.id, &job, seen_at, &mut summary, &mut observed)
                            .await?;
                    }
                    ExtractionOutcome::NeedsFallback(reason) => routed.push((url, reason)),
                    ExtractionOutcome::Failed(reason) => {
                        if self.config.extractor.fallback_on_network_failure {
                            routed.push((url, reason));
                        } else {
                            summary.failed_urls.push(url);
                        }
                    }
                }
            }
        }
        extractor.report_loss(&stats);

        // Phase 2b: render fallback
        if !routed.is_empty() && !cancel.is_cancelled() {
            info!(count = routed.len(), "Routing URLs to render fallback");
            let stream = self.fallback.render_stream(&self.pool, routed, ctx);
            tokio::pin!(stream);
            while let Some((url, outcome)) = next_unless_cancelled(&mut stream, cancel).await {
                match outcome {
                    ExtractionOutcome::Success(job) => {
                        self.record(company.id, &job, seen_at, &mut summary, &mut observed)
                            .await?;
                        summary.fallback_recovered += 1;
                    }
                    ExtractionOutcome::NeedsFallback(reason) | ExtractionOutcome::Failed(reason) => {
                        warn!(url = %url, reason = %reason, "URL skipped for this run");
                        summary.failed_urls.push(url);
                    }
                }
            }
        }

        // Phase 3: reconcile
        if cancel.is_cancelled() {
            warn!("Run cancelled, skipping reconciliation");
            summary.aborted = true;
        } else {
            let reconciled = self
                .reconciler
                .reconcile(&self.store, company.id, &observed)
                .await?;
            summary.stale_jobs = reconciled.staled.len();
        }

        if summary.completeness_warning.is_none() && summary.discovered > 0 {
            let lost = summary.failed_urls.len();
            let loss = lost as f64 / summary.discovered as f64;
            if loss > self.config.extractor.loss_threshold {
                summary.completeness_warning = Some(CompletenessWarning::ExtractionLoss {
                    lost,
                    discovered: summary.discovered,
                });
            }
        }

        info!(
            discovered = summary.discovered,
            new_jobs = summary.new_jobs,
            updated_jobs = summary.updated_jobs,
            reactivated_jobs = summary.reactivated_jobs,
            stale_jobs = summary.stale_jobs,
            fallback_recovered = summary.fallback_recovered,
            failed = summary.failed_urls.len(),
            warning = ?summary.completeness_warning,
            aborted = summary.aborted,
            "Crawl run finished"
        );
        Ok(summary)
    }

    async fn record(
        &self,
        company_id: i64,
        job: &ExtractedJob,
        seen_at: DateTime<Utc>,
        summary: &mut CrawlSummary,
        observed: &mut HashSet<String>,
    ) -> CrawlResult<()> {
        match self.store.upsert(company_id, job, seen_at).await? {
            UpsertOutcome::Inserted => {
                summary.new_jobs += 1;
                summary.new_job_ids.push(job.job_id.clone());
            }
            UpsertOutcome::Refreshed => summary.updated_jobs += 1,
            UpsertOutcome::Reactivated => summary.reactivated_jobs += 1,
        }
        observed.insert(job.job_id.clone());
        Ok(())
    }
}

#[cfg(feature = "sqlite")]
impl<L: BrowserLauncher> CrawlRunner<crate::stores::SqliteStore, crate::fetchers::ReqwestFetcher, L> {
    /// Runner backed by the configured SQLite database and a `reqwest` fetcher.
    pub async fn from_config(launcher: L, config: CrawlerConfig) -> CrawlResult<Self> {
        let store = crate::stores::SqliteStore::new(&config.database_url).await?;
        let fetcher = crate::fetchers::ReqwestFetcher::new(config.extractor.request_timeout)?;
        Ok(Self::new(store, fetcher, launcher, config))
    }
}
