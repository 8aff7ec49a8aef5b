//! Phase 2 fast path: plain HTTP fetch plus JSON-LD parse.

use std::sync::Arc;

use futures::stream::{self, Stream, StreamExt};
use tracing::{debug, warn, Instrument};

use crate::context::RunContext;
use crate::error::{CrawlError, CrawlResult};
use crate::jsonld;
use crate::ratelimit::{AdaptiveRateLimiter, FailureKind};
use crate::traits::fetcher::PageFetcher;
use crate::types::config::ExtractorConfig;
use crate::types::job::ExtractedJob;
use crate::types::outcome::ExtractionOutcome;
use crate::types::summary::ExtractionStats;

const RATE_LIMIT_MARKERS: [&str; 2] = ["rate limit", "too many requests"];

fn mentions_rate_limit(body: &str) -> bool {
    let lower = body.to_lowercase();
    RATE_LIMIT_MARKERS.iter().any(|m| lower.contains(m))
}

/// Turns detail URLs into [`ExtractionOutcome`]s over plain HTTP.
///
/// Every request passes through the site's shared [`AdaptiveRateLimiter`]
/// and reports back to it, so concurrent workers slow down together.
pub struct DetailExtractor<F: PageFetcher> {
    fetcher: F,
    limiter: Arc<AdaptiveRateLimiter>,
    config: ExtractorConfig,
}

impl<F: PageFetcher> DetailExtractor<F> {
    pub fn new(fetcher: F, limiter: Arc<AdaptiveRateLimiter>, config: ExtractorConfig) -> Self {
        Self {
            fetcher,
            limiter,
            config,
        }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn limiter(&self) -> &Arc<AdaptiveRateLimiter> {
        &self.limiter
    }

    /// Fetch and parse one URL.
    ///
    /// Transient failures, rate limiting and pages served without a JSON-LD
    /// block are retried with backoff up to `max_retries` attempts. Network
    /// exhaustion is `Failed`; a block that never appeared is `NeedsFallback`.
    /// A block that is present but malformed is `NeedsFallback` straight away.
    pub async fn extract(&self, url: &str) -> ExtractionOutcome {
        let attempts = self.config.max_retries.max(1);
        let mut last_error = String::new();
        let mut block_missing = false;

        for attempt in 0..attempts {
            let kind = match self.fetch_once(url).await {
                Ok(job) => {
                    self.limiter.success();
                    debug!(url = %url, job_id = %job.job_id, "Extracted job");
                    return ExtractionOutcome::Success(job);
                }
                Err(e @ CrawlError::StructuralMismatch { .. }) => {
                    // The site answered; only the page shape is off.
                    self.limiter.success();
                    debug!(url = %url, error = %e, "Routing to render fallback");
                    return ExtractionOutcome::NeedsFallback(e.to_string());
                }
                Err(e @ CrawlError::MissingStructuredData { .. }) => {
                    self.limiter.success();
                    block_missing = true;
                    last_error = e.to_string();
                    FailureKind::Other
                }
                Err(e) if e.is_retryable() => {
                    let kind = e.failure_kind();
                    self.limiter.failure(kind);
                    block_missing = false;
                    last_error = e.to_string();
                    kind
                }
                Err(e) => {
                    self.limiter.failure(e.failure_kind());
                    warn!(url = %url, error = %e, "Fetch failed permanently");
                    return ExtractionOutcome::Failed(e.to_string());
                }
            };

            if attempt + 1 < attempts {
                let delay = self.config.backoff.delay(attempt, kind);
                warn!(
                    url = %url,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %last_error,
                    "Fetch failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }

        if block_missing {
            debug!(url = %url, attempts, "Structured data never appeared, routing to render fallback");
            return ExtractionOutcome::NeedsFallback(format!(
                "{} after {} attempts",
                last_error, attempts
            ));
        }

        warn!(url = %url, attempts, error = %last_error, "Giving up on URL");
        ExtractionOutcome::Failed(format!(
            "gave up after {} attempts: {}",
            attempts, last_error
        ))
    }

    async fn fetch_once(&self, url: &str) -> CrawlResult<ExtractedJob> {
        self.limiter.wait().await;
        let page = self.fetcher.get(url).await?;

        if page.status == 429 {
            return Err(CrawlError::RateLimited {
                url: url.to_string(),
            });
        }
        if !page.is_success() {
            return Err(CrawlError::TransientNetwork {
                url: url.to_string(),
                reason: format!("HTTP {}", page.status),
            });
        }

        let blocks = jsonld::extract_blocks(&page.body);
        if blocks.is_empty() && mentions_rate_limit(&page.body) {
            return Err(CrawlError::RateLimited {
                url: url.to_string(),
            });
        }
        jsonld::parse_job_posting(blocks.iter().map(String::as_str), url)
    }

    /// Extract `urls` with at most `concurrency` requests in flight.
    ///
    /// Outcomes arrive in completion order. Each worker runs inside the
    /// run's span.
    pub fn extract_stream<'a>(
        &'a self,
        urls: Vec<String>,
        ctx: &RunContext,
    ) -> impl Stream<Item = (String, ExtractionOutcome)> + 'a {
        let span = ctx.span();
        stream::iter(urls)
            .map(move |url| {
                async move {
                    let outcome = self.extract(&url).await;
                    (url, outcome)
                }
                .instrument(span.clone())
            })
            .buffer_unordered(self.config.concurrency.max(1))
    }

    /// Extract every URL and tally the outcomes.
    pub async fn extract_all(
        &self,
        urls: Vec<String>,
        ctx: &RunContext,
    ) -> (Vec<(String, ExtractionOutcome)>, ExtractionStats) {
        let mut stats = ExtractionStats::default();
        let outcomes: Vec<_> = self
            .extract_stream(urls, ctx)
            .inspect(|(_, outcome)| stats.record(outcome))
            .collect()
            .await;
        self.report_loss(&stats);
        (outcomes, stats)
    }

    /// Log a completeness risk if fast-path loss exceeds the threshold.
    pub fn report_loss(&self, stats: &ExtractionStats) -> bool {
        let loss = stats.loss_fraction();
        let risky = loss > self.config.loss_threshold;
        if risky {
            warn!(
                succeeded = stats.succeeded,
                needs_fallback = stats.needs_fallback,
                failed = stats.failed,
                loss = loss,
                threshold = self.config.loss_threshold,
                "Fast-path loss above threshold, run completeness at risk"
            );
        } else {
            debug!(
                succeeded = stats.succeeded,
                needs_fallback = stats.needs_fallback,
                failed = stats.failed,
                "Fast path complete"
            );
        }
        risky
    }
}
