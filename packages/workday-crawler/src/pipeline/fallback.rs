//! Browser-rendered extraction for URLs the fast path could not resolve.
//!
//! Reads the same JSON-LD block the fast path looks for, through a pooled
//! browser session, and parses it with the same parser, so a recovered job
//! is indistinguishable from one extracted directly. When the block is
//! absent the visible title and description nodes are used instead.

use futures::stream::{self, Stream, StreamExt};
use tracing::{debug, info, warn, Instrument};
use url::Url;

use crate::context::RunContext;
use crate::error::{CrawlError, CrawlResult};
use crate::jsonld;
use crate::session::SessionPool;
use crate::traits::browser::{BrowserLauncher, BrowserSession};
use crate::types::config::FallbackConfig;
use crate::types::job::{EmploymentType, ExtractedJob};
use crate::types::outcome::ExtractionOutcome;

/// Requisition id from a Workday detail URL.
///
/// Workday paths end in `<Title>_<REQ-ID>`, e.g.
/// `/job/Minneapolis/Data-Analyst_R12345` gives `R12345`.
pub fn job_id_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last = parsed.path_segments()?.rfind(|s| !s.is_empty())?;
    let (_, id) = last.rsplit_once('_')?;
    let valid = !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    valid.then(|| id.to_string())
}

fn non_empty(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

/// Renders detail pages in pooled browser sessions.
#[derive(Debug, Clone, Default)]
pub struct RenderFallback {
    config: FallbackConfig,
}

impl RenderFallback {
    pub fn new(config: FallbackConfig) -> Self {
        Self { config }
    }

    /// Render one URL. `prior` is why the fast path gave up on it and is
    /// kept in the reason chain if rendering fails too.
    pub async fn render<L: BrowserLauncher>(
        &self,
        pool: &SessionPool<L>,
        url: &str,
        prior: &str,
    ) -> ExtractionOutcome {
        let mut lease = match pool.acquire().await {
            Ok(lease) => lease,
            Err(e) => {
                warn!(url = %url, error = %e, "No browser session for fallback");
                return ExtractionOutcome::Failed(format!("{}; fallback: {}", prior, e));
            }
        };

        match self.render_with(&mut *lease, url).await {
            Ok(job) => {
                info!(url = %url, job_id = %job.job_id, "Fallback recovered job");
                ExtractionOutcome::Success(job)
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Fallback failed, discarding session");
                lease.discard().await;
                ExtractionOutcome::Failed(format!("{}; fallback: {}", prior, e))
            }
        }
    }

    async fn render_with<S: BrowserSession>(
        &self,
        session: &mut S,
        url: &str,
    ) -> CrawlResult<ExtractedJob> {
        let selectors = &self.config.selectors;

        session.navigate(url).await?;
        let title_rendered = session
            .wait_for_selector(&selectors.title, self.config.render_timeout)
            .await?;

        let blocks = session.read_texts(&selectors.json_ld).await?;
        if !blocks.is_empty() {
            match jsonld::parse_job_posting(blocks.iter().map(String::as_str), url) {
                Ok(job) => return Ok(job),
                Err(e) => debug!(url = %url, error = %e, "Rendered JSON-LD unusable, reading DOM"),
            }
        }

        if !title_rendered {
            return Err(CrawlError::RenderFailure {
                url: url.to_string(),
                reason: "no structured data and title never rendered".to_string(),
            });
        }
        self.read_dom(session, url).await
    }

    /// Degraded extraction from visible nodes.
    async fn read_dom<S: BrowserSession>(&self, session: &mut S, url: &str) -> CrawlResult<ExtractedJob> {
        let selectors = &self.config.selectors;
        let failure = |reason: &str| CrawlError::RenderFailure {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let title = non_empty(session.read_text(&selectors.title).await?)
            .ok_or_else(|| failure("title node is empty"))?;
        let job_id = job_id_from_url(url).ok_or_else(|| failure("no requisition id in URL"))?;
        let description = non_empty(session.read_text(&selectors.description).await?);
        let location = match &selectors.location {
            Some(selector) => non_empty(session.read_text(selector).await?),
            None => None,
        };

        Ok(ExtractedJob {
            job_id,
            title,
            description,
            date_posted: None,
            employment_type: EmploymentType::Unspecified,
            location,
            hiring_organization: None,
            url: url.to_string(),
        })
    }

    /// Render `(url, prior reason)` pairs, one per available session.
    pub fn render_stream<'a, L: BrowserLauncher>(
        &'a self,
        pool: &'a SessionPool<L>,
        urls: Vec<(String, String)>,
        ctx: &RunContext,
    ) -> impl Stream<Item = (String, ExtractionOutcome)> + 'a {
        let span = ctx.span();
        let width = pool.config().max_sessions.max(1);
        stream::iter(urls)
            .map(move |(url, prior)| {
                async move {
                    let outcome = self.render(pool, &url, &prior).await;
                    (url, outcome)
                }
                .instrument(span.clone())
            })
            .buffer_unordered(width)
    }
}
