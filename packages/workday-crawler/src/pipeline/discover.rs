//! Phase 1: enumerate every detail-page URL on a paginated listing.
//!
//! Pagination is stateful (each "next" click depends on the DOM the last one
//! produced), so a company's listing is walked sequentially through a single
//! pooled session. The result is checked against the total the site reports
//! in its pagination label; a short walk is retried once with a larger page
//! size and the two walks are unioned.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::error::{CrawlError, CrawlResult};
use crate::session::{SessionLease, SessionPool};
use crate::traits::browser::{BrowserLauncher, BrowserSession};
use crate::types::config::DiscoveryConfig;
use crate::types::outcome::CandidateUrl;
use crate::types::summary::CompletenessWarning;

static LABEL_PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"(?i)of\s+([\d,]+)\s+jobs").unwrap(),
        Regex::new(r"(?i)of\s+([\d,]+)").unwrap(),
        Regex::new(r"(?i)([\d,]+)\s+jobs").unwrap(),
    ]
});

/// Parse the declared job total from a pagination label such as
/// `"1 - 20 of 1,204 jobs"`. First matching pattern wins.
pub fn parse_declared_total(label: &str) -> Option<usize> {
    LABEL_PATTERNS.iter().find_map(|re| {
        let digits = re.captures(label)?.get(1)?.as_str().replace(',', "");
        digits.parse().ok()
    })
}

/// Listing URLs to try, in order: the configured one, then with `/en-US`
/// inserted after the host, then without its query string.
pub fn listing_url_variants(base_url: &str) -> Vec<String> {
    let mut variants = vec![base_url.to_string()];
    if let Ok(url) = Url::parse(base_url) {
        if !url.path().starts_with("/en-US") {
            let mut localized = url.clone();
            let path = url.path().trim_start_matches('/');
            localized.set_path(&format!("/en-US/{}", path));
            variants.push(localized.to_string());
        }
        if url.query().is_some() {
            let mut bare = url.clone();
            bare.set_query(None);
            variants.push(bare.to_string());
        }
    }
    let mut seen = Vec::with_capacity(variants.len());
    variants.retain(|v| {
        let fresh = !seen.contains(v);
        seen.push(v.clone());
        fresh
    });
    variants
}

/// Resolve a listing href to an absolute detail URL without fragment.
fn resolve_href(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let mut url = base.join(href).ok()?;
    url.set_fragment(None);
    Some(url.to_string())
}

/// Result of walking one company's listing.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryReport {
    /// Unique detail URLs in first-seen order
    pub urls: Vec<CandidateUrl>,
    /// Total from the pagination label, if one was found
    pub declared_total: Option<usize>,
    /// Listing pages visited across all walks
    pub pages_walked: usize,
    /// Still short of the declared total beyond tolerance
    pub incomplete: bool,
}

impl DiscoveryReport {
    pub fn found(&self) -> usize {
        self.urls.len()
    }

    pub fn completeness_warning(&self) -> Option<CompletenessWarning> {
        match (self.incomplete, self.declared_total) {
            (true, Some(declared)) => Some(CompletenessWarning::DiscoveryShortfall {
                found: self.found(),
                declared,
            }),
            _ => None,
        }
    }

    /// `DiscoveryIncomplete` error describing the shortfall, if any.
    pub fn incomplete_error(&self) -> Option<CrawlError> {
        match (self.incomplete, self.declared_total) {
            (true, Some(declared)) => Some(CrawlError::DiscoveryIncomplete {
                found: self.found(),
                declared,
            }),
            _ => None,
        }
    }
}

/// Drives pagination on a listing page to collect candidate URLs.
#[derive(Debug, Clone, Default)]
pub struct UrlDiscoverer {
    config: DiscoveryConfig,
}

impl UrlDiscoverer {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Walk the listing at `base_url` and return every detail URL found.
    ///
    /// Fails with `ListingUnavailable` only when no variant of the listing
    /// URL loads within the retry budget; a short walk is reported, not
    /// failed.
    #[instrument(skip_all, fields(base_url = %base_url))]
    pub async fn discover<L: BrowserLauncher>(
        &self,
        pool: &SessionPool<L>,
        base_url: &str,
    ) -> CrawlResult<DiscoveryReport> {
        let mut lease = pool.acquire().await?;

        let listing_url = match self.load_listing(&mut lease, base_url).await {
            Ok(url) => url,
            Err(e) => {
                lease.discard().await;
                return Err(e);
            }
        };
        let base = Url::parse(&listing_url).map_err(|_| CrawlError::InvalidUrl {
            url: listing_url.clone(),
        })?;

        let declared_total = self.read_declared_total(&mut lease).await?;
        match declared_total {
            Some(total) => info!(declared_total = total, "Listing declares job total"),
            None => warn!("No pagination label found; skipping completeness check"),
        }

        let mut found: IndexMap<String, usize> = IndexMap::new();
        let mut pages_walked = self
            .walk(&mut lease, &base, declared_total, 0, &mut found)
            .await?;

        if self.is_short(found.len(), declared_total) {
            warn!(
                found = found.len(),
                declared = declared_total.unwrap_or_default(),
                "Discovery short of declared total, retrying with larger page size"
            );
            if let Some(pages) = self
                .walk_with_larger_page_size(
                    &mut lease,
                    &listing_url,
                    &base,
                    declared_total,
                    pages_walked,
                    &mut found,
                )
                .await?
            {
                pages_walked += pages;
            }
        }

        let incomplete = self.is_short(found.len(), declared_total);
        if let Some(declared) = declared_total {
            if found.len() != declared {
                warn!(
                    found = found.len(),
                    declared,
                    incomplete,
                    "Discovered count differs from declared total"
                );
            }
        }
        info!(found = found.len(), pages_walked, "Discovery complete");

        Ok(DiscoveryReport {
            urls: found
                .into_iter()
                .map(|(url, page)| CandidateUrl::new(url, page))
                .collect(),
            declared_total,
            pages_walked,
            incomplete,
        })
    }

    fn is_short(&self, found: usize, declared: Option<usize>) -> bool {
        match declared {
            Some(declared) if declared > found => {
                let shortfall = (declared - found) as f64 / declared as f64;
                shortfall > self.config.completeness_tolerance
            }
            _ => false,
        }
    }

    /// Navigate to the first listing URL variant whose results render.
    async fn load_listing<S: BrowserSession>(
        &self,
        session: &mut SessionLease<S>,
        base_url: &str,
    ) -> CrawlResult<String> {
        let retries = self.config.load_retries.max(1);
        let mut attempts = 0;
        let mut last_reason = String::from("no listing URL tried");

        for url in listing_url_variants(base_url) {
            for attempt in 1..=retries {
                attempts += 1;
                match session.navigate(&url).await {
                    Ok(()) => {
                        match session
                            .wait_for_selector(&self.config.selectors.results, self.config.load_timeout)
                            .await
                        {
                            Ok(true) => {
                                debug!(url = %url, attempt, "Listing loaded");
                                return Ok(url);
                            }
                            Ok(false) => last_reason = "job results never rendered".to_string(),
                            Err(e) => last_reason = e.to_string(),
                        }
                    }
                    Err(e) => last_reason = e.to_string(),
                }
                warn!(url = %url, attempt, reason = %last_reason, "Listing load failed");
                tokio::time::sleep(self.config.settle_delay * attempt).await;
            }
        }

        Err(CrawlError::ListingUnavailable {
            url: base_url.to_string(),
            attempts,
            reason: last_reason,
        })
    }

    async fn read_declared_total<S: BrowserSession>(
        &self,
        session: &mut SessionLease<S>,
    ) -> CrawlResult<Option<usize>> {
        let labels = session
            .read_texts(&self.config.selectors.pagination_label)
            .await?;
        Ok(labels.iter().find_map(|label| parse_declared_total(label)))
    }

    /// Walk pages from the current one, adding unseen URLs to `found`.
    ///
    /// Returns the number of pages visited.
    async fn walk<S: BrowserSession>(
        &self,
        session: &mut SessionLease<S>,
        base: &Url,
        declared_total: Option<usize>,
        page_offset: usize,
        found: &mut IndexMap<String, usize>,
    ) -> CrawlResult<usize> {
        let selectors = &self.config.selectors;
        let mut max_pages = self.config.max_pages;
        let mut pages = 0;

        while pages < max_pages {
            tokio::time::sleep(self.config.settle_delay).await;

            let hrefs = session.read_attributes(&selectors.job_link, "href").await?;
            let before = found.len();
            for href in &hrefs {
                if let Some(url) = resolve_href(base, href) {
                    found.entry(url).or_insert(page_offset + pages);
                }
            }
            debug!(
                page = pages + 1,
                links = hrefs.len(),
                new = found.len() - before,
                "Read listing page"
            );

            if pages == 0 {
                if let Some(total) = declared_total {
                    let per_page = hrefs.len().max(1);
                    max_pages = max_pages.min(total.div_ceil(per_page) + 1);
                }
            }
            pages += 1;

            if !self.next_page(session).await? {
                debug!(pages, "No next page control, reached last page");
                break;
            }
        }

        if pages >= max_pages {
            debug!(max_pages, "Stopped at page cap");
        }
        Ok(pages)
    }

    async fn next_page<S: BrowserSession>(&self, session: &mut SessionLease<S>) -> CrawlResult<bool> {
        for selector in &self.config.selectors.next_page {
            if session.click(selector).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Reload the listing, pick the first larger page size offered, and walk
    /// again. Returns `None` if the site offers no larger page size.
    async fn walk_with_larger_page_size<S: BrowserSession>(
        &self,
        session: &mut SessionLease<S>,
        listing_url: &str,
        base: &Url,
        declared_total: Option<usize>,
        page_offset: usize,
        found: &mut IndexMap<String, usize>,
    ) -> CrawlResult<Option<usize>> {
        let selectors = &self.config.selectors;

        for size in &self.config.alternate_page_sizes {
            session.navigate(listing_url).await?;
            if !session
                .wait_for_selector(&selectors.results, self.config.load_timeout)
                .await?
            {
                continue;
            }
            if !session.click(&selectors.page_size_toggle).await? {
                debug!("No page-size control on listing");
                return Ok(None);
            }
            tokio::time::sleep(self.config.settle_delay).await;

            if session.click(&selectors.page_size_option(*size)).await? {
                info!(page_size = size, "Re-walking listing with larger page size");
                let before = found.len();
                let pages = self
                    .walk(session, base, declared_total, page_offset, found)
                    .await?;
                info!(recovered = found.len() - before, "Alternate walk complete");
                return Ok(Some(pages));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::{FakeLauncher, FakeSite};
    use crate::types::config::SessionPoolConfig;

    const LISTING: &str = "https://acme.wd1.myworkdayjobs.com/en-US/careers";

    fn hrefs(range: std::ops::Range<usize>) -> Vec<String> {
        range
            .map(|i| format!("/en-US/careers/job/Minneapolis/Role-{}_R{}", i, i))
            .collect()
    }

    fn discoverer() -> UrlDiscoverer {
        UrlDiscoverer::new(DiscoveryConfig::default().with_settle_delay(Duration::ZERO))
    }

    fn pool(site: FakeSite) -> SessionPool<FakeLauncher> {
        SessionPool::new(FakeLauncher::new(site), SessionPoolConfig::default())
    }

    #[test]
    fn test_parse_declared_total() {
        assert_eq!(parse_declared_total("1 - 20 of 412 jobs"), Some(412));
        assert_eq!(parse_declared_total("1 - 20 of 1,204 Jobs"), Some(1204));
        assert_eq!(parse_declared_total("Showing 20 of 55"), Some(55));
        assert_eq!(parse_declared_total("87 jobs"), Some(87));
        assert_eq!(parse_declared_total("Search results"), None);
    }

    #[test]
    fn test_listing_url_variants() {
        let variants = listing_url_variants("https://acme.wd1.myworkdayjobs.com/careers?locale=en");
        assert_eq!(
            variants,
            vec![
                "https://acme.wd1.myworkdayjobs.com/careers?locale=en".to_string(),
                "https://acme.wd1.myworkdayjobs.com/en-US/careers?locale=en".to_string(),
                "https://acme.wd1.myworkdayjobs.com/careers".to_string(),
            ]
        );
        assert_eq!(listing_url_variants(LISTING), vec![LISTING.to_string()]);
    }

    #[test]
    fn test_resolve_href_strips_fragment() {
        let base = Url::parse(LISTING).unwrap();
        assert_eq!(
            resolve_href(&base, "/en-US/careers/job/X_R1#apply").as_deref(),
            Some("https://acme.wd1.myworkdayjobs.com/en-US/careers/job/X_R1")
        );
        assert_eq!(resolve_href(&base, "  "), None);
    }

    #[tokio::test]
    async fn test_whole_pages_yield_declared_total() {
        let site = FakeSite::new().with_listing(
            LISTING,
            Some(60),
            vec![hrefs(0..20), hrefs(20..40), hrefs(40..60)],
        );
        let pool = pool(site);

        let report = discoverer().discover(&pool, LISTING).await.unwrap();

        assert_eq!(report.found(), 60);
        assert_eq!(report.declared_total, Some(60));
        assert_eq!(report.pages_walked, 3);
        assert!(!report.incomplete);
        assert_eq!(report.urls[0].page_index, 0);
        assert_eq!(report.urls[59].page_index, 2);
        assert!(report.urls[0].url.starts_with("https://acme.wd1.myworkdayjobs.com/"));
    }

    #[tokio::test]
    async fn test_duplicates_across_pages_are_collapsed() {
        let site = FakeSite::new().with_listing(
            LISTING,
            Some(30),
            vec![hrefs(0..20), hrefs(15..30)],
        );
        let report = discoverer().discover(&pool(site), LISTING).await.unwrap();

        assert_eq!(report.found(), 30);
        assert!(!report.incomplete);
    }

    #[tokio::test]
    async fn test_short_walk_retries_with_larger_page_size_and_unions() {
        // Default pagination silently drops 10 postings; the 50-per-page view has them all.
        let site = FakeSite::new()
            .with_listing(LISTING, Some(50), vec![hrefs(0..20), hrefs(20..40)])
            .with_page_size(LISTING, 50, vec![hrefs(0..50)]);
        let report = discoverer().discover(&pool(site), LISTING).await.unwrap();

        assert_eq!(report.found(), 50);
        assert_eq!(report.pages_walked, 3);
        assert!(!report.incomplete);
        assert!(report.completeness_warning().is_none());
    }

    #[tokio::test]
    async fn test_persistent_shortfall_is_reported_not_failed() {
        let site = FakeSite::new().with_listing(LISTING, Some(50), vec![hrefs(0..20), hrefs(20..40)]);
        let report = discoverer().discover(&pool(site), LISTING).await.unwrap();

        assert_eq!(report.found(), 40);
        assert!(report.incomplete);
        assert_eq!(
            report.completeness_warning(),
            Some(CompletenessWarning::DiscoveryShortfall {
                found: 40,
                declared: 50
            })
        );
        assert!(matches!(
            report.incomplete_error(),
            Some(CrawlError::DiscoveryIncomplete { found: 40, declared: 50 })
        ));
    }

    #[tokio::test]
    async fn test_shortfall_within_tolerance_is_accepted() {
        let site = FakeSite::new().with_listing(LISTING, Some(41), vec![hrefs(0..20), hrefs(20..40)]);
        let report = discoverer().discover(&pool(site), LISTING).await.unwrap();

        assert_eq!(report.found(), 40);
        assert!(!report.incomplete);
        assert_eq!(report.pages_walked, 2);
    }

    #[tokio::test]
    async fn test_missing_label_skips_completeness_check() {
        let site = FakeSite::new().with_listing(LISTING, None, vec![hrefs(0..20), hrefs(20..25)]);
        let report = discoverer().discover(&pool(site), LISTING).await.unwrap();

        assert_eq!(report.declared_total, None);
        assert_eq!(report.found(), 25);
        assert!(!report.incomplete);
    }

    #[tokio::test]
    async fn test_page_cap_bounds_walk() {
        // A broken "next" control that never runs out of pages.
        let pages: Vec<Vec<String>> = (0..10).map(|_| hrefs(0..20)).collect();
        let site = FakeSite::new().with_listing(LISTING, Some(20), pages);
        let report = discoverer().discover(&pool(site), LISTING).await.unwrap();

        assert_eq!(report.pages_walked, 2);
        assert_eq!(report.found(), 20);
    }

    #[tokio::test]
    async fn test_falls_back_to_localized_variant() {
        let configured = "https://acme.wd1.myworkdayjobs.com/careers";
        let site = FakeSite::new()
            .with_unreachable(configured)
            .with_listing(LISTING, Some(20), vec![hrefs(0..20)]);
        let pool = pool(site.clone());

        let report = discoverer().discover(&pool, configured).await.unwrap();

        assert_eq!(report.found(), 20);
        assert_eq!(site.visit_count(configured), 3);
    }

    #[tokio::test]
    async fn test_unloadable_listing_is_fatal_and_bounded() {
        let configured = "https://acme.wd1.myworkdayjobs.com/careers";
        let site = FakeSite::new().with_unreachable(configured);
        let pool = pool(site.clone());

        let err = discoverer().discover(&pool, configured).await.unwrap_err();

        match err {
            CrawlError::ListingUnavailable { attempts, .. } => assert_eq!(attempts, 6),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(site.visits().len(), 6);
        assert_eq!(pool.stats().total, 0);
    }
}
