//! Testing utilities including mock implementations.
//!
//! These let applications (and this crate's own tests) exercise discovery,
//! extraction and fallback without a network or a real browser.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{BrowserError, BrowserResult, CrawlError, CrawlResult};
use crate::traits::browser::{BrowserLauncher, BrowserSession};
use crate::traits::fetcher::{FetchedPage, PageFetcher};
use crate::types::config::{DetailSelectors, ListingSelectors};

// =============================================================================
// Fixtures
// =============================================================================

/// A Workday-shaped `JobPosting` JSON-LD object.
pub fn job_posting_json(job_id: &str, title: &str) -> String {
    serde_json::json!({
        "@context": "http://schema.org",
        "@type": "JobPosting",
        "title": title,
        "identifier": {"@type": "PropertyValue", "name": title, "value": job_id},
        "description": format!("<p>{} description</p>", title),
        "datePosted": "2025-03-01",
        "employmentType": "FULL_TIME",
        "hiringOrganization": {"@type": "Organization", "name": "Acme Corp"},
        "jobLocation": {
            "@type": "Place",
            "address": {"@type": "PostalAddress", "addressLocality": "Minneapolis", "addressCountry": "United States of America"}
        }
    })
    .to_string()
}

/// A detail page embedding [`job_posting_json`].
pub fn job_posting_html(job_id: &str, title: &str) -> String {
    format!(
        r#"<!DOCTYPE html><html><head><title>{title}</title>
<script type="application/ld+json">{json}</script></head>
<body><div data-automation-id="job-posting-details">{title}</div></body></html>"#,
        title = title,
        json = job_posting_json(job_id, title)
    )
}

/// A rendered-only detail page with no structured data.
pub fn job_page_without_jsonld(title: &str) -> String {
    format!(
        r#"<!DOCTYPE html><html><head><title>{title}</title></head>
<body><div id="root"></div></body></html>"#,
        title = title
    )
}

// =============================================================================
// MockFetcher
// =============================================================================

/// One scripted fetch result.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Page { status: u16, body: String },
    Timeout,
    ConnectionReset,
}

impl MockResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        MockResponse::Page {
            status: 200,
            body: body.into(),
        }
    }

    pub fn status(status: u16) -> Self {
        MockResponse::Page {
            status,
            body: String::new(),
        }
    }
}

/// A scripted [`PageFetcher`].
///
/// Each URL plays its responses in order; the last one repeats. Unknown URLs
/// get a 404. Requests can be slowed down, and the highest number of
/// requests in flight at once is recorded.
#[derive(Clone, Default)]
pub struct MockFetcher {
    responses: Arc<RwLock<HashMap<String, VecDeque<MockResponse>>>>,
    calls: Arc<RwLock<Vec<String>>>,
    latency: Arc<RwLock<Duration>>,
    delays: Arc<RwLock<HashMap<String, Duration>>>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

/// Decrements the in-flight count even if the request future is dropped.
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve a 200 with `body` for `url`.
    pub fn with_page(self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.with_responses(url, vec![MockResponse::ok(body)])
    }

    /// Serve a sequence of responses for `url`.
    pub fn with_responses(self, url: impl Into<String>, responses: Vec<MockResponse>) -> Self {
        self.responses
            .write()
            .unwrap()
            .insert(url.into(), responses.into());
        self
    }

    /// Delay every response by `latency`.
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.write().unwrap() = latency;
        self
    }

    /// Delay responses for `url` by `delay`, overriding the global latency.
    pub fn set_delay(&self, url: &str, delay: Duration) {
        self.delays.write().unwrap().insert(url.to_string(), delay);
    }

    /// Most requests that were in flight at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Every URL requested, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls.read().unwrap().iter().filter(|u| *u == url).count()
    }

    fn next_response(&self, url: &str) -> MockResponse {
        let mut responses = self.responses.write().unwrap();
        match responses.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(MockResponse::status(404)),
            Some(queue) => queue.front().cloned().unwrap_or(MockResponse::status(404)),
            None => MockResponse::status(404),
        }
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn get(&self, url: &str) -> CrawlResult<FetchedPage> {
        self.calls.write().unwrap().push(url.to_string());
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        let _in_flight = InFlight(self.in_flight.clone());

        let delay = self
            .delays
            .read()
            .unwrap()
            .get(url)
            .copied()
            .unwrap_or_else(|| *self.latency.read().unwrap());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match self.next_response(url) {
            MockResponse::Page { status, body } => Ok(FetchedPage::new(url, status, body)),
            MockResponse::Timeout => Err(CrawlError::Timeout {
                url: url.to_string(),
            }),
            MockResponse::ConnectionReset => Err(CrawlError::TransientNetwork {
                url: url.to_string(),
                reason: "connection reset by peer".to_string(),
            }),
        }
    }
}

// =============================================================================
// Fake browser
// =============================================================================

/// A detail page as the fake browser renders it.
#[derive(Debug, Clone, Default)]
pub struct FakeDetail {
    pub json_ld: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
}

impl FakeDetail {
    /// Rendered page carrying the structured block.
    pub fn json_ld(job_id: &str, title: &str) -> Self {
        Self {
            json_ld: Some(job_posting_json(job_id, title)),
            title: Some(title.to_string()),
            description: Some(format!("{} description", title)),
            location: None,
        }
    }

    /// Rendered page with only visible DOM nodes.
    pub fn dom(title: &str, description: &str) -> Self {
        Self {
            json_ld: None,
            title: Some(title.to_string()),
            description: Some(description.to_string()),
            location: None,
        }
    }

    pub fn with_location(mut self, location: &str) -> Self {
        self.location = Some(location.to_string());
        self
    }
}

#[derive(Debug, Clone)]
struct FakeListing {
    label: Option<String>,
    default_size: u32,
    /// Page size -> pages of job hrefs
    pages: HashMap<u32, Vec<Vec<String>>>,
}

#[derive(Debug, Default)]
struct SiteState {
    listings: HashMap<String, FakeListing>,
    details: HashMap<String, FakeDetail>,
    unreachable: HashSet<String>,
    visits: Vec<String>,
}

/// In-memory career site served to [`FakeSession`]s.
///
/// Understands the default [`ListingSelectors`] and [`DetailSelectors`].
#[derive(Clone, Default)]
pub struct FakeSite {
    state: Arc<RwLock<SiteState>>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listing at `url` with the given pages of hrefs.
    ///
    /// When `declared` is set, the pagination label reads
    /// `"1 - {n} of {declared} jobs"`.
    pub fn with_listing(self, url: &str, declared: Option<usize>, pages: Vec<Vec<String>>) -> Self {
        self.set_listing(url, declared, pages);
        self
    }

    /// Replace the listing at `url`, e.g. to delist a job between runs.
    pub fn set_listing(&self, url: &str, declared: Option<usize>, pages: Vec<Vec<String>>) {
        let per_page = pages.first().map(Vec::len).unwrap_or(0);
        let default_size = per_page.max(1) as u32;
        let label = declared.map(|total| format!("1 - {} of {} jobs", per_page, total));
        let mut by_size = HashMap::new();
        by_size.insert(default_size, pages);

        self.state.write().unwrap().listings.insert(
            url.to_string(),
            FakeListing {
                label,
                default_size,
                pages: by_size,
            },
        );
    }

    /// Serve a different pagination of the same listing when the
    /// results-per-page menu selects `size`.
    pub fn with_page_size(self, url: &str, size: u32, pages: Vec<Vec<String>>) -> Self {
        if let Some(listing) = self.state.write().unwrap().listings.get_mut(url) {
            listing.pages.insert(size, pages);
        }
        self
    }

    /// Override the raw pagination label text.
    pub fn with_label(self, url: &str, label: Option<&str>) -> Self {
        if let Some(listing) = self.state.write().unwrap().listings.get_mut(url) {
            listing.label = label.map(str::to_string);
        }
        self
    }

    pub fn with_detail(self, url: &str, detail: FakeDetail) -> Self {
        self.state
            .write()
            .unwrap()
            .details
            .insert(url.to_string(), detail);
        self
    }

    /// Make navigation to `url` fail.
    pub fn with_unreachable(self, url: &str) -> Self {
        self.state
            .write()
            .unwrap()
            .unreachable
            .insert(url.to_string());
        self
    }

    /// Every URL navigated to, across all sessions.
    pub fn visits(&self) -> Vec<String> {
        self.state.read().unwrap().visits.clone()
    }

    pub fn visit_count(&self, url: &str) -> usize {
        self.state
            .read()
            .unwrap()
            .visits
            .iter()
            .filter(|u| *u == url)
            .count()
    }
}

/// Launches [`FakeSession`]s against a [`FakeSite`].
#[derive(Clone)]
pub struct FakeLauncher {
    site: FakeSite,
    launches: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    /// Health flag of every session launched so far
    health: Arc<RwLock<Vec<Arc<AtomicBool>>>>,
    fail_next: Arc<AtomicBool>,
    launch_delay: Arc<RwLock<Duration>>,
}

impl FakeLauncher {
    pub fn new(site: FakeSite) -> Self {
        Self {
            site,
            launches: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
            health: Arc::new(RwLock::new(Vec::new())),
            fail_next: Arc::new(AtomicBool::new(false)),
            launch_delay: Arc::new(RwLock::new(Duration::ZERO)),
        }
    }

    pub fn site(&self) -> &FakeSite {
        &self.site
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Make every session launched so far report unresponsive.
    pub fn wedge_sessions(&self) {
        for flag in self.health.read().unwrap().iter() {
            flag.store(false, Ordering::SeqCst);
        }
    }

    pub fn fail_next_launch(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Make every later launch take `delay`, like a cold browser start.
    pub fn set_launch_delay(&self, delay: Duration) {
        *self.launch_delay.write().unwrap() = delay;
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    type Session = FakeSession;

    async fn launch(&self) -> BrowserResult<FakeSession> {
        let delay = *self.launch_delay.read().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(BrowserError::Launch("fake launch failure".to_string()));
        }
        self.launches.fetch_add(1, Ordering::SeqCst);

        let responsive = Arc::new(AtomicBool::new(true));
        self.health.write().unwrap().push(responsive.clone());

        Ok(FakeSession {
            site: self.site.clone(),
            responsive,
            closes: self.closes.clone(),
            listing_selectors: ListingSelectors::default(),
            detail_selectors: DetailSelectors::default(),
            current_url: None,
            page_index: 0,
            page_size: None,
            size_menu_open: false,
        })
    }
}

/// A browser session over a [`FakeSite`].
pub struct FakeSession {
    site: FakeSite,
    responsive: Arc<AtomicBool>,
    closes: Arc<AtomicUsize>,
    listing_selectors: ListingSelectors,
    detail_selectors: DetailSelectors,
    current_url: Option<String>,
    page_index: usize,
    page_size: Option<u32>,
    size_menu_open: bool,
}

impl FakeSession {
    fn listing(&self) -> Option<FakeListing> {
        let url = self.current_url.as_ref()?;
        self.site.state.read().unwrap().listings.get(url).cloned()
    }

    fn detail(&self) -> Option<FakeDetail> {
        let url = self.current_url.as_ref()?;
        self.site.state.read().unwrap().details.get(url).cloned()
    }

    fn current_pages(&self, listing: &FakeListing) -> Vec<Vec<String>> {
        let size = self.page_size.unwrap_or(listing.default_size);
        listing.pages.get(&size).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&mut self, url: &str) -> BrowserResult<()> {
        {
            let mut state = self.site.state.write().unwrap();
            state.visits.push(url.to_string());
            if state.unreachable.contains(url) {
                return Err(BrowserError::Navigation {
                    url: url.to_string(),
                    reason: "net::ERR_CONNECTION_REFUSED".to_string(),
                });
            }
        }
        self.current_url = Some(url.to_string());
        self.page_index = 0;
        self.page_size = None;
        self.size_menu_open = false;
        Ok(())
    }

    async fn wait_for_selector(&mut self, selector: &str, _timeout: Duration) -> BrowserResult<bool> {
        if let Some(listing) = self.listing() {
            if selector == self.listing_selectors.results {
                return Ok(!self.current_pages(&listing).is_empty());
            }
            if selector == self.listing_selectors.pagination_label {
                return Ok(listing.label.is_some());
            }
        }
        Ok(!self.read_texts(selector).await?.is_empty())
    }

    async fn read_texts(&mut self, selector: &str) -> BrowserResult<Vec<String>> {
        if let Some(listing) = self.listing() {
            if selector == self.listing_selectors.pagination_label {
                return Ok(listing.label.into_iter().collect());
            }
            return Ok(Vec::new());
        }
        let Some(detail) = self.detail() else {
            return Ok(Vec::new());
        };
        let selectors = &self.detail_selectors;
        let text = if selector == selectors.json_ld {
            detail.json_ld
        } else if selector == selectors.title {
            detail.title
        } else if selector == selectors.description {
            detail.description
        } else if Some(selector) == selectors.location.as_deref() {
            detail.location
        } else {
            None
        };
        Ok(text.into_iter().collect())
    }

    async fn read_attributes(&mut self, selector: &str, attribute: &str) -> BrowserResult<Vec<String>> {
        let Some(listing) = self.listing() else {
            return Ok(Vec::new());
        };
        if selector != self.listing_selectors.job_link || attribute != "href" {
            return Ok(Vec::new());
        }
        Ok(self
            .current_pages(&listing)
            .get(self.page_index)
            .cloned()
            .unwrap_or_default())
    }

    async fn click(&mut self, selector: &str) -> BrowserResult<bool> {
        let Some(listing) = self.listing() else {
            return Ok(false);
        };

        if self.listing_selectors.next_page.first().map(String::as_str) == Some(selector) {
            if self.page_index + 1 < self.current_pages(&listing).len() {
                self.page_index += 1;
                return Ok(true);
            }
            return Ok(false);
        }

        if selector == self.listing_selectors.page_size_toggle {
            self.size_menu_open = listing.pages.len() > 1;
            return Ok(self.size_menu_open);
        }

        if self.size_menu_open {
            for size in listing.pages.keys() {
                if selector == self.listing_selectors.page_size_option(*size) {
                    self.page_size = Some(*size);
                    self.page_index = 0;
                    self.size_menu_open = false;
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }

    async fn current_url(&mut self) -> BrowserResult<String> {
        self.current_url.clone().ok_or(BrowserError::Closed)
    }

    async fn is_responsive(&mut self) -> bool {
        self.responsive.load(Ordering::SeqCst)
    }

    async fn close(&mut self) -> BrowserResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.current_url = None;
        Ok(())
    }
}
