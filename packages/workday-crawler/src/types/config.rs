//! Configuration types for discovery, extraction and persistence.
//!
//! Every tunable has a `Default` matching the values the crawler has been
//! operated with, plus builder-style `with_*` setters.
//! [`CrawlerConfig::from_env`] overrides defaults from `WORKDAY_*` variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::retry::BackoffPolicy;

/// CSS selectors for the paginated listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingSelectors {
    /// Present once job results have rendered
    pub results: String,
    /// Anchors whose `href` is a detail-page URL
    pub job_link: String,
    /// Text like "1 - 20 of 412 jobs"
    pub pagination_label: String,
    /// Tried in order; the first clickable one advances the page
    pub next_page: Vec<String>,
    /// Control that opens the results-per-page menu
    pub page_size_toggle: String,
}

impl Default for ListingSelectors {
    fn default() -> Self {
        Self {
            results: ".css-1q2dra3, [data-automation-id='jobResults'] li".into(),
            job_link: "[data-automation-id='jobTitle']".into(),
            pagination_label: "div[data-automation-id='paginationLabel']".into(),
            next_page: vec![
                "button[aria-label='next']:not([disabled])".into(),
                "button[aria-label='Next Page']:not([disabled])".into(),
                "button[aria-label='next page']:not([disabled])".into(),
                "button[data-uxi-element-id='next']:not([disabled])".into(),
                "button[aria-label*='next']:not([disabled])".into(),
                "a[aria-label*='next']:not([disabled])".into(),
            ],
            page_size_toggle: "button[data-automation-id='itemsPerPage']".into(),
        }
    }
}

impl ListingSelectors {
    /// Selector for a results-per-page menu option.
    pub fn page_size_option(&self, size: u32) -> String {
        format!("li[data-automation-id='{}']", size)
    }
}

/// CSS selectors used when reading a rendered detail page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailSelectors {
    pub json_ld: String,
    pub title: String,
    pub description: String,
    pub location: Option<String>,
}

impl Default for DetailSelectors {
    fn default() -> Self {
        Self {
            json_ld: "script[type='application/ld+json']".into(),
            title: "[data-automation-id='jobPostingHeader']".into(),
            description: "[data-automation-id='job-posting-details']".into(),
            location: Some("[data-automation-id='locations'] dd".into()),
        }
    }
}

/// Phase 1: listing pagination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// How long to wait for results to render after navigation.
    pub load_timeout: Duration,

    /// Pause after each page load or click, for lazy content.
    pub settle_delay: Duration,

    /// Attempts per listing URL variant before giving up on it.
    pub load_retries: u32,

    /// Absolute cap on pages walked when no total is declared.
    pub max_pages: usize,

    /// Accepted shortfall against the declared total (0.05 = 5%).
    pub completeness_tolerance: f64,

    /// Larger page sizes tried, in order, when the first walk comes up short.
    pub alternate_page_sizes: Vec<u32>,

    pub selectors: ListingSelectors,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            load_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_millis(1500),
            load_retries: 3,
            max_pages: 100,
            completeness_tolerance: 0.05,
            alternate_page_sizes: vec![50, 100],
            selectors: ListingSelectors::default(),
        }
    }
}

impl DiscoveryConfig {
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_load_retries(mut self, retries: u32) -> Self {
        self.load_retries = retries.max(1);
        self
    }

    pub fn with_max_pages(mut self, max: usize) -> Self {
        self.max_pages = max;
        self
    }

    pub fn with_completeness_tolerance(mut self, tolerance: f64) -> Self {
        self.completeness_tolerance = tolerance.clamp(0.0, 1.0);
        self
    }

    pub fn with_selectors(mut self, selectors: ListingSelectors) -> Self {
        self.selectors = selectors;
        self
    }
}

/// Phase 2: HTTP fast path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Maximum detail pages in flight at once.
    pub concurrency: usize,

    /// Fetch attempts per URL on transient failure.
    pub max_retries: u32,

    /// Per-request deadline.
    pub request_timeout: Duration,

    /// Loss fraction above which the run is flagged incomplete.
    pub loss_threshold: f64,

    pub backoff: BackoffPolicy,

    /// Send URLs whose retries were exhausted to the browser as well.
    ///
    /// Default: true. The browser is often admitted where plain HTTP was refused.
    pub fallback_on_network_failure: bool,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            concurrency: 20,
            max_retries: 3,
            request_timeout: Duration::from_secs(10),
            loss_threshold: 0.05,
            backoff: BackoffPolicy::default(),
            fallback_on_network_failure: true,
        }
    }
}

impl ExtractorConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_loss_threshold(mut self, threshold: f64) -> Self {
        self.loss_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn with_fallback_on_network_failure(mut self, enabled: bool) -> Self {
        self.fallback_on_network_failure = enabled;
        self
    }
}

/// Browser-rendered fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    pub selectors: DetailSelectors,
    pub render_timeout: Duration,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            selectors: DetailSelectors::default(),
            render_timeout: Duration::from_secs(30),
        }
    }
}

/// Adaptive delay controller tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Starting delay; the floor when unset
    pub initial_delay: Option<Duration>,
    pub backoff_factor: f64,
    pub timeout_factor: f64,
    pub rate_limit_factor: f64,
    /// Consecutive successes before the delay is reduced
    pub success_streak: u32,
    pub decrease_divisor: f64,
    /// Hard ceiling on request rate, independent of the adaptive delay
    pub max_requests_per_second: Option<u32>,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            initial_delay: None,
            backoff_factor: 1.5,
            timeout_factor: 2.0,
            rate_limit_factor: 3.0,
            success_streak: 10,
            decrease_divisor: 1.2,
            max_requests_per_second: None,
        }
    }
}

impl RateLimiterConfig {
    pub fn with_bounds(mut self, min: Duration, max: Duration) -> Self {
        self.min_delay = min;
        self.max_delay = max.max(min);
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    pub fn with_success_streak(mut self, streak: u32) -> Self {
        self.success_streak = streak.max(1);
        self
    }

    pub fn with_max_requests_per_second(mut self, rps: u32) -> Self {
        self.max_requests_per_second = Some(rps);
        self
    }
}

/// Browser session pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPoolConfig {
    pub max_sessions: usize,
    /// Idle sessions older than this are recycled on the next acquire
    pub idle_timeout: Duration,
    /// Sessions older than this are recycled regardless of use
    pub max_age: Option<Duration>,
    /// Blocked acquirers log a warning at this interval
    pub wait_timeout: Duration,
}

impl Default for SessionPoolConfig {
    fn default() -> Self {
        Self {
            max_sessions: 3,
            idle_timeout: Duration::from_secs(900),
            max_age: None,
            wait_timeout: Duration::from_secs(120),
        }
    }
}

impl SessionPoolConfig {
    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max.max(1);
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_max_age(mut self, age: Duration) -> Self {
        self.max_age = Some(age);
        self
    }
}

/// Post-run sweep tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Consecutive misses after which an active job goes stale
    pub stale_after_misses: u32,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            stale_after_misses: 2,
        }
    }
}

/// Top-level configuration for a crawler instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    pub database_url: String,
    pub discovery: DiscoveryConfig,
    pub extractor: ExtractorConfig,
    pub fallback: FallbackConfig,
    pub rate_limiter: RateLimiterConfig,
    pub sessions: SessionPoolConfig,
    pub reconcile: ReconcileConfig,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://workday_jobs.db".into(),
            discovery: DiscoveryConfig::default(),
            extractor: ExtractorConfig::default(),
            fallback: FallbackConfig::default(),
            rate_limiter: RateLimiterConfig::default(),
            sessions: SessionPoolConfig::default(),
            reconcile: ReconcileConfig::default(),
        }
    }
}

impl CrawlerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from the environment.
    ///
    /// Reads `.env` if present. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::default().apply_env(|key| env::var(key).ok())
    }

    /// Apply overrides from a variable lookup.
    pub fn apply_env(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(url) = lookup("WORKDAY_DATABASE_URL") {
            self.database_url = url;
        }
        if let Some(v) = parse_var::<usize>(&lookup, "WORKDAY_CONCURRENCY")? {
            self.extractor = self.extractor.with_concurrency(v);
        }
        if let Some(v) = parse_var::<u32>(&lookup, "WORKDAY_MAX_RETRIES")? {
            self.extractor = self.extractor.with_max_retries(v);
        }
        if let Some(v) = parse_var::<f64>(&lookup, "WORKDAY_LOSS_THRESHOLD")? {
            self.extractor = self.extractor.with_loss_threshold(v);
        }
        if let Some(v) = parse_var::<usize>(&lookup, "WORKDAY_MAX_SESSIONS")? {
            self.sessions = self.sessions.with_max_sessions(v);
        }
        if let Some(v) = parse_var::<u32>(&lookup, "WORKDAY_STALE_AFTER_MISSES")? {
            self.reconcile.stale_after_misses = v.max(1);
        }
        if let Some(v) = parse_var::<f64>(&lookup, "WORKDAY_COMPLETENESS_TOLERANCE")? {
            self.discovery = self.discovery.with_completeness_tolerance(v);
        }
        let min = parse_var::<u64>(&lookup, "WORKDAY_MIN_DELAY_MS")?.map(Duration::from_millis);
        let max = parse_var::<u64>(&lookup, "WORKDAY_MAX_DELAY_MS")?.map(Duration::from_millis);
        if min.is_some() || max.is_some() {
            let min = min.unwrap_or(self.rate_limiter.min_delay);
            let max = max.unwrap_or(self.rate_limiter.max_delay);
            self.rate_limiter = self.rate_limiter.with_bounds(min, max);
        }
        Ok(self)
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }

    pub fn with_discovery(mut self, discovery: DiscoveryConfig) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn with_extractor(mut self, extractor: ExtractorConfig) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiterConfig) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    pub fn with_sessions(mut self, sessions: SessionPoolConfig) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn with_stale_after_misses(mut self, misses: u32) -> Self {
        self.reconcile.stale_after_misses = misses.max(1);
        self
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Invalid {
                key,
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_tuned_constants() {
        let config = CrawlerConfig::default();
        assert_eq!(config.extractor.concurrency, 20);
        assert_eq!(config.extractor.max_retries, 3);
        assert_eq!(config.sessions.max_sessions, 3);
        assert_eq!(config.sessions.idle_timeout, Duration::from_secs(900));
        assert_eq!(config.reconcile.stale_after_misses, 2);
        assert_eq!(config.rate_limiter.min_delay, Duration::from_millis(500));
        assert_eq!(config.rate_limiter.max_delay, Duration::from_secs(30));
        assert_eq!(config.discovery.completeness_tolerance, 0.05);
    }

    #[test]
    fn test_env_overrides() {
        let config = CrawlerConfig::default()
            .apply_env(lookup_from(&[
                ("WORKDAY_DATABASE_URL", "sqlite::memory:"),
                ("WORKDAY_CONCURRENCY", "8"),
                ("WORKDAY_STALE_AFTER_MISSES", "4"),
                ("WORKDAY_MAX_DELAY_MS", "10000"),
            ]))
            .unwrap();

        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.extractor.concurrency, 8);
        assert_eq!(config.reconcile.stale_after_misses, 4);
        assert_eq!(config.rate_limiter.max_delay, Duration::from_secs(10));
        assert_eq!(config.rate_limiter.min_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_env_rejects_malformed_value() {
        let err = CrawlerConfig::default()
            .apply_env(lookup_from(&[("WORKDAY_CONCURRENCY", "lots")]))
            .unwrap_err();

        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "WORKDAY_CONCURRENCY",
                ..
            }
        ));
    }

    #[test]
    fn test_page_size_option_selector() {
        let selectors = ListingSelectors::default();
        assert_eq!(
            selectors.page_size_option(50),
            "li[data-automation-id='50']"
        );
    }
}
